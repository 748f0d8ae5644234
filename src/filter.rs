//! Include/exclude filtering for the project walk.
//!
//! Include patterns are matched against file names. Exclude patterns are
//! matched against every component of the path relative to the root, so an
//! excluded directory prunes its whole subtree during the walk.

use glob::Pattern;
use std::path::{Component, Path};

/// Files scanned for usages by default.
pub const DEFAULT_INCLUDES: &[&str] = &[
    "*.py",
    "*.pyi",
    "*.nix",
    "*.sh",
    "*.bash",
    "*.zsh",
    "*.yml",
    "*.yaml",
    "*.json",
    "*.toml",
    "Dockerfile",
    "Dockerfile.*",
    "*.Dockerfile",
];

/// Build artifacts, caches and VCS metadata skipped by default.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    ".git",
    ".svn",
    ".hg",
    "__pycache__",
    "node_modules",
    "venv",
    ".venv",
    "env",
    ".tox",
    ".pytest_cache",
    ".mypy_cache",
    "build",
    "dist",
    "target",
    ".envdoc_backups",
    "*.backup_*",
    "*.pyc",
    "*.pyo",
    "*.min.js",
    "*.bundle.js",
];

/// Compiled include/exclude glob sets.
#[derive(Debug, Clone)]
pub struct FilterSet {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl Default for FilterSet {
    fn default() -> Self {
        Self::new(&[], &[], true)
    }
}

impl FilterSet {
    /// Builds a filter set. Extra includes and excludes are added to the
    /// defaults; with `default_excludes = false` only `exclude` is used.
    /// Invalid globs are logged and ignored.
    pub fn new(include: &[String], exclude: &[String], default_excludes: bool) -> Self {
        let include = DEFAULT_INCLUDES
            .iter()
            .copied()
            .chain(include.iter().map(String::as_str))
            .filter_map(compile)
            .collect();

        let defaults: &[&str] = if default_excludes { DEFAULT_EXCLUDES } else { &[] };
        let exclude = defaults
            .iter()
            .copied()
            .chain(exclude.iter().map(String::as_str))
            .filter_map(compile)
            .collect();

        Self { include, exclude }
    }

    /// Whether any component of `relative` matches an exclude pattern.
    pub fn is_excluded(&self, relative: &Path) -> bool {
        relative.components().any(|component| match component {
            Component::Normal(name) => name
                .to_str()
                .is_some_and(|name| self.exclude.iter().any(|p| p.matches(name))),
            _ => false,
        })
    }

    /// Whether the file should be scanned for usages.
    pub fn is_scannable(&self, relative: &Path) -> bool {
        if self.is_excluded(relative) {
            return false;
        }
        relative
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| self.include.iter().any(|p| p.matches(name)))
    }
}

fn compile(pattern: &str) -> Option<Pattern> {
    match Pattern::new(pattern) {
        Ok(p) => Some(p),
        Err(e) => {
            log::warn!("ignoring invalid glob '{pattern}': {e}");
            None
        }
    }
}
