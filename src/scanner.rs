//! Project scanner.
//!
//! Walks the project root once, extracting variable usages from scannable
//! files and definitions from declaration files, and combines them with a
//! snapshot of the live environment into an [`Inventory`]. Python and Nix
//! files are read structurally; everything else, and any file that fails to
//! parse, goes through an ordered list of regular expressions.

use crate::definitions::{self, DeclarationKind, DefinitionRecord, SourceKind};
use crate::error::{ScanError, ScanWarning};
use crate::filter::FilterSet;
use crate::syntax::{self, AccessKind, SourceLanguage};
use crate::vocab;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use walkdir::WalkDir;

/// Accessor idioms tried in order by the pattern fallback. Group 1 is the
/// name; group 2, when present, a default value.
static USAGE_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("os.getenv", r#"os\.getenv\s*\(\s*['"]([^'")]+)['"]"#),
        ("getenv", r#"\bgetenv\s*\(\s*['"]([^'")]+)['"]"#),
        ("os.environ[]", r#"os\.environ\s*\[\s*['"]([^'"\]]+)['"]"#),
        ("environ[]", r#"\benviron\s*\[\s*['"]([^'"\]]+)['"]"#),
        ("os.environ.get", r#"os\.environ\.get\s*\(\s*['"]([^'")]+)['"]"#),
        ("environ.get", r#"\benviron\.get\s*\(\s*['"]([^'")]+)['"]"#),
        ("get_env", r#"\bget_env\s*\(\s*['"]([^'")]+)['"]"#),
        ("env_var", r#"\benv_var\s*\(\s*['"]([^'")]+)['"]"#),
        ("getEnv", r#"\bgetEnv\s+"([^"$]+)""#),
        ("process.env", r"\bprocess\.env\.([A-Z_][A-Z0-9_]*)"),
        ("ENV", r"(?m)^\s*ENV\s+([A-Z_][A-Z0-9_]*)"),
        ("${}", r"\$\{([A-Z_][A-Z0-9_]*)(?::?-([^}]*))?\}"),
        ("$", r"\$([A-Z_][A-Z0-9_]*)"),
    ]
    .into_iter()
    .map(|(accessor, pattern)| {
        (
            accessor,
            Regex::new(pattern).expect("usage pattern compiles"),
        )
    })
    .collect()
});

/// One observed read of a variable in source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageRecord {
    pub file_path: PathBuf,
    /// 1-indexed.
    pub line: usize,
    /// 1-indexed.
    pub column: usize,
    pub variable_name: String,
    pub access_kind: AccessKind,
    /// Accessor idiom, e.g. `os.environ.get` or `${}`.
    pub accessor: String,
    pub has_default: bool,
    pub default_value: Option<String>,
    pub enclosing_function: Option<String>,
    pub enclosing_type: Option<String>,
    /// Source line containing the read, trimmed.
    pub context_line: String,
}

impl UsageRecord {
    /// A pattern-kind usage with no scope information.
    pub fn new(file_path: impl Into<PathBuf>, line: usize, column: usize, name: &str) -> Self {
        UsageRecord {
            file_path: file_path.into(),
            line,
            column,
            variable_name: name.to_string(),
            access_kind: AccessKind::Pattern,
            accessor: String::new(),
            has_default: false,
            default_value: None,
            enclosing_function: None,
            enclosing_type: None,
            context_line: String::new(),
        }
    }
}

/// Counts from one scan pass.
#[derive(Debug, Default, Clone, Serialize)]
pub struct UsageStats {
    pub files_scanned: usize,
    pub total_usages: usize,
    pub unique_variables_used: usize,
    pub total_definitions: usize,
    pub unique_variables_defined: usize,
    pub system_variables: usize,
    pub file_variables: usize,
    pub files_with_usage: usize,
    pub declaration_files: usize,
}

/// Number of files a walk selected.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileCounts {
    pub scanned: usize,
    pub declarations: usize,
}

/// Everything one scan pass found. Built once and not mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct Inventory {
    pub root: PathBuf,
    pub usages: Vec<UsageRecord>,
    /// File definitions followed by the live environment as system definitions.
    pub definitions: Vec<DefinitionRecord>,
    pub environment: BTreeMap<String, String>,
    /// Declared names and values keyed by path relative to the root.
    pub file_variables: BTreeMap<String, BTreeMap<String, String>>,
    pub stats: UsageStats,
    pub warnings: Vec<ScanWarning>,
}

impl Inventory {
    /// Assembles an inventory from extracted records. The live environment
    /// is appended to `definitions` as system definitions.
    pub fn new(
        root: impl Into<PathBuf>,
        usages: Vec<UsageRecord>,
        definitions: Vec<DefinitionRecord>,
        environment: BTreeMap<String, String>,
        warnings: Vec<ScanWarning>,
    ) -> Self {
        Self::with_file_counts(
            root,
            usages,
            definitions,
            environment,
            warnings,
            FileCounts::default(),
        )
    }

    /// Like [`Inventory::new`], recording how many files the walk selected.
    pub fn with_file_counts(
        root: impl Into<PathBuf>,
        usages: Vec<UsageRecord>,
        mut definitions: Vec<DefinitionRecord>,
        environment: BTreeMap<String, String>,
        warnings: Vec<ScanWarning>,
        counts: FileCounts,
    ) -> Self {
        let root = root.into();
        let file_variables = file_variable_map(&root, &definitions);
        definitions.extend(
            environment
                .iter()
                .map(|(name, value)| DefinitionRecord::system(name, value)),
        );
        let stats = usage_stats(&usages, &definitions, counts);

        Inventory {
            root,
            usages,
            definitions,
            environment,
            file_variables,
            stats,
            warnings,
        }
    }

    /// Distinct names read by code.
    pub fn used_names(&self) -> BTreeSet<&str> {
        self.usages
            .iter()
            .map(|u| u.variable_name.as_str())
            .collect()
    }

    /// Names present in the live environment.
    pub fn system_names(&self) -> BTreeSet<&str> {
        self.environment.keys().map(String::as_str).collect()
    }

    /// File-declared names that can resolve a usage.
    pub fn file_names(&self) -> BTreeSet<&str> {
        self.definitions
            .iter()
            .filter(|d| d.source_kind == SourceKind::File && d.resolves_usage())
            .map(|d| d.variable_name.as_str())
            .collect()
    }

    /// All usages of `name`, in scan order.
    pub fn usages_of<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a UsageRecord> + 'a {
        self.usages.iter().filter(move |u| u.variable_name == name)
    }
}

/// Snapshot of the current process environment. Non-UTF-8 entries are dropped.
pub fn live_environment() -> BTreeMap<String, String> {
    std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}

/// Scans `root` and builds an [`Inventory`].
///
/// Fails only when `root` is missing or not a directory. Unreadable files,
/// syntax errors and malformed declarations become warnings.
pub fn scan_project(
    root: &Path,
    filter: &FilterSet,
    environment: BTreeMap<String, String>,
) -> Result<Inventory, ScanError> {
    if !root.exists() {
        return Err(ScanError::RootMissing(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(ScanError::RootNotDirectory(root.to_path_buf()));
    }

    let mut warnings = Vec::new();
    let (sources, declarations) = collect_files(root, filter, &mut warnings);
    log::info!(
        "found {} scannable files and {} declaration files under {}",
        sources.len(),
        declarations.len(),
        root.display()
    );

    let mut usages = Vec::new();
    for file in &sources {
        match extract_usages(file, &mut warnings) {
            Ok(found) => {
                log::debug!("{}: {} usages", file.display(), found.len());
                usages.extend(found);
            }
            Err(e) => {
                log::warn!("skipping {}: {e}", file.display());
                warnings.push(ScanWarning::from(&e));
            }
        }
    }

    let mut definitions = Vec::new();
    for (file, kind) in &declarations {
        let content = match std::fs::read_to_string(file) {
            Ok(content) => content,
            Err(source) => {
                let e = ScanError::Read {
                    path: file.clone(),
                    source,
                };
                log::warn!("skipping {}: {e}", file.display());
                warnings.push(ScanWarning::from(&e));
                continue;
            }
        };
        let parsed = definitions::parse(*kind, file, &content);
        warnings.extend(parsed.errors.iter().map(ScanWarning::from));
        definitions.extend(parsed.definitions);
    }

    let counts = FileCounts {
        scanned: sources.len(),
        declarations: declarations.len(),
    };
    let inventory =
        Inventory::with_file_counts(root, usages, definitions, environment, warnings, counts);
    log::info!(
        "{} usages of {} variables, {} definitions",
        inventory.stats.total_usages,
        inventory.stats.unique_variables_used,
        inventory.stats.total_definitions
    );

    Ok(inventory)
}

/// Walks `root`, returning scannable files and declaration files in path order.
pub fn collect_files(
    root: &Path,
    filter: &FilterSet,
    warnings: &mut Vec<ScanWarning>,
) -> (Vec<PathBuf>, Vec<(PathBuf, DeclarationKind)>) {
    let mut sources = Vec::new();
    let mut declarations = Vec::new();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !filter.is_excluded(relative_to(root, e.path())));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let err = ScanError::Walk {
                    path: e.path().map(Path::to_path_buf).unwrap_or_default(),
                    message: e.to_string(),
                };
                log::warn!("{err}");
                warnings.push(ScanWarning::from(&err));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = relative_to(root, entry.path());
        if filter.is_scannable(relative) {
            sources.push(entry.path().to_path_buf());
        }
        if let Some(kind) = DeclarationKind::classify(relative) {
            declarations.push((entry.path().to_path_buf(), kind));
        }
    }

    (sources, declarations)
}

fn relative_to<'a>(root: &Path, path: &'a Path) -> &'a Path {
    path.strip_prefix(root).unwrap_or(path)
}

/// Extracts usages from one file.
///
/// Python and Nix files are parsed; a file with syntax errors is recorded in
/// `warnings` and re-scanned with the pattern fallback.
pub fn extract_usages(
    file: &Path,
    warnings: &mut Vec<ScanWarning>,
) -> Result<Vec<UsageRecord>, ScanError> {
    let source = std::fs::read_to_string(file).map_err(|source| ScanError::Read {
        path: file.to_path_buf(),
        source,
    })?;

    if let Some(language) = SourceLanguage::from_path(file) {
        match syntax::extract(language, &source) {
            Some(sites) => return Ok(structural_usages(file, &source, sites)),
            None => {
                let e = ScanError::Syntax {
                    path: file.to_path_buf(),
                };
                log::warn!("{e}");
                warnings.push(ScanWarning::from(&e));
            }
        }
    }

    Ok(pattern_usages(file, &source))
}

fn structural_usages(file: &Path, source: &str, sites: Vec<syntax::AccessSite>) -> Vec<UsageRecord> {
    let lines: Vec<&str> = source.lines().collect();
    sites
        .into_iter()
        .filter(|site| vocab::is_conventional_name(&site.name))
        .map(|site| UsageRecord {
            file_path: file.to_path_buf(),
            line: site.line,
            column: site.column,
            context_line: context_line(&lines, site.line),
            variable_name: site.name,
            access_kind: site.kind,
            accessor: site.accessor,
            has_default: site.has_default,
            default_value: site.default_value,
            enclosing_function: site.enclosing_function,
            enclosing_type: site.enclosing_type,
        })
        .collect()
}

/// Pattern-based extraction. Hits at the same position from overlapping
/// patterns are reported once, by the first pattern in order.
pub fn pattern_usages(file: &Path, source: &str) -> Vec<UsageRecord> {
    let lines: Vec<&str> = source.lines().collect();
    let index = LineIndex::new(source);
    let mut seen: HashSet<(usize, String)> = HashSet::new();
    let mut usages = Vec::new();

    for (accessor, pattern) in USAGE_PATTERNS.iter() {
        for caps in pattern.captures_iter(source) {
            let Some(name) = caps.get(1) else {
                continue;
            };
            let name_str = name.as_str();
            if !vocab::is_conventional_name(name_str) || vocab::is_denylisted(name_str) {
                continue;
            }
            if !seen.insert((name.start(), name_str.to_string())) {
                continue;
            }

            let (line, column) = index.position(source, name.start());
            let default_value = caps.get(2).map(|m| m.as_str().to_string());
            usages.push(UsageRecord {
                file_path: file.to_path_buf(),
                line,
                column,
                variable_name: name_str.to_string(),
                access_kind: AccessKind::Pattern,
                accessor: accessor.to_string(),
                has_default: default_value.is_some(),
                default_value,
                enclosing_function: None,
                enclosing_type: None,
                context_line: context_line(&lines, line),
            });
        }
    }

    usages.sort_by_key(|u| (u.line, u.column));
    usages
}

fn context_line(lines: &[&str], line: usize) -> String {
    lines
        .get(line.saturating_sub(1))
        .map(|l| l.trim().to_string())
        .unwrap_or_default()
}

/// Byte offsets of line starts, for offset to (line, column) lookups.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { starts }
    }

    fn position(&self, source: &str, offset: usize) -> (usize, usize) {
        let line = self.starts.partition_point(|start| *start <= offset);
        let line_start = self.starts[line - 1];
        let column = source
            .get(line_start..offset)
            .map_or(0, |prefix| prefix.chars().count());
        (line, column + 1)
    }
}

fn file_variable_map(
    root: &Path,
    definitions: &[DefinitionRecord],
) -> BTreeMap<String, BTreeMap<String, String>> {
    let mut map: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    for definition in definitions.iter().filter(|d| !d.is_reference_only) {
        let key = relative_to(root, &definition.source_path)
            .display()
            .to_string();
        map.entry(key)
            .or_default()
            .insert(definition.variable_name.clone(), definition.value.clone());
    }
    map
}

fn usage_stats(
    usages: &[UsageRecord],
    definitions: &[DefinitionRecord],
    counts: FileCounts,
) -> UsageStats {
    let used: HashSet<&str> = usages.iter().map(|u| u.variable_name.as_str()).collect();
    let defined: HashSet<&str> = definitions
        .iter()
        .map(|d| d.variable_name.as_str())
        .collect();
    let of_kind = |kind: SourceKind| {
        definitions
            .iter()
            .filter(|d| d.source_kind == kind)
            .map(|d| d.variable_name.as_str())
            .collect::<HashSet<_>>()
            .len()
    };

    UsageStats {
        files_scanned: counts.scanned,
        declaration_files: counts.declarations,
        total_usages: usages.len(),
        unique_variables_used: used.len(),
        total_definitions: definitions.len(),
        unique_variables_defined: defined.len(),
        system_variables: of_kind(SourceKind::System),
        file_variables: of_kind(SourceKind::File),
        files_with_usage: usages
            .iter()
            .map(|u| &u.file_path)
            .collect::<HashSet<_>>()
            .len(),
    }
}
