//! Declaration files: dotenv files, container build files, compose files and
//! CI pipeline manifests.
//!
//! Parsing is line oriented and deliberately shallow. Compose and pipeline
//! manifests are not parsed as YAML; only `environment:`/`env:`/`variables:`
//! blocks and `${NAME}`-style interpolation sites are picked up.

use crate::error::ConfigParseError;
use crate::vocab;
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static REFERENCE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\$\{([A-Z_][A-Z0-9_]*)",
        r"\$([A-Z_][A-Z0-9_]*)",
        r"\b(?:secrets|env|vars)\.([A-Z_][A-Z0-9_]*)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("reference pattern compiles"))
    .collect()
});

const ENV_BLOCK_HEADERS: &[&str] = &["environment:", "env:", "variables:"];
const PIPELINE_FILES: &[&str] = &[
    ".gitlab-ci.yml",
    "azure-pipelines.yml",
    "bitbucket-pipelines.yml",
];
const TEMPLATE_MARKERS: &[&str] = &["example", "sample", "template"];

/// Where a definition came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    File,
    System,
}

/// Source path recorded for definitions from the live environment.
pub const SYSTEM_SOURCE: &str = "<system>";

/// One declared name/value pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DefinitionRecord {
    pub source_path: PathBuf,
    /// 1-indexed; 0 for the live environment.
    pub line: usize,
    pub variable_name: String,
    pub value: String,
    pub source_kind: SourceKind,
    /// Declared in an example/template file; never resolves a usage.
    pub is_template_only: bool,
    pub is_sensitive: bool,
    /// Only an interpolation site was seen, no value. Still resolves usages:
    /// the pipeline or compose file supplies the variable at run time.
    pub is_reference_only: bool,
}

impl DefinitionRecord {
    pub(crate) fn file(
        path: &Path,
        line: usize,
        name: &str,
        value: &str,
        is_template_only: bool,
    ) -> Self {
        DefinitionRecord {
            source_path: path.to_path_buf(),
            line,
            variable_name: name.to_string(),
            value: value.to_string(),
            source_kind: SourceKind::File,
            is_template_only,
            is_sensitive: vocab::is_sensitive(name),
            is_reference_only: false,
        }
    }

    /// A definition from the live process environment.
    pub fn system(name: &str, value: &str) -> Self {
        DefinitionRecord {
            source_path: PathBuf::from(SYSTEM_SOURCE),
            line: 0,
            variable_name: name.to_string(),
            value: value.to_string(),
            source_kind: SourceKind::System,
            is_template_only: false,
            is_sensitive: vocab::is_sensitive(name),
            is_reference_only: false,
        }
    }

    /// Whether this definition can resolve a usage.
    pub fn resolves_usage(&self) -> bool {
        !self.is_template_only
    }
}

/// Kinds of declaration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    Dotenv,
    Dockerfile,
    Compose,
    Pipeline,
}

impl DeclarationKind {
    /// Classifies a path relative to the project root.
    pub fn classify(relative: &Path) -> Option<Self> {
        let name = relative.file_name()?.to_str()?;
        let is_yaml = name.ends_with(".yml") || name.ends_with(".yaml");

        if name == ".env" || name.starts_with(".env.") || name.ends_with(".env") {
            Some(DeclarationKind::Dotenv)
        } else if name.starts_with("Dockerfile")
            || name.ends_with(".Dockerfile")
            || name.ends_with(".dockerfile")
        {
            Some(DeclarationKind::Dockerfile)
        } else if is_yaml && (name.starts_with("docker-compose") || name.starts_with("compose")) {
            Some(DeclarationKind::Compose)
        } else if PIPELINE_FILES.contains(&name) || (is_yaml && is_github_workflow(relative)) {
            Some(DeclarationKind::Pipeline)
        } else {
            None
        }
    }
}

fn is_github_workflow(relative: &Path) -> bool {
    let mut parents = relative.parent().into_iter().flat_map(Path::components).rev();
    let workflows = parents.next().and_then(|c| c.as_os_str().to_str());
    let github = parents.next().and_then(|c| c.as_os_str().to_str());
    workflows == Some("workflows") && github == Some(".github")
}

/// Whether a file name marks an example/template declaration file.
pub fn is_template_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_lowercase)
        .is_some_and(|name| TEMPLATE_MARKERS.iter().any(|m| name.contains(m)))
}

/// Definitions and skipped lines from one declaration file.
#[derive(Debug, Default)]
pub struct ParsedDeclarations {
    pub definitions: Vec<DefinitionRecord>,
    pub errors: Vec<ConfigParseError>,
}

impl ParsedDeclarations {
    fn reject(&mut self, path: &Path, line: usize, reason: impl Into<String>) {
        let err = ConfigParseError {
            path: path.to_path_buf(),
            line,
            reason: reason.into(),
        };
        log::warn!("skipping declaration: {err}");
        self.errors.push(err);
    }
}

/// Parses the declarations in `content` according to `kind`.
pub fn parse(kind: DeclarationKind, path: &Path, content: &str) -> ParsedDeclarations {
    let template = is_template_file(path);
    let mut parsed = ParsedDeclarations::default();
    match kind {
        DeclarationKind::Dotenv => parse_dotenv(path, content, template, &mut parsed),
        DeclarationKind::Dockerfile => parse_dockerfile(path, content, template, &mut parsed),
        DeclarationKind::Compose | DeclarationKind::Pipeline => {
            parse_env_blocks(path, content, template, &mut parsed);
            parse_references(path, content, template, &mut parsed);
        }
    }
    parsed
}

fn parse_dotenv(path: &Path, content: &str, template: bool, parsed: &mut ParsedDeclarations) {
    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line
            .strip_prefix("export ")
            .map(str::trim_start)
            .unwrap_or(line);

        let Some((key, value)) = line.split_once('=') else {
            parsed.reject(path, line_no, "expected NAME=value");
            continue;
        };
        let key = key.trim();
        if !is_valid_key(key) {
            parsed.reject(path, line_no, format!("invalid variable name '{key}'"));
            continue;
        }
        let value = unquote(value.trim());
        parsed
            .definitions
            .push(DefinitionRecord::file(path, line_no, key, &value, template));
    }
}

fn parse_dockerfile(path: &Path, content: &str, template: bool, parsed: &mut ParsedDeclarations) {
    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        let Some((directive, rest)) = line.split_once(char::is_whitespace) else {
            continue;
        };
        if !directive.eq_ignore_ascii_case("ENV") {
            continue;
        }
        let rest = rest.trim();

        let tokens = split_respecting_quotes(rest);
        let Some(first) = tokens.first() else {
            parsed.reject(path, line_no, "empty ENV directive");
            continue;
        };

        if first.contains('=') {
            for token in &tokens {
                let Some((key, value)) = token.split_once('=') else {
                    parsed.reject(path, line_no, format!("expected NAME=value, got '{token}'"));
                    continue;
                };
                push_checked(parsed, path, line_no, key, &unquote(value), template);
            }
        } else if tokens.len() >= 2 {
            let value = unquote(rest[first.len()..].trim());
            push_checked(parsed, path, line_no, first, &value, template);
        } else {
            parsed.reject(path, line_no, "ENV without a value");
        }
    }
}

fn parse_env_blocks(path: &Path, content: &str, template: bool, parsed: &mut ParsedDeclarations) {
    // (header indent, indent of the first entry)
    let mut block: Option<(usize, Option<usize>)> = None;

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let indent = raw.len() - raw.trim_start().len();

        if let Some((header, entry_indent)) = block {
            if indent > header {
                match entry_indent {
                    None => block = Some((header, Some(indent))),
                    Some(expected) if indent > expected => continue,
                    Some(_) => {}
                }
                parse_block_entry(path, line_no, trimmed, template, parsed);
                continue;
            }
            block = None;
        }

        if ENV_BLOCK_HEADERS.contains(&trimmed) {
            block = Some((indent, None));
        }
    }
}

fn parse_block_entry(
    path: &Path,
    line_no: usize,
    entry: &str,
    template: bool,
    parsed: &mut ParsedDeclarations,
) {
    let (key, value) = match entry.strip_prefix("- ") {
        Some(item) => {
            let item = unquote(item.trim());
            match item.split_once('=') {
                Some((k, v)) => (k.trim().to_string(), unquote(v.trim())),
                None => (item, String::new()),
            }
        }
        None => match entry.split_once(':') {
            Some((k, v)) => (unquote(k.trim()), unquote(v.trim())),
            None => {
                parsed.reject(path, line_no, "expected NAME: value");
                return;
            }
        },
    };
    push_checked(parsed, path, line_no, &key, &value, template);
}

fn parse_references(path: &Path, content: &str, template: bool, parsed: &mut ParsedDeclarations) {
    let mut seen = std::collections::HashSet::new();
    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;
        if line.trim_start().starts_with('#') {
            continue;
        }
        for pattern in REFERENCE_PATTERNS.iter() {
            for caps in pattern.captures_iter(line) {
                let name = &caps[1];
                if !seen.insert((name.to_string(), line_no)) {
                    continue;
                }
                let mut definition = DefinitionRecord::file(path, line_no, name, "", template);
                definition.is_reference_only = true;
                parsed.definitions.push(definition);
            }
        }
    }
}

fn push_checked(
    parsed: &mut ParsedDeclarations,
    path: &Path,
    line_no: usize,
    key: &str,
    value: &str,
    template: bool,
) {
    let key = key.trim();
    if is_valid_key(key) {
        parsed
            .definitions
            .push(DefinitionRecord::file(path, line_no, key, value, template));
    } else {
        parsed.reject(path, line_no, format!("invalid variable name '{key}'"));
    }
}

fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Strips matching surrounding quotes, or an inline ` #` comment from an
/// unquoted value.
fn unquote(value: &str) -> String {
    if let Some(quote) = value.chars().next().filter(|c| *c == '"' || *c == '\'') {
        if let Some(end) = value[1..].find(quote) {
            return value[1..1 + end].to_string();
        }
        return value.to_string();
    }
    match value.find(" #") {
        Some(idx) => value[..idx].trim_end().to_string(),
        None => value.to_string(),
    }
}

fn split_respecting_quotes(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in input.chars() {
        match quote {
            Some(q) if c == q => {
                quote = None;
                current.push(c);
            }
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                current.push(c);
            }
            None if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            None => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}
