//! Content rewriting for renames.
//!
//! Two strategies share one contract: given file content and an old/new
//! name, return the rewritten content only if something changed. The
//! structural strategy re-extracts accessor sites and replaces the exact
//! literal spans captured during extraction. The pattern strategy matches
//! each known accessor idiom with the old name specifically. Both produce
//! byte spans of the old name, spliced from the end of the file backwards.

use crate::syntax::{self, SourceLanguage};
use regex::Regex;
use std::path::Path;

/// Byte span of one name literal and its new text.
#[derive(Debug, Clone, PartialEq)]
struct Replacement {
    start: usize,
    end: usize,
    new_text: String,
}

/// One way of renaming a variable inside file content.
pub trait EditStrategy {
    fn name(&self) -> &'static str;

    /// The rewritten content, or `None` when this strategy does not apply or
    /// changes nothing.
    fn rewrite(&self, path: &Path, content: &str, old: &str, new: &str) -> Option<String>;
}

/// Replaces the literal name argument of parsed accessor calls and subscripts.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuralEdit;

impl EditStrategy for StructuralEdit {
    fn name(&self) -> &'static str {
        "structural"
    }

    fn rewrite(&self, path: &Path, content: &str, old: &str, new: &str) -> Option<String> {
        let language = SourceLanguage::from_path(path)?;
        let sites = syntax::extract(language, content)?;
        let replacements: Vec<Replacement> = sites
            .into_iter()
            .filter(|site| site.name == old)
            .map(|site| Replacement {
                start: site.name_start,
                end: site.name_end,
                new_text: new.to_string(),
            })
            .collect();
        changed(content, apply_replacements(content, replacements))
    }
}

/// Anchored substitutions for every accessor and interpolation idiom.
#[derive(Debug, Default, Clone, Copy)]
pub struct PatternEdit;

impl EditStrategy for PatternEdit {
    fn name(&self) -> &'static str {
        "pattern"
    }

    fn rewrite(&self, _path: &Path, content: &str, old: &str, new: &str) -> Option<String> {
        let mut replacements: Vec<Replacement> = Vec::new();
        for pattern in rename_patterns(old) {
            for caps in pattern.captures_iter(content) {
                let Some(name) = caps.get(1) else {
                    continue;
                };
                if replacements.iter().any(|r| r.start == name.start()) {
                    continue;
                }
                replacements.push(Replacement {
                    start: name.start(),
                    end: name.end(),
                    new_text: new.to_string(),
                });
            }
        }
        changed(content, apply_replacements(content, replacements))
    }
}

/// Regexes whose group 1 is exactly `old` in an accessor position.
fn rename_patterns(old: &str) -> Vec<Regex> {
    let old = regex::escape(old);
    [
        format!(r#"os\.getenv\s*\(\s*['"]({old})['"]"#),
        format!(r#"\bgetenv\s*\(\s*['"]({old})['"]"#),
        format!(r#"os\.environ\s*\[\s*['"]({old})['"]"#),
        format!(r#"\benviron\s*\[\s*['"]({old})['"]"#),
        format!(r#"os\.environ\.get\s*\(\s*['"]({old})['"]"#),
        format!(r#"\benviron\.get\s*\(\s*['"]({old})['"]"#),
        format!(r#"\b(?:get_env|env_var|get_setting|get_config)\s*\(\s*['"]({old})['"]"#),
        format!(r#"\bgetEnv\s+"({old})""#),
        format!(r"\bprocess\.env\.({old})\b"),
        format!(r"(?m)^\s*ENV\s+({old})\b"),
        format!(r"\$\{{({old})[:}}\-]"),
        format!(r"\$({old})\b"),
    ]
    .iter()
    .filter_map(|pattern| match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            log::warn!("skipping rename pattern {pattern}: {e}");
            None
        }
    })
    .collect()
}

fn changed(original: &str, rewritten: String) -> Option<String> {
    (rewritten != original).then_some(rewritten)
}

/// Splices every span into `content`, last span first, so each span's offsets
/// still refer to the original text. Spans that fall outside the content or
/// split a character are skipped.
fn apply_replacements(content: &str, mut replacements: Vec<Replacement>) -> String {
    replacements.sort_by(|a, b| b.start.cmp(&a.start));

    let mut result = content.to_string();
    for rep in replacements {
        if rep.start <= rep.end
            && rep.end <= result.len()
            && result.is_char_boundary(rep.start)
            && result.is_char_boundary(rep.end)
        {
            result.replace_range(rep.start..rep.end, &rep.new_text);
        }
    }

    result
}

/// Content after a rename, with the strategy that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Rewrite {
    pub content: String,
    pub strategy: &'static str,
}

/// Renames `old` to `new` in `content`, trying the structural strategy first
/// and falling back to patterns. `None` means the content is unchanged.
pub fn rename(path: &Path, content: &str, old: &str, new: &str) -> Option<Rewrite> {
    let strategies: [&dyn EditStrategy; 2] = [&StructuralEdit, &PatternEdit];
    strategies.iter().find_map(|strategy| {
        let content = strategy.rewrite(path, content, old, new)?;
        log::debug!("{}: {old} -> {new} via {}", path.display(), strategy.name());
        Some(Rewrite {
            content,
            strategy: strategy.name(),
        })
    })
}
