//! Reconciliation of used names against available definitions.
//!
//! Every used name that neither the live environment nor a real file
//! definition provides becomes an [`Issue`]. Candidates are collected from the
//! system and file pools separately using three signals:
//! 1. Closest-match shortlist scored with [`similarity::score`]
//! 2. Naming-pattern suffix pairs such as `HOST`/`HOSTNAME` (0.9)
//! 3. Prefix families (0.85) and interchangeable suffixes (0.8)
//!
//! Each pool keeps its best three, system scores get a 1.1 boost capped at
//! 0.95, and the merged list keeps the best five.

use crate::definitions::SourceKind;
use crate::scanner::{Inventory, UsageRecord};
use crate::similarity;
use crate::vocab::{self, INTERCHANGEABLE_SUFFIXES, NAMING_PAIRS, PREFIX_FAMILIES};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

const PATTERN_SCORE: f64 = 0.9;
const PREFIX_SCORE: f64 = 0.85;
const SUFFIX_SCORE: f64 = 0.8;
const SYSTEM_BOOST: f64 = 1.1;
const SHORTLIST_CUTOFF: f64 = 0.6;
const SHORTLIST_LIMIT: usize = 5;
const PER_SOURCE_LIMIT: usize = 3;
const MERGED_LIMIT: usize = 5;
const AVAILABILITY_CUTOFF: f64 = 0.8;

/// Best score at or above which an issue is a typo.
pub const TYPO_THRESHOLD: f64 = 0.9;
/// Best score at or above which an issue is a naming inconsistency.
pub const NAMING_THRESHOLD: f64 = 0.7;

/// One proposed correction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub suggested_name: String,
    pub confidence: f64,
    pub origin_source: SourceKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Typo,
    InconsistentNaming,
    SimilarAvailable,
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    UseSystemVariable,
    UseFileVariable,
    ChooseSource,
    ReviewSuggestions,
    CreateVariable,
}

/// A declaration file holding the used name, or a close variant of it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileAvailability {
    /// Relative to the project root.
    pub file: String,
    pub name: String,
    pub exact: bool,
}

/// An unresolved used name with ranked candidates.
#[derive(Debug, Clone, Serialize)]
pub struct Issue {
    pub used_name: String,
    pub usages: Vec<UsageRecord>,
    /// Descending confidence, ties by name.
    pub candidates: Vec<Candidate>,
    pub issue_kind: IssueKind,
    pub recommended_action: RecommendedAction,
    /// Whether the live environment offered any candidate.
    pub system_available: bool,
    /// Template files included, since they can still point at the right name.
    pub file_availability: Vec<FileAvailability>,
}

impl Issue {
    pub fn top_candidate(&self) -> Option<&Candidate> {
        self.candidates.first()
    }

    pub fn best_confidence(&self) -> f64 {
        self.top_candidate().map_or(0.0, |c| c.confidence)
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct Statistics {
    pub total_used: usize,
    pub total_system: usize,
    pub total_file: usize,
    pub perfect_matches: usize,
    pub system_only_matches: usize,
    pub file_only_matches: usize,
    pub issues: usize,
    pub unused_definitions: usize,
    pub sensitive_variables: usize,
    pub issues_by_kind: BTreeMap<IssueKind, usize>,
    pub issues_by_action: BTreeMap<RecommendedAction, usize>,
    pub perfect_match_score: f64,
    pub system_coverage: f64,
    pub file_coverage: f64,
    pub overall_health_score: f64,
}

/// Result of reconciling one inventory.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    /// Ordered by used name.
    pub issues: Vec<Issue>,
    pub perfect_matches: Vec<String>,
    pub system_only_matches: Vec<String>,
    pub file_only_matches: Vec<String>,
    pub unused_definitions: Vec<String>,
    pub sensitive_variables: Vec<String>,
    pub statistics: Statistics,
}

impl Analysis {
    pub fn health_score(&self) -> f64 {
        self.statistics.overall_health_score
    }
}

/// Reconciles the usages in `inventory` against its definitions.
pub fn analyze(inventory: &Inventory) -> Analysis {
    let used = inventory.used_names();
    let system = inventory.system_names();
    let file = inventory.file_names();

    let mut perfect = Vec::new();
    let mut system_only = Vec::new();
    let mut file_only = Vec::new();
    let mut issues = Vec::new();

    for name in &used {
        match (system.contains(name), file.contains(name)) {
            (true, true) => perfect.push(name.to_string()),
            (true, false) => system_only.push(name.to_string()),
            (false, true) => file_only.push(name.to_string()),
            (false, false) => {
                let issue = build_issue(inventory, name, &system, &file);
                log::debug!(
                    "{name}: {:?} with {} candidates",
                    issue.issue_kind,
                    issue.candidates.len()
                );
                issues.push(issue);
            }
        }
    }

    let unused: Vec<String> = system
        .union(&file)
        .filter(|name| !used.contains(*name))
        .map(|name| name.to_string())
        .collect();
    let sensitive: Vec<String> = used
        .iter()
        .chain(system.iter())
        .chain(file.iter())
        .filter(|name| vocab::is_sensitive(name))
        .map(|name| name.to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut statistics = Statistics {
        total_used: used.len(),
        total_system: system.len(),
        total_file: file.len(),
        perfect_matches: perfect.len(),
        system_only_matches: system_only.len(),
        file_only_matches: file_only.len(),
        issues: issues.len(),
        unused_definitions: unused.len(),
        sensitive_variables: sensitive.len(),
        ..Statistics::default()
    };
    for issue in &issues {
        *statistics.issues_by_kind.entry(issue.issue_kind).or_default() += 1;
        *statistics
            .issues_by_action
            .entry(issue.recommended_action)
            .or_default() += 1;
    }
    statistics.perfect_match_score = percentage(perfect.len(), used.len());
    statistics.system_coverage = percentage(perfect.len() + system_only.len(), used.len());
    statistics.file_coverage = percentage(perfect.len() + file_only.len(), used.len());
    statistics.overall_health_score = health_score(
        perfect.len() + system_only.len() + file_only.len(),
        used.len(),
    );

    log::info!(
        "{} used names, {} issues, health {:.2}",
        used.len(),
        issues.len(),
        statistics.overall_health_score
    );

    Analysis {
        issues,
        perfect_matches: perfect,
        system_only_matches: system_only,
        file_only_matches: file_only,
        unused_definitions: unused,
        sensitive_variables: sensitive,
        statistics,
    }
}

/// Percentage of used names resolved, rounded to two decimals; 100 when
/// nothing is used.
pub fn health_score(resolved: usize, total_used: usize) -> f64 {
    if total_used == 0 {
        return 100.0;
    }
    percentage(resolved, total_used)
}

/// Process exit status for a health score: 0 healthy, 1 partial, 2 poor.
pub fn health_exit_code(score: f64) -> i32 {
    if score >= 90.0 {
        0
    } else if score >= 70.0 {
        1
    } else {
        2
    }
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round2(part as f64 / whole as f64 * 100.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn build_issue(
    inventory: &Inventory,
    name: &str,
    system: &BTreeSet<&str>,
    file: &BTreeSet<&str>,
) -> Issue {
    let system_scores = pool_candidates(name, system);
    let file_scores = pool_candidates(name, file);
    let best_system = system_scores.first().map(|(_, s)| *s);
    let best_file = file_scores.first().map(|(_, s)| *s);

    let (issue_kind, recommended_action) = classify(best_system, best_file);
    let candidates = merge_candidates(&system_scores, &file_scores);

    Issue {
        used_name: name.to_string(),
        usages: inventory.usages_of(name).cloned().collect(),
        candidates,
        issue_kind,
        recommended_action,
        system_available: !system_scores.is_empty(),
        file_availability: file_availability(inventory, name),
    }
}

/// Per declaration file, the exact name or its closest variant.
fn file_availability(inventory: &Inventory, name: &str) -> Vec<FileAvailability> {
    inventory
        .file_variables
        .iter()
        .filter_map(|(file, variables)| {
            let (matched, exact) = if variables.contains_key(name) {
                (name, true)
            } else {
                let closest = similarity::close_matches(
                    name,
                    variables.keys().map(String::as_str),
                    1,
                    AVAILABILITY_CUTOFF,
                );
                (*closest.first()?, false)
            };
            Some(FileAvailability {
                file: file.clone(),
                name: matched.to_string(),
                exact,
            })
        })
        .collect()
}

/// Classifies from the unboosted best score of each pool.
fn classify(best_system: Option<f64>, best_file: Option<f64>) -> (IssueKind, RecommendedAction) {
    let preferred = |system: f64, file: f64| {
        if system > file {
            RecommendedAction::UseSystemVariable
        } else {
            RecommendedAction::UseFileVariable
        }
    };

    match (best_system, best_file) {
        (None, None) => (IssueKind::Missing, RecommendedAction::CreateVariable),
        (system, file) => {
            let s = system.unwrap_or(f64::MIN);
            let f = file.unwrap_or(f64::MIN);
            let best = s.max(f);
            if best >= TYPO_THRESHOLD {
                (IssueKind::Typo, preferred(s, f))
            } else if best >= NAMING_THRESHOLD {
                let action = if system.is_some() && file.is_some() {
                    RecommendedAction::ChooseSource
                } else {
                    preferred(s, f)
                };
                (IssueKind::InconsistentNaming, action)
            } else {
                (
                    IssueKind::SimilarAvailable,
                    RecommendedAction::ReviewSuggestions,
                )
            }
        }
    }
}

/// Best candidates for `name` from one pool, highest first, at most three.
fn pool_candidates(name: &str, pool: &BTreeSet<&str>) -> Vec<(String, f64)> {
    let mut best: BTreeMap<String, f64> = BTreeMap::new();
    let mut offer = |candidate: &str, score: f64| {
        let entry = best.entry(candidate.to_string()).or_insert(score);
        if score > *entry {
            *entry = score;
        }
    };

    for candidate in similarity::close_matches(
        name,
        pool.iter().copied(),
        SHORTLIST_LIMIT,
        SHORTLIST_CUTOFF,
    ) {
        offer(candidate, similarity::score(name, candidate));
    }
    for candidate in pattern_matches(name, pool) {
        offer(&candidate, PATTERN_SCORE);
    }
    for candidate in prefix_family_matches(name, pool) {
        offer(&candidate, PREFIX_SCORE);
    }
    for candidate in suffix_matches(name, pool) {
        offer(&candidate, SUFFIX_SCORE);
    }

    let mut ranked: Vec<(String, f64)> = best.into_iter().collect();
    sort_ranked(&mut ranked);
    ranked.truncate(PER_SOURCE_LIMIT);
    ranked
}

fn sort_ranked(ranked: &mut [(String, f64)]) {
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
}

/// Names obtained by swapping a naming-pair suffix, in both directions.
fn pattern_matches(name: &str, pool: &BTreeSet<&str>) -> Vec<String> {
    let mut hits = Vec::new();
    for (a, b) in NAMING_PAIRS {
        for (from, to) in [(a, b), (b, a)] {
            if let Some(stem) = name.strip_suffix(from) {
                let alternative = format!("{stem}{to}");
                if pool.contains(alternative.as_str()) && !hits.contains(&alternative) {
                    hits.push(alternative);
                }
            }
        }
    }
    hits
}

/// Bare form of a prefixed name, the bare form under every other known
/// prefix, or the name with a known prefix added.
fn prefix_family_matches(name: &str, pool: &BTreeSet<&str>) -> Vec<String> {
    let own = PREFIX_FAMILIES
        .iter()
        .filter(|prefix| name.len() > prefix.len() && name.starts_with(*prefix))
        .max_by_key(|prefix| prefix.len());
    let bare = own.map_or(name, |prefix| &name[prefix.len()..]);

    let mut hits = Vec::new();
    if own.is_some() && pool.contains(bare) {
        hits.push(bare.to_string());
    }
    for prefix in PREFIX_FAMILIES {
        if Some(prefix) == own {
            continue;
        }
        let alternative = format!("{prefix}{bare}");
        if alternative != name && pool.contains(alternative.as_str()) && !hits.contains(&alternative)
        {
            hits.push(alternative);
        }
    }
    hits
}

/// Same base name with another interchangeable suffix, or with none.
fn suffix_matches(name: &str, pool: &BTreeSet<&str>) -> Vec<String> {
    let Some(base) = INTERCHANGEABLE_SUFFIXES
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix))
        .filter(|base| !base.is_empty())
    else {
        return Vec::new();
    };

    let mut hits = Vec::new();
    if pool.contains(base) {
        hits.push(base.to_string());
    }
    for suffix in INTERCHANGEABLE_SUFFIXES {
        let alternative = format!("{base}{suffix}");
        if alternative != name && pool.contains(alternative.as_str()) {
            hits.push(alternative);
        }
    }
    hits
}

/// Boosts system scores, keeps the best score per name and the top five.
fn merge_candidates(system: &[(String, f64)], file: &[(String, f64)]) -> Vec<Candidate> {
    let mut merged: BTreeMap<&str, Candidate> = BTreeMap::new();
    let boosted = system.iter().map(|(name, score)| {
        (
            name,
            (score * SYSTEM_BOOST).min(similarity::FORMAT_VARIANT),
            SourceKind::System,
        )
    });
    let plain = file.iter().map(|(name, score)| (name, *score, SourceKind::File));

    for (name, confidence, origin_source) in boosted.chain(plain) {
        let replace = merged
            .get(name.as_str())
            .is_none_or(|existing| confidence > existing.confidence);
        if replace {
            merged.insert(
                name.as_str(),
                Candidate {
                    suggested_name: name.clone(),
                    confidence,
                    origin_source,
                },
            );
        }
    }

    let mut candidates: Vec<Candidate> = merged.into_values().collect();
    candidates.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.suggested_name.cmp(&b.suggested_name))
    });
    candidates.truncate(MERGED_LIMIT);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::DefinitionRecord;
    use std::path::Path;

    fn inventory(used: &[&str], file: &[&str], system: &[&str]) -> Inventory {
        let usages = used
            .iter()
            .enumerate()
            .map(|(i, name)| UsageRecord::new("app.py", i + 1, 1, name))
            .collect();
        let definitions = file
            .iter()
            .enumerate()
            .map(|(i, name)| DefinitionRecord::file(Path::new(".env"), i + 1, name, "x", false))
            .collect();
        let environment = system
            .iter()
            .map(|name| (name.to_string(), "x".to_string()))
            .collect();
        Inventory::new("/project", usages, definitions, environment, Vec::new())
    }

    fn names(candidates: &[Candidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.suggested_name.as_str()).collect()
    }

    #[test]
    fn renamed_host_suggests_file_variable() {
        let analysis = analyze(&inventory(&["DB_HOST"], &["DB_HOSTNAME"], &[]));
        let issue = &analysis.issues[0];
        assert_eq!(issue.used_name, "DB_HOST");
        assert_eq!(issue.issue_kind, IssueKind::Typo);
        assert_eq!(issue.recommended_action, RecommendedAction::UseFileVariable);
        assert_eq!(issue.candidates[0].suggested_name, "DB_HOSTNAME");
        assert_eq!(issue.candidates[0].confidence, PATTERN_SCORE);
    }

    #[test]
    fn case_typo_is_a_format_variant() {
        let analysis = analyze(&inventory(&["API_KEy"], &["API_KEY"], &[]));
        let issue = &analysis.issues[0];
        assert_eq!(issue.issue_kind, IssueKind::Typo);
        assert_eq!(issue.candidates[0].suggested_name, "API_KEY");
        assert_eq!(issue.candidates[0].confidence, similarity::FORMAT_VARIANT);
    }

    #[test]
    fn unrelated_name_is_missing() {
        let analysis = analyze(&inventory(
            &["COMPLETELY_UNRELATED_NAME"],
            &["DB_HOST"],
            &["PATH"],
        ));
        let issue = &analysis.issues[0];
        assert_eq!(issue.issue_kind, IssueKind::Missing);
        assert!(issue.candidates.is_empty());
        assert_eq!(issue.recommended_action, RecommendedAction::CreateVariable);
    }

    #[test]
    fn names_in_both_sources_are_never_issues() {
        let analysis = analyze(&inventory(
            &["DATABASE_URL", "SECRET_KEY"],
            &["DATABASE_URL", "SECRET_KEY"],
            &["DATABASE_URL", "SECRET_KEY"],
        ));
        assert!(analysis.issues.is_empty());
        assert_eq!(analysis.perfect_matches, vec!["DATABASE_URL", "SECRET_KEY"]);
        assert_eq!(analysis.health_score(), 100.0);
    }

    #[test]
    fn availability_lists_exact_and_similar_files() {
        let definitions = vec![
            DefinitionRecord::file(Path::new("/project/.env"), 1, "API_TOKENS", "x", false),
            DefinitionRecord::file(Path::new("/project/.env.example"), 1, "API_TOKEN", "", true),
            DefinitionRecord::file(Path::new("/project/ci.env"), 1, "UNRELATED", "x", false),
        ];
        let environment = BTreeMap::from([("API_TOKENS".to_string(), "x".to_string())]);
        let usages = vec![UsageRecord::new("/project/app.py", 1, 1, "API_TOKEN")];
        let inv = Inventory::new("/project", usages, definitions, environment, Vec::new());

        let issue = &analyze(&inv).issues[0];
        assert!(issue.system_available);
        assert_eq!(
            issue.file_availability,
            vec![
                FileAvailability {
                    file: ".env".to_string(),
                    name: "API_TOKENS".to_string(),
                    exact: false,
                },
                FileAvailability {
                    file: ".env.example".to_string(),
                    name: "API_TOKEN".to_string(),
                    exact: true,
                },
            ]
        );

        let missing = &analyze(&inventory(&["NOTHING_LIKE_IT"], &[], &[])).issues[0];
        assert!(!missing.system_available);
        assert!(missing.file_availability.is_empty());
    }

    #[test]
    fn template_definitions_do_not_resolve() {
        let mut inv = inventory(&["API_TOKEN"], &[], &[]);
        inv.definitions.push(DefinitionRecord::file(
            Path::new(".env.example"),
            1,
            "API_TOKEN",
            "",
            true,
        ));
        let analysis = analyze(&inv);
        assert_eq!(analysis.issues.len(), 1);
        assert_eq!(analysis.issues[0].issue_kind, IssueKind::Missing);
    }

    #[test]
    fn system_scores_are_boosted_and_capped() {
        let analysis = analyze(&inventory(&["API_KEy", "DB_HOST"], &[], &["API_KEY", "DB_HOSTNAME"]));
        for issue in &analysis.issues {
            let top = issue.top_candidate().unwrap();
            assert_eq!(top.origin_source, SourceKind::System);
            assert_eq!(top.confidence, similarity::FORMAT_VARIANT);
            assert_eq!(issue.recommended_action, RecommendedAction::UseSystemVariable);
        }
    }

    #[test]
    fn candidates_sorted_with_lexical_ties() {
        let analysis = analyze(&inventory(
            &["APP_SECRET"],
            &["DJANGO_SECRET", "FLASK_SECRET", "SECRET", "APP_SECRETS"],
            &[],
        ));
        let candidates = &analysis.issues[0].candidates;
        for pair in candidates.windows(2) {
            assert!(pair[0].confidence >= pair[1].confidence);
            if pair[0].confidence == pair[1].confidence {
                assert!(pair[0].suggested_name < pair[1].suggested_name);
            }
        }
        assert!(candidates.len() <= PER_SOURCE_LIMIT);
        assert!(candidates.iter().all(|c| (0.0..=1.0).contains(&c.confidence)));
    }

    #[test]
    fn ambiguous_source_defers_to_caller() {
        let analysis = analyze(&inventory(&["REDIS_HOST"], &["REDIS_URL"], &["REDIS_PORT"]));
        let issue = &analysis.issues[0];
        assert_eq!(issue.issue_kind, IssueKind::InconsistentNaming);
        assert_eq!(issue.recommended_action, RecommendedAction::ChooseSource);
        assert_eq!(names(&issue.candidates), vec!["REDIS_PORT", "REDIS_URL"]);
    }

    #[test]
    fn prefix_family_finds_bare_and_sibling_forms() {
        let pool: BTreeSet<&str> = ["SECRET_KEY", "FLASK_SECRET_KEY"].into();
        assert_eq!(
            prefix_family_matches("DJANGO_SECRET_KEY", &pool),
            vec!["SECRET_KEY", "FLASK_SECRET_KEY"]
        );
        let pool: BTreeSet<&str> = ["APP_PORT"].into();
        assert_eq!(prefix_family_matches("PORT", &pool), vec!["APP_PORT"]);
    }

    #[test]
    fn pattern_pairs_work_both_ways() {
        let pool: BTreeSet<&str> = ["DB_HOST", "API_TOKEN"].into();
        assert_eq!(pattern_matches("DB_HOSTNAME", &pool), vec!["DB_HOST"]);
        assert_eq!(pattern_matches("API_KEY", &pool), vec!["API_TOKEN"]);
    }

    #[test]
    fn empty_inventory_is_fully_healthy() {
        let analysis = analyze(&inventory(&[], &["UNUSED_VAR"], &[]));
        assert_eq!(analysis.health_score(), 100.0);
        assert_eq!(analysis.unused_definitions, vec!["UNUSED_VAR"]);
        assert_eq!(health_exit_code(analysis.health_score()), 0);
    }

    #[test]
    fn health_rises_as_names_resolve() {
        let used = ["ONE_VAR", "TWO_VAR", "THREE_VAR"];
        let mut previous = -1.0;
        for resolved in 0..=used.len() {
            let analysis = analyze(&inventory(&used, &used[..resolved], &[]));
            assert!(analysis.health_score() >= previous);
            previous = analysis.health_score();
        }
        assert_eq!(previous, 100.0);
    }

    #[test]
    fn statistics_round_to_two_decimals() {
        let analysis = analyze(&inventory(&["A_VAR", "B_VAR", "C_VAR"], &["A_VAR"], &[]));
        assert_eq!(analysis.statistics.overall_health_score, 33.33);
        assert_eq!(analysis.statistics.file_coverage, 33.33);
        assert_eq!(analysis.statistics.system_coverage, 0.0);
        assert_eq!(health_exit_code(33.33), 2);
        assert_eq!(health_exit_code(75.0), 1);
    }

    #[test]
    fn sensitive_names_span_all_sources() {
        let analysis = analyze(&inventory(&["JWT_SECRET"], &["DB_PASSWORD"], &["GITHUB_TOKEN", "HOME"]));
        assert_eq!(
            analysis.sensitive_variables,
            vec!["DB_PASSWORD", "GITHUB_TOKEN", "JWT_SECRET"]
        );
    }
}
