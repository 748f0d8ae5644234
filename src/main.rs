//! envdoc: reconcile the environment variables a project reads with the ones
//! it declares and the ones that are set.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Args, Commands, Filters};
use colored::Colorize;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, Select};
use envdoc::analyzer::{self, Analysis, Issue, IssueKind};
use envdoc::definitions::{DefinitionRecord, SourceKind};
use envdoc::error::ScanWarning;
use envdoc::filter::FilterSet;
use envdoc::fixer::{FixAction, FixOptions, FixResult, Fixer};
use envdoc::scanner::{self, Inventory, UsageRecord, UsageStats};
use envdoc::vocab;
use serde::Serialize;
use std::path::Path;

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let code = match args.command {
        Commands::Scan {
            filters,
            json,
            save_results,
        } => cmd_scan(&args.root, &filters, json, save_results.as_deref())?,
        Commands::Analyze {
            filters,
            json,
            report,
        } => cmd_analyze(&args.root, &filters, json, report.as_deref())?,
        Commands::Health {
            filters,
            score_only,
        } => cmd_health(&args.root, &filters, score_only)?,
        Commands::Fix {
            filters,
            batch,
            confidence,
            dry_run,
            backup_dir,
        } => {
            let options = FixOptions {
                dry_run,
                backup_dir,
                ..FixOptions::default()
            };
            cmd_fix(&args.root, &filters, batch, confidence, options)?
        }
    };

    std::process::exit(code);
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .target(env_logger::Target::Stderr)
        .init();
}

fn build_inventory(root: &Path, filters: &Filters) -> Result<Inventory> {
    let filter = FilterSet::new(&filters.include, &filters.exclude, !filters.no_default_excludes);
    scanner::scan_project(root, &filter, scanner::live_environment())
        .with_context(|| format!("Failed to scan {}", root.display()))
}

/// Inventory as emitted by `scan --json`. Environment values are left out.
#[derive(Serialize)]
struct ScanReport<'a> {
    root: &'a Path,
    stats: &'a UsageStats,
    usages: &'a [UsageRecord],
    definitions: Vec<&'a DefinitionRecord>,
    environment: Vec<&'a str>,
    warnings: &'a [ScanWarning],
}

fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json + "\n")
        .with_context(|| format!("Failed to write {}", path.display()))?;
    eprintln!("{} Saved {}", "info:".blue().bold(), path.display());
    Ok(())
}

fn cmd_scan(root: &Path, filters: &Filters, json: bool, save: Option<&Path>) -> Result<i32> {
    let inventory = build_inventory(root, filters)?;
    let report = ScanReport {
        root: &inventory.root,
        stats: &inventory.stats,
        usages: &inventory.usages,
        definitions: inventory
            .definitions
            .iter()
            .filter(|d| d.source_kind == SourceKind::File)
            .collect(),
        environment: inventory.system_names().into_iter().collect(),
        warnings: &inventory.warnings,
    };
    if let Some(path) = save {
        save_json(path, &report)?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(0);
    }

    let s = &inventory.stats;
    println!(
        "{} Scanned {} files ({} declaration files)",
        "info:".blue().bold(),
        s.files_scanned,
        s.declaration_files
    );
    println!(
        "  Usages: {} of {} variables in {} files",
        s.total_usages, s.unique_variables_used, s.files_with_usage
    );
    println!(
        "  Definitions: {} file, {} system",
        s.file_variables, s.system_variables
    );

    let used = inventory.used_names();
    if !used.is_empty() {
        println!("\n{}", "Used variables:".bold());
        for name in used {
            let count = inventory.usages_of(name).count();
            println!("  {} {}", name, format!("({count})").dimmed());
        }
    }

    if !inventory.file_variables.is_empty() {
        println!("\n{}", "Declared in files:".bold());
        for (file, variables) in &inventory.file_variables {
            println!("  {} {}", file, format!("({})", variables.len()).dimmed());
        }
    }

    print_warnings(&inventory.warnings);
    Ok(0)
}

fn cmd_analyze(root: &Path, filters: &Filters, json: bool, report: Option<&Path>) -> Result<i32> {
    let inventory = build_inventory(root, filters)?;
    let analysis = analyzer::analyze(&inventory);
    if let Some(path) = report {
        save_json(path, &analysis)?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
    } else {
        print_report(&inventory, &analysis);
        print_warnings(&inventory.warnings);
    }

    Ok(analyzer::health_exit_code(analysis.health_score()))
}

fn cmd_health(root: &Path, filters: &Filters, score_only: bool) -> Result<i32> {
    let inventory = build_inventory(root, filters)?;
    let score = analyzer::analyze(&inventory).health_score();

    if score_only {
        println!("{score:.2}");
        return Ok(0);
    }

    println!("{} {}", "Health:".bold(), colored_score(score));
    Ok(if score >= 70.0 { 0 } else { 1 })
}

fn cmd_fix(
    root: &Path,
    filters: &Filters,
    batch: bool,
    confidence: f64,
    options: FixOptions,
) -> Result<i32> {
    let inventory = build_inventory(root, filters)?;
    let analysis = analyzer::analyze(&inventory);

    if analysis.issues.is_empty() {
        println!("{} No issues to fix", "ok:".green().bold());
        return Ok(0);
    }

    let fixer = Fixer::new(root, options);

    let result = if batch {
        let skipped = analysis
            .issues
            .iter()
            .filter(|i| i.best_confidence() < confidence)
            .count();
        if skipped > 0 {
            println!(
                "{} Skipping {} issue(s) below confidence {:.2}",
                "info:".blue().bold(),
                skipped,
                confidence
            );
        }
        fixer.batch(&analysis, confidence)
    } else {
        let actions = choose_actions(&inventory, &analysis)?;
        fixer.apply(&actions)
    };

    print_fix_result(root, &result);
    Ok(result.exit_code())
}

fn choose_actions(inventory: &Inventory, analysis: &Analysis) -> Result<Vec<FixAction>> {
    let theme = ColorfulTheme::default();
    let mut actions = Vec::new();

    for (index, issue) in analysis.issues.iter().enumerate() {
        println!(
            "\n{} {} {}",
            format!("[{}/{}]", index + 1, analysis.issues.len()).dimmed(),
            issue.used_name.red().bold(),
            format!("({})", kind_label(issue.issue_kind)).dimmed()
        );
        print_usages(&inventory.root, issue);
        print_availability(issue);

        let top = &issue.candidates[..issue.candidates.len().min(3)];
        let mut items: Vec<String> = top
            .iter()
            .map(|c| {
                format!(
                    "Rename to {} ({:.2}, {})",
                    c.suggested_name,
                    c.confidence,
                    source_label(c.origin_source)
                )
            })
            .collect();
        items.push("Add to .env".to_string());
        items.push("Set as system variable".to_string());
        items.push("Rename to a custom name".to_string());
        items.push("Skip".to_string());

        let choice = Select::with_theme(&theme)
            .with_prompt("Fix")
            .items(&items)
            .default(0)
            .interact()?;

        let rename = |new_name: String| FixAction::RenameInCode {
            old_name: issue.used_name.clone(),
            new_name,
            usages: issue.usages.clone(),
        };
        let action = match choice.checked_sub(top.len()) {
            None => Some(rename(top[choice].suggested_name.clone())),
            Some(0) => Some(FixAction::AddDefinition {
                name: issue.used_name.clone(),
                value: prompt_value(&theme, &issue.used_name)?,
                target: None,
            }),
            Some(1) => Some(FixAction::SetSystemVariable {
                name: issue.used_name.clone(),
                value: prompt_value(&theme, &issue.used_name)?,
            }),
            Some(2) => {
                let name: String = Input::with_theme(&theme)
                    .with_prompt("New name")
                    .validate_with(|input: &String| -> Result<(), &str> {
                        if vocab::is_conventional_name(input.trim()) {
                            Ok(())
                        } else {
                            Err("use UPPER_CASE letters, digits and underscores")
                        }
                    })
                    .interact_text()?;
                Some(rename(name.trim().to_string()))
            }
            _ => None,
        };
        actions.extend(action);
    }

    Ok(actions)
}

fn prompt_value(theme: &ColorfulTheme, name: &str) -> Result<String> {
    let value: String = Input::with_theme(theme)
        .with_prompt(format!("Value for {name}"))
        .allow_empty(true)
        .interact_text()?;
    Ok(value)
}

fn print_report(inventory: &Inventory, analysis: &Analysis) {
    let st = &analysis.statistics;

    println!(
        "{} {}",
        "Environment report for".bold(),
        inventory.root.display()
    );
    println!("\n{} {}", "Health:".bold(), colored_score(st.overall_health_score));
    println!(
        "  Used: {}, System: {}, File: {}",
        st.total_used, st.total_system, st.total_file
    );
    println!(
        "  Perfect: {}, System only: {}, File only: {}, Issues: {}",
        st.perfect_matches, st.system_only_matches, st.file_only_matches, st.issues
    );
    println!(
        "  Coverage: system {:.2}%, file {:.2}%",
        st.system_coverage, st.file_coverage
    );

    if analysis.issues.is_empty() {
        println!("\n{} Every used variable is defined", "ok:".green().bold());
    } else {
        println!(
            "\n{} {} unresolved variable(s):\n",
            "Found".red().bold(),
            analysis.issues.len()
        );
        for issue in &analysis.issues {
            println!(
                "  {} {} {}",
                issue.used_name.red(),
                format!("[{}]", kind_label(issue.issue_kind)).yellow(),
                format!("{:?}", issue.recommended_action).dimmed()
            );
            print_usages(&inventory.root, issue);
            print_availability(issue);
            for candidate in issue.candidates.iter().take(3) {
                println!(
                    "    {} {} {}",
                    "->".green(),
                    candidate.suggested_name.green(),
                    format!(
                        "({:.2}, {})",
                        candidate.confidence,
                        source_label(candidate.origin_source)
                    )
                    .dimmed()
                );
            }
        }
    }

    if !analysis.sensitive_variables.is_empty() {
        println!(
            "\n{} {}",
            "Sensitive:".bold(),
            analysis.sensitive_variables.join(", ")
        );
    }
}

fn print_usages(root: &Path, issue: &Issue) {
    for usage in issue.usages.iter().take(3) {
        let loc = format!(
            "{}:{}:{}",
            relative(root, &usage.file_path).display(),
            usage.line,
            usage.column
        );
        println!("    {} {}", loc.dimmed(), usage.context_line);
    }
    if issue.usages.len() > 3 {
        println!(
            "    {}",
            format!("... and {} more", issue.usages.len() - 3).dimmed()
        );
    }
}

fn print_availability(issue: &Issue) {
    if issue.system_available {
        println!("    {} similar name set in the environment", "system:".dimmed());
    }
    for found in &issue.file_availability {
        let detail = if found.exact {
            "exact".to_string()
        } else {
            format!("similar: {}", found.name)
        };
        println!("    {} {} ({})", "file:".dimmed(), found.file, detail);
    }
}

fn print_fix_result(root: &Path, result: &FixResult) {
    println!();
    for outcome in &result.outcomes {
        let prefix = if outcome.success {
            "ok:".green().bold()
        } else {
            "failed:".red().bold()
        };
        println!("{} {}", prefix, outcome.description);
    }

    let verb = if result.dry_run {
        "Would update:"
    } else {
        "Updated:"
    };
    for file in &result.modified_files {
        println!("  {} {}", verb.yellow().bold(), relative(root, file).display());
    }
    for backup in &result.backups {
        println!("  {} {}", "Backup:".dimmed(), relative(root, backup).display());
    }
    for error in &result.errors {
        eprintln!("{} {}", "warn:".yellow().bold(), error);
    }
    for note in &result.notes {
        println!("{} {}", "hint:".cyan().bold(), note);
    }

    println!(
        "\n{} of {} fix(es) succeeded",
        result.success_count, result.total_count
    );
    if result.dry_run {
        println!("{} Dry run, nothing was written", "hint:".cyan().bold());
    }
}

fn print_warnings(warnings: &[ScanWarning]) {
    for warning in warnings {
        eprintln!(
            "{} {}: {}",
            "warn:".yellow().bold(),
            warning.path.display(),
            warning.message
        );
    }
}

fn colored_score(score: f64) -> colored::ColoredString {
    let text = format!("{score:.2}%");
    match analyzer::health_exit_code(score) {
        0 => text.green().bold(),
        1 => text.yellow().bold(),
        _ => text.red().bold(),
    }
}

fn kind_label(kind: IssueKind) -> &'static str {
    match kind {
        IssueKind::Typo => "typo",
        IssueKind::InconsistentNaming => "inconsistent naming",
        IssueKind::SimilarAvailable => "similar available",
        IssueKind::Missing => "missing",
    }
}

fn source_label(source: SourceKind) -> &'static str {
    match source {
        SourceKind::System => "system",
        SourceKind::File => "file",
    }
}

fn relative<'a>(root: &Path, path: &'a Path) -> &'a Path {
    path.strip_prefix(root).unwrap_or(path)
}
