//! Command-line interface definitions.
//!
//! Defines the argument parser and subcommands using clap's derive API.
//! Each subcommand corresponds to one phase: listing the inventory,
//! reporting issues, printing the health score, or applying fixes.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Find and fix mismatches between the environment variables a project
/// reads, the ones it declares, and the ones that are set.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Args {
    /// Project root to scan.
    #[arg(short, long, global = true, default_value = ".")]
    pub root: PathBuf,

    /// Log progress to stderr. `RUST_LOG` takes precedence.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// File selection shared by every subcommand.
#[derive(Debug, Clone, clap::Args)]
pub struct Filters {
    /// Extra glob patterns for files to scan (e.g., "*.cfg").
    #[arg(short, long)]
    pub include: Vec<String>,

    /// Glob patterns for directories/files to exclude (e.g., "fixtures", "*.generated.py").
    /// Build output, caches and VCS metadata are excluded by default.
    #[arg(short, long)]
    pub exclude: Vec<String>,

    /// Disable the default exclusions.
    #[arg(long)]
    pub no_default_excludes: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan the project and summarize used and declared variables.
    Scan {
        #[command(flatten)]
        filters: Filters,

        /// Emit JSON instead of human-readable output.
        #[arg(long)]
        json: bool,

        /// Also write the JSON inventory to this file.
        #[arg(short, long, value_name = "FILE")]
        save_results: Option<PathBuf>,
    },

    /// Report unresolved variables with suggested corrections.
    Analyze {
        #[command(flatten)]
        filters: Filters,

        /// Emit JSON instead of human-readable output.
        #[arg(long)]
        json: bool,

        /// Also write the JSON analysis to this file.
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,
    },

    /// Print the overall health score.
    Health {
        #[command(flatten)]
        filters: Filters,

        /// Print only the number and always exit 0.
        #[arg(long)]
        score_only: bool,
    },

    /// Fix issues interactively, or automatically with --batch.
    Fix {
        #[command(flatten)]
        filters: Filters,

        /// Apply the top suggestion of every issue above --confidence without prompting.
        #[arg(long)]
        batch: bool,

        /// Minimum confidence for batch fixes, between 0 and 1.
        #[arg(long, default_value_t = envdoc::fixer::DEFAULT_CONFIDENCE, value_parser = parse_confidence)]
        confidence: f64,

        /// Show what would change without writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Where to keep backups; relative paths are under --root.
        #[arg(long, value_name = "DIR", default_value = envdoc::backup::DEFAULT_BACKUP_DIR)]
        backup_dir: PathBuf,
    },
}

fn parse_confidence(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .parse()
        .map_err(|_| format!("Invalid confidence '{}', expected a number", s))?;
    if !(0.0..=1.0).contains(&value) {
        return Err(format!("Confidence {} is outside 0..=1", value));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fix_flags() {
        let args = Args::parse_from([
            "envdoc", "--root", "proj", "fix", "--batch", "--confidence", "0.8", "-e", "vendor",
            "--backup-dir", "/tmp/envdoc",
        ]);
        assert_eq!(args.root, PathBuf::from("proj"));
        match args.command {
            Commands::Fix {
                filters,
                batch,
                confidence,
                dry_run,
                backup_dir,
            } => {
                assert!(batch);
                assert!(!dry_run);
                assert_eq!(confidence, 0.8);
                assert_eq!(filters.exclude, vec!["vendor"]);
                assert_eq!(backup_dir, PathBuf::from("/tmp/envdoc"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn output_files_are_optional() {
        let args = Args::parse_from(["envdoc", "analyze", "--report", "envdoc.json"]);
        assert!(matches!(
            args.command,
            Commands::Analyze { report: Some(ref path), json: false, .. } if path == &PathBuf::from("envdoc.json")
        ));

        let args = Args::parse_from(["envdoc", "scan"]);
        assert!(matches!(args.command, Commands::Scan { save_results: None, .. }));

        let args = Args::parse_from(["envdoc", "fix"]);
        assert!(matches!(
            args.command,
            Commands::Fix { ref backup_dir, .. } if backup_dir == &PathBuf::from(".envdoc_backups")
        ));
    }

    #[test]
    fn confidence_defaults_and_bounds() {
        let args = Args::parse_from(["envdoc", "fix"]);
        assert!(matches!(args.command, Commands::Fix { confidence, .. } if confidence == 0.9));
        assert!(parse_confidence("1.5").is_err());
        assert!(parse_confidence("high").is_err());
    }
}
