//! envdoc library for reconciling a project's environment variables.
//!
//! Three records of the same contract drift apart over time: the names code
//! reads, the names declared in dotenv files, container manifests and CI
//! pipelines, and the names set in the live environment. The workflow has
//! three phases:
//!
//! 1. **Scanning**: Walk the project and build an [`Inventory`] of usages and definitions
//! 2. **Analysis**: Turn every unresolved usage into an [`Issue`] with ranked candidates
//! 3. **Fixing**: Rename reads or add definitions, backing up every file first
//!
//! # Example
//!
//! ```no_run
//! use envdoc::{analyzer, filter::FilterSet, fixer, scanner};
//! use std::path::Path;
//!
//! let root = Path::new(".");
//! let inventory =
//!     scanner::scan_project(root, &FilterSet::default(), scanner::live_environment()).unwrap();
//!
//! let analysis = analyzer::analyze(&inventory);
//! println!("health: {:.2}", analysis.health_score());
//!
//! // Apply every suggestion at or above the default confidence.
//! let fixer = fixer::Fixer::new(root, fixer::FixOptions::default());
//! let result = fixer.batch(&analysis, fixer::DEFAULT_CONFIDENCE);
//! std::process::exit(result.exit_code());
//! ```

pub mod analyzer;
pub mod backup;
pub mod definitions;
pub mod error;
pub mod filter;
pub mod fixer;
pub mod platform;
pub mod rewriter;
pub mod scanner;
pub mod similarity;
pub mod syntax;
pub mod vocab;

// Re-export commonly used types at crate root
pub use analyzer::{Analysis, Candidate, FileAvailability, Issue, IssueKind, RecommendedAction};
pub use definitions::{DefinitionRecord, SourceKind};
pub use error::{ConfigParseError, FixError, ScanError};
pub use fixer::{FixAction, FixResult, Fixer};
pub use scanner::{Inventory, UsageRecord};
