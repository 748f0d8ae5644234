//! Applying fixes to disk.
//!
//! Actions run strictly one at a time in the order given, so a later action
//! sees the file state left by an earlier one. Every file is backed up before
//! it is written; a failed backup leaves that file untouched. Failures are
//! recorded in the [`FixResult`] and never stop the remaining actions.

use crate::analyzer::Analysis;
use crate::backup::{BackupStore, DEFAULT_BACKUP_DIR};
use crate::error::FixError;
use crate::platform::{self, DEFAULT_COMMAND_TIMEOUT};
use crate::rewriter;
use crate::scanner::UsageRecord;
use crate::vocab;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default confidence for batch fixes.
pub const DEFAULT_CONFIDENCE: f64 = 0.9;

const DEFINITION_LABEL: &str = "# Added by envdoc";

/// One requested change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FixAction {
    /// Rename every read of `old_name` in the files of `usages`.
    RenameInCode {
        old_name: String,
        new_name: String,
        usages: Vec<UsageRecord>,
    },
    /// Append `name=value` to `target`, or to `<root>/.env` when unset.
    AddDefinition {
        name: String,
        value: String,
        target: Option<PathBuf>,
    },
    /// Set `name` in this process and persist it where possible.
    SetSystemVariable { name: String, value: String },
}

impl FixAction {
    pub fn describe(&self) -> String {
        match self {
            FixAction::RenameInCode {
                old_name, new_name, ..
            } => format!("rename {old_name} -> {new_name}"),
            FixAction::AddDefinition { name, target, .. } => match target {
                Some(target) => format!("add {name} to {}", target.display()),
                None => format!("add {name} to .env"),
            },
            FixAction::SetSystemVariable { name, .. } => format!("set system variable {name}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FixOptions {
    /// Do every step except writing.
    pub dry_run: bool,
    /// Backup directory, relative to the project root unless absolute.
    pub backup_dir: PathBuf,
    pub command_timeout: Duration,
}

impl Default for FixOptions {
    fn default() -> Self {
        FixOptions {
            dry_run: false,
            backup_dir: PathBuf::from(DEFAULT_BACKUP_DIR),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

/// Outcome of one action.
#[derive(Debug, Clone, Serialize)]
pub struct ActionOutcome {
    pub description: String,
    pub success: bool,
}

/// Everything a fix run did.
#[derive(Debug, Default, Serialize)]
pub struct FixResult {
    pub dry_run: bool,
    /// Actions that succeeded.
    pub applied: Vec<FixAction>,
    pub outcomes: Vec<ActionOutcome>,
    /// Files changed, or that would change under dry-run.
    pub modified_files: Vec<PathBuf>,
    pub backups: Vec<PathBuf>,
    pub errors: Vec<FixError>,
    /// Follow-ups for the user, such as shell profile lines.
    pub notes: Vec<String>,
    pub success_count: usize,
    pub total_count: usize,
}

impl FixResult {
    /// 0 when every action succeeded, 1 when some did, 2 when none did.
    pub fn exit_code(&self) -> i32 {
        if self.success_count == self.total_count {
            0
        } else if self.success_count > 0 {
            1
        } else {
            2
        }
    }
}

/// Applies [`FixAction`]s under one project root.
#[derive(Debug)]
pub struct Fixer {
    root: PathBuf,
    options: FixOptions,
    backups: BackupStore,
}

impl Fixer {
    pub fn new(root: impl Into<PathBuf>, options: FixOptions) -> Self {
        let root = root.into();
        let backups = BackupStore::new(&root, &options.backup_dir);
        Fixer {
            root,
            options,
            backups,
        }
    }

    /// Applies `actions` in order.
    pub fn apply(&self, actions: &[FixAction]) -> FixResult {
        let mut result = FixResult {
            dry_run: self.options.dry_run,
            total_count: actions.len(),
            ..FixResult::default()
        };

        for action in actions {
            let errors_before = result.errors.len();
            match action {
                FixAction::RenameInCode {
                    old_name,
                    new_name,
                    usages,
                } => self.rename(old_name, new_name, usages, &mut result),
                FixAction::AddDefinition {
                    name,
                    value,
                    target,
                } => self.add_definition(name, value, target.as_deref(), &mut result),
                FixAction::SetSystemVariable { name, value } => {
                    self.set_system_variable(name, value, &mut result)
                }
            }

            let success = result.errors.len() == errors_before;
            if success {
                result.success_count += 1;
                result.applied.push(action.clone());
            } else {
                log::warn!("{} failed", action.describe());
            }
            result.outcomes.push(ActionOutcome {
                description: action.describe(),
                success,
            });
        }

        log::info!(
            "{}/{} fixes succeeded{}",
            result.success_count,
            result.total_count,
            if result.dry_run { " (dry run)" } else { "" }
        );
        result
    }

    /// Renames to the top candidate of every issue whose best confidence
    /// meets `threshold`.
    pub fn batch(&self, analysis: &Analysis, threshold: f64) -> FixResult {
        self.apply(&batch_actions(analysis, threshold))
    }

    fn rename(&self, old: &str, new: &str, usages: &[UsageRecord], result: &mut FixResult) {
        let files: BTreeSet<&Path> = usages.iter().map(|u| u.file_path.as_path()).collect();
        if !vocab::is_conventional_name(new) {
            let path = files.first().copied().unwrap_or(self.root.as_path());
            let e = invalid_name(path, new);
            log::warn!("{e}");
            result.errors.push(e);
            return;
        }
        for file in files {
            if let Err(e) = self.rename_in_file(file, old, new, result) {
                log::warn!("{e}");
                result.errors.push(e);
            }
        }
    }

    fn rename_in_file(
        &self,
        file: &Path,
        old: &str,
        new: &str,
        result: &mut FixResult,
    ) -> Result<(), FixError> {
        let edit_error = |source| FixError::Edit {
            path: file.to_path_buf(),
            source,
        };

        if !self.options.dry_run {
            result.backups.push(self.backups.create(file)?);
        }
        let content = fs::read_to_string(file).map_err(edit_error)?;
        let Some(rewrite) = rewriter::rename(file, &content, old, new) else {
            log::info!("{}: no reads of {old} to rename", file.display());
            return Ok(());
        };

        if !self.options.dry_run {
            fs::write(file, &rewrite.content).map_err(edit_error)?;
        }
        log::info!(
            "{}: renamed {old} -> {new} ({})",
            file.display(),
            rewrite.strategy
        );
        result.modified_files.push(file.to_path_buf());
        Ok(())
    }

    fn add_definition(
        &self,
        name: &str,
        value: &str,
        target: Option<&Path>,
        result: &mut FixResult,
    ) {
        let target = target.map_or_else(|| self.root.join(".env"), Path::to_path_buf);
        let appended = if vocab::is_conventional_name(name) {
            self.append_definition(&target, name, value, result)
        } else {
            Err(invalid_name(&target, name))
        };
        if let Err(e) = appended {
            log::warn!("{e}");
            result.errors.push(e);
        }
    }

    fn append_definition(
        &self,
        target: &Path,
        name: &str,
        value: &str,
        result: &mut FixResult,
    ) -> Result<(), FixError> {
        if self.options.dry_run {
            result.modified_files.push(target.to_path_buf());
            return Ok(());
        }
        if target.exists() {
            result.backups.push(self.backups.create(target)?);
        }

        let edit_error = |source| FixError::Edit {
            path: target.to_path_buf(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(target)
            .map_err(edit_error)?;
        file.write_all(definition_block(name, value).as_bytes())
            .map_err(edit_error)?;

        log::info!("added {name} to {}", target.display());
        result.modified_files.push(target.to_path_buf());
        Ok(())
    }

    fn set_system_variable(&self, name: &str, value: &str, result: &mut FixResult) {
        if let Err(e) = platform::validate_variable(name, value) {
            log::warn!("{e}");
            result.errors.push(e);
            return;
        }
        result.notes.push(format!(
            "add to your shell profile to persist: {}",
            platform::profile_line(name, value)
        ));
        if self.options.dry_run {
            return;
        }

        if let Err(e) = platform::set_in_process(name, value) {
            log::warn!("{e}");
            result.errors.push(e);
            return;
        }
        match platform::persist(name, value, self.options.command_timeout) {
            Ok(true) => log::info!("persisted {name}"),
            Ok(false) => log::debug!("no persistent variable mechanism for {name}"),
            Err(e) => {
                log::warn!("{e}");
                result.errors.push(e);
            }
        }
    }
}

/// Rename actions for issues whose top candidate meets `threshold`. Lower
/// ranked candidates are never chosen.
pub fn batch_actions(analysis: &Analysis, threshold: f64) -> Vec<FixAction> {
    analysis
        .issues
        .iter()
        .filter_map(|issue| {
            let top = issue.top_candidate()?;
            (top.confidence >= threshold).then(|| FixAction::RenameInCode {
                old_name: issue.used_name.clone(),
                new_name: top.suggested_name.clone(),
                usages: issue.usages.clone(),
            })
        })
        .collect()
}

fn invalid_name(path: &Path, name: &str) -> FixError {
    FixError::Edit {
        path: path.to_path_buf(),
        source: io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{name:?} is not an uppercase variable name"),
        ),
    }
}

/// The labeled block appended to a declaration file.
pub fn definition_block(name: &str, value: &str) -> String {
    format!("\n{DEFINITION_LABEL}\n{name}={}\n", dotenv_value(value))
}

fn dotenv_value(value: &str) -> String {
    let needs_quotes = value
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '#' | '"' | '\''));
    if needs_quotes {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::analyze;
    use crate::filter::FilterSet;
    use crate::scanner::scan_project;
    use std::collections::BTreeMap;

    fn project(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, content).unwrap();
        }
        dir
    }

    fn rename_action(dir: &Path, old: &str, new: &str) -> FixAction {
        FixAction::RenameInCode {
            old_name: old.to_string(),
            new_name: new.to_string(),
            usages: vec![UsageRecord::new(dir.join("app.py"), 2, 1, old)],
        }
    }

    #[test]
    fn batch_applies_only_confident_issues() {
        let dir = project(&[
            (
                "app.py",
                "import os\nkey = os.getenv(\"APIKEY\")\ndebug = os.getenv(\"DJANGO_DEBUG\")\n",
            ),
            (".env", "API_KEY=abc\nDEBUG=1\n"),
        ]);
        let inventory = scan_project(dir.path(), &FilterSet::default(), BTreeMap::new()).unwrap();
        let analysis = analyze(&inventory);
        let confidences: Vec<f64> = analysis.issues.iter().map(|i| i.best_confidence()).collect();
        assert_eq!(confidences, vec![0.95, 0.85]);

        let result = Fixer::new(dir.path(), FixOptions::default()).batch(&analysis, DEFAULT_CONFIDENCE);
        assert_eq!(result.total_count, 1);
        assert_eq!(result.success_count, 1);
        assert_eq!(result.backups.len(), 1);
        assert_eq!(result.exit_code(), 0);

        let content = fs::read_to_string(dir.path().join("app.py")).unwrap();
        assert!(content.contains("os.getenv(\"API_KEY\")"));
        assert!(content.contains("os.getenv(\"DJANGO_DEBUG\")"));

        let rescanned = scan_project(dir.path(), &FilterSet::default(), BTreeMap::new()).unwrap();
        let remaining: Vec<String> = analyze(&rescanned)
            .issues
            .into_iter()
            .map(|i| i.used_name)
            .collect();
        assert_eq!(remaining, vec!["DJANGO_DEBUG"]);
    }

    #[test]
    fn failed_backup_leaves_file_untouched() {
        let original = "import os\nos.getenv('DB_HOST')\n";
        let dir = project(&[("app.py", original), (DEFAULT_BACKUP_DIR, "blocked")]);

        let fixer = Fixer::new(dir.path(), FixOptions::default());
        let result = fixer.apply(&[rename_action(dir.path(), "DB_HOST", "DB_HOSTNAME")]);

        assert_eq!(fs::read_to_string(dir.path().join("app.py")).unwrap(), original);
        assert_eq!(result.errors.len(), 1);
        assert!(matches!(result.errors[0], FixError::Backup { .. }));
        assert_eq!(result.success_count, 0);
        assert!(result.modified_files.is_empty());
        assert_eq!(result.exit_code(), 2);
    }

    #[test]
    fn failed_action_does_not_stop_the_batch() {
        let dir = project(&[("app.py", "import os\nos.getenv('DB_HOST')\n")]);
        let missing = FixAction::RenameInCode {
            old_name: "GONE".to_string(),
            new_name: "HERE".to_string(),
            usages: vec![UsageRecord::new(dir.path().join("deleted.py"), 1, 1, "GONE")],
        };
        let actions = [missing, rename_action(dir.path(), "DB_HOST", "DB_HOSTNAME")];

        let result = Fixer::new(dir.path(), FixOptions::default()).apply(&actions);
        assert_eq!(result.success_count, 1);
        assert_eq!(result.total_count, 2);
        assert_eq!(result.exit_code(), 1);
        assert!(!result.outcomes[0].success);
        assert!(result.outcomes[1].success);
    }

    #[cfg(unix)]
    #[test]
    fn write_failure_keeps_backup_and_continues() {
        use std::os::unix::fs::PermissionsExt;

        let original = "import os\nos.getenv('DB_HOST')\n";
        let dir = project(&[("app.py", original), ("worker.py", original)]);
        let locked = dir.path().join("app.py");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o444)).unwrap();
        if fs::OpenOptions::new().write(true).open(&locked).is_ok() {
            // Running as root; permissions are not enforced.
            return;
        }

        let worker = FixAction::RenameInCode {
            old_name: "DB_HOST".to_string(),
            new_name: "DB_HOSTNAME".to_string(),
            usages: vec![UsageRecord::new(dir.path().join("worker.py"), 2, 1, "DB_HOST")],
        };
        let actions = [rename_action(dir.path(), "DB_HOST", "DB_HOSTNAME"), worker];
        let result = Fixer::new(dir.path(), FixOptions::default()).apply(&actions);

        assert_eq!(result.errors.len(), 1);
        assert!(matches!(result.errors[0], FixError::Edit { .. }));
        assert_eq!(result.backups.len(), 2);
        assert_eq!(fs::read_to_string(&result.backups[0]).unwrap(), original);
        assert_eq!(fs::read_to_string(&locked).unwrap(), original);
        assert!(!result.outcomes[0].success);
        assert!(result.outcomes[1].success);
        assert!(fs::read_to_string(dir.path().join("worker.py"))
            .unwrap()
            .contains("DB_HOSTNAME"));
        assert_eq!(result.exit_code(), 1);
    }

    #[test]
    fn invalid_new_names_are_rejected_before_backup() {
        let original = "import os\nos.getenv('DB_HOST')\n";
        let dir = project(&[("app.py", original)]);
        let actions = [
            rename_action(dir.path(), "DB_HOST", ""),
            rename_action(dir.path(), "DB_HOST", "db_host"),
            FixAction::AddDefinition {
                name: "BAD NAME".to_string(),
                value: "1".to_string(),
                target: None,
            },
            FixAction::SetSystemVariable {
                name: "A=B".to_string(),
                value: "1".to_string(),
            },
        ];

        let result = Fixer::new(dir.path(), FixOptions::default()).apply(&actions);

        assert_eq!(result.success_count, 0);
        assert_eq!(result.exit_code(), 2);
        assert!(result.errors.iter().all(|e| matches!(e, FixError::Edit { .. })));
        assert_eq!(result.errors.len(), 4);
        assert!(result.backups.is_empty());
        assert!(result.notes.is_empty());
        assert!(!dir.path().join(DEFAULT_BACKUP_DIR).exists());
        assert!(!dir.path().join(".env").exists());
        assert_eq!(fs::read_to_string(dir.path().join("app.py")).unwrap(), original);
    }

    #[test]
    fn dry_run_writes_nothing() {
        let original = "import os\nos.getenv('DB_HOST')\n";
        let dir = project(&[("app.py", original)]);
        let options = FixOptions {
            dry_run: true,
            ..FixOptions::default()
        };
        let fixer = Fixer::new(dir.path(), options);
        let result = fixer.apply(&[
            rename_action(dir.path(), "DB_HOST", "DB_HOSTNAME"),
            FixAction::AddDefinition {
                name: "DB_HOSTNAME".to_string(),
                value: "localhost".to_string(),
                target: None,
            },
            FixAction::SetSystemVariable {
                name: "ENVDOC_FIXER_DRY_RUN_VAR".to_string(),
                value: "1".to_string(),
            },
        ]);

        assert_eq!(result.success_count, 3);
        assert_eq!(
            result.modified_files,
            vec![dir.path().join("app.py"), dir.path().join(".env")]
        );
        assert!(result.backups.is_empty());
        assert_eq!(fs::read_to_string(dir.path().join("app.py")).unwrap(), original);
        assert!(!dir.path().join(".env").exists());
        assert!(!dir.path().join(DEFAULT_BACKUP_DIR).exists());
        assert!(std::env::var("ENVDOC_FIXER_DRY_RUN_VAR").is_err());
    }

    #[test]
    fn add_definition_appends_labeled_block() {
        let dir = project(&[(".env", "EXISTING=1\n")]);
        let fixer = Fixer::new(dir.path(), FixOptions::default());
        let result = fixer.apply(&[FixAction::AddDefinition {
            name: "GREETING".to_string(),
            value: "hello world".to_string(),
            target: None,
        }]);

        assert_eq!(result.exit_code(), 0);
        assert_eq!(result.backups.len(), 1);
        assert_eq!(
            fs::read_to_string(dir.path().join(".env")).unwrap(),
            "EXISTING=1\n\n# Added by envdoc\nGREETING=\"hello world\"\n"
        );
    }

    #[test]
    fn add_definition_creates_missing_target() {
        let dir = project(&[]);
        let target = dir.path().join("config/.env.local");
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        let result = Fixer::new(dir.path(), FixOptions::default()).apply(&[
            FixAction::AddDefinition {
                name: "PORT".to_string(),
                value: "8000".to_string(),
                target: Some(target.clone()),
            },
        ]);
        assert!(result.backups.is_empty());
        assert_eq!(
            fs::read_to_string(target).unwrap(),
            "\n# Added by envdoc\nPORT=8000\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn set_system_variable_updates_process_and_notes_profile_line() {
        let dir = project(&[]);
        let result = Fixer::new(dir.path(), FixOptions::default()).apply(&[
            FixAction::SetSystemVariable {
                name: "ENVDOC_FIXER_SET_VAR".to_string(),
                value: "enabled".to_string(),
            },
        ]);
        assert_eq!(result.exit_code(), 0);
        assert_eq!(std::env::var("ENVDOC_FIXER_SET_VAR").as_deref(), Ok("enabled"));
        assert!(result.notes[0].ends_with("export ENVDOC_FIXER_SET_VAR=\"enabled\""));
    }

    #[test]
    fn empty_run_is_successful() {
        let dir = project(&[]);
        let result = Fixer::new(dir.path(), FixOptions::default()).apply(&[]);
        assert_eq!(result.exit_code(), 0);
    }
}
