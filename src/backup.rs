//! Timestamped copies of files taken before they are edited.

use crate::error::FixError;
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};

/// Backup directory created under the project root.
pub const DEFAULT_BACKUP_DIR: &str = ".envdoc_backups";

/// A directory of `<file-name>.backup_<timestamp>` copies.
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
}

impl BackupStore {
    /// A relative `dir` is placed under `root`; an absolute one is used as is.
    pub fn new(root: &Path, dir: impl AsRef<Path>) -> Self {
        BackupStore {
            dir: root.join(dir),
        }
    }

    /// Copies `original` into the store and returns the backup path.
    ///
    /// The directory is created on first use. Two backups of the same file
    /// never share a name, even within one clock tick.
    pub fn create(&self, original: &Path) -> Result<PathBuf, FixError> {
        let fail = |source: std::io::Error| FixError::Backup {
            path: original.to_path_buf(),
            source,
        };

        let file_name = original
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                fail(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "path has no file name",
                ))
            })?;
        fs::create_dir_all(&self.dir).map_err(fail)?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S_%6f");
        let base = format!("{file_name}.backup_{stamp}");
        let mut target = self.dir.join(&base);
        let mut attempt = 1;
        while target.exists() {
            target = self.dir.join(format!("{base}_{attempt}"));
            attempt += 1;
        }

        fs::copy(original, &target).map_err(fail)?;
        log::info!("backed up {} to {}", original.display(), target.display());
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_directory_and_copies_content() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("settings.py");
        fs::write(&original, "import os\n").unwrap();

        let store = BackupStore::new(dir.path(), DEFAULT_BACKUP_DIR);
        let backup = store.create(&original).unwrap();

        assert!(backup.starts_with(dir.path().join(DEFAULT_BACKUP_DIR)));
        let name = backup.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("settings.py.backup_"), "{name}");
        assert_eq!(fs::read_to_string(&backup).unwrap(), "import os\n");
    }

    #[test]
    fn sequential_backups_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join(".env");
        fs::write(&original, "A=1\n").unwrap();

        let store = BackupStore::new(dir.path(), DEFAULT_BACKUP_DIR);
        let first = store.create(&original).unwrap();
        fs::write(&original, "A=2\n").unwrap();
        let second = store.create(&original).unwrap();

        assert_ne!(first, second);
        assert_eq!(fs::read_to_string(&first).unwrap(), "A=1\n");
        assert_eq!(fs::read_to_string(&second).unwrap(), "A=2\n");
    }

    #[test]
    fn blocked_directory_is_a_backup_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(DEFAULT_BACKUP_DIR), "not a directory").unwrap();
        let original = dir.path().join("app.py");
        fs::write(&original, "").unwrap();

        let err = BackupStore::new(dir.path(), DEFAULT_BACKUP_DIR)
            .create(&original)
            .unwrap_err();
        assert!(matches!(err, FixError::Backup { .. }));
    }

    #[test]
    fn missing_original_is_a_backup_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = BackupStore::new(dir.path(), DEFAULT_BACKUP_DIR)
            .create(&dir.path().join("gone.py"))
            .unwrap_err();
        assert!(matches!(err, FixError::Backup { .. }));
    }

    #[test]
    fn absolute_directory_is_used_as_given() {
        let project = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        let original = project.path().join(".env");
        fs::write(&original, "A=1\n").unwrap();

        let backup = BackupStore::new(project.path(), elsewhere.path())
            .create(&original)
            .unwrap();
        assert!(backup.starts_with(elsewhere.path()));
        assert!(!project.path().join(DEFAULT_BACKUP_DIR).exists());
    }
}
