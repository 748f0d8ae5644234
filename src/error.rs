//! Error types for scanning and fixing.
//!
//! Only [`ScanError::RootMissing`] and [`ScanError::RootNotDirectory`] are
//! fatal. Everything else is collected into the result structures so a single
//! bad file or failed action never aborts the run.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building an inventory.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("project root {} does not exist", .0.display())]
    RootMissing(PathBuf),

    #[error("project root {} is not a directory", .0.display())]
    RootNotDirectory(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk {}: {message}", path.display())]
    Walk { path: PathBuf, message: String },

    #[error("syntax errors in {}, falling back to pattern scan", path.display())]
    Syntax { path: PathBuf },
}

impl ScanError {
    /// Path the error refers to.
    pub fn path(&self) -> &PathBuf {
        match self {
            ScanError::RootMissing(path) | ScanError::RootNotDirectory(path) => path,
            ScanError::Read { path, .. }
            | ScanError::Walk { path, .. }
            | ScanError::Syntax { path } => path,
        }
    }
}

/// A declaration line that could not be parsed. The line is skipped.
#[derive(Debug, Clone, Error, Serialize)]
#[error("{}:{line}: {reason}", path.display())]
pub struct ConfigParseError {
    pub path: PathBuf,
    pub line: usize,
    pub reason: String,
}

/// Non-fatal problem recorded during a scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanWarning {
    pub path: PathBuf,
    pub message: String,
}

impl From<&ScanError> for ScanWarning {
    fn from(err: &ScanError) -> Self {
        ScanWarning {
            path: err.path().clone(),
            message: err.to_string(),
        }
    }
}

impl From<&ConfigParseError> for ScanWarning {
    fn from(err: &ConfigParseError) -> Self {
        ScanWarning {
            path: err.path.clone(),
            message: err.to_string(),
        }
    }
}

/// Errors recorded per action by the fixer.
#[derive(Debug, Error)]
pub enum FixError {
    /// Copying the original aside failed; the file was not touched.
    #[error("backup of {} failed: {source}", path.display())]
    Backup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("editing {} failed: {source}", path.display())]
    Edit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed: {message}")]
    Platform { command: String, message: String },

    #[error("`{command}` timed out after {seconds}s")]
    PlatformTimeout { command: String, seconds: u64 },
}

impl Serialize for FixError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_warning_keeps_path_and_message() {
        let err = ScanError::Syntax {
            path: PathBuf::from("app.py"),
        };
        let warning = ScanWarning::from(&err);
        assert_eq!(warning.path, PathBuf::from("app.py"));
        assert!(warning.message.contains("falling back"));
    }

    #[test]
    fn config_parse_error_formats_location() {
        let err = ConfigParseError {
            path: PathBuf::from(".env"),
            line: 3,
            reason: "missing '='".to_string(),
        };
        assert_eq!(err.to_string(), ".env:3: missing '='");
    }

    #[test]
    fn fix_error_serializes_as_message() {
        let err = FixError::PlatformTimeout {
            command: "setx A b".to_string(),
            seconds: 10,
        };
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, "\"`setx A b` timed out after 10s\"");
    }
}
