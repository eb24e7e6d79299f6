use std::path::PathBuf;

use thiserror::Error;

use crate::crypto::DecryptError;

pub type ExcelMgrResult<T> = Result<T, ExcelMgrError>;

#[derive(Error, Debug)]
pub enum ExcelMgrError {
    #[error("Failed to decrypt {path}: {source}")]
    Decryption {
        path: PathBuf,
        #[source]
        source: DecryptError,
    },

    #[error("No password available for encrypted workbook {0}")]
    CredentialMissing(String),

    #[error("Columns not found: {}{}", .missing.join(", "), resolved_note(.resolved))]
    ColumnNotFound {
        /// Targets that did not resolve, in request order.
        missing: Vec<String>,
        /// Targets that resolved fine, so the caller can fix everything in one pass.
        resolved: Vec<String>,
    },

    #[error("Target '{target}' is ambiguous: matches {}", .candidates.join(", "))]
    AmbiguousMatch {
        target: String,
        candidates: Vec<String>,
    },

    #[error("Sheet '{sheet}' not found in {path}")]
    SheetNotFound { path: PathBuf, sheet: String },

    #[error("Unsupported destination: {0}")]
    UnsupportedDestination(String),

    #[error("Destination {0} already exists; pass --yes to overwrite")]
    ConfirmationRequired(PathBuf),

    #[error("Refusing to write macro-enabled workbook {0}: macro policy is 'forbid'")]
    MacroPolicyViolation(PathBuf),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read workbook {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("Failed to write {path}: {message}")]
    Write { path: PathBuf, message: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl ExcelMgrError {
    /// Known errors are input problems: they are recorded per file and the batch goes on.
    /// Everything else means the tool itself broke and aborts the run.
    pub fn is_known(&self) -> bool {
        matches!(
            self,
            ExcelMgrError::Decryption { .. }
                | ExcelMgrError::CredentialMissing(_)
                | ExcelMgrError::ColumnNotFound { .. }
                | ExcelMgrError::AmbiguousMatch { .. }
                | ExcelMgrError::SheetNotFound { .. }
                | ExcelMgrError::UnsupportedDestination(_)
                | ExcelMgrError::ConfirmationRequired(_)
                | ExcelMgrError::MacroPolicyViolation(_)
                | ExcelMgrError::Validation(_)
        )
    }

    /// Short machine-friendly name used in logs and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            ExcelMgrError::Decryption { .. } => "decryption",
            ExcelMgrError::CredentialMissing(_) => "credential_missing",
            ExcelMgrError::ColumnNotFound { .. } => "column_not_found",
            ExcelMgrError::AmbiguousMatch { .. } => "ambiguous_match",
            ExcelMgrError::SheetNotFound { .. } => "sheet_not_found",
            ExcelMgrError::UnsupportedDestination(_) => "unsupported_destination",
            ExcelMgrError::ConfirmationRequired(_) => "confirmation_required",
            ExcelMgrError::MacroPolicyViolation(_) => "macro_policy_violation",
            ExcelMgrError::Validation(_) => "validation",
            ExcelMgrError::Io(_) => "io",
            ExcelMgrError::Read { .. } => "read",
            ExcelMgrError::Write { .. } => "write",
            ExcelMgrError::Database(_) => "database",
        }
    }
}

fn resolved_note(resolved: &[String]) -> String {
    if resolved.is_empty() {
        String::new()
    } else {
        format!(" (resolved: {})", resolved.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_errors_are_classified() {
        let known = [
            ExcelMgrError::CredentialMissing("a.xlsx".to_string()),
            ExcelMgrError::UnsupportedDestination("database".to_string()),
            ExcelMgrError::MacroPolicyViolation(PathBuf::from("out.xlsm")),
            ExcelMgrError::Validation("bad".to_string()),
        ];
        for err in known {
            assert!(err.is_known(), "{} should be known", err.kind());
        }

        let io = ExcelMgrError::Io(std::io::Error::other("disk"));
        assert!(!io.is_known());
    }

    #[test]
    fn test_column_not_found_lists_every_missing_target() {
        let err = ExcelMgrError::ColumnNotFound {
            missing: vec!["7".to_string(), "9".to_string()],
            resolved: vec!["1".to_string()],
        };
        assert_eq!(err.to_string(), "Columns not found: 7, 9 (resolved: 1)");
    }
}
