//! Error types for the contract feed
//!
//! Errors are classified by how the user sees them:
//! - Fatal: configuration problems, the app cannot start
//! - Warning: backend query failures, prior state stays intact
//! - Error: export failures, the operation is aborted
//!
//! Email lookup failures never reach this module; the resolver absorbs them.

use std::path::PathBuf;
use thiserror::Error;

/// Error types surfaced by the feed engine and its collaborators
#[derive(Debug, Error)]
pub enum FeedError {
    // Fatal
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Database not found: {0}")]
    DatabaseNotFound(PathBuf),

    // Non-fatal, user retries manually
    #[error("Query failed: {0}")]
    Query(String),

    // Aborts the export
    #[error("Export failed: {0}")]
    Export(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl FeedError {
    /// Returns true if the app cannot continue after this error
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FeedError::Configuration(_) | FeedError::DatabaseNotFound(_)
        )
    }

    /// Returns true if the prior session state is untouched and the user
    /// can simply re-issue the request
    pub fn is_retryable(&self) -> bool {
        matches!(self, FeedError::Query(_))
    }

    /// Get a user-friendly recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            FeedError::Configuration(_) => {
                "Check your configuration in ~/.contractfeed/config.json"
            }
            FeedError::DatabaseNotFound(_) => {
                "Verify databasePath in ~/.contractfeed/config.json"
            }
            FeedError::Query(_) => "Check the database connection and reload.",
            FeedError::Export(_) => "Check the destination folder and try again.",
            FeedError::Io(_) => "Check file permissions and disk space.",
        }
    }
}

impl From<std::io::Error> for FeedError {
    fn from(err: std::io::Error) -> Self {
        FeedError::Io(err.to_string())
    }
}

impl From<crate::db::DbError> for FeedError {
    fn from(err: crate::db::DbError) -> Self {
        match err {
            crate::db::DbError::NotFound(path) => FeedError::DatabaseNotFound(path),
            other => FeedError::Query(other.to_string()),
        }
    }
}

/// Serializable notice shown to the user once per failure
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserNotice {
    pub message: String,
    pub severity: Severity,
    pub can_retry: bool,
    pub recovery_suggestion: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Fatal,
    Warning,
    Error,
}

impl From<&FeedError> for UserNotice {
    fn from(err: &FeedError) -> Self {
        let severity = if err.is_fatal() {
            Severity::Fatal
        } else if err.is_retryable() {
            Severity::Warning
        } else {
            Severity::Error
        };

        UserNotice {
            message: err.to_string(),
            severity,
            can_retry: err.is_retryable(),
            recovery_suggestion: err.recovery_suggestion().to_string(),
        }
    }
}
