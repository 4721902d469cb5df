//! Engine error types.

use std::path::PathBuf;

use crate::changeset::ValidationError;

/// Errors raised by the executor and facade.
///
/// `Mutation` and `AuditWrite` carry the storage error unchanged: the
/// engine rolls back and re-raises without retrying, leaving retry policy
/// to the caller.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// The change-set failed structural validation; no storage I/O was
    /// attempted.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Failed to open or create database.
    #[error("Failed to open database at {path}: {source}")]
    DatabaseOpen {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Failed to create parent directory.
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The record mutation failed inside the transaction.
    #[error("record mutation failed: {0}")]
    Mutation(#[source] rusqlite::Error),

    /// Writing the audit entries failed inside the transaction.
    #[error("audit write failed: {0}")]
    AuditWrite(#[source] rusqlite::Error),

    /// Failed to execute SQL outside the mutation/audit steps
    /// (transaction begin/commit, reads).
    #[error("Database query failed: {0}")]
    Query(#[from] rusqlite::Error),

    /// Failed to serialize data to JSON.
    #[error("JSON serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Blocking task was cancelled.
    #[error("Blocking task cancelled")]
    TaskCancelled,
}
