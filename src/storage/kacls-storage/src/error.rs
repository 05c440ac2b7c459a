//! Storage error types.

use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Entry not found.
    #[error("entry not found: {0}")]
    NotFound(String),

    /// Entry already exists.
    #[error("entry already exists: {0}")]
    AlreadyExists(String),

    /// The stored state changed since it was read.
    #[error("conflicting update: {0}")]
    Conflict(String),

    /// A batch mutation is malformed.
    #[error("invalid batch: {0}")]
    InvalidBatch(String),

    /// Backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}
