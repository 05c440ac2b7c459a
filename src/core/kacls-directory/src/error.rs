//! Directory error types.

use thiserror::Error;

/// Errors that can occur in the public key directory.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Malformed or missing input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Algorithm tag outside the supported set.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The access gate rejected the user id.
    #[error("access denied")]
    Denied,

    /// No key registered for this user.
    #[error("public key not found: {0}")]
    NotFound(String),
}
