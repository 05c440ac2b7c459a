//! Relay error types.

use thiserror::Error;

/// Reasons a payload is refused before relay.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// Payload is not a JSON object.
    #[error("payload is not an object")]
    NotAnObject,

    /// A required field is absent or empty.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A field has the wrong type.
    #[error("invalid field: {0}")]
    InvalidField(&'static str),

    /// Unknown algorithm tag.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Sender or recipient id is empty.
    #[error("invalid participant: {0}")]
    InvalidParticipant(&'static str),
}
