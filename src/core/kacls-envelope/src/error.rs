//! Envelope service error types.

use kacls_crypto::CryptoError;
use kacls_seal::SealError;
use kacls_storage::StorageError;
use thiserror::Error;

use crate::policy::DenyReason;

/// Errors that can occur in the envelope service.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Malformed or missing input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The key was already superseded.
    #[error("key already rotated: {0}")]
    AlreadyRotated(String),

    /// Caller is not allowed to use the key.
    #[error("access denied: {0}")]
    Denied(DenyReason),

    /// Unknown or expired key.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// The envelope failed authentication.
    #[error("decryption failed")]
    DecryptionFailed,

    /// Master secret unavailable.
    #[error("seal error: {0}")]
    Seal(SealError),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Cryptographic error.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl EnvelopeError {
    /// True for failures the caller caused.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_) | Self::AlreadyRotated(_) | Self::Denied(_) | Self::KeyNotFound(_)
        )
    }
}

impl From<SealError> for EnvelopeError {
    fn from(err: SealError) -> Self {
        match err {
            SealError::Crypto(CryptoError::DecryptionFailed(_)) => Self::DecryptionFailed,
            SealError::Crypto(CryptoError::InvalidInput(msg)) => Self::InvalidInput(msg),
            other => Self::Seal(other),
        }
    }
}
