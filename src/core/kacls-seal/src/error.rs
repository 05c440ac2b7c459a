//! Seal error types.

use thiserror::Error;

/// Errors raised by the master secret source.
#[derive(Debug, Error)]
pub enum SealError {
    /// No master secret has been loaded yet.
    #[error("master secret not initialized")]
    NotInitialized,

    /// Initialization was attempted and failed; the source stays closed.
    #[error("master secret initialization failed: {0}")]
    InitFailed(String),

    /// The master secret was torn down.
    #[error("master secret has been torn down")]
    TornDown,

    /// The secret provider could not produce a key.
    #[error("secret provider error: {0}")]
    Provider(String),

    /// The loaded key does not match the configured fingerprint.
    #[error("master key fingerprint mismatch")]
    FingerprintMismatch,

    /// Crypto error.
    #[error("crypto error: {0}")]
    Crypto(#[from] kacls_crypto::CryptoError),
}
