//! Secret providers.
//!
//! A provider produces the master key exactly once, when the
//! [`MasterSecretSource`](crate::MasterSecretSource) is initialized. Swapping
//! the provider is how a vault- or hardware-backed key source would be
//! plugged in.

use kacls_crypto::MasterKey;
use tracing::warn;

use crate::{compute_fingerprint, SealError};

/// Source of the process-wide master key.
pub trait SecretProvider: Send + Sync {
    /// Returns the name of this provider for logging.
    fn name(&self) -> &'static str;

    /// Produces the master key.
    fn load(&self) -> Result<MasterKey, SealError>;
}

/// Generates a fresh random master key for this process.
///
/// Nothing is persisted: wrapped keys do not survive a restart.
#[derive(Debug, Default, Clone, Copy)]
pub struct EphemeralProvider;

impl SecretProvider for EphemeralProvider {
    fn name(&self) -> &'static str {
        "ephemeral"
    }

    fn load(&self) -> Result<MasterKey, SealError> {
        Ok(MasterKey::generate())
    }
}

/// Serves an operator-supplied master key.
pub struct StaticProvider {
    key: MasterKey,
    expected_fingerprint: Option<String>,
}

impl StaticProvider {
    /// Wraps an existing master key.
    pub fn new(key: MasterKey) -> Self {
        Self {
            key,
            expected_fingerprint: None,
        }
    }

    /// Parses a 64-character hex master key.
    pub fn from_hex(encoded: &str) -> Result<Self, SealError> {
        let bytes = zeroize::Zeroizing::new(
            hex::decode(encoded.trim())
                .map_err(|e| SealError::Provider(format!("invalid master key hex: {e}")))?,
        );
        let key = MasterKey::from_bytes(&bytes)?;
        Ok(Self::new(key))
    }

    /// Requires the loaded key to match a known fingerprint.
    pub fn with_expected_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.expected_fingerprint = Some(fingerprint.into().to_ascii_lowercase());
        self
    }
}

impl SecretProvider for StaticProvider {
    fn name(&self) -> &'static str {
        "static"
    }

    fn load(&self) -> Result<MasterKey, SealError> {
        if let Some(expected) = &self.expected_fingerprint {
            let actual = compute_fingerprint(self.key.as_bytes())?;
            if &actual != expected {
                warn!("Configured master key does not match the expected fingerprint");
                return Err(SealError::FingerprintMismatch);
            }
        }
        Ok(self.key.clone())
    }
}
