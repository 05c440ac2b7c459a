//! # KACLS Seal
//!
//! Lifecycle of the process-wide master secret.
//!
//! The source moves through four states:
//! - **Uninitialized**: no key loaded, every operation fails
//! - **Ready**: the envelope wrapping key is derived and usable
//! - **Failed**: initialization failed; the source stays closed
//! - **TornDown**: key material was wiped at shutdown
//!
//! The raw master key never leaves this crate. Callers get [`seal`] and
//! [`open`] over the derived wrapping key and a short fingerprint for logs.
//!
//! [`seal`]: MasterSecretSource::seal
//! [`open`]: MasterSecretSource::open

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod provider;

use hmac::{Hmac, Mac};
use parking_lot::RwLock;
use sha2::Sha256;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use kacls_crypto::{aead, kdf, SealedBox, KEY_SIZE};

pub use error::SealError;
pub use provider::{EphemeralProvider, SecretProvider, StaticProvider};

type HmacSha256 = Hmac<Sha256>;

/// Domain separation tag for the master key fingerprint.
const FINGERPRINT_TAG: &[u8] = b"kacls-seal-verify-v1";

/// HKDF info label for the envelope wrapping key.
pub const ENVELOPE_KEY_INFO: &[u8] = b"kacls-envelope-v1";

/// Length of a fingerprint in hex characters.
pub const FINGERPRINT_LEN: usize = 16;

/// Computes the key-check value of a master key.
///
/// HMAC-SHA256 over a fixed tag, truncated to [`FINGERPRINT_LEN`] hex chars.
/// It identifies a key without revealing it.
pub fn compute_fingerprint(master_key: &[u8]) -> Result<String, SealError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(master_key)
        .map_err(|e| SealError::Provider(e.to_string()))?;
    mac.update(FINGERPRINT_TAG);
    let digest = mac.finalize().into_bytes();
    Ok(hex::encode(&digest[..FINGERPRINT_LEN / 2]))
}

/// State of the master secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SealStatus {
    /// No initialization attempted yet.
    Uninitialized,
    /// Key material loaded and usable.
    Ready,
    /// Initialization failed.
    Failed,
    /// Key material wiped.
    TornDown,
}

enum SealState {
    Uninitialized,
    Ready {
        wrapping_key: Zeroizing<[u8; KEY_SIZE]>,
        fingerprint: String,
    },
    Failed(String),
    TornDown,
}

impl SealState {
    fn status(&self) -> SealStatus {
        match self {
            Self::Uninitialized => SealStatus::Uninitialized,
            Self::Ready { .. } => SealStatus::Ready,
            Self::Failed(_) => SealStatus::Failed,
            Self::TornDown => SealStatus::TornDown,
        }
    }

    fn unavailable(&self) -> SealError {
        match self {
            Self::Uninitialized | Self::Ready { .. } => SealError::NotInitialized,
            Self::Failed(reason) => SealError::InitFailed(reason.clone()),
            Self::TornDown => SealError::TornDown,
        }
    }
}

/// Owner of the master secret.
pub struct MasterSecretSource {
    provider: Box<dyn SecretProvider>,
    state: RwLock<SealState>,
}

impl MasterSecretSource {
    /// Creates an uninitialized source backed by `provider`.
    pub fn new(provider: Box<dyn SecretProvider>) -> Self {
        Self {
            provider,
            state: RwLock::new(SealState::Uninitialized),
        }
    }

    /// Shorthand for a source with a random per-process key.
    pub fn ephemeral() -> Self {
        Self::new(Box::new(EphemeralProvider))
    }

    /// Loads the master key and derives the wrapping key.
    ///
    /// Idempotent once ready. After a failure or teardown, every further
    /// call returns the same error instead of retrying.
    pub fn initialize(&self) -> Result<(), SealError> {
        let mut state = self.state.write();

        match &*state {
            SealState::Ready { .. } => {
                debug!("Master secret already initialized");
                return Ok(());
            }
            SealState::Uninitialized => {}
            other => return Err(other.unavailable()),
        }

        let loaded = self.provider.load().and_then(|master| {
            let wrapping_key = kdf::derive_encryption_key(master.as_bytes(), ENVELOPE_KEY_INFO)?;
            let fingerprint = compute_fingerprint(master.as_bytes())?;
            Ok((wrapping_key, fingerprint))
        });

        match loaded {
            Ok((wrapping_key, fingerprint)) => {
                info!(
                    provider = self.provider.name(),
                    fingerprint = %fingerprint,
                    "Master secret initialized"
                );
                *state = SealState::Ready {
                    wrapping_key,
                    fingerprint,
                };
                Ok(())
            }
            Err(e) => {
                warn!(provider = self.provider.name(), error = %e, "Master secret initialization failed");
                *state = SealState::Failed(e.to_string());
                Err(SealError::InitFailed(e.to_string()))
            }
        }
    }

    /// Returns the current status.
    pub fn status(&self) -> SealStatus {
        self.state.read().status()
    }

    /// Returns true if seal and open are usable.
    pub fn is_ready(&self) -> bool {
        self.status() == SealStatus::Ready
    }

    /// Fingerprint of the loaded master key.
    pub fn fingerprint(&self) -> Result<String, SealError> {
        match &*self.state.read() {
            SealState::Ready { fingerprint, .. } => Ok(fingerprint.clone()),
            other => Err(other.unavailable()),
        }
    }

    /// Encrypts `plaintext` under the wrapping key, binding `aad`.
    pub fn seal(&self, plaintext: &[u8], aad: &[u8]) -> Result<SealedBox, SealError> {
        match &*self.state.read() {
            SealState::Ready { wrapping_key, .. } => {
                Ok(aead::seal(&wrapping_key[..], plaintext, aad)?)
            }
            other => Err(other.unavailable()),
        }
    }

    /// Decrypts a value produced by [`seal`](Self::seal).
    pub fn open(
        &self,
        ciphertext: &[u8],
        nonce: &[u8],
        tag: &[u8],
        aad: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, SealError> {
        match &*self.state.read() {
            SealState::Ready { wrapping_key, .. } => {
                Ok(aead::open(&wrapping_key[..], ciphertext, nonce, tag, aad)?)
            }
            other => Err(other.unavailable()),
        }
    }

    /// Wipes the key material. Terminal.
    pub fn teardown(&self) {
        let mut state = self.state.write();
        if matches!(*state, SealState::TornDown) {
            return;
        }
        *state = SealState::TornDown;
        info!("Master secret torn down");
    }
}

impl Drop for MasterSecretSource {
    fn drop(&mut self) {
        *self.state.get_mut() = SealState::TornDown;
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use kacls_crypto::{CryptoError, MasterKey};

    struct FailingProvider;

    impl SecretProvider for FailingProvider {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn load(&self) -> Result<MasterKey, SealError> {
            Err(SealError::Provider("backend unreachable".into()))
        }
    }

    fn ready_source() -> MasterSecretSource {
        let source = MasterSecretSource::ephemeral();
        source.initialize().unwrap();
        source
    }

    #[test]
    fn test_uninitialized_rejects_operations() {
        let source = MasterSecretSource::ephemeral();
        assert_eq!(source.status(), SealStatus::Uninitialized);
        assert!(matches!(
            source.seal(b"data", b"aad"),
            Err(SealError::NotInitialized)
        ));
        assert!(matches!(
            source.fingerprint(),
            Err(SealError::NotInitialized)
        ));
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let source = ready_source();
        let fingerprint = source.fingerprint().unwrap();

        source.initialize().unwrap();
        assert_eq!(source.fingerprint().unwrap(), fingerprint);
        assert_eq!(fingerprint.len(), FINGERPRINT_LEN);
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let source = ready_source();
        let sealed = source.seal(b"dek bytes", b"key-1").unwrap();

        let opened = source
            .open(&sealed.ciphertext, &sealed.nonce, &sealed.tag, b"key-1")
            .unwrap();
        assert_eq!(&*opened, b"dek bytes");

        let wrong_aad = source.open(&sealed.ciphertext, &sealed.nonce, &sealed.tag, b"key-2");
        assert!(matches!(
            wrong_aad,
            Err(SealError::Crypto(CryptoError::DecryptionFailed(_)))
        ));
    }

    #[test]
    fn test_different_sources_cannot_open_each_other() {
        let a = ready_source();
        let b = ready_source();
        let sealed = a.seal(b"secret", b"aad").unwrap();

        assert!(b
            .open(&sealed.ciphertext, &sealed.nonce, &sealed.tag, b"aad")
            .is_err());
    }

    #[test]
    fn test_static_provider_is_deterministic() {
        let hex_key = "42".repeat(KEY_SIZE);
        let a = MasterSecretSource::new(Box::new(StaticProvider::from_hex(&hex_key).unwrap()));
        let b = MasterSecretSource::new(Box::new(StaticProvider::from_hex(&hex_key).unwrap()));
        a.initialize().unwrap();
        b.initialize().unwrap();

        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());

        let sealed = a.seal(b"portable", b"k").unwrap();
        let opened = b
            .open(&sealed.ciphertext, &sealed.nonce, &sealed.tag, b"k")
            .unwrap();
        assert_eq!(&*opened, b"portable");
    }

    #[test]
    fn test_failed_initialization_fails_closed() {
        let source = MasterSecretSource::new(Box::new(FailingProvider));

        assert!(matches!(
            source.initialize(),
            Err(SealError::InitFailed(_))
        ));
        assert_eq!(source.status(), SealStatus::Failed);

        // No retry: the source stays closed.
        assert!(matches!(
            source.initialize(),
            Err(SealError::InitFailed(_))
        ));
        assert!(matches!(
            source.seal(b"x", b"y"),
            Err(SealError::InitFailed(_))
        ));
    }

    #[test]
    fn test_teardown_is_terminal() {
        let source = ready_source();
        source.teardown();

        assert_eq!(source.status(), SealStatus::TornDown);
        assert!(!source.is_ready());
        assert!(matches!(source.seal(b"x", b"y"), Err(SealError::TornDown)));
        assert!(matches!(source.initialize(), Err(SealError::TornDown)));

        // Second teardown is a no-op.
        source.teardown();
    }

    #[test]
    fn test_fingerprint_is_stable_hex() {
        let fp1 = compute_fingerprint(&[7u8; KEY_SIZE]).unwrap();
        let fp2 = compute_fingerprint(&[7u8; KEY_SIZE]).unwrap();
        let fp3 = compute_fingerprint(&[8u8; KEY_SIZE]).unwrap();

        assert_eq!(fp1, fp2);
        assert_ne!(fp1, fp3);
        assert!(fp1.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
