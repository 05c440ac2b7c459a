//! Secure key types with automatic memory zeroization.
//!
//! Both key types implement `Zeroize` and `ZeroizeOnDrop` and redact their
//! contents from `Debug` output.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::aead::KEY_SIZE;
use crate::error::CryptoError;
use crate::random::{generate_bytes, generate_key};

/// Largest data encryption key accepted for wrapping, in bytes.
pub const MAX_DATA_KEY_SIZE: usize = 512;

/// Key sizes (in bits) supported by [`DataKey::generate`].
pub const SUPPORTED_DATA_KEY_BITS: [usize; 3] = [128, 192, 256];

/// The process-wide master key.
///
/// Created once at startup by a secret provider and never persisted by the
/// service. It is only ever used as input key material for deriving the
/// envelope wrapping key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    bytes: [u8; KEY_SIZE],
}

impl MasterKey {
    /// Generates a new random master key.
    pub fn generate() -> Self {
        let key = generate_key();
        Self { bytes: *key }
    }

    /// Creates a master key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "expected {} bytes, got {}",
                KEY_SIZE,
                bytes.len()
            )));
        }

        let mut key_bytes = [0u8; KEY_SIZE];
        key_bytes.copy_from_slice(bytes);

        Ok(Self { bytes: key_bytes })
    }

    /// Returns the raw key bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// A data encryption key (DEK) as handed to or returned by the service.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DataKey {
    bytes: Vec<u8>,
}

impl DataKey {
    /// Generates a random data key of `bits` length.
    ///
    /// # Errors
    ///
    /// Returns an error unless `bits` is one of [`SUPPORTED_DATA_KEY_BITS`].
    pub fn generate(bits: usize) -> Result<Self, CryptoError> {
        if !SUPPORTED_DATA_KEY_BITS.contains(&bits) {
            return Err(CryptoError::InvalidInput(format!(
                "unsupported key size {} (expected one of 128, 192, 256)",
                bits
            )));
        }

        Ok(Self {
            bytes: generate_bytes(bits / 8),
        })
    }

    /// Creates a data key from caller-supplied bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty or longer than
    /// [`MAX_DATA_KEY_SIZE`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.is_empty() {
            return Err(CryptoError::InvalidKey("data key cannot be empty".into()));
        }
        if bytes.len() > MAX_DATA_KEY_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "data key too long ({} bytes, max {})",
                bytes.len(),
                MAX_DATA_KEY_SIZE
            )));
        }

        Ok(Self {
            bytes: bytes.to_vec(),
        })
    }

    /// Returns the raw key bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Key length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false for a constructed key; present for API symmetry.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for DataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataKey")
            .field("len", &self.bytes.len())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}
