//! Key derivation.
//!
//! The master secret is never used directly as an AEAD key. Each purpose
//! gets its own subkey, expanded from the master with HKDF-SHA256 (RFC 5869)
//! under a context label.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::aead::KEY_SIZE;
use crate::error::CryptoError;

/// Derives an AES-256 key from `master_key` for the purpose named by `context`.
///
/// Derivation is deterministic: the same master and label always yield the
/// same key, and distinct labels yield unrelated keys.
pub fn derive_encryption_key(
    master_key: &[u8],
    context: &[u8],
) -> Result<Zeroizing<[u8; KEY_SIZE]>, CryptoError> {
    if master_key.len() < KEY_SIZE {
        return Err(CryptoError::InvalidKey(format!(
            "master key must be at least {} bytes, got {}",
            KEY_SIZE,
            master_key.len()
        )));
    }
    if context.is_empty() {
        return Err(CryptoError::InvalidInput(
            "derivation context must not be empty".to_string(),
        ));
    }

    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    Hkdf::<Sha256>::new(None, master_key)
        .expand(context, key.as_mut_slice())
        .map_err(|_| CryptoError::KeyGenerationFailed("HKDF expansion failed".to_string()))?;

    Ok(key)
}
