//! AES-256-GCM authenticated encryption with detached nonce and tag.
//!
//! Envelope records store the ciphertext, nonce and authentication tag as
//! separate fields, so unlike a single `nonce || ciphertext || tag` blob the
//! three parts are produced and consumed independently.

use aes_gcm::{
    aead::{generic_array::GenericArray, AeadInPlace, KeyInit},
    Aes256Gcm, Nonce,
};
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::random::generate_nonce;

/// Size of an AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;

/// Size of a GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Algorithm tag recorded alongside every sealed value.
pub const ALGORITHM: &str = "aes-256-gcm";

/// Output of [`seal`]: ciphertext plus the nonce and tag needed to open it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBox {
    /// Encrypted bytes (same length as the plaintext).
    pub ciphertext: Vec<u8>,
    /// Random nonce drawn for this seal call.
    pub nonce: [u8; NONCE_SIZE],
    /// GCM authentication tag.
    pub tag: [u8; TAG_SIZE],
}

fn check_key(key: &[u8]) -> Result<(), CryptoError> {
    if key.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKey(format!(
            "expected {} bytes, got {}",
            KEY_SIZE,
            key.len()
        )));
    }
    Ok(())
}

/// Encrypts plaintext using AES-256-GCM.
///
/// A fresh nonce is drawn from the OS CSPRNG on every call.
///
/// # Arguments
///
/// * `key` - 32-byte encryption key
/// * `plaintext` - Data to encrypt
/// * `associated_data` - Context bound into the tag (not encrypted)
pub fn seal(
    key: &[u8],
    plaintext: &[u8],
    associated_data: &[u8],
) -> Result<SealedBox, CryptoError> {
    check_key(key)?;

    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let nonce = generate_nonce();
    let mut buffer = plaintext.to_vec();

    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&nonce), associated_data, &mut buffer)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut tag_bytes = [0u8; TAG_SIZE];
    tag_bytes.copy_from_slice(tag.as_slice());

    Ok(SealedBox {
        ciphertext: buffer,
        nonce,
        tag: tag_bytes,
    })
}

/// Decrypts and authenticates a sealed value.
///
/// Any tag mismatch (wrong key, wrong associated data, tampered ciphertext,
/// nonce or tag) is reported as [`CryptoError::DecryptionFailed`] and no
/// plaintext is returned.
///
/// # Returns
///
/// Decrypted plaintext wrapped in `Zeroizing` for automatic memory cleanup.
pub fn open(
    key: &[u8],
    ciphertext: &[u8],
    nonce: &[u8],
    tag: &[u8],
    associated_data: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    check_key(key)?;

    if nonce.len() != NONCE_SIZE {
        return Err(CryptoError::InvalidInput(format!(
            "nonce must be {} bytes, got {}",
            NONCE_SIZE,
            nonce.len()
        )));
    }

    if tag.len() != TAG_SIZE {
        return Err(CryptoError::InvalidInput(format!(
            "tag must be {} bytes, got {}",
            TAG_SIZE,
            tag.len()
        )));
    }

    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;

    let mut buffer = Zeroizing::new(ciphertext.to_vec());

    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(nonce),
            associated_data,
            buffer.as_mut_slice(),
            GenericArray::from_slice(tag),
        )
        .map_err(|_| CryptoError::DecryptionFailed("authentication failed".to_string()))?;

    Ok(buffer)
}
