//! # KACLS Crypto
//!
//! Cryptographic primitives used by the key access control list service:
//! - Authenticated encryption with detached nonce and tag (AES-256-GCM)
//! - Key derivation (HKDF-SHA256)
//! - Zeroizing key types
//! - Secure random generation

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod aead;
pub mod error;
pub mod kdf;
pub mod keys;
pub mod random;

pub use aead::{SealedBox, ALGORITHM, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use error::CryptoError;
pub use keys::{DataKey, MasterKey};
