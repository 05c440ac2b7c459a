//! Request and response bodies.
//!
//! Field names are camelCase. Key material and envelope parts travel as
//! hex; public keys travel as base64.

use std::collections::BTreeSet;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

use kacls_crypto::ALGORITHM;
use kacls_directory::{PublicKeyRecord, PublicKeySummary};
use kacls_envelope::{GeneratedKey, Rotation, UnwrappedKey, WrappedKey};

use crate::error::ApiError;

/// Decodes a hex field, naming it in the error.
pub(crate) fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>, ApiError> {
    hex::decode(value).map_err(|_| ApiError::BadRequest(format!("{field} must be hex")))
}

/// Decodes a base64 field, naming it in the error.
pub(crate) fn decode_base64(field: &str, value: &str) -> Result<Vec<u8>, ApiError> {
    BASE64
        .decode(value)
        .map_err(|_| ApiError::BadRequest(format!("{field} must be base64")))
}

fn default_algorithm() -> String {
    ALGORITHM.to_string()
}

// ============================================================================
// Envelope
// ============================================================================

/// `POST /api/wrap-key`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrapKeyRequest {
    /// Data key, hex.
    pub dek: String,
    /// Owner of the key.
    #[serde(alias = "userId")]
    pub owner_user_id: String,
    /// Resource scope.
    pub resource_id: String,
    /// Permission labels.
    pub permissions: Option<BTreeSet<String>>,
    /// Expiry, Unix seconds.
    pub expires_at: Option<u64>,
}

/// Response of wrap-key.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrapKeyResponse {
    /// New key id.
    pub key_id: String,
    /// Wrapped key, hex.
    pub ciphertext: String,
    /// Nonce, hex.
    pub nonce: String,
    /// Authentication tag, hex.
    pub auth_tag: String,
    /// Cipher identifier.
    pub algorithm: String,
    /// Expiry, Unix seconds.
    pub expires_at: u64,
}

impl From<WrappedKey> for WrapKeyResponse {
    fn from(wrapped: WrappedKey) -> Self {
        Self {
            key_id: wrapped.key_id.to_string(),
            ciphertext: hex::encode(&wrapped.envelope.ciphertext),
            nonce: hex::encode(&wrapped.envelope.nonce),
            auth_tag: hex::encode(&wrapped.envelope.auth_tag),
            algorithm: wrapped.envelope.algorithm,
            expires_at: wrapped.grant.expires_at,
        }
    }
}

/// `POST /api/unwrap-key`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnwrapKeyRequest {
    /// Wrapped key, hex.
    pub ciphertext: String,
    /// Nonce, hex.
    pub nonce: String,
    /// Authentication tag, hex.
    pub auth_tag: String,
    /// Key the envelope belongs to.
    pub key_id: String,
    /// Requesting user.
    #[serde(alias = "userId")]
    pub caller_user_id: String,
    /// Resource the caller wants the key for.
    pub resource_id: Option<String>,
    /// Cipher identifier of the envelope.
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
}

/// Response of unwrap-key.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnwrapKeyResponse {
    /// Data key, hex.
    pub dek: String,
    /// Permission labels of the grant.
    pub permissions: Vec<String>,
    /// Expiry, Unix seconds.
    pub expires_at: u64,
}

impl From<UnwrappedKey> for UnwrapKeyResponse {
    fn from(unwrapped: UnwrappedKey) -> Self {
        Self {
            dek: hex::encode(unwrapped.dek.as_bytes()),
            permissions: unwrapped.permissions.into_iter().collect(),
            expires_at: unwrapped.expires_at,
        }
    }
}

/// `POST /api/generate-key`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateKeyRequest {
    /// Owner of the key.
    #[serde(alias = "userId")]
    pub owner_user_id: String,
    /// Resource scope.
    pub resource_id: String,
    /// Key size in bits; 256 by default.
    pub key_size: Option<usize>,
    /// Permission labels.
    pub permissions: Option<BTreeSet<String>>,
    /// Expiry, Unix seconds.
    pub expires_at: Option<u64>,
}

/// Response of generate-key.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateKeyResponse {
    /// Plaintext data key, hex.
    pub dek: String,
    /// New key id.
    pub key_id: String,
    /// Wrapped key, hex.
    pub ciphertext: String,
    /// Nonce, hex.
    pub nonce: String,
    /// Authentication tag, hex.
    pub auth_tag: String,
    /// Cipher identifier.
    pub algorithm: String,
    /// Expiry, Unix seconds.
    pub expires_at: u64,
}

impl From<GeneratedKey> for GenerateKeyResponse {
    fn from(generated: GeneratedKey) -> Self {
        let wrapped = WrapKeyResponse::from(generated.wrapped);
        Self {
            dek: hex::encode(generated.dek.as_bytes()),
            key_id: wrapped.key_id,
            ciphertext: wrapped.ciphertext,
            nonce: wrapped.nonce,
            auth_tag: wrapped.auth_tag,
            algorithm: wrapped.algorithm,
            expires_at: wrapped.expires_at,
        }
    }
}

/// `POST /api/rotate-key`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotateKeyRequest {
    /// Key to supersede.
    pub old_key_id: String,
    /// Owner of the key.
    #[serde(alias = "userId")]
    pub owner_user_id: String,
    /// Resource scope of the replacement.
    pub resource_id: String,
    /// Permission labels of the replacement.
    pub permissions: Option<BTreeSet<String>>,
    /// Expiry of the replacement, Unix seconds.
    pub expires_at: Option<u64>,
}

/// Response of rotate-key.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotateKeyResponse {
    /// Replacement data key, hex.
    pub new_dek: String,
    /// Replacement key id.
    pub new_key_id: String,
    /// Replacement envelope ciphertext, hex.
    pub new_ciphertext: String,
    /// Replacement nonce, hex.
    pub new_nonce: String,
    /// Replacement tag, hex.
    pub new_auth_tag: String,
    /// Superseded key id.
    pub old_key_id: String,
    /// Rotation time, Unix seconds.
    pub rotated_at: u64,
}

impl From<Rotation> for RotateKeyResponse {
    fn from(rotation: Rotation) -> Self {
        Self {
            new_dek: hex::encode(rotation.new_dek.as_bytes()),
            new_key_id: rotation.new_key_id.to_string(),
            new_ciphertext: hex::encode(&rotation.new_envelope.ciphertext),
            new_nonce: hex::encode(&rotation.new_envelope.nonce),
            new_auth_tag: hex::encode(&rotation.new_envelope.auth_tag),
            old_key_id: rotation.old_key_id.to_string(),
            rotated_at: rotation.rotated_at,
        }
    }
}

// ============================================================================
// Directory
// ============================================================================

/// `POST /api/register-public-key`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPublicKeyRequest {
    /// Owner of the key.
    pub user_id: String,
    /// Public key, base64.
    pub public_key: String,
    /// Algorithm tag.
    pub algorithm: String,
}

/// Response of register-public-key.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPublicKeyResponse {
    /// Always true.
    pub success: bool,
    /// Id minted for the key.
    pub key_id: String,
}

/// Response of get-public-key.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyResponse {
    /// Owner of the key.
    pub user_id: String,
    /// Public key, base64.
    pub public_key: String,
    /// Algorithm tag.
    pub algorithm: String,
    /// Id minted at registration.
    pub key_id: String,
    /// Registration time, Unix seconds.
    pub registered_at: u64,
}

impl From<PublicKeyRecord> for PublicKeyResponse {
    fn from(record: PublicKeyRecord) -> Self {
        Self {
            user_id: record.user_id,
            public_key: BASE64.encode(&record.public_key),
            algorithm: record.algorithm.to_string(),
            key_id: record.key_id.to_string(),
            registered_at: record.registered_at,
        }
    }
}

/// Listing entry.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeySummaryDto {
    /// Owner of the key.
    pub user_id: String,
    /// Algorithm tag.
    pub algorithm: String,
    /// Id minted at registration.
    pub key_id: String,
    /// Registration time.
    pub registered_at: u64,
    /// Last registration or lookup.
    pub last_used_at: u64,
    /// Truncated base64 of the key.
    pub public_key_preview: String,
}

impl From<PublicKeySummary> for PublicKeySummaryDto {
    fn from(summary: PublicKeySummary) -> Self {
        Self {
            user_id: summary.user_id,
            algorithm: summary.algorithm.to_string(),
            key_id: summary.key_id.to_string(),
            registered_at: summary.registered_at,
            last_used_at: summary.last_used_at,
            public_key_preview: summary.public_key_preview,
        }
    }
}

/// Response of list-public-keys.
#[derive(Debug, Serialize, Deserialize)]
pub struct PublicKeyListResponse {
    /// Number of records.
    pub count: usize,
    /// Summaries ordered by user id.
    pub records: Vec<PublicKeySummaryDto>,
}

// ============================================================================
// Health
// ============================================================================

/// Response of `GET /health`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Service name.
    pub service: String,
    /// `healthy` or `degraded`.
    pub status: String,
    /// Crate version.
    pub version: String,
    /// Whether the master secret is loaded.
    pub master_key_initialized: bool,
    /// Number of registered public keys.
    pub registered_public_keys: usize,
    /// Number of stored wrapped keys.
    pub active_keys: usize,
}
