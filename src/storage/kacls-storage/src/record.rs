//! Stored key records.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, globally unique key identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(String);

impl KeyId {
    /// Mints a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wraps an identifier received from a caller.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Bytes bound as associated data when sealing under this id.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for KeyId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for KeyId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A data key sealed under the master secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeRecord {
    /// Key this envelope belongs to; also the associated data.
    pub key_id: KeyId,
    /// Encrypted data key.
    pub ciphertext: Vec<u8>,
    /// Nonce used when sealing.
    pub nonce: Vec<u8>,
    /// Authentication tag.
    pub auth_tag: Vec<u8>,
    /// Cipher identifier, e.g. `aes-256-gcm`.
    pub algorithm: String,
}

/// Lifecycle state of a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantStatus {
    /// Usable.
    Active,
    /// Superseded by a newer key; still usable until it expires.
    Rotated,
    /// Past its expiry.
    Expired,
}

/// Who may unwrap a key, for which resource, and until when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantMetadata {
    /// Key this grant governs.
    pub key_id: KeyId,
    /// The only user allowed to unwrap.
    pub owner_user_id: String,
    /// Resource the key is scoped to, if any.
    pub resource_id: Option<String>,
    /// Opaque permission labels.
    pub permissions: BTreeSet<String>,
    /// Creation time (Unix seconds).
    pub created_at: u64,
    /// Expiry time (Unix seconds).
    pub expires_at: u64,
    /// Lifecycle state.
    pub status: GrantStatus,
    /// Key this one replaced.
    pub rotated_from: Option<KeyId>,
    /// Key that replaced this one.
    pub rotated_to: Option<KeyId>,
    /// When this key was superseded.
    pub rotated_at: Option<u64>,
}

impl GrantMetadata {
    /// A grant is expired from its expiry instant onwards.
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

/// Envelope and grant stored together under one key id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    /// Sealed data key.
    pub envelope: EnvelopeRecord,
    /// Access grant.
    pub grant: GrantMetadata,
}

impl KeyRecord {
    /// Id of this record.
    pub fn key_id(&self) -> &KeyId {
        &self.envelope.key_id
    }
}
