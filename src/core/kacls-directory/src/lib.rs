//! # KACLS Directory
//!
//! Directory of per-user public keys used to set up key exchange between
//! clients. One record per user; registering again replaces the old key.
//! Listings only ever expose a short preview of each key.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use kacls_auth::AccessGate;
use kacls_storage::{Clock, KeyId};

pub use error::DirectoryError;

/// Smallest accepted public key, in bytes.
pub const MIN_PUBLIC_KEY_LEN: usize = 32;

/// Largest accepted public key, in bytes.
pub const MAX_PUBLIC_KEY_LEN: usize = 4096;

/// Number of base64 characters shown in a listing preview.
pub const PREVIEW_LEN: usize = 20;

/// Marker appended to every preview.
pub const PREVIEW_MARKER: &str = "...";

/// Supported key agreement algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PublicKeyAlgorithm {
    /// ECDH over NIST P-256.
    EcdhP256,
}

impl PublicKeyAlgorithm {
    /// Wire tag of the algorithm.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EcdhP256 => "ECDH-P256",
        }
    }
}

impl fmt::Display for PublicKeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PublicKeyAlgorithm {
    type Err = DirectoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ECDH-P256" => Ok(Self::EcdhP256),
            other => Err(DirectoryError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// A registered public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyRecord {
    /// Owner of the key.
    pub user_id: String,
    /// Raw public key bytes.
    pub public_key: Vec<u8>,
    /// Key agreement algorithm.
    pub algorithm: PublicKeyAlgorithm,
    /// Id minted at registration.
    pub key_id: KeyId,
    /// Registration time (Unix seconds).
    pub registered_at: u64,
    /// Last registration or lookup (Unix seconds).
    pub last_used_at: u64,
}

/// Listing entry. Never carries the full key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeySummary {
    /// Owner of the key.
    pub user_id: String,
    /// Key agreement algorithm.
    pub algorithm: PublicKeyAlgorithm,
    /// Id minted at registration.
    pub key_id: KeyId,
    /// Registration time.
    pub registered_at: u64,
    /// Last registration or lookup.
    pub last_used_at: u64,
    /// Truncated base64 of the key.
    pub public_key_preview: String,
}

impl From<&PublicKeyRecord> for PublicKeySummary {
    fn from(record: &PublicKeyRecord) -> Self {
        Self {
            user_id: record.user_id.clone(),
            algorithm: record.algorithm,
            key_id: record.key_id.clone(),
            registered_at: record.registered_at,
            last_used_at: record.last_used_at,
            public_key_preview: preview(&record.public_key),
        }
    }
}

/// Fixed-length base64 prefix of a key followed by [`PREVIEW_MARKER`].
pub fn preview(public_key: &[u8]) -> String {
    let encoded = BASE64.encode(public_key);
    let cut = encoded.len().min(PREVIEW_LEN);
    format!("{}{}", &encoded[..cut], PREVIEW_MARKER)
}

/// In-memory public key directory.
pub struct PublicKeyDirectory {
    records: RwLock<HashMap<String, PublicKeyRecord>>,
    gate: Arc<dyn AccessGate>,
    clock: Arc<dyn Clock>,
}

impl PublicKeyDirectory {
    /// Creates an empty directory.
    pub fn new(gate: Arc<dyn AccessGate>, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            gate,
            clock,
        }
    }

    /// Registers `public_key` for `user_id`, replacing any previous key.
    pub fn register(
        &self,
        user_id: &str,
        public_key: &[u8],
        algorithm: &str,
    ) -> Result<KeyId, DirectoryError> {
        if user_id.is_empty() {
            return Err(DirectoryError::InvalidInput("user id is required".into()));
        }
        let algorithm: PublicKeyAlgorithm = algorithm.parse()?;
        if !(MIN_PUBLIC_KEY_LEN..=MAX_PUBLIC_KEY_LEN).contains(&public_key.len()) {
            return Err(DirectoryError::InvalidInput(format!(
                "public key must be {}..={} bytes, got {}",
                MIN_PUBLIC_KEY_LEN,
                MAX_PUBLIC_KEY_LEN,
                public_key.len()
            )));
        }
        self.admit(user_id)?;

        let now = self.clock.now();
        let key_id = KeyId::generate();
        let record = PublicKeyRecord {
            user_id: user_id.to_string(),
            public_key: public_key.to_vec(),
            algorithm,
            key_id: key_id.clone(),
            registered_at: now,
            last_used_at: now,
        };

        let replaced = self
            .records
            .write()
            .insert(user_id.to_string(), record)
            .is_some();

        info!(
            user_id,
            key_id = %key_id,
            algorithm = %algorithm,
            replaced,
            "Public key registered"
        );

        Ok(key_id)
    }

    /// Looks up the key of `user_id` and marks it used.
    pub fn get(&self, user_id: &str) -> Result<PublicKeyRecord, DirectoryError> {
        if user_id.is_empty() {
            return Err(DirectoryError::InvalidInput("user id is required".into()));
        }
        self.admit(user_id)?;

        let mut records = self.records.write();
        let record = records
            .get_mut(user_id)
            .ok_or_else(|| DirectoryError::NotFound(user_id.to_string()))?;
        record.last_used_at = self.clock.now();

        debug!(user_id, "Public key retrieved");
        Ok(record.clone())
    }

    /// Summaries of every registered key, ordered by user id.
    pub fn list(&self) -> Vec<PublicKeySummary> {
        let mut summaries: Vec<PublicKeySummary> = self
            .records
            .read()
            .values()
            .map(PublicKeySummary::from)
            .collect();
        summaries.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        summaries
    }

    /// Number of registered keys.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// True if no key is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn admit(&self, user_id: &str) -> Result<(), DirectoryError> {
        if self.gate.validate(user_id) {
            return Ok(());
        }
        warn!(gate = self.gate.name(), "Access gate rejected user");
        Err(DirectoryError::Denied)
    }
}
