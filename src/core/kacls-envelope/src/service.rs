//! The key envelope service.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use kacls_auth::AccessGate;
use kacls_crypto::{DataKey, ALGORITHM};
use kacls_seal::MasterSecretSource;
use kacls_storage::{
    Clock, EnvelopeRecord, GrantMetadata, GrantStatus, KeyId, KeyRecord, KeyRecordStore,
    StorageError, WriteBatch,
};

use crate::config::EnvelopeConfig;
use crate::error::EnvelopeError;
use crate::policy::{decide, Decision, DenyReason};

/// Permissions granted when the caller names none.
pub const DEFAULT_PERMISSIONS: [&str; 2] = ["read", "write"];

/// Size of the data key minted by [`KeyEnvelopeService::rotate`].
const ROTATED_KEY_BITS: usize = 256;

/// Grant terms for a new key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WrapRequest {
    /// Sole user allowed to unwrap.
    pub owner_user_id: String,
    /// Resource scope.
    pub resource_id: Option<String>,
    /// Permission labels; defaults to [`DEFAULT_PERMISSIONS`].
    pub permissions: Option<BTreeSet<String>>,
    /// Expiry (Unix seconds); defaults to now plus the configured TTL.
    pub expires_at: Option<u64>,
}

impl WrapRequest {
    /// Grant for `owner_user_id` with default terms.
    pub fn new(owner_user_id: impl Into<String>) -> Self {
        Self {
            owner_user_id: owner_user_id.into(),
            ..Default::default()
        }
    }

    /// Scopes the key to a resource.
    pub fn resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    /// Sets the permission labels.
    pub fn permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions = Some(permissions.into_iter().map(Into::into).collect());
        self
    }

    /// Sets an explicit expiry.
    pub fn expires_at(mut self, expires_at: u64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

/// Terms of the replacement key. Unset fields are inherited from the old
/// grant, except expiry which defaults to now plus the configured TTL.
pub type RotateRequest = WrapRequest;

/// Result of [`KeyEnvelopeService::wrap`].
#[derive(Debug, Clone)]
pub struct WrappedKey {
    /// Fresh key id.
    pub key_id: KeyId,
    /// Sealed data key.
    pub envelope: EnvelopeRecord,
    /// Stored grant.
    pub grant: GrantMetadata,
}

/// Result of [`KeyEnvelopeService::unwrap`].
#[derive(Debug, Clone)]
pub struct UnwrappedKey {
    /// Recovered data key.
    pub dek: DataKey,
    /// Permissions of the grant.
    pub permissions: BTreeSet<String>,
    /// Grant expiry.
    pub expires_at: u64,
}

/// Result of [`KeyEnvelopeService::generate_key`].
#[derive(Debug, Clone)]
pub struct GeneratedKey {
    /// Plaintext data key for immediate use.
    pub dek: DataKey,
    /// The same key, wrapped.
    pub wrapped: WrappedKey,
}

/// Result of [`KeyEnvelopeService::rotate`].
#[derive(Debug, Clone)]
pub struct Rotation {
    /// Replacement data key.
    pub new_dek: DataKey,
    /// Replacement key id.
    pub new_key_id: KeyId,
    /// Replacement envelope.
    pub new_envelope: EnvelopeRecord,
    /// Replacement grant.
    pub new_grant: GrantMetadata,
    /// Superseded key id.
    pub old_key_id: KeyId,
    /// When the rotation happened.
    pub rotated_at: u64,
}

/// Resolved grant terms.
struct Terms {
    owner_user_id: String,
    resource_id: Option<String>,
    permissions: BTreeSet<String>,
    expires_at: u64,
}

/// Wraps, unwraps, rotates and expires data keys.
pub struct KeyEnvelopeService {
    secret: Arc<MasterSecretSource>,
    store: Arc<dyn KeyRecordStore>,
    gate: Arc<dyn AccessGate>,
    clock: Arc<dyn Clock>,
    config: EnvelopeConfig,
}

impl KeyEnvelopeService {
    /// Creates a service over the given collaborators.
    pub fn new(
        secret: Arc<MasterSecretSource>,
        store: Arc<dyn KeyRecordStore>,
        gate: Arc<dyn AccessGate>,
        clock: Arc<dyn Clock>,
        config: EnvelopeConfig,
    ) -> Self {
        Self {
            secret,
            store,
            gate,
            clock,
            config,
        }
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &EnvelopeConfig {
        &self.config
    }

    /// True once the master secret is loaded.
    pub fn is_ready(&self) -> bool {
        self.secret.is_ready()
    }

    /// Number of stored keys, including rotated ones.
    pub fn key_count(&self) -> Result<usize, EnvelopeError> {
        Ok(self.store.len()?)
    }

    // ========================================================================
    // Wrap
    // ========================================================================

    /// Wraps `dek` under a fresh key id and stores its grant.
    pub fn wrap(&self, dek: &DataKey, request: WrapRequest) -> Result<WrappedKey, EnvelopeError> {
        Self::require_user(&request.owner_user_id)?;
        self.admit(&request.owner_user_id)?;

        let now = self.clock.now();
        let terms = self.resolve(request, now, None)?;
        let key_id = KeyId::generate();
        let record = self.seal_record(&key_id, dek, terms, now, None)?;

        self.store
            .apply(WriteBatch::new().insert(record.clone()))?;

        info!(
            key_id = %key_id,
            owner = %record.grant.owner_user_id,
            resource = ?record.grant.resource_id,
            expires_at = record.grant.expires_at,
            "Data key wrapped"
        );

        Ok(WrappedKey {
            key_id,
            envelope: record.envelope,
            grant: record.grant,
        })
    }

    /// Generates a random data key of `bits` length and wraps it.
    pub fn generate_key(
        &self,
        request: WrapRequest,
        bits: usize,
    ) -> Result<GeneratedKey, EnvelopeError> {
        let dek = DataKey::generate(bits).map_err(|e| EnvelopeError::InvalidInput(e.to_string()))?;
        let wrapped = self.wrap(&dek, request)?;
        debug!(key_id = %wrapped.key_id, bits, "Data key generated");
        Ok(GeneratedKey { dek, wrapped })
    }

    // ========================================================================
    // Unwrap
    // ========================================================================

    /// Opens a presented envelope for `caller`.
    ///
    /// An expired key is evicted and reported as not found, whoever asks.
    /// Owner or resource mismatches are denied without changing state.
    pub fn unwrap(
        &self,
        envelope: &EnvelopeRecord,
        key_id: &KeyId,
        caller: &str,
        resource_id: Option<&str>,
    ) -> Result<UnwrappedKey, EnvelopeError> {
        Self::require_user(caller)?;
        self.admit(caller)?;

        let record = self
            .store
            .get(key_id)?
            .ok_or_else(|| EnvelopeError::KeyNotFound(key_id.to_string()))?;

        let now = self.clock.now();
        match decide(&record.grant, caller, resource_id, now) {
            Decision::Allow => {}
            Decision::Deny(DenyReason::Expired) => {
                self.evict(key_id)?;
                return Err(EnvelopeError::KeyNotFound(key_id.to_string()));
            }
            Decision::Deny(reason) => {
                warn!(key_id = %key_id, caller, reason = %reason, "Unwrap denied");
                return Err(EnvelopeError::Denied(reason));
            }
        }

        if envelope.key_id != *key_id {
            return Err(EnvelopeError::InvalidInput(
                "envelope belongs to a different key".into(),
            ));
        }
        if envelope.algorithm != ALGORITHM {
            return Err(EnvelopeError::InvalidInput(format!(
                "unsupported envelope algorithm: {}",
                envelope.algorithm
            )));
        }

        let plaintext = self
            .secret
            .open(
                &envelope.ciphertext,
                &envelope.nonce,
                &envelope.auth_tag,
                key_id.as_bytes(),
            )
            .map_err(|e| {
                let e = EnvelopeError::from(e);
                if matches!(e, EnvelopeError::DecryptionFailed) {
                    warn!(key_id = %key_id, "Envelope failed authentication");
                }
                e
            })?;
        let dek = DataKey::from_bytes(&plaintext)?;

        debug!(key_id = %key_id, caller, "Data key unwrapped");

        Ok(UnwrappedKey {
            dek,
            permissions: record.grant.permissions,
            expires_at: record.grant.expires_at,
        })
    }

    // ========================================================================
    // Rotation
    // ========================================================================

    /// Replaces `old_key_id` with a freshly generated key.
    ///
    /// The new record and the superseded grant are written in one batch.
    /// The old envelope is left untouched and stays unwrappable until the
    /// old grant expires, capped by the configured grace period.
    pub fn rotate(
        &self,
        old_key_id: &KeyId,
        request: RotateRequest,
    ) -> Result<Rotation, EnvelopeError> {
        Self::require_user(&request.owner_user_id)?;
        self.admit(&request.owner_user_id)?;

        let old = self
            .store
            .get(old_key_id)?
            .ok_or_else(|| EnvelopeError::KeyNotFound(old_key_id.to_string()))?;

        let now = self.clock.now();
        if old.grant.is_expired(now) {
            self.evict(old_key_id)?;
            return Err(EnvelopeError::KeyNotFound(old_key_id.to_string()));
        }
        if old.grant.owner_user_id != request.owner_user_id {
            warn!(key_id = %old_key_id, "Rotation denied: caller does not own key");
            return Err(EnvelopeError::Denied(DenyReason::OwnerMismatch));
        }
        if old.grant.status == GrantStatus::Rotated || old.grant.rotated_to.is_some() {
            return Err(EnvelopeError::AlreadyRotated(old_key_id.to_string()));
        }

        let terms = self.resolve(request, now, Some(&old.grant))?;
        let new_dek = DataKey::generate(ROTATED_KEY_BITS)?;
        let new_key_id = KeyId::generate();
        let new_record =
            self.seal_record(&new_key_id, &new_dek, terms, now, Some(old_key_id.clone()))?;

        let mut superseded = old.grant.clone();
        superseded.status = GrantStatus::Rotated;
        superseded.rotated_to = Some(new_key_id.clone());
        superseded.rotated_at = Some(now);
        if let Some(grace) = self.config.rotation_grace {
            superseded.expires_at = superseded
                .expires_at
                .min(now.saturating_add(grace.as_secs()));
        }
        let old_expires_at = superseded.expires_at;

        // The grant must be unchanged since it was read; a concurrent
        // rotation or eviction in between loses.
        self.store
            .apply(
                WriteBatch::new()
                    .insert(new_record.clone())
                    .replace_grant(old.grant, superseded),
            )
            .map_err(|e| match e {
                StorageError::Conflict(_) => {
                    warn!(key_id = %old_key_id, "Rotation lost to a concurrent update");
                    EnvelopeError::AlreadyRotated(old_key_id.to_string())
                }
                StorageError::NotFound(_) => EnvelopeError::KeyNotFound(old_key_id.to_string()),
                other => EnvelopeError::Storage(other),
            })?;

        info!(
            old_key_id = %old_key_id,
            new_key_id = %new_key_id,
            old_expires_at,
            "Data key rotated"
        );

        Ok(Rotation {
            new_dek,
            new_key_id,
            new_envelope: new_record.envelope,
            new_grant: new_record.grant,
            old_key_id: old_key_id.clone(),
            rotated_at: now,
        })
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Evicts every expired key. Returns how many were removed.
    pub fn cleanup_expired(&self) -> Result<usize, EnvelopeError> {
        let now = self.clock.now();
        let removed = self
            .store
            .remove_where(&|record: &KeyRecord| record.grant.is_expired(now))?;

        for key_id in &removed {
            info!(key_id = %key_id, "Expired key evicted");
        }
        if !removed.is_empty() {
            info!(count = removed.len(), "Expired key cleanup finished");
        }

        Ok(removed.len())
    }

    /// Returns the grant of a key without using it.
    ///
    /// An expired grant is reported with status `expired` but not evicted.
    pub fn grant(&self, key_id: &KeyId) -> Result<GrantMetadata, EnvelopeError> {
        let mut grant = self
            .store
            .get(key_id)?
            .ok_or_else(|| EnvelopeError::KeyNotFound(key_id.to_string()))?
            .grant;

        if grant.is_expired(self.clock.now()) {
            grant.status = GrantStatus::Expired;
        }
        Ok(grant)
    }

    // ========================================================================
    // Internal
    // ========================================================================

    fn require_user(user_id: &str) -> Result<(), EnvelopeError> {
        if user_id.is_empty() {
            return Err(EnvelopeError::InvalidInput("user id is required".into()));
        }
        Ok(())
    }

    fn admit(&self, user_id: &str) -> Result<(), EnvelopeError> {
        if self.gate.validate(user_id) {
            return Ok(());
        }
        warn!(gate = self.gate.name(), "Access gate rejected user");
        Err(EnvelopeError::Denied(DenyReason::UserRejected))
    }

    fn resolve(
        &self,
        request: WrapRequest,
        now: u64,
        inherit: Option<&GrantMetadata>,
    ) -> Result<Terms, EnvelopeError> {
        let expires_at = request
            .expires_at
            .unwrap_or_else(|| now.saturating_add(self.config.default_ttl.as_secs()));
        if expires_at <= now {
            return Err(EnvelopeError::InvalidInput(
                "expiry must be in the future".into(),
            ));
        }

        let resource_id = request
            .resource_id
            .or_else(|| inherit.and_then(|g| g.resource_id.clone()));
        let permissions = request
            .permissions
            .or_else(|| inherit.map(|g| g.permissions.clone()))
            .unwrap_or_else(|| DEFAULT_PERMISSIONS.iter().map(|p| p.to_string()).collect());

        Ok(Terms {
            owner_user_id: request.owner_user_id,
            resource_id,
            permissions,
            expires_at,
        })
    }

    fn seal_record(
        &self,
        key_id: &KeyId,
        dek: &DataKey,
        terms: Terms,
        now: u64,
        rotated_from: Option<KeyId>,
    ) -> Result<KeyRecord, EnvelopeError> {
        let sealed = self.secret.seal(dek.as_bytes(), key_id.as_bytes())?;

        Ok(KeyRecord {
            envelope: EnvelopeRecord {
                key_id: key_id.clone(),
                ciphertext: sealed.ciphertext,
                nonce: sealed.nonce.to_vec(),
                auth_tag: sealed.tag.to_vec(),
                algorithm: ALGORITHM.to_string(),
            },
            grant: GrantMetadata {
                key_id: key_id.clone(),
                owner_user_id: terms.owner_user_id,
                resource_id: terms.resource_id,
                permissions: terms.permissions,
                created_at: now,
                expires_at: terms.expires_at,
                status: GrantStatus::Active,
                rotated_from,
                rotated_to: None,
                rotated_at: None,
            },
        })
    }

    fn evict(&self, key_id: &KeyId) -> Result<(), EnvelopeError> {
        if self.store.remove(key_id)?.is_some() {
            info!(key_id = %key_id, "Expired key evicted");
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
