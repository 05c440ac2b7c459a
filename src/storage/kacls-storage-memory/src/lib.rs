//! # KACLS Storage Memory
//!
//! In-memory implementation of [`KeyRecordStore`].
//!
//! All records live in one map behind a single lock. A batch holds the
//! write lock for its whole validation and application, so readers see
//! either none or all of it. Contents are lost when the process exits.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use kacls_storage::{KeyId, KeyRecord, KeyRecordStore, Mutation, StorageError, WriteBatch};

/// In-memory key record store.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    records: RwLock<HashMap<KeyId, KeyRecord>>,
}

impl MemoryKeyStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyRecordStore for MemoryKeyStore {
    fn get(&self, key_id: &KeyId) -> Result<Option<KeyRecord>, StorageError> {
        Ok(self.records.read().get(key_id).cloned())
    }

    fn apply(&self, batch: WriteBatch) -> Result<(), StorageError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut records = self.records.write();
        batch.validate(|id| records.get(id).map(|record| &record.grant))?;

        let count = batch.len();
        for mutation in batch.into_mutations() {
            match mutation {
                Mutation::Insert(record) => {
                    records.insert(record.key_id().clone(), record);
                }
                Mutation::ReplaceGrant { grant, .. } => {
                    if let Some(record) = records.get_mut(&grant.key_id) {
                        record.grant = grant;
                    }
                }
                Mutation::Remove(key_id) => {
                    records.remove(&key_id);
                }
            }
        }

        debug!(mutations = count, "Applied write batch");
        Ok(())
    }

    fn remove(&self, key_id: &KeyId) -> Result<Option<KeyRecord>, StorageError> {
        Ok(self.records.write().remove(key_id))
    }

    fn remove_where(
        &self,
        predicate: &dyn Fn(&KeyRecord) -> bool,
    ) -> Result<Vec<KeyId>, StorageError> {
        let mut records = self.records.write();
        let mut removed = Vec::new();
        records.retain(|id, record| {
            if predicate(record) {
                removed.push(id.clone());
                false
            } else {
                true
            }
        });
        Ok(removed)
    }

    fn key_ids(&self) -> Result<Vec<KeyId>, StorageError> {
        Ok(self.records.read().keys().cloned().collect())
    }

    fn len(&self) -> Result<usize, StorageError> {
        Ok(self.records.read().len())
    }

    fn contains(&self, key_id: &KeyId) -> Result<bool, StorageError> {
        Ok(self.records.read().contains_key(key_id))
    }
}
