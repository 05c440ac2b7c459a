//! Key record store trait and write batches.

use std::collections::HashMap;

use crate::error::StorageError;
use crate::record::{GrantMetadata, KeyId, KeyRecord};

/// A single change inside a [`WriteBatch`].
#[derive(Debug, Clone)]
pub enum Mutation {
    /// Adds a new record. The id must not exist.
    Insert(KeyRecord),
    /// Replaces the grant of an existing record, provided the stored grant
    /// still equals `expected`.
    ReplaceGrant {
        /// Grant the caller last read.
        expected: GrantMetadata,
        /// Replacement grant.
        grant: GrantMetadata,
    },
    /// Deletes an existing record.
    Remove(KeyId),
}

impl Mutation {
    /// Id the mutation targets.
    pub fn key_id(&self) -> &KeyId {
        match self {
            Self::Insert(record) => record.key_id(),
            Self::ReplaceGrant { grant, .. } => &grant.key_id,
            Self::Remove(id) => id,
        }
    }
}

/// Ordered list of mutations applied all-or-nothing.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    mutations: Vec<Mutation>,
}

impl WriteBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an insert.
    pub fn insert(mut self, record: KeyRecord) -> Self {
        self.mutations.push(Mutation::Insert(record));
        self
    }

    /// Appends a grant replacement that only applies while the stored grant
    /// is still `expected`.
    pub fn replace_grant(mut self, expected: GrantMetadata, grant: GrantMetadata) -> Self {
        self.mutations
            .push(Mutation::ReplaceGrant { expected, grant });
        self
    }

    /// Appends a removal.
    pub fn remove(mut self, key_id: KeyId) -> Self {
        self.mutations.push(Mutation::Remove(key_id));
        self
    }

    /// Consumes the batch.
    pub fn into_mutations(self) -> Vec<Mutation> {
        self.mutations
    }

    /// Number of mutations.
    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    /// True if the batch has no mutations.
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Checks every mutation against the current state, in order.
    ///
    /// `current` returns the stored grant of an id before the batch runs.
    /// Earlier mutations in the batch are taken into account, so inserting
    /// and then replacing the grant of the same id is valid.
    pub fn validate<'s>(
        &self,
        current: impl Fn(&KeyId) -> Option<&'s GrantMetadata>,
    ) -> Result<(), StorageError> {
        let mut overlay: HashMap<&KeyId, Option<&GrantMetadata>> = HashMap::new();

        for mutation in &self.mutations {
            let id = mutation.key_id();
            let stored = match overlay.get(id) {
                Some(grant) => *grant,
                None => current(id),
            };

            let after = match mutation {
                Mutation::Insert(record) => {
                    if stored.is_some() {
                        return Err(StorageError::AlreadyExists(id.to_string()));
                    }
                    if record.grant.key_id != record.envelope.key_id {
                        return Err(StorageError::InvalidBatch(format!(
                            "grant {} does not match envelope {}",
                            record.grant.key_id, record.envelope.key_id
                        )));
                    }
                    Some(&record.grant)
                }
                Mutation::ReplaceGrant { expected, grant } => {
                    let stored = stored.ok_or_else(|| StorageError::NotFound(id.to_string()))?;
                    if stored != expected {
                        return Err(StorageError::Conflict(id.to_string()));
                    }
                    Some(grant)
                }
                Mutation::Remove(_) => {
                    if stored.is_none() {
                        return Err(StorageError::NotFound(id.to_string()));
                    }
                    None
                }
            };

            overlay.insert(id, after);
        }

        Ok(())
    }
}

/// Storage for key records.
///
/// Implementations must make [`apply`](Self::apply) atomic: either every
/// mutation of the batch is visible afterwards or none is, and no reader
/// observes a partially applied batch.
pub trait KeyRecordStore: Send + Sync {
    /// Get a record by id.
    fn get(&self, key_id: &KeyId) -> Result<Option<KeyRecord>, StorageError>;

    /// Apply a batch atomically.
    fn apply(&self, batch: WriteBatch) -> Result<(), StorageError>;

    /// Remove a record, returning it if it existed.
    fn remove(&self, key_id: &KeyId) -> Result<Option<KeyRecord>, StorageError>;

    /// Remove every record matching `predicate` in one atomic step.
    fn remove_where(
        &self,
        predicate: &dyn Fn(&KeyRecord) -> bool,
    ) -> Result<Vec<KeyId>, StorageError>;

    /// All stored ids.
    fn key_ids(&self) -> Result<Vec<KeyId>, StorageError>;

    /// Number of stored records.
    fn len(&self) -> Result<usize, StorageError>;

    /// Check if a record exists.
    fn contains(&self, key_id: &KeyId) -> Result<bool, StorageError> {
        Ok(self.get(key_id)?.is_some())
    }

    /// True if the store is empty.
    fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}
