use crate::{EncodingStore, Snapshot, StoreError};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use vigil_core::{Embedding, FaceEncoding, IdentityId};

/// In-memory encoding store.
///
/// Each identity maps to an immutable `Arc<FaceEncoding>`. Writers build the new
/// value outside the lock and only swap the pointer inside it, so the write lock
/// is held for O(log n) regardless of vector size.
pub struct MemoryStore {
    dim: usize,
    entries: RwLock<BTreeMap<IdentityId, Arc<FaceEncoding>>>,
}

impl MemoryStore {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Swap in an already-validated encoding.
    pub(crate) fn put(&self, encoding: FaceEncoding) -> Result<(), StoreError> {
        let value = Arc::new(encoding);
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        entries.insert(value.identity.clone(), value);
        Ok(())
    }
}

impl EncodingStore for MemoryStore {
    fn dim(&self) -> usize {
        self.dim
    }

    fn upsert(&self, identity: &IdentityId, embedding: Embedding) -> Result<FaceEncoding, StoreError> {
        embedding.validate(self.dim)?;
        let encoding = FaceEncoding::new(identity.clone(), embedding);
        self.put(encoding.clone())?;
        Ok(encoding)
    }

    fn snapshot(&self) -> Result<Snapshot, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.values().cloned().collect())
    }

    fn remove(&self, identity: &IdentityId) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.remove(identity).is_some())
    }

    fn get(&self, identity: &IdentityId) -> Result<Option<Arc<FaceEncoding>>, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(identity).cloned())
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.entries.read().map_err(|_| StoreError::Poisoned)?.len())
    }
}
