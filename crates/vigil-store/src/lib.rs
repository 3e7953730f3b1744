//! vigil-store — Encoding repository.
//!
//! Holds at most one [`FaceEncoding`] per identity. Re-enrollment replaces the
//! whole encoding. Snapshots are point-in-time lists of immutable `Arc`s, so a
//! reader never sees a half-written vector.

pub mod memory;
mod record;
pub mod sqlite;

use std::sync::Arc;
use thiserror::Error;
use vigil_core::{Embedding, FaceEncoding, IdentityId, MalformedVector};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Point-in-time view of every enrolled encoding, ordered by identity.
pub type Snapshot = Vec<Arc<FaceEncoding>>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("malformed vector: {0}")]
    Malformed(#[from] MalformedVector),
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("record codec: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("store lock poisoned")]
    Poisoned,
}

impl StoreError {
    /// Everything but a malformed vector means the store itself is unavailable.
    pub fn is_internal(&self) -> bool {
        !matches!(self, StoreError::Malformed(_))
    }
}

/// Persistence boundary for enrolled face encodings.
pub trait EncodingStore: Send + Sync {
    /// Dimension every stored vector must have.
    fn dim(&self) -> usize;

    /// Insert or wholly replace the encoding for `identity`.
    fn upsert(&self, identity: &IdentityId, embedding: Embedding) -> Result<FaceEncoding, StoreError>;

    fn snapshot(&self) -> Result<Snapshot, StoreError>;

    /// Returns whether an encoding was present.
    fn remove(&self, identity: &IdentityId) -> Result<bool, StoreError>;

    fn get(&self, identity: &IdentityId) -> Result<Option<Arc<FaceEncoding>>, StoreError>;

    fn len(&self) -> Result<usize, StoreError>;

    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}
