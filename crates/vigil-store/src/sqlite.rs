//! SQLite-backed encoding store.
//!
//! Write-through: every upsert/remove hits SQLite first, then the in-memory
//! cache that serves snapshots. Recognition never touches the database.

use crate::memory::MemoryStore;
use crate::record::EncodingRecord;
use crate::{EncodingStore, Snapshot, StoreError};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use vigil_core::{Embedding, FaceEncoding, IdentityId};

const WRITE_STRIPES: usize = 16;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS face_encodings (
    identity_id   TEXT PRIMARY KEY NOT NULL,
    vector        TEXT NOT NULL,
    dim           INTEGER NOT NULL,
    model_version TEXT,
    created_at    TEXT NOT NULL
);";

pub struct SqliteStore {
    conn: Mutex<Connection>,
    cache: MemoryStore,
    /// Same identity → same stripe, so the SQLite write and the cache swap for
    /// one identity never interleave with another writer of that identity.
    stripes: [Mutex<()>; WRITE_STRIPES],
}

impl SqliteStore {
    /// Open (or create) the database and load every encoding into memory.
    pub fn open(path: &Path, dim: usize) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        let store = Self::with_connection(conn, dim)?;
        tracing::info!(
            path = %path.display(),
            encodings = store.cache.len()?,
            dim,
            "encoding store opened"
        );
        Ok(store)
    }

    /// Private in-memory database, for tests and ephemeral deployments.
    pub fn open_in_memory(dim: usize) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, dim)
    }

    fn with_connection(conn: Connection, dim: usize) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        let cache = MemoryStore::new(dim);
        load_all(&conn, &cache, dim)?;
        Ok(Self {
            conn: Mutex::new(conn),
            cache,
            stripes: std::array::from_fn(|_| Mutex::new(())),
        })
    }

    fn stripe(&self, identity: &IdentityId) -> Result<MutexGuard<'_, ()>, StoreError> {
        let mut hasher = DefaultHasher::new();
        identity.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % WRITE_STRIPES;
        self.stripes[idx].lock().map_err(|_| StoreError::Poisoned)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

/// Load every readable row. A row that cannot be decoded is logged and
/// skipped; its resident must re-enroll.
fn load_all(conn: &Connection, cache: &MemoryStore, dim: usize) -> Result<(), StoreError> {
    let mut stmt =
        conn.prepare("SELECT identity_id, vector, model_version, created_at FROM face_encodings")?;
    let mut rows = stmt.query([])?;

    let mut skipped = 0usize;
    while let Some(row) = rows.next()? {
        let identity_id: String = row.get(0)?;
        match decode_row(row, identity_id.clone()).map(|record| record.into_encoding(dim)) {
            Ok(Ok(encoding)) => cache.put(encoding)?,
            // A dimension change means the extractor model changed; old
            // vectors cannot be compared.
            Ok(Err(e)) => {
                skipped += 1;
                tracing::warn!(identity = %identity_id, error = %e, "skipping stored encoding");
            }
            Err(e) => {
                skipped += 1;
                tracing::warn!(identity = %identity_id, error = %e, "skipping undecodable encoding row");
            }
        }
    }
    if skipped > 0 {
        tracing::warn!(skipped, "some stored encodings were not loaded");
    }
    Ok(())
}

fn decode_row(row: &rusqlite::Row<'_>, identity_id: String) -> Result<EncodingRecord, StoreError> {
    let vector: String = row.get(1)?;
    let model_version: Option<String> = row.get(2)?;
    let created_at: DateTime<Utc> = row.get(3)?;
    Ok(EncodingRecord::from_columns(identity_id, &vector, model_version, created_at)?)
}

impl EncodingStore for SqliteStore {
    fn dim(&self) -> usize {
        self.cache.dim()
    }

    fn upsert(&self, identity: &IdentityId, embedding: Embedding) -> Result<FaceEncoding, StoreError> {
        embedding.validate(self.dim())?;
        let encoding = FaceEncoding::new(identity.clone(), embedding);
        let record = EncodingRecord::from(&encoding);
        let vector = record.vector_json()?;

        let _guard = self.stripe(identity)?;
        self.conn()?.execute(
            "INSERT INTO face_encodings (identity_id, vector, dim, model_version, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(identity_id) DO UPDATE SET
                vector = excluded.vector,
                dim = excluded.dim,
                model_version = excluded.model_version,
                created_at = excluded.created_at",
            params![
                record.identity_id,
                vector,
                record.vector.len() as i64,
                record.model_version,
                record.created_at,
            ],
        )?;
        self.cache.put(encoding.clone())?;
        tracing::debug!(identity = %identity, "encoding persisted");
        Ok(encoding)
    }

    fn snapshot(&self) -> Result<Snapshot, StoreError> {
        self.cache.snapshot()
    }

    fn remove(&self, identity: &IdentityId) -> Result<bool, StoreError> {
        let _guard = self.stripe(identity)?;
        let deleted = self.conn()?.execute(
            "DELETE FROM face_encodings WHERE identity_id = ?1",
            params![identity.as_str()],
        )?;
        self.cache.remove(identity)?;
        Ok(deleted > 0)
    }

    fn get(&self, identity: &IdentityId) -> Result<Option<Arc<FaceEncoding>>, StoreError> {
        self.cache.get(identity)
    }

    fn len(&self) -> Result<usize, StoreError> {
        self.cache.len()
    }
}
