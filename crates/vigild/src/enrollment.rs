use crate::directory::IdentityDirectory;
use crate::engine::EngineHandle;
use crate::error::{blocking, WorkflowError};
use std::sync::Arc;
use vigil_core::{single_face, FaceEncoding, IdentityId};
use vigil_store::EncodingStore;

/// Registers or replaces the face encoding of a known identity.
#[derive(Clone)]
pub struct EnrollmentWorkflow {
    engine: EngineHandle,
    store: Arc<dyn EncodingStore>,
    directory: Arc<dyn IdentityDirectory>,
}

impl EnrollmentWorkflow {
    pub fn new(
        engine: EngineHandle,
        store: Arc<dyn EncodingStore>,
        directory: Arc<dyn IdentityDirectory>,
    ) -> Self {
        Self { engine, store, directory }
    }

    /// Extract exactly one face from `image` and store it for `identity`.
    ///
    /// The store is written only after extraction has succeeded, so every
    /// failure (and a future dropped mid-extraction) leaves it untouched. The
    /// SQLite write itself runs on the blocking pool.
    pub async fn enroll(
        &self,
        identity: &IdentityId,
        image: Vec<u8>,
    ) -> Result<FaceEncoding, WorkflowError> {
        if image.is_empty() {
            return Err(WorkflowError::MissingImage);
        }
        if !self.directory.contains(identity) {
            tracing::warn!(identity = %identity, "enrollment for unknown identity rejected");
            return Err(WorkflowError::UnknownIdentity(identity.clone()));
        }

        let faces = self.engine.extract(image).await?;
        let embedding = single_face(faces)?;

        // Once extraction has succeeded the write runs to completion, even if
        // the caller goes away.
        let store = Arc::clone(&self.store);
        let id = identity.clone();
        let (encoding, replaced) = blocking(move || {
            let replaced = store.get(&id)?.is_some();
            Ok((store.upsert(&id, embedding)?, replaced))
        })
        .await?;
        tracing::info!(
            identity = %identity,
            dim = encoding.embedding.dim(),
            replaced,
            "face enrolled"
        );
        Ok(encoding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{OpenDirectory, ResidentDirectory};
    use crate::testing::{axis, engine, png_with_key, ScriptedExtractor};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use vigil_core::{DetectionError, Embedding, MalformedVector};
    use vigil_store::{MemoryStore, Snapshot, StoreError};

    const DIM: usize = 4;

    fn workflow(extractor: ScriptedExtractor) -> (EnrollmentWorkflow, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new(DIM));
        let wf = EnrollmentWorkflow::new(
            engine(extractor, Duration::from_secs(5)),
            store.clone(),
            Arc::new(OpenDirectory),
        );
        (wf, store)
    }

    #[tokio::test]
    async fn test_enroll_stores_single_face() {
        let (wf, store) = workflow(ScriptedExtractor::new().face(1, axis(DIM, 0, 1.0)));
        let id = IdentityId::from(42);
        let encoding = wf.enroll(&id, png_with_key(1)).await.unwrap();
        assert_eq!(encoding.identity, id);
        assert_eq!(store.get(&id).unwrap().unwrap().embedding.values, axis(DIM, 0, 1.0));
    }

    #[tokio::test]
    async fn test_reenroll_replaces_previous_vector() {
        let extractor = ScriptedExtractor::new()
            .face(1, axis(DIM, 0, 1.0))
            .face(2, axis(DIM, 1, 1.0));
        let (wf, store) = workflow(extractor);
        let id = IdentityId::from(42);
        wf.enroll(&id, png_with_key(1)).await.unwrap();
        wf.enroll(&id, png_with_key(2)).await.unwrap();

        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.get(&id).unwrap().unwrap().embedding.values, axis(DIM, 1, 1.0));
    }

    #[tokio::test]
    async fn test_zero_faces_leaves_store_unchanged() {
        let (wf, store) = workflow(ScriptedExtractor::new().face(1, axis(DIM, 0, 1.0)));
        let id = IdentityId::from(42);
        wf.enroll(&id, png_with_key(1)).await.unwrap();

        let err = wf.enroll(&id, png_with_key(9)).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Detection(DetectionError::NoFaceDetected)));
        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.get(&id).unwrap().unwrap().embedding.values, axis(DIM, 0, 1.0));
    }

    #[tokio::test]
    async fn test_multiple_faces_rejected() {
        let extractor = ScriptedExtractor::new()
            .face(5, axis(DIM, 0, 1.0))
            .face(5, axis(DIM, 1, 1.0));
        let (wf, store) = workflow(extractor);
        let err = wf.enroll(&IdentityId::from(1), png_with_key(5)).await.unwrap_err();
        assert_eq!(err.reason(), "multiple_faces_detected");
        assert!(store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_unknown_identity_rejected_before_extraction() {
        let directory = ResidentDirectory::from_toml("[[resident]]\nid = 42\nname = \"Ada\"\n").unwrap();
        let store = Arc::new(MemoryStore::new(DIM));
        let wf = EnrollmentWorkflow::new(
            engine(ScriptedExtractor::new().face(1, axis(DIM, 0, 1.0)), Duration::from_secs(5)),
            store.clone(),
            Arc::new(directory),
        );

        let err = wf.enroll(&IdentityId::from(7), png_with_key(1)).await.unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownIdentity(ref id) if id.as_str() == "7"));
        wf.enroll(&IdentityId::from(42), png_with_key(1)).await.unwrap();
        assert_eq!(store.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_wrong_dimension_is_malformed() {
        let (wf, store) = workflow(ScriptedExtractor::new().face(1, vec![1.0; DIM + 1]));
        let err = wf.enroll(&IdentityId::from(1), png_with_key(1)).await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Malformed(MalformedVector::WrongDimension { expected: 4, actual: 5 })
        ));
        assert!(store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_empty_image_is_missing() {
        let (wf, _store) = workflow(ScriptedExtractor::new());
        let err = wf.enroll(&IdentityId::from(1), Vec::new()).await.unwrap_err();
        assert_eq!(err.reason(), "missing_image");
    }

    #[tokio::test]
    async fn test_timeout_never_writes() {
        let slow = ScriptedExtractor::new()
            .face(1, axis(DIM, 0, 1.0))
            .delay(Duration::from_millis(300));
        let store = Arc::new(MemoryStore::new(DIM));
        let wf = EnrollmentWorkflow::new(
            engine(slow, Duration::from_millis(30)),
            store.clone(),
            Arc::new(OpenDirectory),
        );

        let err = wf.enroll(&IdentityId::from(1), png_with_key(1)).await.unwrap_err();
        assert_eq!(err.reason(), "timeout");
        // Let the worker finish its late extraction.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(store.is_empty().unwrap());
    }

    /// Store whose upsert blocks its thread for a while.
    struct SlowStore {
        inner: MemoryStore,
        started: AtomicBool,
        done: AtomicBool,
    }

    impl EncodingStore for SlowStore {
        fn dim(&self) -> usize {
            self.inner.dim()
        }

        fn upsert(&self, identity: &IdentityId, embedding: Embedding) -> Result<FaceEncoding, StoreError> {
            self.started.store(true, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(300));
            let out = self.inner.upsert(identity, embedding);
            self.done.store(true, Ordering::SeqCst);
            out
        }

        fn snapshot(&self) -> Result<Snapshot, StoreError> {
            self.inner.snapshot()
        }

        fn remove(&self, identity: &IdentityId) -> Result<bool, StoreError> {
            self.inner.remove(identity)
        }

        fn get(&self, identity: &IdentityId) -> Result<Option<Arc<FaceEncoding>>, StoreError> {
            self.inner.get(identity)
        }

        fn len(&self) -> Result<usize, StoreError> {
            self.inner.len()
        }
    }

    #[tokio::test]
    async fn test_store_write_does_not_block_runtime() {
        // Single-threaded runtime: an inline blocking write would starve this task.
        let store = Arc::new(SlowStore {
            inner: MemoryStore::new(DIM),
            started: AtomicBool::new(false),
            done: AtomicBool::new(false),
        });
        let wf = EnrollmentWorkflow::new(
            engine(ScriptedExtractor::new().face(1, axis(DIM, 0, 1.0)), Duration::from_secs(5)),
            store.clone(),
            Arc::new(OpenDirectory),
        );
        let task = tokio::spawn(async move { wf.enroll(&IdentityId::from(1), png_with_key(1)).await });

        while !store.started.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert!(!store.done.load(Ordering::SeqCst), "runtime stalled during the store write");

        task.await.unwrap().unwrap();
        assert_eq!(store.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_enrollments_all_land() {
        let mut extractor = ScriptedExtractor::new();
        for key in 0..16u8 {
            extractor = extractor.face(key, axis(DIM, (key as usize) % DIM, f32::from(key) + 1.0));
        }
        let (wf, store) = workflow(extractor);

        let mut tasks = Vec::new();
        for key in 0..16u8 {
            let wf = wf.clone();
            tasks.push(tokio::spawn(async move {
                wf.enroll(&IdentityId::from(u64::from(key)), png_with_key(key)).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.len().unwrap(), 16);
        for key in 0..16u8 {
            let enc = store.get(&IdentityId::from(u64::from(key))).unwrap().unwrap();
            assert_eq!(enc.embedding.values, axis(DIM, (key as usize) % DIM, f32::from(key) + 1.0));
        }
    }
}
