use crate::audit::{AuditSink, SecurityEvent};
use crate::directory::{IdentityDirectory, Resident};
use crate::engine::EngineHandle;
use crate::error::{blocking, WorkflowError};
use std::sync::Arc;
use std::time::Instant;
use vigil_core::{single_face, EuclideanMatcher, MatchResult, Matcher};
use vigil_store::EncodingStore;

/// A match decision plus what the directory knows about the matched identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub result: MatchResult,
    pub resident: Option<Resident>,
}

/// Identifies the person in a probe image against the enrolled gallery.
#[derive(Clone)]
pub struct RecognitionWorkflow {
    engine: EngineHandle,
    store: Arc<dyn EncodingStore>,
    directory: Arc<dyn IdentityDirectory>,
    audit: Arc<dyn AuditSink>,
    matcher: EuclideanMatcher,
    threshold: f32,
}

impl RecognitionWorkflow {
    pub fn new(
        engine: EngineHandle,
        store: Arc<dyn EncodingStore>,
        directory: Arc<dyn IdentityDirectory>,
        audit: Arc<dyn AuditSink>,
        matcher: EuclideanMatcher,
        threshold: f32,
    ) -> Self {
        Self { engine, store, directory, audit, matcher, threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn margin(&self) -> f32 {
        self.matcher.margin
    }

    /// Recognize the single face in `image`. Exactly one audit event is
    /// recorded per call, whether it matches, misses, or fails.
    pub async fn recognize(&self, image: Vec<u8>) -> Result<Recognition, WorkflowError> {
        let started = Instant::now();
        match self.identify(image).await {
            Ok(recognition) => {
                self.audit.record(&SecurityEvent::recognition(&recognition.result));
                tracing::info!(
                    outcome = recognition.result.outcome().as_str(),
                    identity = recognition.result.identity().map(|id| id.as_str()),
                    distance = recognition.result.distance(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "recognition finished"
                );
                Ok(recognition)
            }
            Err(e) => Err(self.reject(e)),
        }
    }

    /// Audit a recognition attempt that failed, including failures raised
    /// before the workflow ran (bad request body, undecodable base64).
    pub fn reject(&self, err: WorkflowError) -> WorkflowError {
        self.audit.record(&SecurityEvent::recognition_failed(err.reason()));
        if err.is_internal() {
            tracing::error!(error = %err, "recognition failed");
        } else {
            tracing::info!(reason = err.reason(), "recognition rejected");
        }
        err
    }

    async fn identify(&self, image: Vec<u8>) -> Result<Recognition, WorkflowError> {
        if image.is_empty() {
            return Err(WorkflowError::MissingImage);
        }
        let faces = self.engine.extract(image).await?;
        let probe = single_face(faces)?;
        probe.validate(self.store.dim())?;

        let store = Arc::clone(&self.store);
        let gallery = blocking(move || store.snapshot()).await?;
        let result = self.matcher.recognize(&probe, &gallery, self.threshold);
        tracing::debug!(gallery = gallery.len(), "probe compared against gallery");

        let resident = result.identity().and_then(|id| self.directory.resident(id));
        Ok(Recognition { result, resident })
    }
}
