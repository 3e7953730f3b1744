use crate::engine::EngineError;
use thiserror::Error;
use vigil_core::{DecodeError, DetectionError, ExtractorError, IdentityId, MalformedVector};
use vigil_store::StoreError;

/// Request-level failure of an enrollment or recognition.
///
/// `Unknown` matches are not errors and never appear here.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("no image provided")]
    MissingImage,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("identity {0} is not in the resident directory")]
    UnknownIdentity(IdentityId),
    #[error(transparent)]
    Decode(DecodeError),
    #[error(transparent)]
    Detection(#[from] DetectionError),
    #[error("malformed vector: {0}")]
    Malformed(#[from] MalformedVector),
    #[error("extractor failure: {0}")]
    Extractor(String),
    #[error("store failure: {0}")]
    Store(StoreError),
    #[error("extractor workers are not running")]
    EngineUnavailable,
    #[error("blocking store task failed: {0}")]
    StoreTask(String),
}

impl WorkflowError {
    /// Machine-readable reason for the response body and audit record.
    pub fn reason(&self) -> &'static str {
        match self {
            WorkflowError::MissingImage => "missing_image",
            WorkflowError::InvalidRequest(_) => "invalid_request",
            WorkflowError::UnknownIdentity(_) => "unknown_identity",
            WorkflowError::Decode(_) | WorkflowError::Detection(DetectionError::DecodeFailed(_)) => {
                "decode_failed"
            }
            WorkflowError::Detection(DetectionError::NoFaceDetected) => "no_face_detected",
            WorkflowError::Detection(DetectionError::MultipleFacesDetected { .. }) => {
                "multiple_faces_detected"
            }
            WorkflowError::Detection(DetectionError::Timeout) => "timeout",
            WorkflowError::Malformed(_) => "malformed_vector",
            WorkflowError::Extractor(_)
            | WorkflowError::Store(_)
            | WorkflowError::EngineUnavailable
            | WorkflowError::StoreTask(_) => "internal_error",
        }
    }

    /// Failures that need operator attention rather than a new capture.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            WorkflowError::Extractor(_)
                | WorkflowError::Store(_)
                | WorkflowError::EngineUnavailable
                | WorkflowError::StoreTask(_)
        )
    }
}

impl From<DecodeError> for WorkflowError {
    fn from(e: DecodeError) -> Self {
        match e {
            DecodeError::Empty => WorkflowError::MissingImage,
            other => WorkflowError::Decode(other),
        }
    }
}

impl From<EngineError> for WorkflowError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Decode(d) => d.into(),
            EngineError::Extractor(ExtractorError::Detection(d)) => WorkflowError::Detection(d),
            EngineError::Extractor(ExtractorError::Inference(msg)) => WorkflowError::Extractor(msg),
            EngineError::Timeout(_) => WorkflowError::Detection(DetectionError::Timeout),
            EngineError::ChannelClosed => WorkflowError::EngineUnavailable,
        }
    }
}

impl From<StoreError> for WorkflowError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Malformed(m) => WorkflowError::Malformed(m),
            other => WorkflowError::Store(other),
        }
    }
}

impl From<tokio::task::JoinError> for WorkflowError {
    fn from(e: tokio::task::JoinError) -> Self {
        WorkflowError::StoreTask(e.to_string())
    }
}

/// Run a synchronous store call on the blocking pool.
///
/// SQLite writes fsync; they must not stall the runtime's worker threads.
pub async fn blocking<T, F>(f: F) -> Result<T, WorkflowError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}
