//! Embedding extractor interface.
//!
//! An extractor turns one decoded still image into one embedding per detected
//! face. Backends may be slow and nondeterministic across calls.

use crate::decode::Frame;
use crate::types::Embedding;
use thiserror::Error;

/// Reasons a capture cannot yield exactly one usable face.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectionError {
    #[error("no face detected")]
    NoFaceDetected,
    #[error("{count} faces detected, expected exactly one")]
    MultipleFacesDetected { count: usize },
    #[error("image decode failed: {0}")]
    DecodeFailed(String),
    #[error("face extraction timed out")]
    Timeout,
}

#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error(transparent)]
    Detection(#[from] DetectionError),
    #[error("inference failed: {0}")]
    Inference(String),
}

/// Image → embeddings oracle.
///
/// Returns a non-empty list (one embedding per detected face) or
/// `DetectionError::NoFaceDetected`. Takes `&mut self` because inference
/// sessions are not shareable across threads.
pub trait EmbeddingExtractor: Send {
    fn extract(&mut self, frame: &Frame) -> Result<Vec<Embedding>, ExtractorError>;

    /// Backend name for status output.
    fn name(&self) -> &str;
}

/// Require exactly one face, as both enrollment and recognition do.
pub fn single_face(mut embeddings: Vec<Embedding>) -> Result<Embedding, DetectionError> {
    match embeddings.len() {
        0 => Err(DetectionError::NoFaceDetected),
        1 => Ok(embeddings.remove(0)),
        count => Err(DetectionError::MultipleFacesDetected { count }),
    }
}
