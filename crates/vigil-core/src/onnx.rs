//! SCRFD + ArcFace extractor backend.

use crate::alignment::align_face;
use crate::decode::Frame;
use crate::detector::{DetectorError, FaceDetector};
use crate::extractor::{DetectionError, EmbeddingExtractor, ExtractorError};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::Embedding;
use std::path::Path;
use thiserror::Error;

pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum OnnxLoadError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Detect every face, align it, and embed it.
pub struct OnnxExtractor {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxExtractor {
    /// Load both models from `model_dir`. Fails fast if either is missing.
    pub fn load(model_dir: &Path) -> Result<Self, OnnxLoadError> {
        let det = model_dir.join(SCRFD_MODEL_FILE);
        let rec = model_dir.join(ARCFACE_MODEL_FILE);
        Ok(Self {
            detector: FaceDetector::load(&det.to_string_lossy())?,
            recognizer: FaceRecognizer::load(&rec.to_string_lossy())?,
        })
    }
}

impl EmbeddingExtractor for OnnxExtractor {
    fn extract(&mut self, frame: &Frame) -> Result<Vec<Embedding>, ExtractorError> {
        let faces = self
            .detector
            .detect(frame)
            .map_err(|e| ExtractorError::Inference(e.to_string()))?;

        if faces.is_empty() {
            return Err(DetectionError::NoFaceDetected.into());
        }
        tracing::debug!(
            faces = faces.len(),
            best_score = faces[0].score,
            "faces detected"
        );

        faces
            .iter()
            .map(|face| {
                let aligned = align_face(frame, &face.landmarks);
                self.recognizer
                    .embed(&aligned)
                    .map_err(|e| ExtractorError::Inference(e.to_string()))
            })
            .collect()
    }

    fn name(&self) -> &str {
        "scrfd+arcface"
    }
}
