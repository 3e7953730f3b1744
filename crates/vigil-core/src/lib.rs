//! vigil-core — Face identification engine.
//!
//! Embedding types, the Euclidean matching policy, the extractor interface and
//! the image decode step. With the `onnx` feature, SCRFD detection and ArcFace
//! recognition run via ONNX Runtime for CPU inference.

#[cfg(feature = "onnx")]
pub mod alignment;
pub mod decode;
#[cfg(feature = "onnx")]
pub mod detector;
pub mod extractor;
pub mod matcher;
#[cfg(feature = "onnx")]
pub mod onnx;
#[cfg(feature = "onnx")]
pub mod recognizer;
pub mod types;

pub use decode::{decode_base64, decode_image, DecodeError, Frame};
pub use extractor::{single_face, DetectionError, EmbeddingExtractor, ExtractorError};
pub use matcher::{EuclideanMatcher, Matcher, DEFAULT_AMBIGUITY_MARGIN};
#[cfg(feature = "onnx")]
pub use onnx::OnnxExtractor;
pub use types::{Embedding, FaceEncoding, IdentityId, MalformedVector, MatchOutcome, MatchResult};

/// Default model directory: `$XDG_DATA_HOME/vigil/models`.
pub fn default_model_dir() -> std::path::PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            std::path::PathBuf::from(home).join(".local/share")
        })
        .join("vigil/models")
}
