use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Opaque key of a resident, owned by the identity directory.
///
/// Integer user ids are carried as their decimal string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(String);

impl IdentityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IdentityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for IdentityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for IdentityId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// A vector that violates the embedding invariants.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MalformedVector {
    #[error("embedding is empty")]
    Empty,
    #[error("expected {expected}-dim embedding, got {actual}")]
    WrongDimension { expected: usize, actual: usize },
    #[error("embedding value at index {index} is not finite")]
    NonFinite { index: usize },
}

/// Face embedding vector (512-dimensional for ArcFace, 128 for dlib-style extractors).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values, model_version: None }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Check the length is exactly `dim` and every value is finite.
    pub fn validate(&self, dim: usize) -> Result<(), MalformedVector> {
        if self.values.is_empty() {
            return Err(MalformedVector::Empty);
        }
        if self.values.len() != dim {
            return Err(MalformedVector::WrongDimension {
                expected: dim,
                actual: self.values.len(),
            });
        }
        match self.values.iter().position(|v| !v.is_finite()) {
            Some(index) => Err(MalformedVector::NonFinite { index }),
            None => Ok(()),
        }
    }

    /// Euclidean (L2) distance between two embeddings.
    ///
    /// Symmetric, and zero only for identical vectors. Always processes every
    /// dimension. Callers must have validated both sides to the same length.
    ///
    /// Accumulates in f64 and saturates at `f32::MAX`, so finite inputs always
    /// give a finite distance.
    pub fn distance(&self, other: &Embedding) -> f32 {
        let sum: f64 = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(&a, &b)| {
                let d = f64::from(a) - f64::from(b);
                d * d
            })
            .sum();
        sum.sqrt().min(f64::from(f32::MAX)) as f32
    }
}

/// The single enrolled embedding of one identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceEncoding {
    pub identity: IdentityId,
    pub embedding: Embedding,
    pub created_at: DateTime<Utc>,
}

impl FaceEncoding {
    /// Stamp a fresh encoding with the current time.
    pub fn new(identity: IdentityId, embedding: Embedding) -> Self {
        Self {
            identity,
            embedding,
            created_at: Utc::now(),
        }
    }
}

impl AsRef<FaceEncoding> for FaceEncoding {
    fn as_ref(&self) -> &FaceEncoding {
        self
    }
}

/// Outcome of matching a probe embedding against the enrolled gallery.
///
/// `Unknown` is a valid result, not a failure. It keeps the best distance seen
/// so non-matches can still be audited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum MatchResult {
    Matched { identity: IdentityId, distance: f32 },
    Unknown { best_distance: Option<f32> },
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchResult::Matched { .. })
    }

    /// Distance of the best candidate, if there was any candidate at all.
    pub fn distance(&self) -> Option<f32> {
        match self {
            MatchResult::Matched { distance, .. } => Some(*distance),
            MatchResult::Unknown { best_distance } => *best_distance,
        }
    }

    pub fn identity(&self) -> Option<&IdentityId> {
        match self {
            MatchResult::Matched { identity, .. } => Some(identity),
            MatchResult::Unknown { .. } => None,
        }
    }

    pub fn outcome(&self) -> MatchOutcome {
        if self.is_match() {
            MatchOutcome::Matched
        } else {
            MatchOutcome::Unknown
        }
    }
}

/// Audit vocabulary for a recognition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOutcome {
    Matched,
    Unknown,
    Error,
}

impl MatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchOutcome::Matched => "matched",
            MatchOutcome::Unknown => "unknown",
            MatchOutcome::Error => "error",
        }
    }
}
