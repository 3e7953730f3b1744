//! Matching engine: decides which enrolled identity, if any, a probe belongs to.

use crate::types::{Embedding, FaceEncoding, MatchResult};

/// Minimum gap between the best and second-best distance for a confident match.
pub const DEFAULT_AMBIGUITY_MARGIN: f32 = 0.02;

/// Strategy for comparing a probe embedding against a gallery of enrolled faces.
pub trait Matcher {
    fn recognize<E: AsRef<FaceEncoding>>(
        &self,
        probe: &Embedding,
        candidates: &[E],
        threshold: f32,
    ) -> MatchResult;
}

/// Euclidean nearest-neighbour matcher with margin-based ambiguity rejection.
///
/// Decision policy, with `d1` the best and `d2` the second-best distance:
/// - no candidates: `Unknown(None)`
/// - `d1 > threshold`: `Unknown(d1)`. A probe exactly at the threshold matches.
/// - `d2 - d1 < margin`: `Unknown(d1)`. Two near-equidistant identities are a
///   false reject, never a guess.
/// - otherwise `Matched(best, d1)`
///
/// Always iterates ALL gallery entries so timing does not leak match position.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMatcher {
    pub margin: f32,
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self { margin: DEFAULT_AMBIGUITY_MARGIN }
    }
}

impl EuclideanMatcher {
    pub fn new(margin: f32) -> Self {
        Self { margin }
    }
}

impl Matcher for EuclideanMatcher {
    fn recognize<E: AsRef<FaceEncoding>>(
        &self,
        probe: &Embedding,
        candidates: &[E],
        threshold: f32,
    ) -> MatchResult {
        let mut best: Option<(usize, f32)> = None;
        let mut second = f32::INFINITY;

        for (i, candidate) in candidates.iter().enumerate() {
            let d = probe.distance(&candidate.as_ref().embedding);
            match best {
                Some((_, best_d)) if d >= best_d => {
                    if d < second {
                        second = d;
                    }
                }
                Some((_, best_d)) => {
                    second = best_d;
                    best = Some((i, d));
                }
                None => best = Some((i, d)),
            }
        }

        let Some((idx, best_d)) = best else {
            return MatchResult::Unknown { best_distance: None };
        };

        if best_d > threshold {
            return MatchResult::Unknown { best_distance: Some(best_d) };
        }

        // `second` stays infinite with a single candidate, so this never fires then.
        if second - best_d < self.margin {
            tracing::debug!(
                best = best_d,
                second,
                margin = self.margin,
                "ambiguous match rejected"
            );
            return MatchResult::Unknown { best_distance: Some(best_d) };
        }

        MatchResult::Matched {
            identity: candidates[idx].as_ref().identity.clone(),
            distance: best_d,
        }
    }
}
