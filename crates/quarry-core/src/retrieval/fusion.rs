//! Score fusion for hybrid retrieval.
//!
//! Each stage's raw scores live on a different scale (cosine similarity vs
//! unbounded BM25), and absolute ranges differ per query and per embedding
//! model. Scores are therefore min-max normalized over each stage's own
//! candidate set for the current query - never against a global constant -
//! and then combined as a weighted sum.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{QuarryError, QuarryResult};
use crate::types::ChunkId;

/// Stage weights for linear fusion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionWeights {
    /// Weight for the (normalized) semantic similarity score.
    pub semantic: f32,
    /// Weight for the (normalized) lexical score.
    pub lexical: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            semantic: 0.7,
            lexical: 0.3,
        }
    }
}

impl FusionWeights {
    /// Calculate the fused score from normalized per-stage scores.
    ///
    /// A stage the chunk did not surface in contributes 0.
    pub fn fuse(&self, semantic_norm: Option<f32>, lexical_norm: Option<f32>) -> f32 {
        let score = semantic_norm.unwrap_or(0.0) * self.semantic
            + lexical_norm.unwrap_or(0.0) * self.lexical;
        score.clamp(0.0, 1.0)
    }

    /// Validate that the weights are non-negative and sum to ~1.0.
    pub fn validate(&self) -> QuarryResult<()> {
        if self.semantic < 0.0 || self.lexical < 0.0 {
            return Err(QuarryError::configuration(
                "fusion weights must be non-negative",
            ));
        }
        let sum = self.semantic + self.lexical;
        if (sum - 1.0).abs() > 0.01 {
            return Err(QuarryError::configuration(format!(
                "fusion weights should sum to 1.0, got {sum}"
            )));
        }
        Ok(())
    }
}

/// Min-max normalize one stage's raw scores to [0, 1] over that stage's own
/// candidate set.
///
/// When the set is degenerate (a single candidate, or every score equal),
/// there is no spread to map: every candidate maps to 1.0 if the common
/// score is positive, 0.0 otherwise.
pub fn min_max_normalize(scores: &[(ChunkId, f32)]) -> HashMap<ChunkId, f32> {
    if scores.is_empty() {
        return HashMap::new();
    }

    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for (_, score) in scores {
        min = min.min(*score);
        max = max.max(*score);
    }

    let span = max - min;
    scores
        .iter()
        .map(|(id, score)| {
            let normalized = if span <= f32::EPSILON {
                if max > 0.0 {
                    1.0
                } else {
                    0.0
                }
            } else {
                (score - min) / span
            };
            (id.clone(), normalized)
        })
        .collect()
}
