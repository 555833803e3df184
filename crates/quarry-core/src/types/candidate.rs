//! Ephemeral per-query retrieval candidates.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::chunk::Chunk;

/// Which retrieval path(s) surfaced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceChannel {
    /// Vector similarity search only.
    Semantic,
    /// Term-based lexical search only.
    Lexical,
    /// Surfaced by both stages and merged into one candidate.
    Both,
}

impl SourceChannel {
    /// Merge the channel of a second sighting of the same chunk.
    pub fn merge(self, other: SourceChannel) -> SourceChannel {
        if self == other {
            self
        } else {
            SourceChannel::Both
        }
    }
}

/// A scored chunk produced for one query.
///
/// Created fresh per query and discarded once the response is packed;
/// never persisted, hence no serde.
#[derive(Debug, Clone)]
pub struct RetrievalCandidate {
    /// The retrieved chunk.
    pub chunk: Arc<Chunk>,
    /// Cosine similarity from the semantic stage, if it surfaced there.
    /// Range [-1, 1], typically [0, 1] for normalized embeddings.
    pub semantic_score: Option<f32>,
    /// Raw lexical score, if the lexical stage surfaced it. Non-negative
    /// and unbounded (BM25-like).
    pub lexical_score: Option<f32>,
    /// The fused score used for ranking.
    pub fused_score: f32,
    /// Which stage(s) produced this candidate.
    pub source_channel: SourceChannel,
}

/// The ranked output of one retrieval call, before context packing.
#[derive(Debug, Clone)]
pub struct RankedCandidates {
    /// Candidates ordered by `fused_score` descending (ties broken
    /// deterministically).
    pub candidates: Vec<RetrievalCandidate>,
    /// True when at least one stage was dropped (failed or timed out) and
    /// the result was assembled from the remaining stage(s).
    pub degraded: bool,
    /// Number of distinct chunks surfaced across both stages before
    /// truncation to `top_k`.
    pub total_considered: usize,
    /// Wall-clock time spent inside the retrieval call.
    pub elapsed: Duration,
}

impl RankedCandidates {
    /// An empty, non-degraded result (e.g. empty corpus).
    pub fn empty(elapsed: Duration) -> Self {
        Self {
            candidates: Vec::new(),
            degraded: false,
            total_considered: 0,
            elapsed,
        }
    }

    /// Number of returned candidates.
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Whether no candidates were returned.
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_merge() {
        assert_eq!(
            SourceChannel::Semantic.merge(SourceChannel::Semantic),
            SourceChannel::Semantic
        );
        assert_eq!(
            SourceChannel::Semantic.merge(SourceChannel::Lexical),
            SourceChannel::Both
        );
        assert_eq!(
            SourceChannel::Both.merge(SourceChannel::Lexical),
            SourceChannel::Both
        );
    }

    #[test]
    fn channel_serializes_lowercase() {
        let json = serde_json::to_string(&SourceChannel::Lexical).unwrap();
        assert_eq!(json, "\"lexical\"");
        let json = serde_json::to_string(&SourceChannel::Both).unwrap();
        assert_eq!(json, "\"both\"");
    }
}
