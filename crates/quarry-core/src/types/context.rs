//! Packed retrieval context handed to the generation step.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::chunk::ChunkId;

/// Provenance for one included context segment.
///
/// Citations are ordered to match inclusion order in `context_text`; the
/// generation step must preserve that ordering so citation markers map back
/// to the right segments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    /// Owning document of the cited chunk.
    pub document_id: String,
    /// Id of the cited chunk.
    pub chunk_id: ChunkId,
    /// Position of the chunk within its document.
    pub sequence_index: u32,
    /// The fused relevance score the chunk was ranked with.
    pub score: f32,
    /// True when the segment was cut at a whitespace boundary to fit the
    /// remaining budget.
    pub truncated: bool,
}

/// The final packed result for one query.
///
/// Owned exclusively by the caller that issued the query; never shared
/// across requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalContext {
    /// Concatenated, ordered chunk texts with inline citation markers,
    /// within the character budget.
    pub context_text: String,
    /// One citation per included segment, in inclusion order.
    pub citations: Vec<Citation>,
    /// Distinct chunks surfaced by the retrieval stages for this query.
    pub total_chunks_considered: usize,
    /// Wall-clock time of the retrieval call that produced the candidates.
    pub retrieval_time: Duration,
    /// Carried over from the ranked result: true when a stage was dropped.
    pub degraded: bool,
}

impl RetrievalContext {
    /// Whether anything was packed.
    pub fn is_empty(&self) -> bool {
        self.citations.is_empty()
    }
}
