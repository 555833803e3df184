//! Core data types for the retrieval pipeline.

mod candidate;
mod chunk;
mod context;

pub use candidate::{RankedCandidates, RetrievalCandidate, SourceChannel};
pub use chunk::{CategoryFilter, Chunk, ChunkId};
pub use context::{Citation, RetrievalContext};
