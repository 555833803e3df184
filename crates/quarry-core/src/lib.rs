//! quarry-core - Core library for quarry.
//!
//! This crate provides the types, traits, and hybrid retrieval engine of
//! quarry: given a natural-language query and a corpus of chunked, embedded,
//! classified documents, it produces a ranked, deduplicated,
//! budget-constrained set of passages with per-passage provenance, ready to
//! ground a generative answer.
//!
//! # Example
//!
//! ```ignore
//! use quarry_core::{HybridRetriever, RetrievalRequest, RetrieverConfig};
//!
//! let retriever = HybridRetriever::new(
//!     RetrieverConfig::default(),
//!     embedder,      // Arc<dyn Embedder>, e.g. from quarry-embeddings
//!     vector_index,  // Arc<dyn VectorIndex>, e.g. from quarry-vector-stores
//!     chunk_store,   // Arc<dyn ChunkStore>
//! )?;
//!
//! // Index a document's chunk generation.
//! retriever.replace_document("doc-1", chunks).await?;
//!
//! // Retrieve and pack context for a query.
//! let context = retriever
//!     .retrieve_context(&RetrievalRequest::new("how does compaction work?", 5))
//!     .await?;
//! println!("{}", context.context_text);
//! ```

pub mod config;
pub mod error;
pub mod history;
pub mod packer;
pub mod retrieval;
pub mod store;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use config::{CacheConfig, RetrieverConfig};
pub use error::{QuarryError, QuarryResult};
pub use history::{HistoryRow, HistoryStats, SqliteHistoryStore};
pub use packer::ContextPacker;
pub use retrieval::{Bm25Params, FusionWeights, HybridRetriever, LexicalIndex, RetrievalRequest};
pub use store::InMemoryChunkStore;
pub use traits::{
    ChunkStore, Embedder, EmbedderConfig, EmbedderProvider, QueryHistorySink, QueryRecord,
    VectorIndex, VectorIndexConfig, VectorIndexProvider, VectorRecord,
};
pub use types::{
    CategoryFilter, Chunk, ChunkId, Citation, RankedCandidates, RetrievalCandidate,
    RetrievalContext, SourceChannel,
};
