//! Trait seams for external collaborators.
//!
//! The retrieval core has no compile-time dependency on any particular
//! embedding or vector-index vendor; everything behind these traits is
//! swappable.

mod chunk_store;
mod embedder;
mod history;
mod vector_index;

pub use chunk_store::ChunkStore;
pub use embedder::{Embedder, EmbedderConfig, EmbedderProvider};
pub use history::{QueryHistorySink, QueryRecord};
pub use vector_index::{VectorIndex, VectorIndexConfig, VectorIndexProvider, VectorRecord};
