//! Vector index trait and related types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::QuarryResult;
use crate::types::{CategoryFilter, ChunkId};

/// A vector record stored in the index.
///
/// Carries the denormalized metadata the index needs for query-time
/// category pre-filtering and for generation-wise removal by document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Chunk this vector belongs to.
    pub chunk_id: ChunkId,
    /// Owning document, for generation replacement.
    pub document_id: String,
    /// Denormalized category, for pre-filtering.
    pub category: String,
    /// The embedding vector.
    pub embedding: Vec<f32>,
}

/// Core VectorIndex trait - nearest-neighbor search over chunk embeddings.
///
/// `nearest` must either support the category pre-filter natively or wrap
/// an unfiltered search so that the returned `k` results all pass the
/// filter (the filter restricts candidate generation, it is not post-hoc
/// rejection of the final result set).
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace vectors.
    async fn upsert(&self, records: Vec<VectorRecord>) -> QuarryResult<()>;

    /// Remove every vector belonging to a document (one chunk generation).
    async fn remove_document(&self, document_id: &str) -> QuarryResult<()>;

    /// Return up to `k` chunk ids nearest to `query` by cosine similarity,
    /// ordered by similarity descending.
    async fn nearest(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&CategoryFilter>,
    ) -> QuarryResult<Vec<(ChunkId, f32)>>;

    /// Number of vectors currently indexed.
    async fn len(&self) -> QuarryResult<usize>;
}

/// Vector index provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VectorIndexProvider {
    /// In-memory brute-force cosine index.
    #[default]
    Memory,
    /// Embedded SQLite index via the sqlite-vec extension.
    SqliteVec,
}

/// Vector index configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndexConfig {
    /// Provider type.
    pub provider: VectorIndexProvider,
    /// Database path for file-backed providers (":memory:" for in-memory
    /// SQLite).
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Table/collection name for providers that need one.
    #[serde(default = "default_table")]
    pub table: String,
    /// Embedding dimension.
    #[serde(default = "default_dimension")]
    pub dimension: usize,
}

fn default_db_path() -> String {
    ":memory:".to_string()
}

fn default_table() -> String {
    "chunk_embeddings".to_string()
}

fn default_dimension() -> usize {
    768
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            provider: VectorIndexProvider::Memory,
            db_path: default_db_path(),
            table: default_table(),
            dimension: default_dimension(),
        }
    }
}
