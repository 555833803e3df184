//! Chunk store trait.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::QuarryResult;
use crate::types::{Chunk, ChunkId};

/// Read/write access to the immutable chunk corpus.
///
/// Implementations must apply `replace_document` atomically with respect to
/// a single document's chunk generation: the old generation is fully
/// removed before (or atomically with) the new generation's insertion, so a
/// concurrent query never sees a mixed half-old/half-new set.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Fetch one chunk by id.
    async fn get(&self, id: &ChunkId) -> QuarryResult<Option<Arc<Chunk>>>;

    /// Fetch a document's chunks ordered by `sequence_index`.
    async fn get_chunks(&self, document_id: &str) -> QuarryResult<Vec<Arc<Chunk>>>;

    /// Replace a document's entire chunk generation.
    ///
    /// Used by the (out-of-scope) ingestion pipeline after re-processing a
    /// document. Old chunks are deleted, never overwritten in place.
    async fn replace_document(&self, document_id: &str, chunks: Vec<Chunk>) -> QuarryResult<()>;

    /// Remove a document's chunks entirely.
    async fn remove_document(&self, document_id: &str) -> QuarryResult<()>;

    /// Total number of chunks stored.
    async fn count(&self) -> QuarryResult<usize>;
}
