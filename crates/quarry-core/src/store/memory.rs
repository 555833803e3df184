//! In-memory chunk store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{QuarryError, QuarryResult};
use crate::traits::ChunkStore;
use crate::types::{Chunk, ChunkId};

#[derive(Default)]
struct StoreState {
    by_id: HashMap<ChunkId, Arc<Chunk>>,
    // Chunk ids per document, kept sorted by sequence_index.
    by_document: HashMap<String, Vec<ChunkId>>,
}

/// In-memory [`ChunkStore`] backed by a read-write lock.
///
/// Generation replacement happens under a single write lock, so concurrent
/// readers see either the old generation or the new one, never a mix.
#[derive(Default)]
pub struct InMemoryChunkStore {
    state: RwLock<StoreState>,
}

impl InMemoryChunkStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn validate_generation(document_id: &str, chunks: &[Chunk]) -> QuarryResult<()> {
        let mut seen = std::collections::HashSet::new();
        for chunk in chunks {
            if chunk.document_id != document_id {
                return Err(QuarryError::validation(format!(
                    "chunk '{}' belongs to document '{}', not '{}'",
                    chunk.id, chunk.document_id, document_id
                )));
            }
            if !seen.insert(chunk.sequence_index) {
                return Err(QuarryError::validation(format!(
                    "duplicate sequence_index {} in document '{}'",
                    chunk.sequence_index, document_id
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ChunkStore for InMemoryChunkStore {
    async fn get(&self, id: &ChunkId) -> QuarryResult<Option<Arc<Chunk>>> {
        let state = self.state.read().await;
        Ok(state.by_id.get(id).cloned())
    }

    async fn get_chunks(&self, document_id: &str) -> QuarryResult<Vec<Arc<Chunk>>> {
        let state = self.state.read().await;
        let ids = match state.by_document.get(document_id) {
            Some(ids) => ids,
            None => return Ok(Vec::new()),
        };
        Ok(ids
            .iter()
            .filter_map(|id| state.by_id.get(id).cloned())
            .collect())
    }

    async fn replace_document(&self, document_id: &str, chunks: Vec<Chunk>) -> QuarryResult<()> {
        Self::validate_generation(document_id, &chunks)?;

        let mut chunks = chunks;
        chunks.sort_by_key(|c| c.sequence_index);

        let mut state = self.state.write().await;
        if let Some(old_ids) = state.by_document.remove(document_id) {
            for id in old_ids {
                state.by_id.remove(&id);
            }
        }
        let mut ids = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            ids.push(chunk.id.clone());
            state.by_id.insert(chunk.id.clone(), Arc::new(chunk));
        }
        state.by_document.insert(document_id.to_string(), ids);
        Ok(())
    }

    async fn remove_document(&self, document_id: &str) -> QuarryResult<()> {
        let mut state = self.state.write().await;
        if let Some(ids) = state.by_document.remove(document_id) {
            for id in ids {
                state.by_id.remove(&id);
            }
        }
        Ok(())
    }

    async fn count(&self) -> QuarryResult<usize> {
        let state = self.state.read().await;
        Ok(state.by_id.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(doc: &str, seq: u32, text: &str) -> Chunk {
        Chunk::new(doc, seq, text, "other").unwrap()
    }

    #[tokio::test]
    async fn replace_swaps_the_whole_generation() {
        let store = InMemoryChunkStore::new();

        let old = vec![chunk("doc-1", 0, "old zero"), chunk("doc-1", 1, "old one")];
        let old_ids: Vec<ChunkId> = old.iter().map(|c| c.id.clone()).collect();
        store.replace_document("doc-1", old).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);

        let fresh = vec![chunk("doc-1", 0, "new zero")];
        store.replace_document("doc-1", fresh).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        for id in &old_ids {
            assert!(store.get(id).await.unwrap().is_none());
        }
        let chunks = store.get_chunks("doc-1").await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "new zero");
    }

    #[tokio::test]
    async fn chunks_come_back_in_sequence_order() {
        let store = InMemoryChunkStore::new();
        store
            .replace_document(
                "doc-1",
                vec![
                    chunk("doc-1", 2, "two"),
                    chunk("doc-1", 0, "zero"),
                    chunk("doc-1", 1, "one"),
                ],
            )
            .await
            .unwrap();

        let chunks = store.get_chunks("doc-1").await.unwrap();
        let order: Vec<u32> = chunks.iter().map(|c| c.sequence_index).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn duplicate_sequence_index_rejected() {
        let store = InMemoryChunkStore::new();
        let result = store
            .replace_document(
                "doc-1",
                vec![chunk("doc-1", 0, "a"), chunk("doc-1", 0, "b")],
            )
            .await;
        assert!(matches!(result, Err(QuarryError::Validation(_))));
    }

    #[tokio::test]
    async fn wrong_document_id_rejected() {
        let store = InMemoryChunkStore::new();
        let result = store
            .replace_document("doc-1", vec![chunk("doc-2", 0, "a")])
            .await;
        assert!(matches!(result, Err(QuarryError::Validation(_))));
    }

    #[tokio::test]
    async fn remove_unknown_document_is_a_noop() {
        let store = InMemoryChunkStore::new();
        store.remove_document("nope").await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
