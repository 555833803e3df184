//! In-memory brute-force cosine index.

use std::collections::HashMap;

use async_trait::async_trait;
use ordered_float::OrderedFloat;
use tokio::sync::RwLock;

use quarry_core::{CategoryFilter, ChunkId, QuarryResult, VectorIndex, VectorRecord};

struct StoredVector {
    document_id: String,
    category: String,
    embedding: Vec<f32>,
}

/// Exact nearest-neighbor search by scanning every stored vector.
///
/// The category filter is applied while candidates are generated, so the
/// returned `k` results are all in-category rather than a post-filtered
/// remnant. Linear cost per query; fine up to tens of thousands of chunks,
/// use [`SqliteVecIndex`](crate::SqliteVecIndex) beyond that.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    records: RwLock<HashMap<ChunkId, StoredVector>>,
}

impl InMemoryVectorIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, records: Vec<VectorRecord>) -> QuarryResult<()> {
        let mut map = self.records.write().await;
        for record in records {
            map.insert(
                record.chunk_id,
                StoredVector {
                    document_id: record.document_id,
                    category: record.category,
                    embedding: record.embedding,
                },
            );
        }
        Ok(())
    }

    async fn remove_document(&self, document_id: &str) -> QuarryResult<()> {
        let mut map = self.records.write().await;
        map.retain(|_, v| v.document_id != document_id);
        Ok(())
    }

    async fn nearest(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&CategoryFilter>,
    ) -> QuarryResult<Vec<(ChunkId, f32)>> {
        let map = self.records.read().await;
        let mut hits: Vec<(ChunkId, f32)> = map
            .iter()
            .filter(|(_, v)| filter.map_or(true, |f| f.matches(&v.category)))
            .map(|(id, v)| (id.clone(), cosine_similarity(query, &v.embedding)))
            .collect();

        hits.sort_by(|a, b| {
            OrderedFloat(b.1)
                .cmp(&OrderedFloat(a.1))
                .then_with(|| a.0.cmp(&b.0))
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn len(&self) -> QuarryResult<usize> {
        Ok(self.records.read().await.len())
    }
}

/// Cosine similarity; 0.0 for mismatched lengths or zero-magnitude vectors.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a > f32::EPSILON && norm_b > f32::EPSILON {
        dot / (norm_a * norm_b)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, doc: &str, category: &str, embedding: Vec<f32>) -> VectorRecord {
        VectorRecord {
            chunk_id: ChunkId::from(id),
            document_id: doc.to_string(),
            category: category.to_string(),
            embedding,
        }
    }

    #[tokio::test]
    async fn nearest_orders_by_similarity() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert(vec![
                record("exact", "d1", "tech", vec![1.0, 0.0, 0.0]),
                record("close", "d1", "tech", vec![0.9, 0.1, 0.0]),
                record("orthogonal", "d2", "tech", vec![0.0, 1.0, 0.0]),
            ])
            .await
            .unwrap();

        let hits = index.nearest(&[1.0, 0.0, 0.0], 2, None).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, ChunkId::from("exact"));
        assert_eq!(hits[1].0, ChunkId::from("close"));
        assert!(hits[0].1 >= hits[1].1);
    }

    #[tokio::test]
    async fn filter_is_applied_before_truncation() {
        let index = InMemoryVectorIndex::new();
        // Two in-category vectors rank below two out-of-category ones.
        index
            .upsert(vec![
                record("biz-1", "d1", "business", vec![0.5, 0.5, 0.0]),
                record("biz-2", "d1", "business", vec![0.4, 0.6, 0.0]),
                record("tech-1", "d2", "tech", vec![1.0, 0.0, 0.0]),
                record("tech-2", "d2", "tech", vec![0.9, 0.1, 0.0]),
            ])
            .await
            .unwrap();

        let filter = CategoryFilter::new(["business"]).unwrap();
        let hits = index
            .nearest(&[1.0, 0.0, 0.0], 2, Some(&filter))
            .await
            .unwrap();

        // A post-filter over the top-2 would have returned nothing.
        assert_eq!(hits.len(), 2);
        assert!(hits
            .iter()
            .all(|(id, _)| id.as_str().starts_with("biz")));
    }

    #[tokio::test]
    async fn remove_document_drops_only_its_vectors() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert(vec![
                record("a", "d1", "tech", vec![1.0, 0.0]),
                record("b", "d2", "tech", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        index.remove_document("d1").await.unwrap();
        assert_eq!(index.len().await.unwrap(), 1);
        let hits = index.nearest(&[1.0, 0.0], 10, None).await.unwrap();
        assert_eq!(hits[0].0, ChunkId::from("b"));
    }

    #[tokio::test]
    async fn upsert_replaces_existing_vector() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert(vec![record("a", "d1", "tech", vec![1.0, 0.0])])
            .await
            .unwrap();
        index
            .upsert(vec![record("a", "d1", "tech", vec![0.0, 1.0])])
            .await
            .unwrap();

        assert_eq!(index.len().await.unwrap(), 1);
        let hits = index.nearest(&[0.0, 1.0], 1, None).await.unwrap();
        assert!((hits[0].1 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_edge_cases() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 0.01);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 0.01);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
