//! End-to-end retrieval pipeline tests against mock collaborators.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use quarry_core::{
    CategoryFilter, Chunk, ChunkId, Embedder, HybridRetriever, InMemoryChunkStore, QuarryError,
    QuarryResult, RetrievalRequest, RetrieverConfig, SourceChannel, VectorIndex, VectorRecord,
};

const DIMS: usize = 128;

/// Surface engine warn/debug output when a test fails.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("quarry_core=debug")
        .with_test_writer()
        .try_init();
}

/// Deterministic embedding: character codepoints bucketed into fixed
/// dimensions, L2-normalized. Texts sharing characters are cosine-close.
fn bucket_embed(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for ch in text.chars().filter(|c| c.is_alphanumeric()) {
        v[ch as usize % DIMS] += 1.0;
    }
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

struct BucketEmbedder;

#[async_trait]
impl Embedder for BucketEmbedder {
    async fn embed(&self, text: &str) -> QuarryResult<Vec<f32>> {
        Ok(bucket_embed(text))
    }
    fn dimension(&self) -> usize {
        DIMS
    }
    fn model_name(&self) -> &str {
        "bucket-test"
    }
}

struct UnreachableEmbedder;

#[async_trait]
impl Embedder for UnreachableEmbedder {
    async fn embed(&self, _text: &str) -> QuarryResult<Vec<f32>> {
        Err(QuarryError::embedding_unavailable("model server down"))
    }
    fn dimension(&self) -> usize {
        DIMS
    }
    fn model_name(&self) -> &str {
        "unreachable-test"
    }
}

#[derive(Default)]
struct BruteForceIndex {
    records: RwLock<Vec<VectorRecord>>,
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na > f32::EPSILON && nb > f32::EPSILON {
        dot / (na * nb)
    } else {
        0.0
    }
}

#[async_trait]
impl VectorIndex for BruteForceIndex {
    async fn upsert(&self, records: Vec<VectorRecord>) -> QuarryResult<()> {
        self.records.write().await.extend(records);
        Ok(())
    }
    async fn remove_document(&self, document_id: &str) -> QuarryResult<()> {
        self.records
            .write()
            .await
            .retain(|r| r.document_id != document_id);
        Ok(())
    }
    async fn nearest(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&CategoryFilter>,
    ) -> QuarryResult<Vec<(ChunkId, f32)>> {
        let records = self.records.read().await;
        let mut hits: Vec<(ChunkId, f32)> = records
            .iter()
            .filter(|r| filter.map_or(true, |f| f.matches(&r.category)))
            .map(|r| (r.chunk_id.clone(), cosine(query, &r.embedding)))
            .collect();
        hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }
    async fn len(&self) -> QuarryResult<usize> {
        Ok(self.records.read().await.len())
    }
}

fn chunk(id: &str, doc: &str, seq: u32, text: &str, category: &str) -> Chunk {
    let mut c = Chunk::new(doc, seq, text, category).unwrap();
    c.id = ChunkId::from(id);
    c.embedding = Some(bucket_embed(text));
    c
}

async fn multilingual_retriever(embedder: Arc<dyn Embedder>) -> HybridRetriever {
    init_tracing();
    let retriever = HybridRetriever::new(
        RetrieverConfig::default(),
        embedder,
        Arc::new(BruteForceIndex::default()),
        Arc::new(InMemoryChunkStore::new()),
    )
    .unwrap();

    retriever
        .replace_document(
            "doc-a",
            vec![chunk("chunk-a", "doc-a", 0, "人工智能 水务 应用", "tech-docs")],
        )
        .await
        .unwrap();
    retriever
        .replace_document(
            "doc-b",
            vec![chunk("chunk-b", "doc-b", 0, "财务报表 年度", "business")],
        )
        .await
        .unwrap();
    retriever
        .replace_document(
            "doc-c",
            vec![chunk("chunk-c", "doc-c", 0, "人工智能 医疗 应用", "tech-docs")],
        )
        .await
        .unwrap();
    retriever
}

#[tokio::test]
async fn cjk_query_ranks_overlapping_chunks_and_excludes_the_rest() {
    let retriever = multilingual_retriever(Arc::new(BucketEmbedder)).await;

    let result = retriever
        .retrieve(&RetrievalRequest::new("人工智能应用", 2))
        .await
        .unwrap();

    assert_eq!(result.len(), 2);
    let ids: Vec<&str> = result
        .candidates
        .iter()
        .map(|c| c.chunk.id.as_str())
        .collect();
    assert!(ids.contains(&"chunk-a"));
    assert!(ids.contains(&"chunk-c"));
    assert!(!ids.contains(&"chunk-b"));
    // Equal scores tie-break by document id, so A precedes C.
    assert_eq!(ids[0], "chunk-a");
    assert!(!result.degraded);
}

#[tokio::test]
async fn category_filter_restricts_every_candidate() {
    let retriever = multilingual_retriever(Arc::new(BucketEmbedder)).await;

    let request = RetrievalRequest::new("人工智能应用", 10)
        .with_categories(CategoryFilter::new(["tech-docs"]).unwrap());
    let result = retriever.retrieve(&request).await.unwrap();

    assert!(!result.is_empty());
    for candidate in &result.candidates {
        assert_eq!(candidate.chunk.category, "tech-docs");
    }
}

#[tokio::test]
async fn business_filter_surfaces_the_business_chunk_alone() {
    let retriever = multilingual_retriever(Arc::new(BucketEmbedder)).await;

    // No lexical overlap with chunk B, so drop the semantic floor and let
    // the vector stage surface the only in-category chunk.
    let request = RetrievalRequest::new("人工智能应用", 10)
        .with_threshold(0.0)
        .with_categories(CategoryFilter::new(["business"]).unwrap());
    let result = retriever.retrieve(&request).await.unwrap();

    assert_eq!(result.len(), 1);
    assert_eq!(result.candidates[0].chunk.id.as_str(), "chunk-b");
}

#[tokio::test]
async fn result_respects_top_k_and_has_no_duplicates() {
    let retriever = multilingual_retriever(Arc::new(BucketEmbedder)).await;

    for top_k in [1, 2, 3, 10] {
        let result = retriever
            .retrieve(&RetrievalRequest::new("人工智能应用", top_k))
            .await
            .unwrap();
        assert!(result.len() <= top_k);

        let mut seen = std::collections::HashSet::new();
        for candidate in &result.candidates {
            assert!(
                seen.insert(candidate.chunk.id.clone()),
                "chunk {} appeared twice",
                candidate.chunk.id
            );
        }
    }
}

#[tokio::test]
async fn fused_scores_are_non_increasing() {
    let retriever = multilingual_retriever(Arc::new(BucketEmbedder)).await;

    let result = retriever
        .retrieve(&RetrievalRequest::new("人工智能应用", 10).with_threshold(0.0))
        .await
        .unwrap();

    for pair in result.candidates.windows(2) {
        assert!(
            pair[0].fused_score >= pair[1].fused_score,
            "ranking out of order: {} < {}",
            pair[0].fused_score,
            pair[1].fused_score
        );
    }
}

#[tokio::test]
async fn identical_queries_return_identical_rankings() {
    let retriever = multilingual_retriever(Arc::new(BucketEmbedder)).await;
    let request = RetrievalRequest::new("人工智能应用", 10).with_threshold(0.0);

    let first = retriever.retrieve(&request).await.unwrap();
    let second = retriever.retrieve(&request).await.unwrap();

    let ids = |r: &quarry_core::RankedCandidates| {
        r.candidates
            .iter()
            .map(|c| c.chunk.id.clone())
            .collect::<Vec<_>>()
    };
    assert_eq!(ids(&first), ids(&second));

    let scores = |r: &quarry_core::RankedCandidates| {
        r.candidates.iter().map(|c| c.fused_score).collect::<Vec<_>>()
    };
    assert_eq!(scores(&first), scores(&second));
}

#[tokio::test]
async fn embedding_outage_yields_lexical_only_candidates() {
    let retriever = multilingual_retriever(Arc::new(UnreachableEmbedder)).await;

    let result = retriever
        .retrieve(&RetrievalRequest::new("人工智能应用", 10))
        .await
        .unwrap();

    assert!(result.degraded);
    assert!(!result.is_empty());
    for candidate in &result.candidates {
        assert_eq!(candidate.source_channel, SourceChannel::Lexical);
        assert!(candidate.semantic_score.is_none());
        assert!(candidate.lexical_score.is_some());
    }
}

#[tokio::test]
async fn merged_candidates_surface_with_both_channel() {
    let retriever = multilingual_retriever(Arc::new(BucketEmbedder)).await;

    let result = retriever
        .retrieve(&RetrievalRequest::new("人工智能应用", 10))
        .await
        .unwrap();

    // A and C clear the semantic threshold and match lexically.
    for candidate in &result.candidates {
        assert_eq!(candidate.source_channel, SourceChannel::Both);
        assert!(candidate.semantic_score.is_some());
        assert!(candidate.lexical_score.is_some());
    }
}

#[tokio::test]
async fn packed_context_cites_in_inclusion_order() {
    let retriever = multilingual_retriever(Arc::new(BucketEmbedder)).await;

    let context = retriever
        .retrieve_context(&RetrievalRequest::new("人工智能应用", 2))
        .await
        .unwrap();

    assert_eq!(context.citations.len(), 2);
    assert_eq!(context.citations[0].document_id, "doc-a");
    assert_eq!(context.citations[1].document_id, "doc-c");
    assert!(context.context_text.starts_with("[1] "));
    assert!(context.context_text.contains("[2] "));
    assert!(context.context_text.contains("人工智能 水务 应用"));
    assert_eq!(context.total_chunks_considered, 2);
}

#[tokio::test]
async fn reprocessing_a_document_retires_the_old_generation() {
    let retriever = multilingual_retriever(Arc::new(BucketEmbedder)).await;

    retriever
        .replace_document(
            "doc-a",
            vec![chunk("chunk-a2", "doc-a", 0, "全新 内容 改写", "tech-docs")],
        )
        .await
        .unwrap();

    let result = retriever
        .retrieve(&RetrievalRequest::new("人工智能应用", 10).with_threshold(0.0))
        .await
        .unwrap();

    let ids: Vec<&str> = result
        .candidates
        .iter()
        .map(|c| c.chunk.id.as_str())
        .collect();
    assert!(!ids.contains(&"chunk-a"), "old generation still retrievable");
}
