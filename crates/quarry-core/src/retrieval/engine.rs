//! Hybrid retrieval engine orchestrating the semantic and lexical stages.
//!
//! One retrieval call embeds the query, fans out to vector and lexical
//! search concurrently, fuses the two score sets, deduplicates, and
//! truncates to `top_k`. Each stage runs under the configured timeout; the
//! call degrades to whichever stage(s) completed instead of blocking on a
//! slow embedding provider, and only fails outright when neither stage was
//! usable.
//!
//! Retrieval calls are stateless relative to each other and take only read
//! access to the shared indexes, so cancelling an in-flight call (client
//! disconnect) just abandons the ephemeral candidate computation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use ordered_float::OrderedFloat;
use tokio::time::timeout;

use crate::config::RetrieverConfig;
use crate::error::{QuarryError, QuarryResult};
use crate::packer::ContextPacker;
use crate::traits::{
    ChunkStore, Embedder, QueryHistorySink, QueryRecord, VectorIndex, VectorRecord,
};
use crate::types::{
    CategoryFilter, Chunk, ChunkId, RankedCandidates, RetrievalCandidate, RetrievalContext,
    SourceChannel,
};

use super::cache::EmbeddingCache;
use super::fusion::min_max_normalize;
use super::lexical::LexicalIndex;

/// Parameters for one retrieval call.
#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    /// Natural-language query text.
    pub query: String,
    /// Maximum number of candidates to return.
    pub top_k: usize,
    /// Per-call override of the configured semantic similarity floor.
    pub similarity_threshold: Option<f32>,
    /// Restrict both stages to chunks in these categories.
    pub category_filter: Option<CategoryFilter>,
}

impl RetrievalRequest {
    /// Create a request with the configured default threshold and no
    /// category filter.
    pub fn new(query: impl Into<String>, top_k: usize) -> Self {
        Self {
            query: query.into(),
            top_k,
            similarity_threshold: None,
            category_filter: None,
        }
    }

    /// Override the semantic similarity floor for this call.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = Some(threshold);
        self
    }

    /// Restrict retrieval to a category set.
    pub fn with_categories(mut self, filter: CategoryFilter) -> Self {
        self.category_filter = Some(filter);
        self
    }
}

struct CandidateAccumulator {
    chunk: Arc<Chunk>,
    semantic: Option<f32>,
    lexical: Option<f32>,
    channel: SourceChannel,
}

/// The hybrid retriever - vector search + lexical search + category filter,
/// fused into one ranked, deduplicated candidate list.
pub struct HybridRetriever {
    config: RetrieverConfig,
    embedder: Arc<dyn Embedder>,
    vector_index: Arc<dyn VectorIndex>,
    chunk_store: Arc<dyn ChunkStore>,
    lexical: LexicalIndex,
    cache: EmbeddingCache,
    history: Option<Arc<dyn QueryHistorySink>>,
}

impl HybridRetriever {
    /// Create a retriever over the given collaborators.
    ///
    /// # Errors
    /// Fails fast with [`QuarryError::Configuration`] when the configuration
    /// is invalid - an instance with bad weights must never serve a query.
    pub fn new(
        config: RetrieverConfig,
        embedder: Arc<dyn Embedder>,
        vector_index: Arc<dyn VectorIndex>,
        chunk_store: Arc<dyn ChunkStore>,
    ) -> QuarryResult<Self> {
        config.validate()?;
        let lexical = LexicalIndex::new(config.bm25.clone());
        let cache = EmbeddingCache::new(&config.cache);
        Ok(Self {
            config,
            embedder,
            vector_index,
            chunk_store,
            lexical,
            cache,
            history: None,
        })
    }

    /// Attach a query history sink. Recording is fire-and-forget; sink
    /// failures never fail retrieval.
    pub fn with_history(mut self, sink: Arc<dyn QueryHistorySink>) -> Self {
        self.history = Some(sink);
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Retrieve up to `top_k` ranked, deduplicated candidates for a query.
    ///
    /// # Errors
    /// - [`QuarryError::Validation`] for malformed request parameters.
    /// - [`QuarryError::RetrievalFailed`] when both stages were unusable.
    ///   An empty corpus or a query with no matches is an empty result,
    ///   not an error.
    pub async fn retrieve(&self, request: &RetrievalRequest) -> QuarryResult<RankedCandidates> {
        self.validate_request(request)?;
        let start = Instant::now();

        let threshold = request
            .similarity_threshold
            .unwrap_or(self.config.similarity_threshold);
        let stage_timeout = Duration::from_millis(self.config.stage_timeout_ms);
        let fetch_k = request.top_k * self.config.candidate_multiplier;
        let filter = request.category_filter.as_ref();

        // The stages are independent; run them concurrently, each under its
        // own deadline.
        let semantic_fut = timeout(
            stage_timeout,
            self.semantic_stage(&request.query, fetch_k, threshold, filter),
        );
        let lexical_fut = timeout(stage_timeout, async {
            self.lexical.search(&request.query, request.top_k, filter)
        });
        let (semantic_out, lexical_out) = tokio::join!(semantic_fut, lexical_fut);

        let semantic_hits = match semantic_out {
            Ok(Ok(hits)) => Some(hits),
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "semantic stage failed, continuing lexical-only");
                None
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.config.stage_timeout_ms,
                    "semantic stage timed out, continuing lexical-only"
                );
                None
            }
        };
        let lexical_hits = match lexical_out {
            Ok(hits) => Some(hits),
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.config.stage_timeout_ms,
                    "lexical stage timed out"
                );
                None
            }
        };

        if semantic_hits.is_none() && lexical_hits.is_none() {
            return Err(QuarryError::retrieval_failed(
                "semantic and lexical stages were both unavailable for this query",
            ));
        }
        let degraded = semantic_hits.is_none() || lexical_hits.is_none();

        let mut merged: HashMap<ChunkId, CandidateAccumulator> = HashMap::new();
        self.merge_stage(
            &mut merged,
            semantic_hits.unwrap_or_default(),
            SourceChannel::Semantic,
        )
        .await?;
        self.merge_stage(
            &mut merged,
            lexical_hits.unwrap_or_default(),
            SourceChannel::Lexical,
        )
        .await?;

        let total_considered = merged.len();
        let candidates = rank(merged, &self.config, request.top_k);

        tracing::debug!(
            query = %request.query,
            returned = candidates.len(),
            considered = total_considered,
            degraded,
            "retrieval complete"
        );

        let ranked = RankedCandidates {
            candidates,
            degraded,
            total_considered,
            elapsed: start.elapsed(),
        };
        self.record_history(request, &ranked);
        Ok(ranked)
    }

    /// Retrieve and pack in one step, using the configured character budget.
    pub async fn retrieve_context(
        &self,
        request: &RetrievalRequest,
    ) -> QuarryResult<RetrievalContext> {
        let ranked = self.retrieve(request).await?;
        ContextPacker::new().pack(&ranked, self.config.max_context_chars)
    }

    /// Replace a document's entire chunk generation across the chunk store,
    /// the lexical index, and the vector index.
    ///
    /// Per structure the old generation is fully removed before the new one
    /// is inserted, so no query observes a mixed set. Chunks without a
    /// cached embedding are excluded from the vector index (they still
    /// participate in lexical search). Invalidates the embedding cache.
    pub async fn replace_document(
        &self,
        document_id: &str,
        chunks: Vec<Chunk>,
    ) -> QuarryResult<()> {
        self.chunk_store
            .replace_document(document_id, chunks.clone())
            .await?;
        self.lexical.replace_document(document_id, &chunks);

        let records: Vec<VectorRecord> = chunks
            .iter()
            .filter_map(|chunk| {
                chunk.embedding.clone().map(|embedding| VectorRecord {
                    chunk_id: chunk.id.clone(),
                    document_id: chunk.document_id.clone(),
                    category: chunk.category.clone(),
                    embedding,
                })
            })
            .collect();
        let unvectorized = chunks.len() - records.len();
        if unvectorized > 0 {
            tracing::debug!(
                document_id,
                unvectorized,
                "chunks without embeddings stay lexical-only"
            );
        }

        self.vector_index.remove_document(document_id).await?;
        if !records.is_empty() {
            self.vector_index.upsert(records).await?;
        }

        self.cache.clear();
        tracing::info!(document_id, chunks = chunks.len(), "replaced chunk generation");
        Ok(())
    }

    /// Remove a document's chunks from every structure. Invalidates the
    /// embedding cache.
    pub async fn remove_document(&self, document_id: &str) -> QuarryResult<()> {
        self.chunk_store.remove_document(document_id).await?;
        self.lexical.remove_document(document_id);
        self.vector_index.remove_document(document_id).await?;
        self.cache.clear();
        tracing::info!(document_id, "removed document");
        Ok(())
    }

    fn validate_request(&self, request: &RetrievalRequest) -> QuarryResult<()> {
        if request.query.trim().is_empty() {
            return Err(QuarryError::validation("query must not be empty"));
        }
        if request.top_k == 0 {
            return Err(QuarryError::validation("top_k must be positive"));
        }
        if let Some(threshold) = request.similarity_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(QuarryError::validation(format!(
                    "similarity_threshold must be in [0, 1], got {threshold}"
                )));
            }
        }
        Ok(())
    }

    async fn semantic_stage(
        &self,
        query: &str,
        fetch_k: usize,
        threshold: f32,
        filter: Option<&CategoryFilter>,
    ) -> QuarryResult<Vec<(ChunkId, f32)>> {
        let embedding = match self.cache.get(query) {
            Some(cached) => cached,
            None => {
                let embedding = self.embedder.embed(query).await?;
                self.cache.insert(query, embedding.clone());
                embedding
            }
        };

        let hits = self.vector_index.nearest(&embedding, fetch_k, filter).await?;
        Ok(hits
            .into_iter()
            .filter(|(_, similarity)| *similarity >= threshold)
            .collect())
    }

    /// Fold one stage's hits into the merged candidate map.
    ///
    /// A chunk sighted twice keeps the max raw score per stage. Hits whose
    /// chunk has vanished from the store are logged and skipped; a stale
    /// index entry must not abort the query.
    async fn merge_stage(
        &self,
        merged: &mut HashMap<ChunkId, CandidateAccumulator>,
        hits: Vec<(ChunkId, f32)>,
        channel: SourceChannel,
    ) -> QuarryResult<()> {
        for (id, score) in hits {
            if let Some(acc) = merged.get_mut(&id) {
                let slot = match channel {
                    SourceChannel::Semantic => &mut acc.semantic,
                    _ => &mut acc.lexical,
                };
                *slot = Some(slot.map_or(score, |existing| existing.max(score)));
                acc.channel = acc.channel.merge(channel);
                continue;
            }

            let Some(chunk) = self.chunk_store.get(&id).await? else {
                let err = QuarryError::IndexInconsistent { chunk_id: id };
                tracing::warn!(error = %err, "skipping stale index hit");
                continue;
            };
            let (semantic, lexical) = match channel {
                SourceChannel::Semantic => (Some(score), None),
                _ => (None, Some(score)),
            };
            merged.insert(
                chunk.id.clone(),
                CandidateAccumulator {
                    chunk,
                    semantic,
                    lexical,
                    channel,
                },
            );
        }
        Ok(())
    }

    fn record_history(&self, request: &RetrievalRequest, ranked: &RankedCandidates) {
        let Some(sink) = &self.history else {
            return;
        };
        let record = QueryRecord {
            query_text: request.query.clone(),
            category_filter: request.category_filter.clone(),
            result_count: ranked.len(),
            retrieval_time: ranked.elapsed,
            chunk_ids: ranked
                .candidates
                .iter()
                .map(|c| c.chunk.id.clone())
                .collect(),
            degraded: ranked.degraded,
            created_at: Utc::now(),
        };
        let sink = Arc::clone(sink);
        tokio::spawn(async move {
            if let Err(err) = sink.record(record).await {
                tracing::warn!(error = %err, "query history sink failed");
            }
        });
    }
}

/// Normalize per stage, fuse, sort deterministically, truncate.
fn rank(
    merged: HashMap<ChunkId, CandidateAccumulator>,
    config: &RetrieverConfig,
    top_k: usize,
) -> Vec<RetrievalCandidate> {
    let semantic_raw: Vec<(ChunkId, f32)> = merged
        .iter()
        .filter_map(|(id, acc)| acc.semantic.map(|s| (id.clone(), s)))
        .collect();
    let lexical_raw: Vec<(ChunkId, f32)> = merged
        .iter()
        .filter_map(|(id, acc)| acc.lexical.map(|s| (id.clone(), s)))
        .collect();
    let semantic_norm = min_max_normalize(&semantic_raw);
    let lexical_norm = min_max_normalize(&lexical_raw);

    let mut candidates: Vec<RetrievalCandidate> = merged
        .into_iter()
        .map(|(id, acc)| {
            let fused = config.fusion.fuse(
                acc.semantic.and(semantic_norm.get(&id).copied()),
                acc.lexical.and(lexical_norm.get(&id).copied()),
            );
            RetrievalCandidate {
                chunk: acc.chunk,
                semantic_score: acc.semantic,
                lexical_score: acc.lexical,
                fused_score: fused,
                source_channel: acc.channel,
            }
        })
        .collect();

    // Fused score descending; ties break by sequence_index, then document
    // id, then chunk id, so identical corpora rank identically run to run.
    candidates.sort_by(|a, b| {
        OrderedFloat(b.fused_score)
            .cmp(&OrderedFloat(a.fused_score))
            .then_with(|| a.chunk.sequence_index.cmp(&b.chunk.sequence_index))
            .then_with(|| a.chunk.document_id.cmp(&b.chunk.document_id))
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
    candidates.truncate(top_k);
    candidates
}
