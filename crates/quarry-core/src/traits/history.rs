//! Query history sink trait.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QuarryResult;
use crate::types::{CategoryFilter, ChunkId};

/// Retrieval statistics recorded for one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRecord {
    /// The query as issued by the caller.
    pub query_text: String,
    /// Category filter applied, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_filter: Option<CategoryFilter>,
    /// Number of candidates returned.
    pub result_count: usize,
    /// Wall-clock retrieval time.
    pub retrieval_time: Duration,
    /// Ids of the returned chunks, in rank order.
    pub chunk_ids: Vec<ChunkId>,
    /// Whether the result was assembled in degraded (single-stage) form.
    pub degraded: bool,
    /// When the query ran.
    pub created_at: DateTime<Utc>,
}

/// Receives retrieval statistics for later inspection.
///
/// Strictly fire-and-forget from the retriever's point of view: the engine
/// spawns the write and a sink failure is logged, never surfaced to the
/// caller of `retrieve`.
#[async_trait]
pub trait QueryHistorySink: Send + Sync {
    /// Persist one query record.
    async fn record(&self, record: QueryRecord) -> QuarryResult<()>;
}
