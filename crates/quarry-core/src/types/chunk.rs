//! Chunk types - the unit of retrieval.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{QuarryError, QuarryResult};

/// Unique, stable identifier for a chunk.
///
/// Stable across re-indexing: re-processing a document mints new ids for the
/// new chunk generation rather than reusing old ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

impl ChunkId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChunkId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ChunkId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A bounded segment of a source document's text - the atomic unit of
/// retrieval.
///
/// Chunks are immutable: `text` never changes after creation. Re-processing
/// a document produces a new generation of chunks and removes the old set
/// wholesale, so a query never observes a half-old/half-new mix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique identifier, stable across re-indexing.
    pub id: ChunkId,
    /// Owning document (back-reference only).
    pub document_id: String,
    /// Position of this chunk within its document. Unique per document.
    pub sequence_index: u32,
    /// The chunk's content. Never empty.
    pub text: String,
    /// Cached embedding vector. A chunk only participates in semantic
    /// search once this is present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Denormalized copy of the owning document's category, so both stages
    /// can filter without a join.
    pub category: String,
    /// Denormalized subcategory, when the classifier produced one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    /// Creation timestamp. Immutable.
    pub created_at: DateTime<Utc>,
}

impl Chunk {
    /// Create a new chunk with a generated id.
    ///
    /// # Errors
    /// Returns a validation error if `text` is empty or whitespace-only.
    pub fn new(
        document_id: impl Into<String>,
        sequence_index: u32,
        text: impl Into<String>,
        category: impl Into<String>,
    ) -> QuarryResult<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(QuarryError::validation("chunk text must not be empty"));
        }
        Ok(Self {
            id: ChunkId::generate(),
            document_id: document_id.into(),
            sequence_index,
            text,
            embedding: None,
            category: category.into(),
            subcategory: None,
            created_at: Utc::now(),
        })
    }

    /// Attach a cached embedding.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Attach a subcategory.
    pub fn with_subcategory(mut self, subcategory: impl Into<String>) -> Self {
        self.subcategory = Some(subcategory.into());
        self
    }

    /// Whether this chunk can participate in semantic search.
    pub fn is_vectorized(&self) -> bool {
        self.embedding.is_some()
    }
}

/// A set of category ids to restrict retrieval to.
///
/// Applied as a pre-filter during candidate generation in both stages, not
/// as post-hoc rejection, so each stage still yields its intended quantity
/// of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryFilter(BTreeSet<String>);

impl CategoryFilter {
    /// Build a filter from category ids.
    ///
    /// # Errors
    /// Returns a validation error for an empty set - use `None` at the call
    /// site to mean "no filter" instead.
    pub fn new<I, S>(categories: I) -> QuarryResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = categories.into_iter().map(Into::into).collect();
        if set.is_empty() {
            return Err(QuarryError::validation(
                "category filter must contain at least one category",
            ));
        }
        Ok(Self(set))
    }

    /// Whether a chunk category passes the filter.
    pub fn matches(&self, category: &str) -> bool {
        self.0.contains(category)
    }

    /// The category ids in the filter, in sorted order.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}
