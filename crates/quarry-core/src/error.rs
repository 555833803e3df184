//! Error types for quarry operations.
//!
//! The taxonomy distinguishes recoverable failures (an unreachable embedding
//! provider degrades retrieval to lexical-only) from fatal ones (both stages
//! unusable, invalid configuration at startup). An empty corpus is never an
//! error.

use thiserror::Error;

use crate::types::ChunkId;

/// Result type alias for quarry operations.
pub type QuarryResult<T> = Result<T, QuarryError>;

/// Main error type for all quarry operations.
#[derive(Error, Debug)]
pub enum QuarryError {
    /// The embedding provider could not be reached or returned garbage.
    ///
    /// Recoverable: the retriever degrades to lexical-only and flags the
    /// result as degraded instead of propagating this to the caller.
    #[error("embedding provider unavailable: {message}")]
    EmbeddingUnavailable {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Both retrieval stages were unusable for one query.
    ///
    /// This is "retrieval infrastructure down", not "no relevant documents";
    /// the latter is an empty, successful result.
    #[error("retrieval failed: {message}")]
    RetrievalFailed { message: String },

    /// Vector index operation failed.
    #[error("vector index error: {message}")]
    VectorIndex {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An index referenced a chunk the chunk store no longer has.
    ///
    /// Logged and skipped during retrieval; never aborts a whole query.
    #[error("chunk '{chunk_id}' referenced by an index is missing from the chunk store")]
    IndexInconsistent { chunk_id: ChunkId },

    /// Chunk store operation failed.
    #[error("chunk store error: {message}")]
    ChunkStore {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Input validation failed (bad request parameters, malformed chunks).
    #[error("validation error: {0}")]
    Validation(String),

    /// Invalid configuration. Fatal: detected by `validate()` before any
    /// retrieval is served.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Database operation failed (query history store).
    #[error("database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl QuarryError {
    /// Create an embedding-unavailable error.
    pub fn embedding_unavailable(message: impl Into<String>) -> Self {
        Self::EmbeddingUnavailable {
            message: message.into(),
            source: None,
        }
    }

    /// Create an embedding-unavailable error with an underlying cause.
    pub fn embedding_unavailable_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::EmbeddingUnavailable {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a retrieval-failed error.
    pub fn retrieval_failed(message: impl Into<String>) -> Self {
        Self::RetrievalFailed {
            message: message.into(),
        }
    }

    /// Create a vector index error.
    pub fn vector_index(message: impl Into<String>) -> Self {
        Self::VectorIndex {
            message: message.into(),
            source: None,
        }
    }

    /// Create a chunk store error.
    pub fn chunk_store(message: impl Into<String>) -> Self {
        Self::ChunkStore {
            message: message.into(),
            source: None,
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            source: None,
        }
    }

    /// Whether retrieval may continue in degraded form after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::EmbeddingUnavailable { .. } | Self::IndexInconsistent { .. }
        )
    }
}

impl From<rusqlite::Error> for QuarryError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}
