//! quarry-embeddings - Embedding provider implementations for quarry.
//!
//! Both providers are thin HTTP clients; the retrieval core has no
//! compile-time dependency on any vendor SDK.
//!
//! # Supported Providers
//!
//! - **Ollama** - local models via Ollama's `/api/embeddings`
//! - **OpenAI-compatible** - any server speaking the OpenAI embeddings API
//!   (OpenAI itself, LM Studio, vLLM, ...)
//!
//! # Example
//!
//! ```ignore
//! use quarry_embeddings::EmbedderFactory;
//!
//! // Local Ollama with the default model
//! let embedder = EmbedderFactory::ollama()?;
//!
//! // LM Studio's OpenAI-compatible endpoint
//! let embedder = EmbedderFactory::openai_compatible(
//!     "http://localhost:1234/v1",
//!     "text-embedding-nomic-embed-text-v1.5",
//!     768,
//! )?;
//! ```

mod factory;
mod ollama;
mod openai;

pub use factory::EmbedderFactory;
pub use ollama::OllamaEmbedder;
pub use openai::OpenAiEmbedder;

// Re-export core types for convenience
pub use quarry_core::traits::{Embedder, EmbedderConfig, EmbedderProvider};
