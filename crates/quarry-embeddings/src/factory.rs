//! Factory for creating embedding providers.

use std::sync::Arc;

use quarry_core::error::QuarryResult;
use quarry_core::traits::{Embedder, EmbedderConfig, EmbedderProvider};

use crate::ollama::OllamaEmbedder;
use crate::openai::OpenAiEmbedder;

/// Factory for creating embedding providers.
pub struct EmbedderFactory;

impl EmbedderFactory {
    /// Create an embedder from the given configuration.
    pub fn create(
        provider: EmbedderProvider,
        config: EmbedderConfig,
    ) -> QuarryResult<Arc<dyn Embedder>> {
        match provider {
            EmbedderProvider::Ollama => Ok(Arc::new(OllamaEmbedder::new(config)?)),
            EmbedderProvider::OpenAiCompatible => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        }
    }

    /// Create an Ollama embedder with the default model.
    pub fn ollama() -> QuarryResult<Arc<dyn Embedder>> {
        Self::create(EmbedderProvider::Ollama, EmbedderConfig::default())
    }

    /// Create an Ollama embedder with a specific model.
    pub fn ollama_with_model(model: impl Into<String>, dims: usize) -> QuarryResult<Arc<dyn Embedder>> {
        let config = EmbedderConfig {
            model: model.into(),
            embedding_dims: dims,
            ..Default::default()
        };
        Self::create(EmbedderProvider::Ollama, config)
    }

    /// Create an embedder for any OpenAI-compatible endpoint.
    pub fn openai_compatible(
        base_url: impl Into<String>,
        model: impl Into<String>,
        dims: usize,
    ) -> QuarryResult<Arc<dyn Embedder>> {
        let config = EmbedderConfig {
            model: model.into(),
            embedding_dims: dims,
            base_url: Some(base_url.into()),
            api_key: None,
        };
        Self::create(EmbedderProvider::OpenAiCompatible, config)
    }
}
