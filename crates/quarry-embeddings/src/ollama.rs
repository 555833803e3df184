//! Ollama embedding provider implementation.

use async_trait::async_trait;
use serde::Deserialize;

use quarry_core::error::{QuarryError, QuarryResult};
use quarry_core::traits::{Embedder, EmbedderConfig};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f64>,
}

/// Ollama embedding provider.
pub struct OllamaEmbedder {
    client: reqwest::Client,
    base_url: String,
    config: EmbedderConfig,
}

impl OllamaEmbedder {
    /// Create a new Ollama embedder.
    pub fn new(config: EmbedderConfig) -> QuarryResult<Self> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            config,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> QuarryResult<Vec<f32>> {
        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&serde_json::json!({
                "model": self.config.model,
                "prompt": text,
            }))
            .send()
            .await
            .map_err(|e| {
                QuarryError::embedding_unavailable_with_source(
                    format!("Ollama request to {} failed", self.base_url),
                    e,
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QuarryError::embedding_unavailable(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let parsed: EmbeddingsResponse = response.json().await.map_err(|e| {
            QuarryError::embedding_unavailable_with_source("invalid Ollama response", e)
        })?;

        if parsed.embedding.is_empty() {
            return Err(QuarryError::embedding_unavailable(
                "Ollama returned an empty embedding",
            ));
        }

        // Ollama returns f64, the pipeline works in f32.
        Ok(parsed.embedding.into_iter().map(|v| v as f32).collect())
    }

    fn dimension(&self) -> usize {
        self.config.embedding_dims
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let embedder = OllamaEmbedder::new(EmbedderConfig {
            base_url: Some("http://localhost:11434/".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(embedder.base_url, "http://localhost:11434");
    }

    #[test]
    fn reports_configured_model_and_dims() {
        let embedder = OllamaEmbedder::new(EmbedderConfig::default()).unwrap();
        assert_eq!(embedder.model_name(), "nomic-embed-text");
        assert_eq!(embedder.dimension(), 768);
    }
}
