//! OpenAI-compatible embedding provider implementation.
//!
//! Talks the OpenAI embeddings wire format directly, which is also what
//! LM Studio, vLLM, and most local model servers expose. The API key is
//! optional - local servers ignore it.

use async_trait::async_trait;
use serde::Deserialize;

use quarry_core::error::{QuarryError, QuarryResult};
use quarry_core::traits::{Embedder, EmbedderConfig};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// OpenAI-compatible embedding provider.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    config: EmbedderConfig,
}

impl OpenAiEmbedder {
    /// Create a new OpenAI-compatible embedder.
    ///
    /// The API key comes from the config or the `OPENAI_API_KEY`
    /// environment variable; requests go out without authentication when
    /// neither is set.
    pub fn new(config: EmbedderConfig) -> QuarryResult<Self> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok());

        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            config,
        })
    }

    async fn request(&self, input: serde_json::Value) -> QuarryResult<EmbeddingsResponse> {
        let mut request = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&serde_json::json!({
                "model": self.config.model,
                "input": input,
            }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            QuarryError::embedding_unavailable_with_source(
                format!("embeddings request to {} failed", self.base_url),
                e,
            )
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QuarryError::embedding_unavailable(format!(
                "embeddings endpoint returned {status}: {body}"
            )));
        }

        response.json().await.map_err(|e| {
            QuarryError::embedding_unavailable_with_source("invalid embeddings response", e)
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> QuarryResult<Vec<f32>> {
        let parsed = self.request(serde_json::json!(text)).await?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| QuarryError::embedding_unavailable("no embedding returned"))
    }

    async fn embed_batch(&self, texts: &[String]) -> QuarryResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let parsed = self.request(serde_json::json!(texts)).await?;
        if parsed.data.len() != texts.len() {
            return Err(QuarryError::embedding_unavailable(format!(
                "requested {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimension(&self) -> usize {
        self.config.embedding_dims
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
