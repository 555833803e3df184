//! Configuration system for the retrieval core.
//!
//! All tunables the pipeline depends on live here as explicit parameters
//! with documented defaults, instead of constants buried in the code.
//! `validate()` runs the fail-fast checks before any retrieval is served:
//! a process with invalid weights or thresholds must not take traffic.

use serde::{Deserialize, Serialize};

use crate::error::{QuarryError, QuarryResult};
use crate::retrieval::{Bm25Params, FusionWeights};

/// Bounded embedding cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of cached query embeddings. 0 disables the cache.
    pub max_entries: usize,
    /// Time-to-live for a cached entry, in seconds.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 100,
            ttl_secs: 300,
        }
    }
}

/// Main configuration for the hybrid retriever.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    /// Stage weights for score fusion.
    pub fusion: FusionWeights,
    /// Default similarity floor for the semantic stage, in [0, 1].
    /// Requests may override it per call.
    pub similarity_threshold: f32,
    /// The semantic stage fetches `top_k * candidate_multiplier` nearest
    /// neighbors before thresholding. Must be at least 2.
    pub candidate_multiplier: usize,
    /// Per-stage timeout in milliseconds. A stage that exceeds it is
    /// dropped and the call degrades to whatever completed.
    pub stage_timeout_ms: u64,
    /// Character budget for packed context.
    pub max_context_chars: usize,
    /// BM25 parameters for the lexical stage.
    pub bm25: Bm25Params,
    /// Query embedding cache settings.
    pub cache: CacheConfig,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            fusion: FusionWeights::default(),
            similarity_threshold: 0.7,
            candidate_multiplier: 2,
            stage_timeout_ms: 5_000,
            max_context_chars: 4_000,
            bm25: Bm25Params::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl RetrieverConfig {
    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<std::path::Path>) -> QuarryResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        let config: Self = match ext {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| QuarryError::configuration(e.to_string()))?
            }
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| QuarryError::configuration(e.to_string()))?,
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .map_err(|e| QuarryError::configuration(e.to_string()))?,
            _ => {
                return Err(QuarryError::configuration(
                    "unsupported config file format, use .toml, .json, or .yaml",
                ))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables, starting from the
    /// defaults. Unset or unparsable variables keep their defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_parse("QUARRY_SEMANTIC_WEIGHT") {
            config.fusion.semantic = v;
        }
        if let Some(v) = env_parse("QUARRY_LEXICAL_WEIGHT") {
            config.fusion.lexical = v;
        }
        if let Some(v) = env_parse("QUARRY_SIMILARITY_THRESHOLD") {
            config.similarity_threshold = v;
        }
        if let Some(v) = env_parse("QUARRY_CANDIDATE_MULTIPLIER") {
            config.candidate_multiplier = v;
        }
        if let Some(v) = env_parse("QUARRY_STAGE_TIMEOUT_MS") {
            config.stage_timeout_ms = v;
        }
        if let Some(v) = env_parse("QUARRY_MAX_CONTEXT_CHARS") {
            config.max_context_chars = v;
        }

        config
    }

    /// Fail-fast validation of every tunable.
    ///
    /// # Errors
    /// Returns [`QuarryError::Configuration`] on the first invalid value.
    pub fn validate(&self) -> QuarryResult<()> {
        self.fusion.validate()?;

        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(QuarryError::configuration(format!(
                "similarity_threshold must be in [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if self.candidate_multiplier < 2 {
            return Err(QuarryError::configuration(format!(
                "candidate_multiplier must be at least 2, got {}",
                self.candidate_multiplier
            )));
        }
        if self.stage_timeout_ms == 0 {
            return Err(QuarryError::configuration(
                "stage_timeout_ms must be positive",
            ));
        }
        if self.max_context_chars == 0 {
            return Err(QuarryError::configuration(
                "max_context_chars must be positive",
            ));
        }
        self.bm25.validate()?;
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
