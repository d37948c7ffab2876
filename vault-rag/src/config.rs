//! Configuration for the vault.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chunking::ChunkingStrategy;
use crate::error::{Result, VaultError};
use crate::metric::DistanceMetric;

/// Smallest accepted `target_chunk_size`.
const MIN_TARGET_CHUNK_SIZE: usize = 50;

/// Configuration parameters for chunking, embedding and retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VaultConfig {
    /// Target chunk size in characters.
    pub target_chunk_size: usize,
    /// Overlap between consecutive context-aware windows, as a fraction of the window.
    pub chunk_overlap_ratio: f32,
    /// Expected embedding dimension. When set, the backend must match it.
    pub embedding_dimension: Option<usize>,
    /// Distance used to rank search results.
    pub distance_metric: DistanceMetric,
    /// Strategy used when dynamic classification is disabled.
    pub default_strategy: ChunkingStrategy,
    /// Whether the orchestrator classifies content to pick a strategy.
    pub dynamic_classification: bool,
    /// Minimum adjacent-unit similarity for the semantic chunker to keep merging.
    pub semantic_similarity_threshold: f32,
    /// Delay before the first embedding retry, in milliseconds.
    pub embedding_retry_backoff_ms: u64,
    /// Number of retries for an unavailable embedding backend.
    pub embedding_max_retries: u32,
    /// Number of results returned when the caller does not specify `k`.
    pub default_top_k: usize,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            target_chunk_size: 1000,
            chunk_overlap_ratio: 0.15,
            embedding_dimension: None,
            distance_metric: DistanceMetric::Cosine,
            default_strategy: ChunkingStrategy::ContextAware,
            dynamic_classification: true,
            semantic_similarity_threshold: 0.35,
            embedding_retry_backoff_ms: 200,
            embedding_max_retries: 1,
            default_top_k: 5,
        }
    }
}

impl VaultConfig {
    /// Create a new builder for constructing a [`VaultConfig`].
    pub fn builder() -> VaultConfigBuilder {
        VaultConfigBuilder::default()
    }

    /// Build a config from `VAULT_*` environment variables on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Config`] if a variable cannot be parsed or the
    /// resulting config fails validation.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) but reads variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Self::default().with_overrides(lookup)
    }

    /// Apply `VAULT_*` overrides read through `lookup` to this config and validate it.
    pub fn with_overrides(self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut builder = VaultConfigBuilder { config: self };

        if let Some(v) = parse_var(&lookup, "VAULT_TARGET_CHUNK_SIZE")? {
            builder = builder.target_chunk_size(v);
        }
        if let Some(v) = parse_var(&lookup, "VAULT_CHUNK_OVERLAP_RATIO")? {
            builder = builder.chunk_overlap_ratio(v);
        }
        if let Some(v) = parse_var(&lookup, "VAULT_EMBEDDING_DIMENSION")? {
            builder = builder.embedding_dimension(v);
        }
        if let Some(v) = parse_var(&lookup, "VAULT_DISTANCE_METRIC")? {
            builder = builder.distance_metric(v);
        }
        if let Some(v) = parse_var(&lookup, "VAULT_DEFAULT_STRATEGY")? {
            builder = builder.default_strategy(v);
        }
        if let Some(v) = parse_var(&lookup, "VAULT_DYNAMIC_CLASSIFICATION")? {
            builder = builder.dynamic_classification(v);
        }
        if let Some(v) = parse_var(&lookup, "VAULT_SEMANTIC_THRESHOLD")? {
            builder = builder.semantic_similarity_threshold(v);
        }
        if let Some(v) = parse_var(&lookup, "VAULT_EMBEDDING_RETRY_BACKOFF_MS")? {
            builder = builder.embedding_retry_backoff_ms(v);
        }
        if let Some(v) = parse_var(&lookup, "VAULT_EMBEDDING_MAX_RETRIES")? {
            builder = builder.embedding_max_retries(v);
        }
        if let Some(v) = parse_var(&lookup, "VAULT_DEFAULT_TOP_K")? {
            builder = builder.default_top_k(v);
        }

        builder.build()
    }

    /// Overlap between consecutive context-aware windows in characters.
    pub fn chunk_overlap(&self) -> usize {
        overlap_for(self.target_chunk_size, self.chunk_overlap_ratio)
    }

    /// The initial embedding retry delay.
    pub fn embedding_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.embedding_retry_backoff_ms)
    }

    /// Check that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Config`] describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.target_chunk_size < MIN_TARGET_CHUNK_SIZE {
            return Err(VaultError::Config(format!(
                "target_chunk_size ({}) must be at least {MIN_TARGET_CHUNK_SIZE}",
                self.target_chunk_size
            )));
        }
        if !(0.0..=0.5).contains(&self.chunk_overlap_ratio) {
            return Err(VaultError::Config(format!(
                "chunk_overlap_ratio ({}) must be between 0.0 and 0.5",
                self.chunk_overlap_ratio
            )));
        }
        if !(-1.0..=1.0).contains(&self.semantic_similarity_threshold) {
            return Err(VaultError::Config(format!(
                "semantic_similarity_threshold ({}) must be between -1.0 and 1.0",
                self.semantic_similarity_threshold
            )));
        }
        if self.default_top_k == 0 {
            return Err(VaultError::Config("default_top_k must be greater than zero".to_string()));
        }
        if self.embedding_dimension == Some(0) {
            return Err(VaultError::Config(
                "embedding_dimension must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Overlap in characters for a window of `size` characters.
pub(crate) fn overlap_for(size: usize, ratio: f32) -> usize {
    ((size as f32) * ratio).round() as usize
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| VaultError::Config(format!("{key}='{raw}': {e}"))),
    }
}

/// Builder for constructing a validated [`VaultConfig`].
#[derive(Debug, Clone, Default)]
pub struct VaultConfigBuilder {
    config: VaultConfig,
}

impl VaultConfigBuilder {
    /// Set the target chunk size in characters.
    pub fn target_chunk_size(mut self, size: usize) -> Self {
        self.config.target_chunk_size = size;
        self
    }

    /// Set the context-aware window overlap as a fraction of the window.
    pub fn chunk_overlap_ratio(mut self, ratio: f32) -> Self {
        self.config.chunk_overlap_ratio = ratio;
        self
    }

    /// Pin the embedding dimension the backend must produce.
    pub fn embedding_dimension(mut self, dimension: usize) -> Self {
        self.config.embedding_dimension = Some(dimension);
        self
    }

    /// Set the distance metric used for ranking.
    pub fn distance_metric(mut self, metric: DistanceMetric) -> Self {
        self.config.distance_metric = metric;
        self
    }

    /// Set the strategy used when dynamic classification is disabled.
    pub fn default_strategy(mut self, strategy: ChunkingStrategy) -> Self {
        self.config.default_strategy = strategy;
        self
    }

    /// Enable or disable dynamic content classification.
    pub fn dynamic_classification(mut self, enabled: bool) -> Self {
        self.config.dynamic_classification = enabled;
        self
    }

    /// Set the semantic chunker's merge threshold.
    pub fn semantic_similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.semantic_similarity_threshold = threshold;
        self
    }

    /// Set the delay before the first embedding retry.
    pub fn embedding_retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.embedding_retry_backoff_ms = ms;
        self
    }

    /// Set how many times an unavailable embedding backend is retried.
    pub fn embedding_max_retries(mut self, retries: u32) -> Self {
        self.config.embedding_max_retries = retries;
        self
    }

    /// Set the number of results returned when `k` is not given.
    pub fn default_top_k(mut self, k: usize) -> Self {
        self.config.default_top_k = k;
        self
    }

    /// Build the [`VaultConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Config`] if any parameter is out of range.
    pub fn build(self) -> Result<VaultConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
