//! Embedding providers and the retrying [`EmbeddingGenerator`] in front of them.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::VaultConfig;
use crate::error::{Result, VaultError};
use crate::retry::RetryPolicy;

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends behind a unified async
/// interface. The default [`embed_batch`](EmbeddingProvider::embed_batch)
/// implementation calls [`embed`](EmbeddingProvider::embed) sequentially;
/// backends that support native batching should override it.
///
/// Backends report an unreachable or misconfigured service as
/// [`VaultError::EmbeddingUnavailable`].
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs, in input order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// Short backend name used in errors and logs.
    fn name(&self) -> &str {
        "custom"
    }
}

/// Turns text into fixed-length vectors through an explicit backend handle.
///
/// Adds what every caller relies on regardless of backend: one vector per
/// input in input order, the advertised dimension on every vector, and a
/// single retry with backoff when the backend is unavailable.
#[derive(Clone)]
pub struct EmbeddingGenerator {
    provider: Arc<dyn EmbeddingProvider>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for EmbeddingGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingGenerator")
            .field("provider", &self.provider.name())
            .field("dimensions", &self.provider.dimensions())
            .field("retry", &self.retry)
            .finish()
    }
}

impl EmbeddingGenerator {
    /// Wrap a provider with the default retry policy (one retry after 200 ms).
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { provider, retry: RetryPolicy::default() }
    }

    /// Wrap a provider using the retry settings from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Config`] if `config.embedding_dimension` is set
    /// and differs from the provider's dimension.
    pub fn from_config(provider: Arc<dyn EmbeddingProvider>, config: &VaultConfig) -> Result<Self> {
        if let Some(expected) = config.embedding_dimension {
            if expected != provider.dimensions() {
                return Err(VaultError::Config(format!(
                    "embedding_dimension is {expected} but provider '{}' produces {}",
                    provider.name(),
                    provider.dimensions()
                )));
            }
        }
        let retry = RetryPolicy::new(config.embedding_max_retries, config.embedding_retry_backoff());
        Ok(Self { provider, retry })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Embed one text.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::EmbeddingUnavailable`] once the retry budget is spent.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.retry.execute("embed", || self.embed_once(text)).await
    }

    /// Embed a batch of texts; the output has one vector per input, in order.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::EmbeddingUnavailable`] once the retry budget is spent.
    pub async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(provider = self.provider.name(), batch_size = texts.len(), "embedding batch");
        self.retry.execute("embed_batch", || self.embed_batch_once(texts)).await
    }

    async fn embed_once(&self, text: &str) -> Result<Vec<f32>> {
        let vector = self.provider.embed(text).await?;
        self.check_dimension(&vector)?;
        Ok(vector)
    }

    async fn embed_batch_once(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let vectors = self.provider.embed_batch(texts).await?;
        if vectors.len() != texts.len() {
            return Err(self.unavailable(format!(
                "backend returned {} vectors for {} inputs",
                vectors.len(),
                texts.len()
            )));
        }
        for vector in &vectors {
            self.check_dimension(vector)?;
        }
        Ok(vectors)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        let expected = self.provider.dimensions();
        if vector.len() != expected {
            return Err(self.unavailable(format!(
                "backend returned a {}-dimensional vector, expected {expected}",
                vector.len()
            )));
        }
        Ok(())
    }

    fn unavailable(&self, message: String) -> VaultError {
        VaultError::EmbeddingUnavailable { provider: self.provider.name().to_string(), message }
    }
}
