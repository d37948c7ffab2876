//! The retrieval engine: the public entry point of the vault.
//!
//! [`RetrievalEngine`] composes the [`ChunkingOrchestrator`] and the
//! [`VectorStoreManager`] into the two caller-facing operations, `ingest`
//! and `retrieve`, plus per-tenant housekeeping.
//!
//! # Example
//!
//! ```rust,ignore
//! use vault_rag::{Document, HashEmbeddingProvider, RetrievalEngine, TenantId, VaultConfig};
//!
//! let engine = RetrievalEngine::builder()
//!     .config(VaultConfig::default())
//!     .embedding_provider(Arc::new(HashEmbeddingProvider::default()))
//!     .build()?;
//!
//! let tenant = TenantId::new("acme")?;
//! engine.ingest(&tenant, &Document::new(text)).await?;
//! let hits = engine.retrieve(&tenant, "quarterly revenue", 3, None).await?;
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::chunking::ChunkingStrategy;
use crate::config::VaultConfig;
use crate::document::{Document, MetadataFilter, RetrievedChunk};
use crate::embedding::{EmbeddingGenerator, EmbeddingProvider};
use crate::error::{Result, VaultError};
use crate::inmemory::InMemoryVectorIndex;
use crate::manager::VectorStoreManager;
use crate::orchestrator::ChunkingOrchestrator;
use crate::retry::RetryPolicy;
use crate::tenant::TenantId;
use crate::vectorstore::{CollectionStats, VectorIndex};

/// What an ingest call did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub document_id: String,
    pub chunks_added: usize,
    /// Chunks already stored from an earlier ingest of the same document.
    pub chunks_skipped: usize,
    pub strategy_used: ChunkingStrategy,
    pub fallback_used: bool,
    /// Mean chunk confidence.
    pub confidence: f32,
}

/// Multi-tenant ingest and retrieval.
///
/// Holds no state of its own beyond its two components. Construct one via
/// [`RetrievalEngine::builder()`].
#[derive(Debug)]
pub struct RetrievalEngine {
    config: VaultConfig,
    orchestrator: ChunkingOrchestrator,
    manager: VectorStoreManager,
}

impl RetrievalEngine {
    /// Create a new [`RetrievalEngineBuilder`].
    pub fn builder() -> RetrievalEngineBuilder {
        RetrievalEngineBuilder::default()
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn manager(&self) -> &VectorStoreManager {
        &self.manager
    }

    /// Chunk, embed and store a document for `tenant`, letting the
    /// orchestrator pick the strategy.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Chunking`] for malformed documents and
    /// [`VaultError::IngestBatchFailed`] if embedding or persisting fails;
    /// either way nothing is stored.
    pub async fn ingest(&self, tenant: &TenantId, document: &Document) -> Result<IngestSummary> {
        self.ingest_inner(tenant, document, None).await
    }

    /// Like [`ingest`](Self::ingest) with a forced strategy.
    pub async fn ingest_with_strategy(
        &self,
        tenant: &TenantId,
        document: &Document,
        strategy: ChunkingStrategy,
    ) -> Result<IngestSummary> {
        self.ingest_inner(tenant, document, Some(strategy)).await
    }

    async fn ingest_inner(
        &self,
        tenant: &TenantId,
        document: &Document,
        strategy: Option<ChunkingStrategy>,
    ) -> Result<IngestSummary> {
        let outcome = self.orchestrator.process(document, strategy).await.map_err(|e| {
            error!(tenant = %tenant, document.id = %document.id, error = %e, "chunking failed");
            e
        })?;

        let added = self.manager.add_chunks(tenant, outcome.chunks).await?;

        info!(
            tenant = %tenant,
            document.id = %document.id,
            strategy = %outcome.strategy_used,
            fallback_used = outcome.fallback_used,
            chunks_added = added.added,
            chunks_skipped = added.skipped,
            "ingested document"
        );

        Ok(IngestSummary {
            document_id: document.id.clone(),
            chunks_added: added.added,
            chunks_skipped: added.skipped,
            strategy_used: outcome.strategy_used,
            fallback_used: outcome.fallback_used,
            confidence: outcome.confidence,
        })
    }

    /// The `k` chunks of `tenant` most similar to `query`, nearest first.
    ///
    /// Only the tenant's own collection is searched. An unknown tenant
    /// yields an empty list.
    pub async fn retrieve(
        &self,
        tenant: &TenantId,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievedChunk>> {
        let hits = self.manager.query(tenant, query, k, filter).await?;
        info!(tenant = %tenant, k, result_count = hits.len(), "retrieve completed");
        Ok(hits.into_iter().map(RetrievedChunk::from).collect())
    }

    pub async fn stats(&self, tenant: &TenantId) -> Result<CollectionStats> {
        self.manager.stats(tenant).await
    }

    /// Delete everything stored for `tenant`.
    pub async fn delete_tenant(&self, tenant: &TenantId) -> Result<()> {
        self.manager.delete_collection(tenant).await
    }

    pub async fn tenants(&self) -> Result<Vec<TenantId>> {
        self.manager.tenants().await
    }
}

/// Builder for constructing a [`RetrievalEngine`].
///
/// Only the embedding provider is required; the config defaults to
/// [`VaultConfig::default()`] and the index to an [`InMemoryVectorIndex`].
///
/// # Example
///
/// ```rust,ignore
/// let engine = RetrievalEngine::builder()
///     .config(config)
///     .embedding_provider(Arc::new(embedder))
///     .vector_index(Arc::new(FileVectorIndex::open("./vault-data")?))
///     .build()?;
/// ```
#[derive(Default)]
pub struct RetrievalEngineBuilder {
    config: Option<VaultConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_index: Option<Arc<dyn VectorIndex>>,
    retry_policy: Option<RetryPolicy>,
}

impl RetrievalEngineBuilder {
    pub fn config(mut self, config: VaultConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    pub fn vector_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.vector_index = Some(index);
        self
    }

    /// Override the retry policy derived from the config.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Build the [`RetrievalEngine`].
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Config`] if the provider is missing, the config
    /// is invalid, or the provider's dimension contradicts the config.
    pub fn build(self) -> Result<RetrievalEngine> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let provider = self
            .embedding_provider
            .ok_or_else(|| VaultError::Config("embedding_provider is required".to_string()))?;
        let index = self.vector_index.unwrap_or_else(|| Arc::new(InMemoryVectorIndex::new()));

        let mut embedder = EmbeddingGenerator::from_config(provider, &config)?;
        if let Some(policy) = self.retry_policy {
            embedder = embedder.with_retry_policy(policy);
        }

        Ok(RetrievalEngine {
            orchestrator: ChunkingOrchestrator::new(config.clone(), embedder.clone()),
            manager: VectorStoreManager::new(index, embedder, config.distance_metric),
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::HashEmbeddingProvider;

    fn engine() -> RetrievalEngine {
        RetrievalEngine::builder()
            .embedding_provider(Arc::new(HashEmbeddingProvider::default()))
            .build()
            .unwrap()
    }

    #[test]
    fn provider_is_required() {
        assert!(matches!(RetrievalEngine::builder().build(), Err(VaultError::Config(_))));
    }

    #[tokio::test]
    async fn ingest_then_retrieve() {
        let engine = engine();
        let tenant = TenantId::new("acme").unwrap();
        let summary = engine
            .ingest(&tenant, &Document::new("The orbital launch window opens at dawn."))
            .await
            .unwrap();
        assert_eq!(summary.chunks_added, 1);
        assert!(!summary.fallback_used);

        let hits = engine.retrieve(&tenant, "orbital launch window", 3, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata["tenant_id"], "acme");
        assert_eq!(hits[0].metadata["document_id"], summary.document_id);
    }

    #[tokio::test]
    async fn malformed_document_is_a_chunking_error() {
        let engine = engine();
        let tenant = TenantId::new("acme").unwrap();
        let err = engine.ingest(&tenant, &Document::new("")).await.unwrap_err();
        assert!(matches!(err, VaultError::Chunking(_)));
        assert!(engine.tenants().await.unwrap().is_empty());
    }
}
