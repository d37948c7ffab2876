//! Tenant-scoped access to a [`VectorIndex`].
//!
//! The [`VectorStoreManager`] is the only component that mutates the index.
//! It resolves every tenant to its own collection, creates that collection
//! exactly once, serialises writes per tenant, and commits each ingest batch
//! atomically.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OnceCell, RwLock};
use tracing::{debug, error, info};

use crate::document::{Chunk, MetadataFilter, ScoredChunk};
use crate::embedding::EmbeddingGenerator;
use crate::error::{Result, VaultError};
use crate::metric::DistanceMetric;
use crate::tenant::{CollectionName, TenantId};
use crate::vectorstore::{CollectionStats, VectorIndex};

/// A resolved tenant collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionHandle {
    pub tenant: TenantId,
    pub name: CollectionName,
    pub dimensions: usize,
}

/// Result of [`VectorStoreManager::add_chunks`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddOutcome {
    /// Chunks persisted by this call.
    pub added: usize,
    /// Chunks whose id was already stored, or repeated within the batch.
    pub skipped: usize,
}

#[derive(Default)]
struct TenantSlot {
    collection: OnceCell<CollectionHandle>,
    write: Mutex<()>,
}

/// Owns the vector index and the per-tenant collections inside it.
pub struct VectorStoreManager {
    index: Arc<dyn VectorIndex>,
    embedder: EmbeddingGenerator,
    metric: DistanceMetric,
    slots: RwLock<HashMap<TenantId, Arc<TenantSlot>>>,
}

impl std::fmt::Debug for VectorStoreManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStoreManager")
            .field("backend", &self.index.backend())
            .field("embedder", &self.embedder)
            .field("metric", &self.metric)
            .finish()
    }
}

impl VectorStoreManager {
    pub fn new(index: Arc<dyn VectorIndex>, embedder: EmbeddingGenerator, metric: DistanceMetric) -> Self {
        Self { index, embedder, metric, slots: RwLock::new(HashMap::new()) }
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub fn embedder(&self) -> &EmbeddingGenerator {
        &self.embedder
    }

    async fn slot(&self, tenant: &TenantId) -> Arc<TenantSlot> {
        if let Some(slot) = self.slots.read().await.get(tenant) {
            return slot.clone();
        }
        self.slots.write().await.entry(tenant.clone()).or_default().clone()
    }

    /// Resolve the tenant's collection, creating it on first use.
    ///
    /// Concurrent first calls for one tenant create the backend collection once.
    pub async fn get_or_create_collection(&self, tenant: &TenantId) -> Result<CollectionHandle> {
        let slot = self.slot(tenant).await;
        self.ensure_collection(tenant, &slot).await
    }

    async fn ensure_collection(&self, tenant: &TenantId, slot: &TenantSlot) -> Result<CollectionHandle> {
        slot.collection
            .get_or_try_init(|| async {
                let dimensions = self.embedder.dimensions();
                let created = self.index.create_collection(tenant, dimensions).await?;
                if created {
                    info!(tenant = %tenant, dimensions, backend = self.index.backend(), "created collection");
                }
                Ok::<_, VaultError>(CollectionHandle {
                    tenant: tenant.clone(),
                    name: tenant.collection_name(),
                    dimensions,
                })
            })
            .await
            .cloned()
    }

    /// Embed and persist `chunks` for `tenant` as one atomic batch.
    ///
    /// Chunks whose id is already stored (or repeated within the batch) are
    /// skipped. Chunks without an embedding are embedded in a single call.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::IngestBatchFailed`] naming the failed step; in
    /// that case nothing from the batch was persisted.
    pub async fn add_chunks(&self, tenant: &TenantId, chunks: Vec<Chunk>) -> Result<AddOutcome> {
        if chunks.is_empty() {
            return Ok(AddOutcome::default());
        }

        let slot = self.slot(tenant).await;
        let handle = self
            .ensure_collection(tenant, &slot)
            .await
            .map_err(|e| self.batch_failed(tenant, "create_collection", e))?;
        let _write = slot.write.lock().await;

        if let Some(foreign) = chunks.iter().find(|c| c.tenant_id.as_ref().is_some_and(|t| t != tenant)) {
            let owner = foreign.tenant_id.as_ref().map(TenantId::as_str).unwrap_or_default();
            let e = VaultError::InvalidTenantId(format!("chunk '{}' belongs to tenant '{owner}'", foreign.id));
            return Err(self.batch_failed(tenant, "validate", e));
        }

        let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        let existing = self
            .index
            .existing_ids(&handle.name, &ids)
            .await
            .map_err(|e| self.batch_failed(tenant, "lookup", e))?;

        let total = chunks.len();
        let mut seen = HashSet::with_capacity(total);
        let mut fresh: Vec<Chunk> = chunks
            .into_iter()
            .filter(|c| !existing.contains(&c.id) && seen.insert(c.id.clone()))
            .collect();
        let skipped = total - fresh.len();

        if fresh.is_empty() {
            debug!(tenant = %tenant, skipped, "all chunks already stored");
            return Ok(AddOutcome { added: 0, skipped });
        }

        self.embed_missing(&mut fresh).await.map_err(|e| self.batch_failed(tenant, "embed", e))?;

        for chunk in &mut fresh {
            if chunk.embedding.len() != handle.dimensions {
                let e = VaultError::DimensionMismatch { expected: handle.dimensions, actual: chunk.embedding.len() };
                return Err(self.batch_failed(tenant, "validate", e));
            }
            chunk.tenant_id = Some(tenant.clone());
        }

        let added = fresh.len();
        self.index
            .insert_batch(&handle.name, fresh)
            .await
            .map_err(|e| self.batch_failed(tenant, "persist", e))?;

        info!(tenant = %tenant, added, skipped, "chunks added");
        Ok(AddOutcome { added, skipped })
    }

    async fn embed_missing(&self, chunks: &mut [Chunk]) -> Result<()> {
        let pending: Vec<usize> = (0..chunks.len()).filter(|&i| !chunks[i].is_embedded()).collect();
        if pending.is_empty() {
            return Ok(());
        }
        let texts: Vec<&str> = pending.iter().map(|&i| chunks[i].text.as_str()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        for (i, vector) in pending.into_iter().zip(vectors) {
            chunks[i].embedding = vector;
        }
        Ok(())
    }

    fn batch_failed(&self, tenant: &TenantId, operation: &'static str, e: VaultError) -> VaultError {
        error!(tenant = %tenant, operation, error = %e, "ingest batch failed");
        VaultError::ingest_failed(tenant, operation, e)
    }

    /// The `k` chunks of `tenant` nearest to `query`, optionally filtered.
    ///
    /// An unknown tenant or `k == 0` yields an empty list.
    pub async fn query(
        &self,
        tenant: &TenantId,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredChunk>> {
        let name = tenant.collection_name();
        if k == 0 || !self.index.collection_exists(&name).await? {
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed(query).await.map_err(|e| {
            error!(tenant = %tenant, error = %e, "embedding failed during query");
            e
        })?;
        let filter = filter.filter(|f| !f.is_empty());
        let hits = self.index.search(&name, &vector, k, self.metric, filter).await.map_err(|e| {
            error!(tenant = %tenant, error = %e, "vector index search failed");
            e
        })?;

        debug!(tenant = %tenant, result_count = hits.len(), "query completed");
        Ok(hits)
    }

    /// Figures for the tenant's collection; zeros if it has none.
    pub async fn stats(&self, tenant: &TenantId) -> Result<CollectionStats> {
        Ok(self.index.collection_stats(&tenant.collection_name()).await?.unwrap_or_default())
    }

    /// Irreversibly delete the tenant's collection and all its chunks.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::TenantNotFound`] if the tenant has no collection.
    pub async fn delete_collection(&self, tenant: &TenantId) -> Result<()> {
        let slot = self.slot(tenant).await;
        let _write = slot.write.lock().await;

        let deleted = self.index.delete_collection(&tenant.collection_name()).await.map_err(|e| {
            error!(tenant = %tenant, error = %e, "failed to delete collection");
            e
        })?;
        self.slots.write().await.remove(tenant);

        if !deleted {
            return Err(VaultError::TenantNotFound(tenant.clone()));
        }
        info!(tenant = %tenant, "deleted collection");
        Ok(())
    }

    /// Tenants that currently have a collection, sorted.
    pub async fn tenants(&self) -> Result<Vec<TenantId>> {
        let mut tenants: Vec<TenantId> =
            self.index.list_collections().await?.into_iter().map(|info| info.owner).collect();
        tenants.sort();
        Ok(tenants)
    }
}
