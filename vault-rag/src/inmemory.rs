//! In-memory vector index.
//!
//! This module provides [`InMemoryVectorIndex`], a vector index backed by a
//! `HashMap` protected by a `tokio::sync::RwLock`. It is suitable for
//! development, testing, and small-scale use cases; nothing survives the
//! process.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::{Chunk, MetadataFilter, ScoredChunk};
use crate::error::{Result, VaultError};
use crate::metric::DistanceMetric;
use crate::tenant::{CollectionName, TenantId};
use crate::vectorstore::{CollectionData, CollectionInfo, CollectionStats, VectorIndex};

const BACKEND: &str = "InMemory";

/// An in-memory vector index with brute-force search.
///
/// # Example
///
/// ```rust,ignore
/// use vault_rag::{InMemoryVectorIndex, VectorIndex};
///
/// let index = InMemoryVectorIndex::new();
/// index.create_collection(&tenant, 384).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorIndex {
    collections: RwLock<HashMap<CollectionName, CollectionData>>,
}

impl InMemoryVectorIndex {
    /// Create a new empty in-memory index.
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing(name: &CollectionName) -> VaultError {
    VaultError::storage(BACKEND, format!("collection '{name}' does not exist"))
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn create_collection(&self, owner: &TenantId, dimensions: usize) -> Result<bool> {
        let mut collections = self.collections.write().await;
        let name = owner.collection_name();
        if let Some(existing) = collections.get(&name) {
            existing.check_dimensions(dimensions)?;
            return Ok(false);
        }
        collections.insert(name, CollectionData::new(owner.clone(), dimensions));
        Ok(true)
    }

    async fn collection_exists(&self, name: &CollectionName) -> Result<bool> {
        Ok(self.collections.read().await.contains_key(name))
    }

    async fn delete_collection(&self, name: &CollectionName) -> Result<bool> {
        Ok(self.collections.write().await.remove(name).is_some())
    }

    async fn existing_ids(&self, name: &CollectionName, ids: &[&str]) -> Result<HashSet<String>> {
        let collections = self.collections.read().await;
        let data = collections.get(name).ok_or_else(|| missing(name))?;
        Ok(data.existing_ids(ids))
    }

    async fn insert_batch(&self, name: &CollectionName, chunks: Vec<Chunk>) -> Result<()> {
        let mut collections = self.collections.write().await;
        let data = collections.get_mut(name).ok_or_else(|| missing(name))?;
        data.validate_batch(BACKEND, &chunks)?;
        data.append(chunks);
        Ok(())
    }

    async fn search(
        &self,
        name: &CollectionName,
        query: &[f32],
        k: usize,
        metric: DistanceMetric,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredChunk>> {
        let collections = self.collections.read().await;
        let data = collections.get(name).ok_or_else(|| missing(name))?;
        data.search(query, k, metric, filter)
    }

    async fn collection_stats(&self, name: &CollectionName) -> Result<Option<CollectionStats>> {
        Ok(self.collections.read().await.get(name).map(CollectionData::stats))
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let collections = self.collections.read().await;
        let mut infos: Vec<CollectionInfo> = collections.values().map(CollectionData::info).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }
}
