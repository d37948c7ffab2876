//! Vector index trait for storing and searching tenant collections.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::chunking::ChunkingStrategy;
use crate::document::{Chunk, MetadataFilter, ScoredChunk};
use crate::error::{Result, VaultError};
use crate::metric::DistanceMetric;
use crate::tenant::{CollectionName, TenantId};

/// Aggregate figures for one collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub chunk_count: usize,
    /// Approximate bytes held: text, 4 bytes per embedding component, metadata.
    pub storage_size_estimate: usize,
    /// Number of chunks produced by each strategy.
    pub strategies_used: BTreeMap<ChunkingStrategy, usize>,
}

/// A collection as listed by [`VectorIndex::list_collections`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: CollectionName,
    pub owner: TenantId,
    pub dimensions: usize,
    pub chunk_count: usize,
}

/// A storage backend holding one collection per tenant.
///
/// Collections are addressed by the [`CollectionName`] derived from the
/// owning [`TenantId`], and every call touches exactly one collection.
/// Chunks are append-only: a batch is inserted whole or not at all, and ids
/// already present are rejected rather than overwritten.
///
/// # Example
///
/// ```rust,ignore
/// use vault_rag::{InMemoryVectorIndex, VectorIndex};
///
/// let index = InMemoryVectorIndex::new();
/// index.create_collection(&tenant, 384).await?;
/// index.insert_batch(&tenant.collection_name(), chunks).await?;
/// let hits = index.search(&tenant.collection_name(), &query, 5, DistanceMetric::Cosine, None).await?;
/// ```
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Short backend name used in errors and logs.
    fn backend(&self) -> &str;

    /// Create `owner`'s collection. Returns `false` if it already existed.
    ///
    /// Fails with [`VaultError::DimensionMismatch`] if it exists with another dimension.
    async fn create_collection(&self, owner: &TenantId, dimensions: usize) -> Result<bool>;

    async fn collection_exists(&self, name: &CollectionName) -> Result<bool>;

    /// Delete a collection and all its chunks. Returns `false` if it did not exist.
    async fn delete_collection(&self, name: &CollectionName) -> Result<bool>;

    /// The subset of `ids` already stored in the collection.
    async fn existing_ids(&self, name: &CollectionName, ids: &[&str]) -> Result<HashSet<String>>;

    /// Append embedded chunks atomically.
    async fn insert_batch(&self, name: &CollectionName, chunks: Vec<Chunk>) -> Result<()>;

    /// The `k` nearest chunks by ascending distance; ties keep insertion order.
    async fn search(
        &self,
        name: &CollectionName,
        query: &[f32],
        k: usize,
        metric: DistanceMetric,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredChunk>>;

    /// Figures for a collection, or `None` if it does not exist.
    async fn collection_stats(&self, name: &CollectionName) -> Result<Option<CollectionStats>>;

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>>;
}

/// The contents of one collection, shared by the bundled backends.
///
/// Chunks are kept in insertion order, which is also the tie-break order
/// for equal distances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CollectionData {
    pub(crate) owner: TenantId,
    pub(crate) dimensions: usize,
    chunks: Vec<Chunk>,
    #[serde(skip)]
    ids: HashSet<String>,
}

impl CollectionData {
    pub(crate) fn new(owner: TenantId, dimensions: usize) -> Self {
        Self { owner, dimensions, chunks: Vec::new(), ids: HashSet::new() }
    }

    /// Rebuild the id index after deserialization.
    pub(crate) fn reindex(mut self) -> Self {
        self.ids = self.chunks.iter().map(|c| c.id.clone()).collect();
        self
    }

    pub(crate) fn name(&self) -> CollectionName {
        self.owner.collection_name()
    }

    pub(crate) fn check_dimensions(&self, dimensions: usize) -> Result<()> {
        if dimensions != self.dimensions {
            return Err(VaultError::DimensionMismatch { expected: self.dimensions, actual: dimensions });
        }
        Ok(())
    }

    pub(crate) fn existing_ids(&self, ids: &[&str]) -> HashSet<String> {
        ids.iter().filter(|id| self.ids.contains(**id)).map(|id| id.to_string()).collect()
    }

    /// Reject a batch that would break the collection's invariants.
    pub(crate) fn validate_batch(&self, backend: &str, chunks: &[Chunk]) -> Result<()> {
        let mut seen = HashSet::with_capacity(chunks.len());
        for chunk in chunks {
            self.check_dimensions(chunk.embedding.len())?;
            if chunk.tenant_id.as_ref() != Some(&self.owner) {
                return Err(VaultError::storage(
                    backend,
                    format!("chunk '{}' is not stamped for tenant '{}'", chunk.id, self.owner),
                ));
            }
            if self.ids.contains(&chunk.id) || !seen.insert(chunk.id.as_str()) {
                return Err(VaultError::storage(backend, format!("duplicate chunk id '{}'", chunk.id)));
            }
        }
        Ok(())
    }

    /// Append a validated batch.
    pub(crate) fn append(&mut self, chunks: Vec<Chunk>) {
        self.ids.extend(chunks.iter().map(|c| c.id.clone()));
        self.chunks.extend(chunks);
    }

    pub(crate) fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Drop every chunk appended after the first `len`.
    pub(crate) fn truncate(&mut self, len: usize) {
        for chunk in self.chunks.drain(len.min(self.chunks.len())..) {
            self.ids.remove(&chunk.id);
        }
    }

    pub(crate) fn search(
        &self,
        query: &[f32],
        k: usize,
        metric: DistanceMetric,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredChunk>> {
        self.check_dimensions(query.len())?;

        let mut ranked: Vec<(usize, f32)> = self
            .chunks
            .iter()
            .enumerate()
            .filter(|(_, chunk)| filter.is_none_or(|f| f.matches(chunk)))
            .map(|(i, chunk)| (i, metric.distance(&chunk.embedding, query)))
            .collect();

        // Stable sort: equal distances stay in insertion order.
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
        ranked.truncate(k);
        Ok(ranked
            .into_iter()
            .map(|(i, distance)| ScoredChunk { chunk: self.chunks[i].clone(), distance })
            .collect())
    }

    pub(crate) fn stats(&self) -> CollectionStats {
        let mut stats = CollectionStats { chunk_count: self.chunks.len(), ..Default::default() };
        for chunk in &self.chunks {
            stats.storage_size_estimate += chunk.storage_size_estimate();
            *stats.strategies_used.entry(chunk.strategy).or_default() += 1;
        }
        stats
    }

    pub(crate) fn info(&self) -> CollectionInfo {
        CollectionInfo {
            name: self.name(),
            owner: self.owner.clone(),
            dimensions: self.dimensions,
            chunk_count: self.chunks.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;

    fn tenant() -> TenantId {
        TenantId::new("acme").unwrap()
    }

    fn chunk(id: &str, embedding: Vec<f32>) -> Chunk {
        let mut chunk = Chunk::new(&Document::new(id).with_id(id), ChunkingStrategy::ContextAware, 0, id, 0.9);
        chunk.embedding = embedding;
        chunk.tenant_id = Some(tenant());
        chunk
    }

    #[test]
    fn ties_keep_insertion_order() {
        let mut data = CollectionData::new(tenant(), 2);
        let batch = vec![chunk("b", vec![1.0, 0.0]), chunk("a", vec![1.0, 0.0]), chunk("c", vec![0.0, 1.0])];
        data.validate_batch("test", &batch).unwrap();
        data.append(batch);

        let hits = data.search(&[1.0, 0.0], 3, DistanceMetric::Cosine, None).unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.chunk.document_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn rejects_duplicates_wrong_dimensions_and_foreign_chunks() {
        let mut data = CollectionData::new(tenant(), 2);
        data.append(vec![chunk("a", vec![1.0, 0.0])]);

        assert!(data.validate_batch("test", &[chunk("a", vec![0.0, 1.0])]).is_err());
        assert!(data.validate_batch("test", &[chunk("x", vec![0.0, 1.0]), chunk("x", vec![0.0, 1.0])]).is_err());
        assert!(matches!(
            data.validate_batch("test", &[chunk("y", vec![1.0])]),
            Err(VaultError::DimensionMismatch { expected: 2, actual: 1 })
        ));

        let mut foreign = chunk("z", vec![1.0, 0.0]);
        foreign.tenant_id = Some(TenantId::new("other").unwrap());
        assert!(data.validate_batch("test", &[foreign]).is_err());
    }

    #[test]
    fn search_returns_at_most_k_nearest_with_filter() {
        let mut data = CollectionData::new(tenant(), 2);
        data.append((0..10).map(|i| chunk(&format!("c{i}"), vec![1.0, i as f32])).collect());

        let hits = data.search(&[1.0, 0.0], 3, DistanceMetric::Euclidean, None).unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.chunk.document_id.as_str()).collect();
        assert_eq!(ids, vec!["c0", "c1", "c2"]);

        let filter = MetadataFilter::new().with("document_id", "c7");
        let hits = data.search(&[1.0, 0.0], 3, DistanceMetric::Euclidean, Some(&filter)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.document_id, "c7");
    }

    #[test]
    fn truncate_rolls_back_an_append() {
        let mut data = CollectionData::new(tenant(), 2);
        data.append(vec![chunk("a", vec![1.0, 0.0])]);
        let batch = vec![chunk("b", vec![0.0, 1.0])];
        let b_id = batch[0].id.clone();
        data.append(batch);

        data.truncate(1);
        assert_eq!(data.len(), 1);
        assert!(data.existing_ids(&[b_id.as_str()]).is_empty());
        assert!(data.validate_batch("test", &[chunk("b", vec![0.0, 1.0])]).is_ok());
    }

    #[test]
    fn stats_count_strategies() {
        let mut data = CollectionData::new(tenant(), 2);
        data.append(vec![chunk("a", vec![1.0, 0.0]), chunk("b", vec![0.0, 1.0])]);
        let stats = data.stats();
        assert_eq!(stats.chunk_count, 2);
        assert_eq!(stats.strategies_used[&ChunkingStrategy::ContextAware], 2);
        assert!(stats.storage_size_estimate >= 2 * 2 * 4);
    }
}
