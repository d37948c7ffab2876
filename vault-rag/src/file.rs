//! File-backed vector index.
//!
//! [`FileVectorIndex`] keeps every collection in memory like
//! [`InMemoryVectorIndex`](crate::InMemoryVectorIndex) and mirrors each one
//! to a JSON snapshot `<collection>.json` in a data directory. Each
//! collection has its own lock, so a write to one tenant never waits on
//! another tenant's disk I/O. A batch is committed by a detached task that
//! holds the collection's write lock while it appends, writes the snapshot
//! (temp file + rename) and rolls the append back if the write fails; a
//! cancelled caller therefore never leaves memory and disk disagreeing.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::document::{Chunk, MetadataFilter, ScoredChunk};
use crate::error::{Result, VaultError};
use crate::metric::DistanceMetric;
use crate::tenant::{CollectionName, TenantId};
use crate::vectorstore::{CollectionData, CollectionInfo, CollectionStats, VectorIndex};

const BACKEND: &str = "File";
const SNAPSHOT_EXTENSION: &str = "json";

/// One collection slot. `None` once the collection has been deleted, so a
/// writer that resolved the slot before the delete cannot resurrect it.
type SharedCollection = Arc<RwLock<Option<CollectionData>>>;

#[derive(Debug)]
struct StoredCollection {
    dimensions: usize,
    data: SharedCollection,
}

impl StoredCollection {
    fn new(data: CollectionData) -> Self {
        Self { dimensions: data.dimensions, data: Arc::new(RwLock::new(Some(data))) }
    }
}

/// A vector index persisted as one JSON snapshot per collection.
///
/// # Example
///
/// ```rust,ignore
/// use vault_rag::FileVectorIndex;
///
/// let index = FileVectorIndex::open("./vault-data")?;
/// ```
#[derive(Debug)]
pub struct FileVectorIndex {
    dir: PathBuf,
    collections: RwLock<HashMap<CollectionName, StoredCollection>>,
}

impl FileVectorIndex {
    /// Open (creating if needed) a data directory and load every snapshot in it.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] if the directory cannot be created or
    /// read, or a snapshot is unreadable.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;

        let mut collections = HashMap::new();
        for entry in fs::read_dir(&dir).map_err(|e| io_error(&dir, e))? {
            let path = entry.map_err(|e| io_error(&dir, e))?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(SNAPSHOT_EXTENSION) {
                continue;
            }
            let data = load_snapshot(&path)?;
            let name = data.name();
            if path.file_stem().and_then(|stem| stem.to_str()) != Some(name.as_str()) {
                warn!(path = %path.display(), collection = %name, "snapshot file name does not match its owner");
            }
            collections.insert(name, StoredCollection::new(data));
        }

        info!(dir = %dir.display(), collection_count = collections.len(), "opened file vector index");
        Ok(Self { dir, collections: RwLock::new(collections) })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn snapshot_path(&self, name: &CollectionName) -> PathBuf {
        self.dir.join(format!("{name}.{SNAPSHOT_EXTENSION}"))
    }

    /// The collection's slot; the index-wide lock is released on return.
    async fn collection(&self, name: &CollectionName) -> Result<SharedCollection> {
        self.collections.read().await.get(name).map(|stored| stored.data.clone()).ok_or_else(|| missing(name))
    }
}

/// Atomically replace the snapshot at `path` with `data`.
async fn write_snapshot(path: &Path, data: &CollectionData) -> Result<()> {
    let tmp = path.with_extension(format!("{SNAPSHOT_EXTENSION}.tmp"));
    let bytes = serde_json::to_vec(data)
        .map_err(|e| VaultError::storage(BACKEND, format!("failed to serialize collection: {e}")))?;

    tokio::fs::write(&tmp, bytes).await.map_err(|e| io_error(&tmp, e))?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(io_error(path, e));
    }
    Ok(())
}

fn load_snapshot(path: &Path) -> Result<CollectionData> {
    let bytes = fs::read(path).map_err(|e| io_error(path, e))?;
    let data: CollectionData = serde_json::from_slice(&bytes).map_err(|e| {
        VaultError::storage(BACKEND, format!("corrupt snapshot {}: {e}", path.display()))
    })?;
    Ok(data.reindex())
}

fn io_error(path: &Path, e: std::io::Error) -> VaultError {
    VaultError::storage(BACKEND, format!("{}: {e}", path.display()))
}

fn missing(name: &CollectionName) -> VaultError {
    VaultError::storage(BACKEND, format!("collection '{name}' does not exist"))
}

#[async_trait]
impl VectorIndex for FileVectorIndex {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn create_collection(&self, owner: &TenantId, dimensions: usize) -> Result<bool> {
        let mut collections = self.collections.write().await;
        let name = owner.collection_name();
        if let Some(existing) = collections.get(&name) {
            if existing.dimensions != dimensions {
                return Err(VaultError::DimensionMismatch { expected: existing.dimensions, actual: dimensions });
            }
            return Ok(false);
        }
        let data = CollectionData::new(owner.clone(), dimensions);
        write_snapshot(&self.snapshot_path(&name), &data).await?;
        collections.insert(name, StoredCollection::new(data));
        Ok(true)
    }

    async fn collection_exists(&self, name: &CollectionName) -> Result<bool> {
        Ok(self.collections.read().await.contains_key(name))
    }

    async fn delete_collection(&self, name: &CollectionName) -> Result<bool> {
        let mut collections = self.collections.write().await;
        let Some(stored) = collections.remove(name) else {
            return Ok(false);
        };
        // Waits for an in-flight commit, then leaves a tombstone.
        stored.data.write().await.take();

        let path = self.snapshot_path(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(io_error(&path, e)),
        }
        Ok(true)
    }

    async fn existing_ids(&self, name: &CollectionName, ids: &[&str]) -> Result<HashSet<String>> {
        let collection = self.collection(name).await?;
        let guard = collection.read().await;
        Ok(guard.as_ref().ok_or_else(|| missing(name))?.existing_ids(ids))
    }

    async fn insert_batch(&self, name: &CollectionName, chunks: Vec<Chunk>) -> Result<()> {
        let collection = self.collection(name).await?;
        let path = self.snapshot_path(name);
        let name = name.clone();

        let commit = tokio::spawn(async move {
            let mut guard = collection.write().await;
            let data = guard.as_mut().ok_or_else(|| missing(&name))?;
            data.validate_batch(BACKEND, &chunks)?;

            let committed = data.len();
            data.append(chunks);
            if let Err(e) = write_snapshot(&path, data).await {
                data.truncate(committed);
                return Err(e);
            }
            Ok::<_, VaultError>(())
        });

        commit
            .await
            .map_err(|e| VaultError::storage(BACKEND, format!("snapshot commit task failed: {e}")))?
    }

    async fn search(
        &self,
        name: &CollectionName,
        query: &[f32],
        k: usize,
        metric: DistanceMetric,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredChunk>> {
        let collection = self.collection(name).await?;
        let guard = collection.read().await;
        guard.as_ref().ok_or_else(|| missing(name))?.search(query, k, metric, filter)
    }

    async fn collection_stats(&self, name: &CollectionName) -> Result<Option<CollectionStats>> {
        let Ok(collection) = self.collection(name).await else {
            return Ok(None);
        };
        let guard = collection.read().await;
        Ok(guard.as_ref().map(CollectionData::stats))
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let slots: Vec<SharedCollection> =
            self.collections.read().await.values().map(|stored| stored.data.clone()).collect();

        let mut infos = Vec::with_capacity(slots.len());
        for slot in slots {
            if let Some(data) = slot.read().await.as_ref() {
                infos.push(data.info());
            }
        }
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::chunking::ChunkingStrategy;
    use crate::document::Document;

    fn stamped(tenant: &TenantId, id: &str, embedding: Vec<f32>) -> Chunk {
        let mut chunk = Chunk::new(&Document::new(id).with_id(id), ChunkingStrategy::Semantic, 0, id, 0.8);
        chunk.embedding = embedding;
        chunk.tenant_id = Some(tenant.clone());
        chunk
    }

    #[tokio::test]
    async fn snapshots_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let tenant = TenantId::new("acme").unwrap();
        let name = tenant.collection_name();

        {
            let index = FileVectorIndex::open(dir.path()).unwrap();
            index.create_collection(&tenant, 2).await.unwrap();
            index.insert_batch(&name, vec![stamped(&tenant, "a", vec![0.6, 0.8])]).await.unwrap();
        }

        let reopened = FileVectorIndex::open(dir.path()).unwrap();
        let hits = reopened.search(&name, &[0.6, 0.8], 1, DistanceMetric::Cosine, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.text, "a");
        assert_eq!(hits[0].chunk.tenant_id.as_ref(), Some(&tenant));
        assert_eq!(reopened.existing_ids(&name, &[hits[0].chunk.id.as_str()]).await.unwrap().len(), 1);
        assert!(!dir.path().join(format!("{name}.json.tmp")).exists());
    }

    #[tokio::test]
    async fn deleted_collection_stays_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let tenant = TenantId::new("acme").unwrap();
        let name = tenant.collection_name();

        let index = FileVectorIndex::open(dir.path()).unwrap();
        index.create_collection(&tenant, 2).await.unwrap();
        assert!(index.delete_collection(&name).await.unwrap());
        drop(index);

        let reopened = FileVectorIndex::open(dir.path()).unwrap();
        assert!(!reopened.collection_exists(&name).await.unwrap());
        assert!(reopened.list_collections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejected_batch_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let tenant = TenantId::new("acme").unwrap();
        let name = tenant.collection_name();

        let index = FileVectorIndex::open(dir.path()).unwrap();
        index.create_collection(&tenant, 2).await.unwrap();
        assert!(index.insert_batch(&name, vec![stamped(&tenant, "a", vec![1.0])]).await.is_err());
        drop(index);

        let reopened = FileVectorIndex::open(dir.path()).unwrap();
        assert_eq!(reopened.collection_stats(&name).await.unwrap().unwrap().chunk_count, 0);
    }

    #[tokio::test]
    async fn a_held_collection_does_not_block_other_tenants() {
        let dir = tempfile::tempdir().unwrap();
        let acme = TenantId::new("acme").unwrap();
        let globex = TenantId::new("globex").unwrap();

        let index = FileVectorIndex::open(dir.path()).unwrap();
        index.create_collection(&acme, 2).await.unwrap();
        index.create_collection(&globex, 2).await.unwrap();
        index.insert_batch(&globex.collection_name(), vec![stamped(&globex, "g", vec![1.0, 0.0])]).await.unwrap();

        let acme_slot = index.collection(&acme.collection_name()).await.unwrap();
        let _writer = acme_slot.write().await;

        let other = tokio::time::timeout(
            Duration::from_secs(5),
            index.search(&globex.collection_name(), &[1.0, 0.0], 1, DistanceMetric::Cosine, None),
        )
        .await;
        assert_eq!(other.unwrap().unwrap().len(), 1);

        let same = tokio::time::timeout(
            Duration::from_millis(50),
            index.search(&acme.collection_name(), &[1.0, 0.0], 1, DistanceMetric::Cosine, None),
        )
        .await;
        assert!(same.is_err());
    }

    #[tokio::test]
    async fn failed_snapshot_write_rolls_back_memory() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let tenant = TenantId::new("acme").unwrap();
        let name = tenant.collection_name();

        let index = FileVectorIndex::open(&data_dir).unwrap();
        index.create_collection(&tenant, 2).await.unwrap();
        index.insert_batch(&name, vec![stamped(&tenant, "a", vec![1.0, 0.0])]).await.unwrap();

        fs::remove_dir_all(&data_dir).unwrap();
        let err = index.insert_batch(&name, vec![stamped(&tenant, "b", vec![0.0, 1.0])]).await.unwrap_err();
        assert!(matches!(err, VaultError::Storage { .. }));
        assert_eq!(index.collection_stats(&name).await.unwrap().unwrap().chunk_count, 1);

        // The rolled-back chunk is not mistaken for a stored one.
        fs::create_dir_all(&data_dir).unwrap();
        index.insert_batch(&name, vec![stamped(&tenant, "b", vec![0.0, 1.0])]).await.unwrap();
        assert_eq!(index.collection_stats(&name).await.unwrap().unwrap().chunk_count, 2);
    }

    #[tokio::test]
    async fn insert_after_delete_fails_without_recreating_the_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let tenant = TenantId::new("acme").unwrap();
        let name = tenant.collection_name();

        let index = FileVectorIndex::open(dir.path()).unwrap();
        index.create_collection(&tenant, 2).await.unwrap();
        let stale_slot = index.collection(&name).await.unwrap();
        assert!(index.delete_collection(&name).await.unwrap());

        assert!(stale_slot.read().await.is_none());
        assert!(index.insert_batch(&name, vec![stamped(&tenant, "a", vec![1.0, 0.0])]).await.is_err());
        assert!(!dir.path().join(format!("{name}.json")).exists());
    }

    #[test]
    fn corrupt_snapshot_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("tenant_x_00000000.json"), b"{ not json").unwrap();
        assert!(matches!(FileVectorIndex::open(dir.path()), Err(VaultError::Storage { .. })));
    }
}
