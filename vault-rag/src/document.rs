//! Data types for documents, chunks, and search results.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::chunking::ChunkingStrategy;
use crate::error::{Result, VaultError};
use crate::tenant::TenantId;

/// Key-value metadata attached to documents and chunks.
pub type Metadata = HashMap<String, String>;

/// Metadata key that, when present on a document, becomes its id.
pub const DOCUMENT_ID_KEY: &str = "document_id";

/// A source document containing text content and metadata.
///
/// Documents are transient: only the chunks derived from them are persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Identifier used to derive chunk ids. Defaults to a hash of the text.
    pub id: String,
    /// The text content of the document.
    pub text: String,
    /// Source metadata (origin, content type, timestamp, ...).
    pub metadata: Metadata,
    /// Optional URI pointing to the original source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
}

impl Document {
    /// Create a document whose id is derived from its content.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        Self { id: content_id(&text), text, metadata: Metadata::new(), source_uri: None }
    }

    /// Decode a raw byte stream as UTF-8.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Chunking`] if the bytes are not valid UTF-8.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes).map_err(|e| {
            VaultError::Chunking(format!("document is not valid UTF-8: {e}"))
        })?;
        Ok(Self::new(text))
    }

    /// Attach metadata. A `document_id` entry replaces the content-derived id.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        if let Some(id) = metadata.get(DOCUMENT_ID_KEY).filter(|id| !id.trim().is_empty()) {
            self.id = id.trim().to_string();
        }
        self.metadata = metadata;
        self
    }

    /// Override the document id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_source_uri(mut self, uri: impl Into<String>) -> Self {
        self.source_uri = Some(uri.into());
        self
    }
}

/// First 16 hex characters of the SHA-256 of `text`.
fn content_id(text: &str) -> String {
    hex_prefix(text, 8)
}

fn hex_prefix(text: &str, bytes: usize) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().take(bytes).map(|b| format!("{b:02x}")).collect()
}

/// A segment of a [`Document`]: the atomic persisted unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique within a tenant collection:
    /// `{document_id}-{strategy}-{sequence}-{content}`, where `content` is the
    /// first 8 hex characters of the SHA-256 of the chunk text. Re-ingesting
    /// identical content yields identical ids; edited content never collides.
    pub id: String,
    /// The text content of the chunk.
    pub text: String,
    /// The vector embedding for this chunk's text. Empty until embedded.
    #[serde(default)]
    pub embedding: Vec<f32>,
    /// Metadata inherited from the parent document.
    #[serde(default)]
    pub metadata: Metadata,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// Position of the chunk within its document.
    pub sequence: usize,
    /// The strategy that produced the chunk.
    pub strategy: ChunkingStrategy,
    /// How well the chunk respects semantic or structural boundaries, in `[0, 1]`.
    pub confidence: f32,
    /// Characters shared with the previous chunk, for context-aware windows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlap_with_previous: Option<usize>,
    /// Heading hierarchy of the section the chunk came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_path: Option<String>,
    /// Owning tenant; stamped by the store when the chunk is persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<TenantId>,
}

impl Chunk {
    /// Create an un-embedded chunk of `document`.
    pub fn new(
        document: &Document,
        strategy: ChunkingStrategy,
        sequence: usize,
        text: impl Into<String>,
        confidence: f32,
    ) -> Self {
        let text = text.into();
        Self {
            id: format!("{}-{}-{sequence}-{}", document.id, strategy.as_str(), hex_prefix(&text, 4)),
            text,
            embedding: Vec::new(),
            metadata: document.metadata.clone(),
            document_id: document.id.clone(),
            sequence,
            strategy,
            confidence: confidence.clamp(0.0, 1.0),
            overlap_with_previous: None,
            section_path: None,
            tenant_id: None,
        }
    }

    pub fn with_overlap(mut self, overlap: usize) -> Self {
        self.overlap_with_previous = Some(overlap);
        self
    }

    pub fn with_section_path(mut self, path: impl Into<String>) -> Self {
        self.section_path = Some(path.into());
        self
    }

    pub fn is_embedded(&self) -> bool {
        !self.embedding.is_empty()
    }

    /// Inherited metadata merged with the chunk-specific fields.
    ///
    /// Chunk fields always win over document metadata with the same key, so
    /// a document cannot spoof e.g. its `tenant_id`.
    pub fn flattened_metadata(&self) -> Metadata {
        let mut metadata = self.metadata.clone();
        metadata.remove("tenant_id");
        metadata.remove("overlap_with_previous");
        metadata.remove("section_path");

        metadata.insert("chunk_id".to_string(), self.id.clone());
        metadata.insert(DOCUMENT_ID_KEY.to_string(), self.document_id.clone());
        metadata.insert("sequence".to_string(), self.sequence.to_string());
        metadata.insert("strategy".to_string(), self.strategy.as_str().to_string());
        metadata.insert("confidence".to_string(), format!("{:.3}", self.confidence));
        if let Some(overlap) = self.overlap_with_previous {
            metadata.insert("overlap_with_previous".to_string(), overlap.to_string());
        }
        if let Some(path) = &self.section_path {
            metadata.insert("section_path".to_string(), path.clone());
        }
        if let Some(tenant) = &self.tenant_id {
            metadata.insert("tenant_id".to_string(), tenant.to_string());
        }
        metadata
    }

    /// Rough number of bytes this chunk occupies in an index.
    pub fn storage_size_estimate(&self) -> usize {
        let metadata_bytes: usize = self.metadata.iter().map(|(k, v)| k.len() + v.len()).sum();
        self.text.len()
            + self.embedding.len() * std::mem::size_of::<f32>()
            + metadata_bytes
            + self.id.len()
            + self.document_id.len()
            + self.section_path.as_ref().map_or(0, String::len)
    }
}

/// Equality predicate over a chunk's [flattened metadata](Chunk::flattened_metadata).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct MetadataFilter {
    required: Metadata,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `key` to equal `value`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.required.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.required.is_empty()
    }

    /// Whether every required pair is present on the chunk.
    pub fn matches(&self, chunk: &Chunk) -> bool {
        if self.required.is_empty() {
            return true;
        }
        let metadata = chunk.flattened_metadata();
        self.required.iter().all(|(k, v)| metadata.get(k) == Some(v))
    }
}

impl From<Metadata> for MetadataFilter {
    fn from(required: Metadata) -> Self {
        Self { required }
    }
}

/// A stored [`Chunk`] paired with its distance to the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// Distance under the configured metric (lower is more relevant).
    pub distance: f32,
}

/// The caller-facing shape of one retrieval hit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub text: String,
    pub metadata: Metadata,
    pub distance: f32,
}

impl From<ScoredChunk> for RetrievedChunk {
    fn from(scored: ScoredChunk) -> Self {
        let metadata = scored.chunk.flattened_metadata();
        Self {
            chunk_id: scored.chunk.id,
            text: scored.chunk.text,
            metadata,
            distance: scored.distance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_id_is_content_derived_unless_given() {
        let a = Document::new("same text");
        let b = Document::new("same text");
        assert_eq!(a.id, b.id);
        assert_eq!(a.id.len(), 16);

        let named = Document::new("same text")
            .with_metadata(Metadata::from([(DOCUMENT_ID_KEY.to_string(), "handbook".to_string())]));
        assert_eq!(named.id, "handbook");
    }

    #[test]
    fn undecodable_bytes_are_a_chunking_error() {
        let err = Document::from_bytes(&[0x66, 0x6f, 0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, VaultError::Chunking(_)));
        assert_eq!(Document::from_bytes(b"ok").unwrap().text, "ok");
    }

    #[test]
    fn flattened_metadata_cannot_be_spoofed_by_document() {
        let doc = Document::new("text").with_metadata(Metadata::from([
            ("tenant_id".to_string(), "other".to_string()),
            ("origin".to_string(), "upload".to_string()),
        ]));
        let mut chunk = Chunk::new(&doc, ChunkingStrategy::Hierarchical, 0, "text", 1.0)
            .with_section_path("Intro");
        assert!(!chunk.flattened_metadata().contains_key("tenant_id"));

        chunk.tenant_id = Some(TenantId::new("acme").unwrap());
        let flat = chunk.flattened_metadata();
        assert_eq!(flat["tenant_id"], "acme");
        assert_eq!(flat["origin"], "upload");
        assert_eq!(flat["section_path"], "Intro");
        assert_eq!(flat["strategy"], "hierarchical");
    }

    #[test]
    fn filter_matches_all_required_pairs() {
        let doc = Document::new("text")
            .with_metadata(Metadata::from([("origin".to_string(), "upload".to_string())]));
        let chunk = Chunk::new(&doc, ChunkingStrategy::ContextAware, 2, "text", 0.7);

        assert!(MetadataFilter::new().matches(&chunk));
        assert!(MetadataFilter::new().with("origin", "upload").with("sequence", "2").matches(&chunk));
        assert!(!MetadataFilter::new().with("origin", "email").matches(&chunk));
    }

    #[test]
    fn chunk_id_encodes_document_strategy_sequence_and_content() {
        let doc = Document::new("text").with_id("doc");
        let chunk = Chunk::new(&doc, ChunkingStrategy::Semantic, 3, "text", 2.0);
        assert!(chunk.id.starts_with("doc-semantic-3-"));
        assert_eq!(chunk.id.len(), "doc-semantic-3-".len() + 8);
        assert_eq!(chunk.confidence, 1.0);

        let same = Chunk::new(&doc, ChunkingStrategy::Semantic, 3, "text", 0.5);
        let edited = Chunk::new(&doc, ChunkingStrategy::Semantic, 3, "new text", 0.5);
        assert_eq!(same.id, chunk.id);
        assert_ne!(edited.id, chunk.id);
    }
}
