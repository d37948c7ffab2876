//! # vault-rag
//!
//! Multi-tenant semantic memory: content-aware chunking, embeddings and
//! tenant-isolated vector retrieval.
//!
//! ## Overview
//!
//! Documents go in through [`RetrievalEngine::ingest`]. The
//! [`ChunkingOrchestrator`] classifies each document and splits it with one
//! of three [chunkers](chunking):
//!
//! - [`HierarchicalChunker`] - headings and paragraphs, with a section path per chunk
//! - [`ContextAwareChunker`] - overlapping windows snapped to sentence ends
//! - [`SemanticChunker`] - sentences grouped while their embeddings stay similar
//!
//! The [`VectorStoreManager`] embeds the chunks through an
//! [`EmbeddingGenerator`] and commits them atomically into the tenant's own
//! collection of a [`VectorIndex`]. [`RetrievalEngine::retrieve`] searches
//! exactly one tenant's collection.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vault_rag::{Document, FileVectorIndex, HashEmbeddingProvider, RetrievalEngine, TenantId};
//!
//! let engine = RetrievalEngine::builder()
//!     .embedding_provider(Arc::new(HashEmbeddingProvider::default()))
//!     .vector_index(Arc::new(FileVectorIndex::open("./vault-data")?))
//!     .build()?;
//!
//! let acme = TenantId::new("acme")?;
//! let summary = engine.ingest(&acme, &Document::new(handbook_text)).await?;
//! let hits = engine.retrieve(&acme, "parental leave policy", 3, None).await?;
//! ```
//!
//! ## Features
//!
//! - `openai` - [`OpenAIEmbeddingProvider`](openai::OpenAIEmbeddingProvider)
//!   backed by the OpenAI embeddings API

pub mod chunking;
pub mod classifier;
pub mod config;
pub mod document;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod file;
pub mod hash;
pub mod inmemory;
pub mod manager;
pub mod metric;
pub mod orchestrator;
pub mod retry;
pub mod tenant;
pub mod vectorstore;

#[cfg(feature = "openai")]
pub mod openai;

pub use chunking::{Chunker, ChunkingStrategy, ContextAwareChunker, HierarchicalChunker, SemanticChunker};
pub use classifier::{ContentType, StrategyDecision, classify};
pub use config::{VaultConfig, VaultConfigBuilder};
pub use document::{Chunk, Document, Metadata, MetadataFilter, RetrievedChunk, ScoredChunk};
pub use embedding::{EmbeddingGenerator, EmbeddingProvider};
pub use engine::{IngestSummary, RetrievalEngine, RetrievalEngineBuilder};
pub use error::{Result, VaultError};
pub use file::FileVectorIndex;
pub use hash::HashEmbeddingProvider;
pub use inmemory::InMemoryVectorIndex;
pub use manager::{AddOutcome, CollectionHandle, VectorStoreManager};
pub use metric::DistanceMetric;
pub use orchestrator::{ChunkingOrchestrator, ChunkingOutcome};
pub use retry::RetryPolicy;
pub use tenant::{CollectionName, TenantId};
pub use vectorstore::{CollectionInfo, CollectionStats, VectorIndex};
