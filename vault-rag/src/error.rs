//! Error types for the `vault-rag` crate.

use thiserror::Error;

use crate::tenant::TenantId;

/// Errors that can occur in vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The document could not be chunked (empty, undecodable or otherwise malformed input).
    #[error("Chunking error: {0}")]
    Chunking(String),

    /// The embedding backend is unreachable or misconfigured.
    #[error("Embedding unavailable ({provider}): {message}")]
    EmbeddingUnavailable {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The tenant has no collection.
    #[error("Tenant not found: {0}")]
    TenantNotFound(TenantId),

    /// An ingest batch was aborted; nothing from it was persisted.
    #[error("Ingest batch failed for tenant '{tenant}' during {operation}: {source}")]
    IngestBatchFailed {
        /// The tenant the batch was destined for.
        tenant: TenantId,
        /// The step that failed (`embed`, `persist`, ...).
        operation: &'static str,
        /// The underlying cause.
        #[source]
        source: Box<VaultError>,
    },

    /// An error occurred in the vector index backend.
    #[error("Storage error ({backend}): {message}")]
    Storage {
        /// The index backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A vector did not have the dimension the collection expects.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The collection (or backend) dimension.
        expected: usize,
        /// The offending vector's length.
        actual: usize,
    },

    /// The tenant identifier is empty or contains unsupported characters.
    #[error("Invalid tenant id: {0}")]
    InvalidTenantId(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl VaultError {
    /// Whether the embedding boundary should retry this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VaultError::EmbeddingUnavailable { .. })
    }

    pub(crate) fn storage(backend: &str, message: impl Into<String>) -> Self {
        VaultError::Storage { backend: backend.to_string(), message: message.into() }
    }

    pub(crate) fn ingest_failed(tenant: &TenantId, operation: &'static str, source: VaultError) -> Self {
        VaultError::IngestBatchFailed { tenant: tenant.clone(), operation, source: Box::new(source) }
    }
}

/// A convenience result type for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;
