//! Typed tenant identifiers and the collection names derived from them.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, VaultError};

const MAX_TENANT_ID_LEN: usize = 128;

/// An isolated logical owner of exactly one collection.
///
/// Only ASCII alphanumerics, `-` and `_` are accepted so that the derived
/// [`CollectionName`] is safe to use as a file name or table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    /// Validate and wrap a tenant identifier. Surrounding whitespace is trimmed.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidTenantId`] if the id is empty, longer than
    /// 128 characters, or contains characters outside `[A-Za-z0-9_-]`.
    pub fn new(id: impl AsRef<str>) -> Result<Self> {
        let id = id.as_ref().trim();
        if id.is_empty() {
            return Err(VaultError::InvalidTenantId("tenant id must not be empty".into()));
        }
        if id.len() > MAX_TENANT_ID_LEN {
            return Err(VaultError::InvalidTenantId(format!(
                "tenant id exceeds {MAX_TENANT_ID_LEN} characters"
            )));
        }
        if let Some(bad) = id.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_')) {
            return Err(VaultError::InvalidTenantId(format!(
                "'{id}' contains unsupported character '{bad}'"
            )));
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name of the collection that holds this tenant's chunks.
    ///
    /// Deterministic; ids that differ only in case map to different names.
    pub fn collection_name(&self) -> CollectionName {
        let digest = Sha256::digest(self.0.as_bytes());
        let suffix: String = digest.iter().take(4).map(|b| format!("{b:02x}")).collect();
        CollectionName(format!("tenant_{}_{suffix}", self.0.to_ascii_lowercase()))
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TenantId {
    type Error = VaultError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<TenantId> for String {
    fn from(value: TenantId) -> Self {
        value.0
    }
}

impl std::str::FromStr for TenantId {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// The storage address of one tenant collection inside a vector index.
///
/// Only obtainable from [`TenantId::collection_name`], so every index call
/// is addressed by a tenant-derived name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollectionName(String);

impl CollectionName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_unsafe_ids() {
        assert!(TenantId::new("").is_err());
        assert!(TenantId::new("   ").is_err());
        assert!(TenantId::new("../etc").is_err());
        assert!(TenantId::new("a b").is_err());
        assert!(TenantId::new("x".repeat(129)).is_err());
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let tenant = TenantId::new("  acme ").unwrap();
        assert_eq!(tenant.as_str(), "acme");
    }

    #[test]
    fn collection_name_is_deterministic_and_case_sensitive() {
        let a = TenantId::new("Acme").unwrap();
        let b = TenantId::new("acme").unwrap();
        assert_eq!(a.collection_name(), TenantId::new("Acme").unwrap().collection_name());
        assert_ne!(a.collection_name(), b.collection_name());
        assert!(b.collection_name().as_str().starts_with("tenant_acme_"));
    }

    #[test]
    fn deserialization_validates() {
        let ok: TenantId = serde_json::from_str("\"tenant-1\"").unwrap();
        assert_eq!(ok.as_str(), "tenant-1");
        assert!(serde_json::from_str::<TenantId>("\"bad/id\"").is_err());
    }
}
