//! Low-level key-value storage backend trait and supporting types.
//!
//! Backends are dumb versioned KV stores. Serialization, identity checks,
//! and status rules live in [`GenericTaskStore`](super::GenericTaskStore).
//!
//! # Key Structure
//!
//! Keys have the form `task:{task_id}`. Listing every task uses the
//! [`KEY_PREFIX`] prefix.
//!
//! # Versioning
//!
//! Each stored record carries a monotonic `u64` version starting at 1 and
//! incremented on every successful write.
//! [`put_if_version`](StorageBackend::put_if_version) provides
//! compare-and-swap semantics for optimistic concurrency;
//! [`put_if_absent`](StorageBackend::put_if_absent) is the atomic insert.

use std::fmt;

use async_trait::async_trait;
use uuid::Uuid;

/// Prefix shared by all task keys.
pub const KEY_PREFIX: &str = "task:";

/// Raw bytes plus the version they were stored under.
#[derive(Debug, Clone)]
pub struct VersionedRecord {
    /// Serialized record.
    pub data: Vec<u8>,
    /// Version of this write.
    pub version: u64,
}

/// Errors a backend reports.
#[derive(Debug)]
pub enum StorageError {
    /// No value under `key`.
    NotFound {
        /// The missing key.
        key: String,
    },

    /// A compare-and-swap write found a different version.
    VersionConflict {
        /// The contended key.
        key: String,
        /// Version the caller expected.
        expected: u64,
        /// Version actually stored.
        actual: u64,
    },

    /// An insert-if-absent write found the key already present.
    AlreadyExists {
        /// The occupied key.
        key: String,
    },

    /// Any other backend failure.
    Backend {
        /// Description.
        message: String,
        /// Underlying error, if any.
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { key } => write!(f, "key not found: {key}"),
            Self::VersionConflict {
                key,
                expected,
                actual,
            } => write!(
                f,
                "version conflict on key {key}: expected {expected}, found {actual}"
            ),
            Self::AlreadyExists { key } => write!(f, "key already exists: {key}"),
            Self::Backend { message, .. } => write!(f, "backend error: {message}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Backend {
                source: Some(src), ..
            } => Some(src.as_ref()),
            _ => None,
        }
    }
}

/// Versioned key-value operations every storage engine provides.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Reads the value and version under `key`.
    async fn get(&self, key: &str) -> Result<VersionedRecord, StorageError>;

    /// Writes unconditionally, returning the new version.
    async fn put(&self, key: &str, data: &[u8]) -> Result<u64, StorageError>;

    /// Writes only if nothing is stored under `key`, returning version 1.
    /// Fails with [`StorageError::AlreadyExists`] otherwise.
    async fn put_if_absent(&self, key: &str, data: &[u8]) -> Result<u64, StorageError>;

    /// Writes only if the stored version equals `expected_version`.
    async fn put_if_version(
        &self,
        key: &str,
        data: &[u8],
        expected_version: u64,
    ) -> Result<u64, StorageError>;

    /// Removes `key`, returning whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;

    /// Returns every entry whose key starts with `prefix`.
    async fn list_by_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, VersionedRecord)>, StorageError>;
}

/// Builds the storage key for a task.
pub fn make_key(task_id: &Uuid) -> String {
    format!("{KEY_PREFIX}{task_id}")
}

/// Extracts the task ID from a storage key.
pub fn parse_key(key: &str) -> Option<Uuid> {
    key.strip_prefix(KEY_PREFIX)
        .and_then(|id| Uuid::parse_str(id).ok())
}
