//! In-memory storage backend and the ready-to-use in-memory task store.
//!
//! [`InMemoryBackend`] keeps `(bytes, version)` pairs in a `DashMap`.
//! [`InMemoryTaskStore`] is a thin wrapper around
//! `GenericTaskStore<InMemoryBackend>` for tests and single-process
//! deployments.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domain::TaskRecord;
use crate::error::TaskError;
use crate::store::backend::{StorageBackend, StorageError, VersionedRecord};
use crate::store::generic::GenericTaskStore;
use crate::types::TaskStatus;

use super::TaskStore;

/// Thread-safe in-memory KV backend.
#[derive(Debug)]
pub struct InMemoryBackend {
    data: DashMap<String, (Vec<u8>, u64)>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<VersionedRecord, StorageError> {
        let entry = self.data.get(key).ok_or_else(|| StorageError::NotFound {
            key: key.to_string(),
        })?;
        let (data, version) = entry.value();
        Ok(VersionedRecord {
            data: data.clone(),
            version: *version,
        })
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<u64, StorageError> {
        let mut entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| (Vec::new(), 0));
        let new_version = entry.value().1 + 1;
        *entry.value_mut() = (data.to_vec(), new_version);
        Ok(new_version)
    }

    async fn put_if_absent(&self, key: &str, data: &[u8]) -> Result<u64, StorageError> {
        match self.data.entry(key.to_string()) {
            Entry::Occupied(_) => Err(StorageError::AlreadyExists {
                key: key.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert((data.to_vec(), 1));
                Ok(1)
            },
        }
    }

    async fn put_if_version(
        &self,
        key: &str,
        data: &[u8],
        expected_version: u64,
    ) -> Result<u64, StorageError> {
        let mut entry = self
            .data
            .get_mut(key)
            .ok_or_else(|| StorageError::NotFound {
                key: key.to_string(),
            })?;
        let current_version = entry.value().1;
        if current_version != expected_version {
            return Err(StorageError::VersionConflict {
                key: key.to_string(),
                expected: expected_version,
                actual: current_version,
            });
        }
        let new_version = current_version + 1;
        *entry.value_mut() = (data.to_vec(), new_version);
        Ok(new_version)
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.data.remove(key).is_some())
    }

    async fn list_by_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, VersionedRecord)>, StorageError> {
        let results = self
            .data
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| {
                let (data, version) = entry.value();
                (
                    entry.key().clone(),
                    VersionedRecord {
                        data: data.clone(),
                        version: *version,
                    },
                )
            })
            .collect();
        Ok(results)
    }
}

// ---- InMemoryTaskStore: thin wrapper around GenericTaskStore<InMemoryBackend> ----

/// In-memory [`TaskStore`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use taskhost::store::{InMemoryTaskStore, TaskStore};
///
/// let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
/// # let _ = store;
/// ```
#[derive(Debug)]
pub struct InMemoryTaskStore {
    inner: GenericTaskStore<InMemoryBackend>,
}

impl InMemoryTaskStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            inner: GenericTaskStore::new(InMemoryBackend::new()),
        }
    }

    /// Number of stored tasks.
    pub fn len(&self) -> usize {
        self.inner.backend().len()
    }

    /// Returns `true` if no task is stored.
    pub fn is_empty(&self) -> bool {
        self.inner.backend().is_empty()
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

// ---- TaskStore delegation impl ----

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, record: TaskRecord) -> Result<TaskRecord, TaskError> {
        self.inner.create(record).await
    }

    async fn get(&self, task_id: Uuid) -> Result<TaskRecord, TaskError> {
        self.inner.get(task_id).await
    }

    async fn update(&self, record: &TaskRecord) -> Result<TaskRecord, TaskError> {
        self.inner.update(record).await
    }

    async fn update_status(
        &self,
        task_id: Uuid,
        status: TaskStatus,
    ) -> Result<TaskRecord, TaskError> {
        self.inner.update_status(task_id, status).await
    }

    async fn update_plugin_state(
        &self,
        task_id: Uuid,
        plugin_state: &str,
    ) -> Result<TaskRecord, TaskError> {
        self.inner.update_plugin_state(task_id, plugin_state).await
    }

    async fn update_local_state(
        &self,
        task_id: Uuid,
        local_state: Map<String, Value>,
    ) -> Result<TaskRecord, TaskError> {
        self.inner.update_local_state(task_id, local_state).await
    }

    async fn get_plugin_state(&self, task_id: Uuid) -> Result<String, TaskError> {
        TaskStore::get_plugin_state(&self.inner, task_id).await
    }

    async fn get_local_state(&self, task_id: Uuid) -> Result<Map<String, Value>, TaskError> {
        TaskStore::get_local_state(&self.inner, task_id).await
    }

    async fn delete(&self, task_id: Uuid) -> Result<bool, TaskError> {
        self.inner.delete(task_id).await
    }

    async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<TaskRecord>, TaskError> {
        self.inner.list_by_status(status).await
    }
}
