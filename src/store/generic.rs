//! Generic task store over any [`StorageBackend`].
//!
//! [`GenericTaskStore`] serializes [`TaskRecord`]s to canonical JSON and
//! performs every mutation as read, modify, compare-and-swap. A lost race
//! surfaces as [`TaskError::ConcurrentModification`].
//!
//! ```rust,no_run
//! use taskhost::store::{GenericTaskStore, InMemoryBackend};
//!
//! let store = GenericTaskStore::new(InMemoryBackend::new());
//! # let _ = store;
//! ```

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domain::TaskRecord;
use crate::error::TaskError;
use crate::store::backend::{make_key, StorageBackend, StorageError, KEY_PREFIX};
use crate::types::TaskStatus;

/// Task store implementing record operations on top of a KV backend.
///
/// # Type Parameters
///
/// * `B` - A [`StorageBackend`] implementation.
#[derive(Debug)]
pub struct GenericTaskStore<B> {
    pub(crate) backend: B,
}

impl<B: StorageBackend> GenericTaskStore<B> {
    /// Wraps a backend.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Returns the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    // ---- Serialization helpers (private) ----

    fn serialize_record(record: &TaskRecord) -> Result<Vec<u8>, TaskError> {
        serde_json::to_vec(record)
            .map_err(|e| TaskError::Store(format!("failed to serialize TaskRecord: {e}")))
    }

    fn deserialize_record(data: &[u8]) -> Result<TaskRecord, TaskError> {
        serde_json::from_slice(data)
            .map_err(|e| TaskError::Store(format!("failed to deserialize TaskRecord: {e}")))
    }

    fn map_storage_error(err: StorageError, task_id: Uuid) -> TaskError {
        match err {
            StorageError::NotFound { .. } => TaskError::NotFound { task_id },
            StorageError::VersionConflict {
                expected, actual, ..
            } => TaskError::ConcurrentModification {
                task_id,
                expected,
                actual,
            },
            StorageError::AlreadyExists { key } => {
                TaskError::Store(format!("unexpected existing key {key}"))
            },
            StorageError::Backend { message, .. } => TaskError::Store(message),
        }
    }

    /// Applies `mutate` to the stored record and writes it back with CAS.
    async fn modify<F>(&self, task_id: Uuid, mutate: F) -> Result<TaskRecord, TaskError>
    where
        F: FnOnce(&mut TaskRecord) + Send,
    {
        let key = make_key(&task_id);
        let versioned = self
            .backend
            .get(&key)
            .await
            .map_err(|e| Self::map_storage_error(e, task_id))?;

        let mut record = Self::deserialize_record(&versioned.data)?;
        mutate(&mut record);
        record.touch();

        let bytes = Self::serialize_record(&record)?;
        record.version = self
            .backend
            .put_if_version(&key, &bytes, versioned.version)
            .await
            .map_err(|e| Self::map_storage_error(e, task_id))?;
        Ok(record)
    }

    // ---- Record operations (public) ----

    /// Stores a new record, or returns the existing one if the task ID is
    /// already present.
    ///
    /// The insert is a single `put_if_absent`, so concurrent creates for one
    /// task ID all observe the same stored record.
    pub async fn create(&self, mut record: TaskRecord) -> Result<TaskRecord, TaskError> {
        let key = make_key(&record.task_id);
        let bytes = Self::serialize_record(&record)?;
        match self.backend.put_if_absent(&key, &bytes).await {
            Ok(version) => {
                record.version = version;
                Ok(record)
            },
            Err(StorageError::AlreadyExists { .. }) => {
                tracing::debug!(task_id = %record.task_id, "create on existing task returns stored record");
                self.get(record.task_id).await
            },
            Err(e) => Err(Self::map_storage_error(e, record.task_id)),
        }
    }

    /// Loads a record.
    pub async fn get(&self, task_id: Uuid) -> Result<TaskRecord, TaskError> {
        let versioned = self
            .backend
            .get(&make_key(&task_id))
            .await
            .map_err(|e| Self::map_storage_error(e, task_id))?;

        let mut record = Self::deserialize_record(&versioned.data)?;
        record.version = versioned.version;
        Ok(record)
    }

    /// Replaces the whole record, guarded by `record.version`.
    pub async fn update(&self, record: &TaskRecord) -> Result<TaskRecord, TaskError> {
        let mut next = record.clone();
        next.touch();
        let bytes = Self::serialize_record(&next)?;
        next.version = self
            .backend
            .put_if_version(&make_key(&record.task_id), &bytes, record.version)
            .await
            .map_err(|e| Self::map_storage_error(e, record.task_id))?;
        Ok(next)
    }

    /// Sets the outer status.
    pub async fn update_status(
        &self,
        task_id: Uuid,
        status: TaskStatus,
    ) -> Result<TaskRecord, TaskError> {
        self.modify(task_id, |record| record.status = status).await
    }

    /// Sets the plugin state.
    pub async fn update_plugin_state(
        &self,
        task_id: Uuid,
        plugin_state: &str,
    ) -> Result<TaskRecord, TaskError> {
        let plugin_state = plugin_state.to_string();
        self.modify(task_id, move |record| record.plugin_state = plugin_state)
            .await
    }

    /// Replaces the local-state blob.
    pub async fn update_local_state(
        &self,
        task_id: Uuid,
        local_state: Map<String, Value>,
    ) -> Result<TaskRecord, TaskError> {
        self.modify(task_id, move |record| record.local_state = local_state)
            .await
    }

    /// Removes a task.
    pub async fn delete(&self, task_id: Uuid) -> Result<bool, TaskError> {
        self.backend
            .delete(&make_key(&task_id))
            .await
            .map_err(|e| Self::map_storage_error(e, task_id))
    }

    /// Lists tasks in `status`, oldest first.
    pub async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<TaskRecord>, TaskError> {
        let entries = self
            .backend
            .list_by_prefix(KEY_PREFIX)
            .await
            .map_err(|e| Self::map_storage_error(e, Uuid::nil()))?;

        let mut records = Vec::with_capacity(entries.len());
        for (key, versioned) in entries {
            let mut record = match Self::deserialize_record(&versioned.data) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "skipping undecodable task record");
                    continue;
                },
            };
            if record.status == status {
                record.version = versioned.version;
                records.push(record);
            }
        }
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::store::backend::VersionedRecord;
    use crate::store::memory::InMemoryBackend;
    use crate::types::TaskType;

    fn test_store() -> GenericTaskStore<InMemoryBackend> {
        GenericTaskStore::new(InMemoryBackend::new())
    }

    fn record() -> TaskRecord {
        TaskRecord::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            TaskType::SimpleForm,
            json!({}),
        )
    }

    #[tokio::test]
    async fn create_then_get() {
        let store = test_store();
        let created = store.create(record()).await.unwrap();
        assert_eq!(created.version, 1);

        let loaded = store.get(created.task_id).await.unwrap();
        assert_eq!(loaded.task_id, created.task_id);
        assert_eq!(loaded.version, 1);
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let store = test_store();
        let rec = record();
        let first = store.create(rec.clone()).await.unwrap();
        store
            .update_plugin_state(first.task_id, "draft")
            .await
            .unwrap();

        let again = store.create(rec).await.unwrap();
        assert_eq!(again.plugin_state, "draft");
        assert_eq!(again.version, 2);
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let store = test_store();
        let id = Uuid::new_v4();
        assert!(matches!(
            store.get(id).await,
            Err(TaskError::NotFound { task_id }) if task_id == id
        ));
    }

    #[tokio::test]
    async fn field_updates_bump_version() {
        let store = test_store();
        let created = store.create(record()).await.unwrap();

        let updated = store
            .update_status(created.task_id, TaskStatus::InProgress)
            .await
            .unwrap();
        assert_eq!(updated.version, 2);

        let mut local = Map::new();
        local.insert("k".into(), json!(1));
        let updated = store
            .update_local_state(created.task_id, local.clone())
            .await
            .unwrap();
        assert_eq!(updated.version, 3);
        assert_eq!(updated.status, TaskStatus::InProgress);
        assert_eq!(updated.local_state, local);
    }

    #[tokio::test]
    async fn update_with_stale_version_conflicts() {
        let store = test_store();
        let created = store.create(record()).await.unwrap();
        store
            .update_plugin_state(created.task_id, "draft")
            .await
            .unwrap();

        let result = store.update(&created).await;
        assert!(
            matches!(
                result,
                Err(TaskError::ConcurrentModification {
                    expected: 1,
                    actual: 2,
                    ..
                })
            ),
            "expected ConcurrentModification, got: {result:?}"
        );
    }

    #[tokio::test]
    async fn list_by_status_filters() {
        let store = test_store();
        let a = store.create(record()).await.unwrap();
        let b = store.create(record()).await.unwrap();
        store
            .update_status(b.task_id, TaskStatus::Completed)
            .await
            .unwrap();

        let initialized = store.list_by_status(TaskStatus::Initialized).await.unwrap();
        assert_eq!(initialized.len(), 1);
        assert_eq!(initialized[0].task_id, a.task_id);

        assert!(store.delete(a.task_id).await.unwrap());
        assert!(!store.delete(a.task_id).await.unwrap());
        assert!(store
            .list_by_status(TaskStatus::Initialized)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn cas_conflict_returns_concurrent_modification() {
        let store = GenericTaskStore::new(CasConflictBackend {
            inner: Arc::new(InMemoryBackend::new()),
        });
        let created = store.create(record()).await.unwrap();

        let result = store
            .update_status(created.task_id, TaskStatus::Completed)
            .await;
        assert!(matches!(
            result,
            Err(TaskError::ConcurrentModification { .. })
        ));
    }

    /// Backend wrapper that makes put_if_version always fail with VersionConflict.
    #[derive(Debug)]
    struct CasConflictBackend {
        inner: Arc<InMemoryBackend>,
    }

    #[async_trait]
    impl StorageBackend for CasConflictBackend {
        async fn get(&self, key: &str) -> Result<VersionedRecord, StorageError> {
            self.inner.get(key).await
        }
        async fn put(&self, key: &str, data: &[u8]) -> Result<u64, StorageError> {
            self.inner.put(key, data).await
        }
        async fn put_if_absent(&self, key: &str, data: &[u8]) -> Result<u64, StorageError> {
            self.inner.put_if_absent(key, data).await
        }
        async fn put_if_version(
            &self,
            key: &str,
            _data: &[u8],
            expected_version: u64,
        ) -> Result<u64, StorageError> {
            Err(StorageError::VersionConflict {
                key: key.to_string(),
                expected: expected_version,
                actual: expected_version + 1,
            })
        }
        async fn delete(&self, key: &str) -> Result<bool, StorageError> {
            self.inner.delete(key).await
        }
        async fn list_by_prefix(
            &self,
            prefix: &str,
        ) -> Result<Vec<(String, VersionedRecord)>, StorageError> {
            self.inner.list_by_prefix(prefix).await
        }
    }
}
