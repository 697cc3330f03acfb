//! Task persistence: store trait, generic implementation, backends, and
//! transactions.
//!
//! # Architecture
//!
//! 1. **[`TaskStore`]** -- object-safe persistence contract used as
//!    `Arc<dyn TaskStore>` by containers, local stores, and the task manager.
//!
//! 2. **[`GenericTaskStore<B>`](generic::GenericTaskStore)** -- serialization
//!    and compare-and-swap mutations over any backend. Has a blanket
//!    `TaskStore` impl.
//!
//! 3. **[`StorageBackend`]** -- dumb versioned KV trait. No domain logic.
//!
//! 4. **[`TaskTransaction`](transaction::TaskTransaction)** -- a `TaskStore`
//!    scoped to one task that stages every write and commits them as a
//!    single compare-and-swap write.
//!
//! All operations are keyed by task ID and are idempotent under retry:
//! repeating a write with the same value leaves the same record.

pub mod backend;
pub mod generic;
pub mod local;
pub mod memory;
pub mod transaction;

use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

pub use backend::{StorageBackend, StorageError, VersionedRecord};
pub use generic::GenericTaskStore;
pub use local::LocalStore;
pub use memory::{InMemoryBackend, InMemoryTaskStore};
pub use transaction::TaskTransaction;

use crate::domain::TaskRecord;
use crate::error::TaskError;
use crate::types::TaskStatus;

/// Persistence contract for task records.
///
/// Status rules (monotonicity, terminal checks) are enforced by the
/// container and the task manager, not here: a store writes what it is
/// given.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Stores a new record. Creating a task that already exists returns the
    /// stored record unchanged.
    async fn create(&self, record: TaskRecord) -> Result<TaskRecord, TaskError>;

    /// Loads a record.
    ///
    /// # Errors
    ///
    /// [`TaskError::NotFound`] if the task does not exist.
    async fn get(&self, task_id: Uuid) -> Result<TaskRecord, TaskError>;

    /// Replaces a record if its `version` still matches storage.
    ///
    /// # Errors
    ///
    /// [`TaskError::ConcurrentModification`] on a version mismatch.
    async fn update(&self, record: &TaskRecord) -> Result<TaskRecord, TaskError>;

    /// Sets the outer status.
    async fn update_status(
        &self,
        task_id: Uuid,
        status: TaskStatus,
    ) -> Result<TaskRecord, TaskError>;

    /// Sets the plugin state string.
    async fn update_plugin_state(
        &self,
        task_id: Uuid,
        plugin_state: &str,
    ) -> Result<TaskRecord, TaskError>;

    /// Replaces the local-state blob.
    async fn update_local_state(
        &self,
        task_id: Uuid,
        local_state: Map<String, Value>,
    ) -> Result<TaskRecord, TaskError>;

    /// Reads the plugin state string.
    async fn get_plugin_state(&self, task_id: Uuid) -> Result<String, TaskError>;

    /// Reads the local-state blob.
    async fn get_local_state(&self, task_id: Uuid) -> Result<Map<String, Value>, TaskError>;

    /// Removes a task, returning whether it existed.
    async fn delete(&self, task_id: Uuid) -> Result<bool, TaskError>;

    /// Lists every task in the given status.
    async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<TaskRecord>, TaskError>;
}

#[async_trait]
impl<B: StorageBackend + 'static> TaskStore for generic::GenericTaskStore<B> {
    async fn create(&self, record: TaskRecord) -> Result<TaskRecord, TaskError> {
        self.create(record).await
    }

    async fn get(&self, task_id: Uuid) -> Result<TaskRecord, TaskError> {
        self.get(task_id).await
    }

    async fn update(&self, record: &TaskRecord) -> Result<TaskRecord, TaskError> {
        self.update(record).await
    }

    async fn update_status(
        &self,
        task_id: Uuid,
        status: TaskStatus,
    ) -> Result<TaskRecord, TaskError> {
        self.update_status(task_id, status).await
    }

    async fn update_plugin_state(
        &self,
        task_id: Uuid,
        plugin_state: &str,
    ) -> Result<TaskRecord, TaskError> {
        self.update_plugin_state(task_id, plugin_state).await
    }

    async fn update_local_state(
        &self,
        task_id: Uuid,
        local_state: Map<String, Value>,
    ) -> Result<TaskRecord, TaskError> {
        self.update_local_state(task_id, local_state).await
    }

    async fn get_plugin_state(&self, task_id: Uuid) -> Result<String, TaskError> {
        self.get(task_id).await.map(|record| record.plugin_state)
    }

    async fn get_local_state(&self, task_id: Uuid) -> Result<Map<String, Value>, TaskError> {
        self.get(task_id).await.map(|record| record.local_state)
    }

    async fn delete(&self, task_id: Uuid) -> Result<bool, TaskError> {
        self.delete(task_id).await
    }

    async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<TaskRecord>, TaskError> {
        self.list_by_status(status).await
    }
}
