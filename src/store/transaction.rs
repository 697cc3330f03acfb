//! Single-task unit of work.
//!
//! A [`TaskTransaction`] loads a task record at [`begin`](TaskTransaction::begin)
//! and then acts as a [`TaskStore`] scoped to that task: every write is
//! staged in memory and reads observe the staged record. [`commit`](TaskTransaction::commit)
//! applies all staged changes as one compare-and-swap write against the
//! version read at `begin`; dropping the transaction or calling
//! [`rollback`](TaskTransaction::rollback) discards them.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use taskhost::store::{InMemoryTaskStore, TaskStore, TaskTransaction};
//! use taskhost::TaskStatus;
//! # async fn example(task_id: uuid::Uuid) -> Result<(), taskhost::TaskError> {
//! let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
//! let tx = TaskTransaction::begin(store.clone(), task_id).await?;
//! tx.update_plugin_state(task_id, "submitted").await?;
//! tx.update_status(task_id, TaskStatus::Completed).await?;
//! tx.commit().await?; // one write
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domain::TaskRecord;
use crate::error::TaskError;
use crate::store::TaskStore;
use crate::types::TaskStatus;

/// Staged writes for one task, committed atomically.
pub struct TaskTransaction {
    inner: Arc<dyn TaskStore>,
    original: TaskRecord,
    staged: Mutex<TaskRecord>,
    finished: AtomicBool,
}

impl std::fmt::Debug for TaskTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskTransaction")
            .field("task_id", &self.original.task_id)
            .field("version", &self.original.version)
            .field("finished", &self.finished.load(Ordering::Acquire))
            .finish()
    }
}

impl TaskTransaction {
    /// Loads the task and opens a transaction over it.
    ///
    /// # Errors
    ///
    /// Propagates the store's error, typically [`TaskError::NotFound`].
    pub async fn begin(inner: Arc<dyn TaskStore>, task_id: Uuid) -> Result<Self, TaskError> {
        let original = inner.get(task_id).await?;
        Ok(Self::from_record(inner, original))
    }

    /// Opens a transaction over an already loaded record. Commit fails with
    /// [`TaskError::ConcurrentModification`] if `record.version` is stale.
    pub fn from_record(inner: Arc<dyn TaskStore>, record: TaskRecord) -> Self {
        Self {
            inner,
            staged: Mutex::new(record.clone()),
            original: record,
            finished: AtomicBool::new(false),
        }
    }

    /// The task this transaction is scoped to.
    pub fn task_id(&self) -> Uuid {
        self.original.task_id
    }

    /// Current staged record.
    pub fn snapshot(&self) -> TaskRecord {
        self.staged.lock().clone()
    }

    /// Returns `true` if any write has been staged.
    pub fn is_dirty(&self) -> bool {
        *self.staged.lock() != self.original
    }

    /// Writes every staged change in one compare-and-swap update and
    /// returns the stored record.
    ///
    /// # Errors
    ///
    /// - [`TaskError::ConcurrentModification`] if the task changed since
    ///   `begin`.
    /// - [`TaskError::Store`] if the transaction already finished.
    pub async fn commit(&self) -> Result<TaskRecord, TaskError> {
        self.finish()?;
        let staged = self.snapshot();
        if staged == self.original {
            return Ok(staged);
        }
        let committed = self.inner.update(&staged).await?;
        tracing::debug!(
            task_id = %committed.task_id,
            version = committed.version,
            status = %committed.status,
            plugin_state = %committed.plugin_state,
            "transaction committed"
        );
        Ok(committed)
    }

    /// Discards all staged writes and closes the transaction.
    pub fn rollback(&self) {
        if self.finished.swap(true, Ordering::AcqRel) {
            return;
        }
        *self.staged.lock() = self.original.clone();
        tracing::debug!(task_id = %self.task_id(), "transaction rolled back");
    }

    fn finish(&self) -> Result<(), TaskError> {
        if self.finished.swap(true, Ordering::AcqRel) {
            return Err(TaskError::Store(format!(
                "transaction for task {} already finished",
                self.task_id()
            )));
        }
        Ok(())
    }

    fn check_scope(&self, task_id: Uuid) -> Result<(), TaskError> {
        if task_id != self.task_id() {
            return Err(TaskError::Store(format!(
                "transaction for task {} cannot touch task {task_id}",
                self.task_id()
            )));
        }
        Ok(())
    }

    fn stage<F>(&self, task_id: Uuid, mutate: F) -> Result<TaskRecord, TaskError>
    where
        F: FnOnce(&mut TaskRecord),
    {
        self.check_scope(task_id)?;
        if self.finished.load(Ordering::Acquire) {
            return Err(TaskError::Store(format!(
                "transaction for task {task_id} already finished"
            )));
        }
        let mut staged = self.staged.lock();
        mutate(&mut staged);
        Ok(staged.clone())
    }
}

impl Drop for TaskTransaction {
    fn drop(&mut self) {
        if !self.finished.load(Ordering::Acquire) && *self.staged.get_mut() != self.original {
            tracing::debug!(task_id = %self.original.task_id, "discarding uncommitted writes");
        }
    }
}

#[async_trait]
impl TaskStore for TaskTransaction {
    async fn create(&self, record: TaskRecord) -> Result<TaskRecord, TaskError> {
        self.check_scope(record.task_id)?;
        Ok(self.snapshot())
    }

    async fn get(&self, task_id: Uuid) -> Result<TaskRecord, TaskError> {
        self.check_scope(task_id)?;
        Ok(self.snapshot())
    }

    async fn update(&self, record: &TaskRecord) -> Result<TaskRecord, TaskError> {
        let record = record.clone();
        self.stage(record.task_id, move |staged| {
            let version = staged.version;
            *staged = record;
            staged.version = version;
        })
    }

    async fn update_status(
        &self,
        task_id: Uuid,
        status: TaskStatus,
    ) -> Result<TaskRecord, TaskError> {
        self.stage(task_id, |staged| staged.status = status)
    }

    async fn update_plugin_state(
        &self,
        task_id: Uuid,
        plugin_state: &str,
    ) -> Result<TaskRecord, TaskError> {
        self.stage(task_id, |staged| staged.plugin_state = plugin_state.to_string())
    }

    async fn update_local_state(
        &self,
        task_id: Uuid,
        local_state: Map<String, Value>,
    ) -> Result<TaskRecord, TaskError> {
        self.stage(task_id, move |staged| staged.local_state = local_state)
    }

    async fn get_plugin_state(&self, task_id: Uuid) -> Result<String, TaskError> {
        self.check_scope(task_id)?;
        Ok(self.staged.lock().plugin_state.clone())
    }

    async fn get_local_state(&self, task_id: Uuid) -> Result<Map<String, Value>, TaskError> {
        self.check_scope(task_id)?;
        Ok(self.staged.lock().local_state.clone())
    }

    async fn delete(&self, task_id: Uuid) -> Result<bool, TaskError> {
        self.check_scope(task_id)?;
        Err(TaskError::Store(
            "delete is not supported inside a transaction".to_string(),
        ))
    }

    async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<TaskRecord>, TaskError> {
        let own = self.task_id();
        let mut records = self.inner.list_by_status(status).await?;
        records.retain(|record| record.task_id != own);
        let staged = self.snapshot();
        if staged.status == status {
            records.push(staged);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryTaskStore;
    use crate::types::TaskType;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn seeded() -> (Arc<dyn TaskStore>, Uuid) {
        let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
        let record = TaskRecord::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            TaskType::SimpleForm,
            json!({}),
        );
        let id = record.task_id;
        store.create(record).await.unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn commit_applies_all_writes_once() {
        let (store, id) = seeded().await;
        let tx = TaskTransaction::begin(store.clone(), id).await.unwrap();

        tx.update_plugin_state(id, "submitted").await.unwrap();
        tx.update_status(id, TaskStatus::Completed).await.unwrap();
        let mut local = Map::new();
        local.insert("formData".into(), json!({"field": "value"}));
        tx.update_local_state(id, local.clone()).await.unwrap();

        // Nothing visible before commit.
        assert_eq!(store.get(id).await.unwrap().status, TaskStatus::Initialized);

        let committed = tx.commit().await.unwrap();
        assert_eq!(committed.version, 2);

        let stored = store.get(id).await.unwrap();
        assert_eq!(stored.plugin_state, "submitted");
        assert_eq!(stored.status, TaskStatus::Completed);
        assert_eq!(stored.local_state, local);
    }

    #[tokio::test]
    async fn drop_discards_staged_writes() {
        let (store, id) = seeded().await;
        {
            let tx = TaskTransaction::begin(store.clone(), id).await.unwrap();
            tx.update_plugin_state(id, "draft").await.unwrap();
            assert!(tx.is_dirty());
        }
        let stored = store.get(id).await.unwrap();
        assert_eq!(stored.plugin_state, "");
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn rollback_then_commit_fails() {
        let (store, id) = seeded().await;
        let tx = TaskTransaction::begin(store, id).await.unwrap();
        tx.update_status(id, TaskStatus::InProgress).await.unwrap();
        tx.rollback();
        assert!(!tx.is_dirty());
        assert!(tx.commit().await.is_err());
        assert!(tx.update_status(id, TaskStatus::InProgress).await.is_err());
    }

    #[tokio::test]
    async fn commit_detects_concurrent_writer() {
        let (store, id) = seeded().await;
        let tx = TaskTransaction::begin(store.clone(), id).await.unwrap();
        tx.update_plugin_state(id, "draft").await.unwrap();

        store.update_plugin_state(id, "other").await.unwrap();

        assert!(matches!(
            tx.commit().await,
            Err(TaskError::ConcurrentModification { .. })
        ));
        assert_eq!(store.get(id).await.unwrap().plugin_state, "other");
    }

    #[tokio::test]
    async fn writes_outside_scope_fail() {
        let (store, id) = seeded().await;
        let tx = TaskTransaction::begin(store, id).await.unwrap();
        assert!(tx
            .update_status(Uuid::new_v4(), TaskStatus::Failed)
            .await
            .is_err());
        assert!(!tx.is_dirty());
    }

    #[tokio::test]
    async fn clean_commit_skips_write() {
        let (store, id) = seeded().await;
        let tx = TaskTransaction::begin(store.clone(), id).await.unwrap();
        let committed = tx.commit().await.unwrap();
        assert_eq!(committed.version, 1);
        assert_eq!(store.get(id).await.unwrap().version, 1);
    }
}
