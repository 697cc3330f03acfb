//! Task-scoped key/value store over a record's local-state blob.
//!
//! [`LocalStore`] hides the task ID and store from plugin-facing code. It is
//! `Clone + Send + Sync`; clones share the same task and store.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use serde_json::json;
//! use taskhost::store::{InMemoryTaskStore, LocalStore, TaskStore};
//! use taskhost::{TaskRecord, TaskType};
//! use uuid::Uuid;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
//! let record = TaskRecord::new(
//!     Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), TaskType::SimpleForm, json!({}),
//! );
//! let task_id = record.task_id;
//! store.create(record).await.unwrap();
//!
//! let local = LocalStore::new(store, task_id);
//! local.set_state("formData", json!({"field": "value"})).await.unwrap();
//! assert_eq!(
//!     local.get_state("formData").await.unwrap(),
//!     Some(json!({"field": "value"}))
//! );
//! # });
//! ```

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use crate::error::TaskError;
use crate::store::TaskStore;

/// Key/value access to one task's local state.
#[derive(Clone)]
pub struct LocalStore {
    store: Arc<dyn TaskStore>,
    task_id: Uuid,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("task_id", &self.task_id)
            .finish_non_exhaustive()
    }
}

impl LocalStore {
    /// Binds a store handle to a task.
    pub fn new(store: Arc<dyn TaskStore>, task_id: Uuid) -> Self {
        Self { store, task_id }
    }

    /// The bound task.
    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    /// Reads a value. Absent keys return `Ok(None)`.
    pub async fn get_state(&self, key: &str) -> Result<Option<Value>, TaskError> {
        let local = self.store.get_local_state(self.task_id).await?;
        Ok(local.get(key).cloned())
    }

    /// Reads and deserializes a value; a value of the wrong shape reads as
    /// `None`.
    pub async fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, TaskError> {
        Ok(self
            .get_state(key)
            .await?
            .and_then(|v| serde_json::from_value(v).ok()))
    }

    /// Writes a value, replacing any previous one.
    pub async fn set_state(&self, key: impl Into<String>, value: Value) -> Result<(), TaskError> {
        let mut local = self.store.get_local_state(self.task_id).await?;
        local.insert(key.into(), value);
        self.store.update_local_state(self.task_id, local).await?;
        Ok(())
    }

    /// Removes a key, returning its previous value.
    pub async fn remove_state(&self, key: &str) -> Result<Option<Value>, TaskError> {
        let mut local = self.store.get_local_state(self.task_id).await?;
        let previous = local.remove(key);
        if previous.is_some() {
            self.store.update_local_state(self.task_id, local).await?;
        }
        Ok(previous)
    }
}
