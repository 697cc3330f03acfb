//! Process-facing orchestration of task executions.
//!
//! [`TaskManager`] resolves tasks through a read-through cache, runs each
//! execution inside a [`TaskTransaction`] and emits best-effort
//! notifications after commit.
//!
//! # Execution pipeline
//!
//! 1. Take the task's execution lock (different tasks never contend).
//! 2. Open a transaction from the stored record and check the outer status
//!    is executable.
//! 3. Build the executor, bind it in a [`Container`] over the transaction, and
//!    run `start` or `execute`.
//! 4. On success stage the container's outer status and commit everything in
//!    one compare-and-swap write. On failure drop the transaction.
//! 5. Refresh the cache, then notify.
//! 6. Evict the task from the cache once its committed status is terminal.

mod cache;
mod context;
mod notifier;

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::container::Container;
use crate::domain::TaskRecord;
use crate::error::TaskError;
use crate::plugin::ExecutorFactory;
use crate::store::{TaskStore, TaskTransaction};
use crate::types::{
    ExecuteTaskRequest, ExecuteTaskResponse, ExecutionRequest, ExecutionResponse,
    NotificationSignal, TaskNotification, TaskResult, TaskStatus,
};

use cache::{TaskCache, TaskSlot};

pub use context::TaskContext;
pub use notifier::{notification_channel, NotificationSender};

/// Committed result of one execution.
#[derive(Debug, Clone)]
pub struct Execution {
    /// The record as committed.
    pub record: TaskRecord,
    /// The plugin's response.
    pub response: ExecutionResponse,
}

/// Orchestrates task executions for one process.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use serde_json::json;
/// use tokio_util::sync::CancellationToken;
/// use taskhost::config::EngineConfig;
/// use taskhost::manager::{notification_channel, TaskManager};
/// use taskhost::store::InMemoryTaskStore;
/// use taskhost::{ExecutionRequest, TaskRecord, TaskStatus, TaskType};
/// use uuid::Uuid;
///
/// # async fn example() -> Result<(), taskhost::TaskError> {
/// let config = EngineConfig::default();
/// let (sender, _receiver) = notification_channel(config.notification_capacity);
/// let manager = TaskManager::from_config(&config, Arc::new(InMemoryTaskStore::new()), sender)?;
///
/// let record = manager
///     .register_task(TaskRecord::new(
///         Uuid::new_v4(),
///         Uuid::new_v4(),
///         Uuid::new_v4(),
///         TaskType::SimpleForm,
///         json!({"title": "Permit"}),
///     ))
///     .await?;
///
/// let done = manager
///     .submit_task_completion(
///         record.task_id,
///         ExecutionRequest::new("submit").with_content(json!({"field": "value"})),
///         &CancellationToken::new(),
///     )
///     .await?;
/// assert_eq!(done.record.status, TaskStatus::Completed);
/// # Ok(())
/// # }
/// ```
pub struct TaskManager {
    store: Arc<dyn TaskStore>,
    factory: ExecutorFactory,
    cache: TaskCache,
    notifier: NotificationSender,
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager")
            .field("cached_tasks", &self.cache.len())
            .finish()
    }
}

impl TaskManager {
    /// Creates a manager over `store`.
    pub fn new(
        store: Arc<dyn TaskStore>,
        factory: ExecutorFactory,
        notifier: NotificationSender,
    ) -> Self {
        Self {
            store,
            factory,
            cache: TaskCache::default(),
            notifier,
        }
    }

    /// Creates a manager and its executor factory from engine configuration.
    ///
    /// # Errors
    ///
    /// [`TaskError::Config`] if the outbound HTTP client cannot be built.
    pub fn from_config(
        config: &EngineConfig,
        store: Arc<dyn TaskStore>,
        notifier: NotificationSender,
    ) -> Result<Self, TaskError> {
        Ok(Self::new(store, ExecutorFactory::from_config(config)?, notifier))
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    // ---- Cache operations ----

    /// Persists `record` (idempotently) and caches the stored version unless
    /// it is already terminal.
    pub async fn register_task(&self, record: TaskRecord) -> Result<TaskRecord, TaskError> {
        let stored = self.store.create(record).await?;
        self.cache.upsert(stored.clone());
        self.evict_if_terminal(&stored);
        tracing::info!(
            task_id = %stored.task_id,
            task_type = %stored.task_type,
            status = %stored.status,
            "task registered"
        );
        Ok(stored)
    }

    /// Returns the task, loading and caching it on a miss. Terminal tasks are
    /// served from the store without being cached.
    ///
    /// # Errors
    ///
    /// [`TaskError::NotFound`] if the store does not know the task.
    pub async fn get_task(&self, task_id: Uuid) -> Result<TaskRecord, TaskError> {
        Ok(self.resolve(task_id).await?.record())
    }

    /// Drops a task from the cache. The stored record is untouched.
    pub fn evict_task(&self, task_id: Uuid) -> bool {
        self.cache.remove(task_id)
    }

    /// Sets the outer status directly. Setting the current status again is a
    /// no-op; moving backwards or out of a terminal status fails.
    pub async fn update_task_status(
        &self,
        task_id: Uuid,
        status: TaskStatus,
    ) -> Result<TaskRecord, TaskError> {
        let slot = self.resolve(task_id).await?;
        let _exec = slot.exec.lock().await;

        let current = self.store.get(task_id).await?;
        if current.status == status {
            slot.set_record(current.clone());
            return Ok(current);
        }
        current.status.validate_advance(task_id, &status)?;

        let updated = self.store.update_status(task_id, status).await?;
        slot.set_record(updated.clone());
        tracing::info!(task_id = %task_id, from = %current.status, to = %status, "task status updated");
        self.evict_if_terminal(&updated);
        Ok(updated)
    }

    // ---- Executions ----

    /// Runs a task the orchestrator has already loaded.
    ///
    /// Starting (no request) notifies [`NotificationSignal::InProgress`]. A
    /// business request notifies only a terminal outcome.
    pub async fn init_task(
        &self,
        ctx: TaskContext,
        cancel: &CancellationToken,
    ) -> Result<Execution, TaskError> {
        let TaskContext {
            record,
            assignee,
            request,
        } = ctx;
        let mut stored = self.store.create(record).await?;
        if let Some(assignee) = assignee {
            if stored.assignee.as_deref() != Some(assignee.as_str()) {
                tracing::debug!(task_id = %stored.task_id, assignee = %assignee, "assigning task");
                stored.assignee = Some(assignee);
                stored = self.store.update(&stored).await?;
            }
        }
        let slot = self.cache.upsert(stored);

        let execution = self.run(&slot, request.as_ref(), cancel).await?;
        self.notify_outcome(&execution.record, request.is_some());
        Ok(execution)
    }

    /// Drives a task forward with a submitted payload and notifies a
    /// terminal outcome. Non-terminal outcomes are not notified.
    pub async fn submit_task_completion(
        &self,
        task_id: Uuid,
        request: ExecutionRequest,
        cancel: &CancellationToken,
    ) -> Result<Execution, TaskError> {
        let slot = self.resolve(task_id).await?;
        let execution = self.run(&slot, Some(&request), cancel).await?;
        self.notify_terminal(&execution.record);
        Ok(execution)
    }

    /// External callback that sets the outer status directly and notifies
    /// when it is terminal.
    pub async fn notify_task_completion(
        &self,
        task_id: Uuid,
        status: TaskStatus,
    ) -> Result<TaskRecord, TaskError> {
        let record = self.update_task_status(task_id, status).await?;
        self.notify_terminal(&record);
        Ok(record)
    }

    /// External callback routed through the plugin as `action`.
    pub async fn on_task_completed(
        &self,
        task_id: Uuid,
        action: &str,
        content: Option<Value>,
        cancel: &CancellationToken,
    ) -> Result<Execution, TaskError> {
        let request = ExecutionRequest {
            action: action.to_string(),
            content,
        };
        self.submit_task_completion(task_id, request, cancel).await
    }

    /// Transport-facing entry point. Validates the request, runs it, and
    /// turns any error into a failed response.
    pub async fn handle_execute(
        &self,
        request: ExecuteTaskRequest,
        cancel: &CancellationToken,
    ) -> ExecuteTaskResponse {
        match self.try_execute(&request, cancel).await {
            Ok(execution) => {
                let Execution { record, response } = execution;
                ExecuteTaskResponse::ok(TaskResult {
                    status: record.status,
                    plugin_state: record.plugin_state,
                    message: response.message,
                    data: response
                        .api_response
                        .and_then(|api| serde_json::to_value(api).ok()),
                })
            },
            Err(e) => {
                tracing::warn!(
                    task_id = %request.task_id,
                    consignment_id = %request.consignment_id,
                    status = e.status_code().as_u16(),
                    error = %e,
                    "execute request failed"
                );
                ExecuteTaskResponse::failed(&e)
            },
        }
    }

    async fn try_execute(
        &self,
        request: &ExecuteTaskRequest,
        cancel: &CancellationToken,
    ) -> Result<Execution, TaskError> {
        request.validate()?;
        let slot = self.resolve(request.task_id).await?;
        if slot.record().consignment_id != request.consignment_id {
            return Err(TaskError::Validation(
                "consignment_id does not match task".to_string(),
            ));
        }

        let business = request.execution_request();
        let execution = self.run(&slot, business.as_ref(), cancel).await?;
        self.notify_outcome(&execution.record, business.is_some());
        Ok(execution)
    }

    async fn resolve(&self, task_id: Uuid) -> Result<Arc<TaskSlot>, TaskError> {
        if let Some(slot) = self.cache.get(task_id) {
            return Ok(slot);
        }
        let record = self.store.get(task_id).await?;
        if record.is_terminal() {
            return Ok(Arc::new(TaskSlot::new(record)));
        }
        tracing::debug!(task_id = %task_id, "task loaded into cache");
        Ok(self.cache.get_or_insert(record))
    }

    async fn run(
        &self,
        slot: &TaskSlot,
        request: Option<&ExecutionRequest>,
        cancel: &CancellationToken,
    ) -> Result<Execution, TaskError> {
        let _exec = slot.exec.lock().await;
        let task_id = slot.record().task_id;

        let tx = Arc::new(TaskTransaction::begin(Arc::clone(&self.store), task_id).await?);
        let record = tx.snapshot();
        slot.set_record(record.clone());
        if !record.status.is_executable() {
            self.evict_if_terminal(&record);
            return Err(TaskError::NotReady {
                task_id,
                status: record.status,
            });
        }

        let executor = self.factory.build(record.task_type, &record.config)?;
        let container =
            Container::from_executor(&record, Arc::clone(&tx) as Arc<dyn TaskStore>, executor).await;

        let result = match request {
            None => container.start(cancel).await,
            Some(request) => container.execute(request, cancel).await,
        };
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                tx.rollback();
                tracing::warn!(
                    task_id = %task_id,
                    action = request.map(|r| r.action.as_str()).unwrap_or("start"),
                    error = %e,
                    "execution failed, nothing committed"
                );
                return Err(e);
            },
        };

        tx.update_status(task_id, container.status()).await?;
        let committed = match tx.commit().await {
            Ok(committed) => committed,
            Err(e) => {
                if e.is_conflict() {
                    if let Ok(fresh) = self.store.get(task_id).await {
                        slot.set_record(fresh);
                    }
                }
                return Err(e);
            },
        };
        slot.set_record(committed.clone());

        tracing::info!(
            task_id = %task_id,
            status = %committed.status,
            plugin_state = %committed.plugin_state,
            "execution committed"
        );
        Ok(Execution {
            record: committed,
            response,
        })
    }

    /// A start notifies `InProgress`; a business request notifies only a
    /// terminal outcome.
    fn notify_outcome(&self, record: &TaskRecord, business: bool) {
        if business {
            self.notify_terminal(record);
        } else {
            self.notify(record.task_id, NotificationSignal::InProgress);
            self.evict_if_terminal(record);
        }
    }

    fn notify_terminal(&self, record: &TaskRecord) {
        if let Some(signal) = NotificationSignal::for_terminal_status(record.status) {
            self.notify(record.task_id, signal);
        }
        self.evict_if_terminal(record);
    }

    fn evict_if_terminal(&self, record: &TaskRecord) {
        if record.is_terminal() && self.cache.remove(record.task_id) {
            tracing::debug!(task_id = %record.task_id, status = %record.status, "terminal task evicted from cache");
        }
    }

    fn notify(&self, task_id: Uuid, signal: NotificationSignal) {
        self.notifier.notify(TaskNotification::new(task_id, signal));
    }
}
