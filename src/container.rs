//! Per-task runtime binding one plugin to its state machine.
//!
//! The [`Container`] is the sole writer of a task's in-memory and persisted
//! state while it is resident. Plugins reach it only through the
//! [`PluginApi`] handed to [`Plugin::init`].
//!
//! # Locking
//!
//! - A `parking_lot::RwLock` guards outer status and plugin state. It is held
//!   only for the check-and-set itself, never across an `.await`.
//! - An async write gate serializes every mutation together with its
//!   persistence, so durable write order matches in-memory order. Local-store
//!   reads take the gate shared.
//! - An async run lock serializes whole `start`/`execute` calls, so a
//!   plugin's legality check, local writes and transition see no interleaved
//!   call on the same container.
//!
//! Outbound calls made by plugins hold neither state lock.
//!
//! # Persistence
//!
//! `transition` persists the plugin state, then the outer status if the edge
//! sets one. Wired to a [`TaskTransaction`](crate::store::TaskTransaction)
//! both land in a single commit; wired directly to a store they are two
//! writes, and a failure between them leaves the store behind memory until
//! the container is rebuilt from the store.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::TaskRecord;
use crate::error::TaskError;
use crate::fsm::{PluginFsm, TransitionOutcome};
use crate::plugin::{Executor, Plugin, PluginApi, TaskPlugin};
use crate::store::{LocalStore, TaskStore};
use crate::types::{ExecutionRequest, ExecutionResponse, TaskStatus};

#[derive(Debug, Clone)]
struct ContainerState {
    status: TaskStatus,
    plugin_state: String,
}

/// State and wiring shared between a container and its plugin.
struct ContainerCore {
    task_id: Uuid,
    consignment_id: Uuid,
    workflow_id: Uuid,
    state: RwLock<ContainerState>,
    write_gate: tokio::sync::RwLock<()>,
    fsm: Option<Arc<PluginFsm>>,
    store: Arc<dyn TaskStore>,
    local: LocalStore,
    global: Map<String, Value>,
}

impl ContainerCore {
    /// Computes the outcome of `action` against `state`. `Ok(None)` means no
    /// state machine is bound.
    ///
    /// A missing edge is reported before the terminal check, so a consumed
    /// single-use edge always surfaces as an illegal transition.
    fn plan(
        &self,
        state: &ContainerState,
        action: &str,
    ) -> Result<Option<TransitionOutcome>, TaskError> {
        let outcome = match &self.fsm {
            Some(fsm) => Some(fsm.transition(&state.plugin_state, action)?),
            None => None,
        };
        if state.status.is_terminal() {
            return Err(TaskError::Terminal {
                task_id: self.task_id,
                status: state.status,
            });
        }
        if let Some(next) = outcome.as_ref().and_then(|o| o.next_status) {
            state.status.validate_advance(self.task_id, &next)?;
        }
        Ok(outcome)
    }
}

#[async_trait]
impl PluginApi for ContainerCore {
    fn task_id(&self) -> Uuid {
        self.task_id
    }

    fn consignment_id(&self) -> Uuid {
        self.consignment_id
    }

    fn workflow_id(&self) -> Uuid {
        self.workflow_id
    }

    fn task_state(&self) -> TaskStatus {
        self.state.read().status
    }

    async fn set_task_state(&self, status: TaskStatus) -> Result<(), TaskError> {
        let _gate = self.write_gate.write().await;
        {
            let mut state = self.state.write();
            if state.status == status {
                return Ok(());
            }
            state.status.validate_advance(self.task_id, &status)?;
            state.status = status;
        }
        self.store.update_status(self.task_id, status).await?;
        Ok(())
    }

    fn plugin_state(&self) -> String {
        self.state.read().plugin_state.clone()
    }

    async fn set_plugin_state(&self, plugin_state: &str) -> Result<(), TaskError> {
        let _gate = self.write_gate.write().await;
        self.state.write().plugin_state = plugin_state.to_string();
        self.store
            .update_plugin_state(self.task_id, plugin_state)
            .await?;
        Ok(())
    }

    fn can_transition(&self, action: &str) -> bool {
        let state = self.state.read();
        self.plan(&state, action).is_ok()
    }

    async fn transition(&self, action: &str) -> Result<(), TaskError> {
        let _gate = self.write_gate.write().await;

        let outcome = {
            let mut state = self.state.write();
            let Some(outcome) = self.plan(&state, action)? else {
                return Ok(());
            };
            state.plugin_state.clone_from(&outcome.next_plugin_state);
            if let Some(next) = outcome.next_status {
                state.status = next;
            }
            outcome
        };

        tracing::debug!(
            task_id = %self.task_id,
            action,
            plugin_state = %outcome.next_plugin_state,
            status = ?outcome.next_status,
            "transition applied"
        );

        if let Err(e) = self
            .store
            .update_plugin_state(self.task_id, &outcome.next_plugin_state)
            .await
        {
            tracing::error!(task_id = %self.task_id, action, error = %e, "failed to persist plugin state");
            return Err(e);
        }
        if let Some(next) = outcome.next_status {
            if let Err(e) = self.store.update_status(self.task_id, next).await {
                tracing::error!(
                    task_id = %self.task_id,
                    action,
                    error = %e,
                    "plugin state persisted but outer status was not"
                );
                return Err(e);
            }
        }
        Ok(())
    }

    async fn read_local_store(&self, key: &str) -> Result<Option<Value>, TaskError> {
        let _gate = self.write_gate.read().await;
        self.local.get_state(key).await
    }

    async fn write_local_store(&self, key: &str, value: Value) -> Result<(), TaskError> {
        let _gate = self.write_gate.write().await;
        self.local.set_state(key, value).await
    }

    fn read_global_store(&self, key: &str) -> Option<Value> {
        self.global.get(key).cloned()
    }
}

/// Runtime wrapper around one task instance.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use serde_json::json;
/// use tokio_util::sync::CancellationToken;
/// use taskhost::config::EngineConfig;
/// use taskhost::plugin::ExecutorFactory;
/// use taskhost::store::{InMemoryTaskStore, TaskStore};
/// use taskhost::{Container, TaskRecord, TaskType};
/// use uuid::Uuid;
///
/// # async fn example() -> Result<(), taskhost::TaskError> {
/// let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
/// let record = store
///     .create(TaskRecord::new(
///         Uuid::new_v4(),
///         Uuid::new_v4(),
///         Uuid::new_v4(),
///         TaskType::SimpleForm,
///         json!({"title": "Permit"}),
///     ))
///     .await?;
///
/// let factory = ExecutorFactory::from_config(&EngineConfig::default())?;
/// let executor = factory.build(record.task_type, &record.config)?;
/// let container = Container::from_executor(&record, store, executor).await;
/// let response = container.start(&CancellationToken::new()).await?;
/// assert_eq!(response.plugin_state.as_deref(), Some("initialized"));
/// # Ok(())
/// # }
/// ```
pub struct Container<P: Plugin = TaskPlugin> {
    core: Arc<ContainerCore>,
    plugin: P,
    run: tokio::sync::Mutex<()>,
}

impl<P: Plugin> std::fmt::Debug for Container<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.core.state.read();
        f.debug_struct("Container")
            .field("task_id", &self.core.task_id)
            .field("status", &state.status)
            .field("plugin_state", &state.plugin_state)
            .field("has_fsm", &self.core.fsm.is_some())
            .finish()
    }
}

impl Container<TaskPlugin> {
    /// Builds a container from a factory-built executor.
    pub async fn from_executor(
        record: &TaskRecord,
        store: Arc<dyn TaskStore>,
        executor: Executor,
    ) -> Self {
        Self::new(record, store, executor.plugin, executor.fsm).await
    }
}

impl<P: Plugin> Container<P> {
    /// Binds `plugin` and `fsm` to the task in `record`.
    ///
    /// The persisted plugin state is loaded from `store`; if that fails the
    /// record's own plugin state is used (empty means "not yet started").
    /// Then `plugin.init` is called with this container's API.
    pub async fn new(
        record: &TaskRecord,
        store: Arc<dyn TaskStore>,
        mut plugin: P,
        fsm: Option<Arc<PluginFsm>>,
    ) -> Self {
        let plugin_state = match store.get_plugin_state(record.task_id).await {
            Ok(state) => state,
            Err(e) => {
                tracing::debug!(task_id = %record.task_id, error = %e, "no persisted plugin state, using record");
                record.plugin_state.clone()
            },
        };

        let core = Arc::new(ContainerCore {
            task_id: record.task_id,
            consignment_id: record.consignment_id,
            workflow_id: record.workflow_id,
            state: RwLock::new(ContainerState {
                status: record.status,
                plugin_state,
            }),
            write_gate: tokio::sync::RwLock::new(()),
            fsm,
            local: LocalStore::new(Arc::clone(&store), record.task_id),
            store,
            global: record.global_context.clone(),
        });

        plugin.init(Arc::clone(&core) as Arc<dyn PluginApi>);
        Self {
            core,
            plugin,
            run: tokio::sync::Mutex::new(()),
        }
    }

    /// The task ID.
    pub fn task_id(&self) -> Uuid {
        self.core.task_id
    }

    /// Current outer status.
    pub fn status(&self) -> TaskStatus {
        self.core.task_state()
    }

    /// Current plugin state.
    pub fn plugin_state(&self) -> String {
        self.core.plugin_state()
    }

    /// The capability surface handed to the plugin.
    pub fn api(&self) -> Arc<dyn PluginApi> {
        Arc::clone(&self.core) as Arc<dyn PluginApi>
    }

    /// Whether `action` is legal now. Always `true` without a state machine
    /// unless the task is terminal.
    pub fn can_transition(&self, action: &str) -> bool {
        self.core.can_transition(action)
    }

    /// Applies `action`. See [`PluginApi::transition`].
    pub async fn transition(&self, action: &str) -> Result<(), TaskError> {
        self.core.transition(action).await
    }

    /// Runs the plugin's one-time initialization.
    pub async fn start(&self, cancel: &CancellationToken) -> Result<ExecutionResponse, TaskError> {
        let _run = self.run.lock().await;
        let before = self.core.plugin_state();
        let response = self.plugin.start(cancel).await?;
        Ok(self.annotate(response, &before))
    }

    /// Runs one business action.
    pub async fn execute(
        &self,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResponse, TaskError> {
        let _run = self.run.lock().await;
        let before = self.core.plugin_state();
        let response = self.plugin.execute(request, cancel).await?;
        Ok(self.annotate(response, &before))
    }

    fn annotate(&self, mut response: ExecutionResponse, before: &str) -> ExecutionResponse {
        let state = self.core.state.read();
        if state.plugin_state != before {
            response.new_state = Some(state.status);
            response.plugin_state = Some(state.plugin_state.clone());
        }
        response
    }
}
