//! Plugin contract, the capability surface a container offers to plugins,
//! and the closed set of plugin kinds.
//!
//! A plugin never owns its state. It reads and changes state only through
//! the [`PluginApi`] handed to [`Plugin::init`], which routes every change
//! through the container's state machine and persistence.

pub mod factory;
pub mod resolver;
pub mod simple_form;
pub mod wait_for_event;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::TaskError;
use crate::types::{ExecutionRequest, ExecutionResponse, TaskStatus};

pub use factory::{Executor, ExecutorFactory};
pub use resolver::ActionResolver;
pub use simple_form::{SimpleForm, SimpleFormConfig};
pub use wait_for_event::{WaitForEvent, WaitForEventConfig};

/// Capabilities a container exposes to the plugin it runs.
#[async_trait]
pub trait PluginApi: Send + Sync {
    /// The task being run.
    fn task_id(&self) -> Uuid;

    /// The consignment the task belongs to.
    fn consignment_id(&self) -> Uuid;

    /// The workflow the task belongs to.
    fn workflow_id(&self) -> Uuid;

    /// Current outer status.
    fn task_state(&self) -> TaskStatus;

    /// Sets and persists the outer status. Monotonicity applies; setting the
    /// current status writes nothing.
    async fn set_task_state(&self, status: TaskStatus) -> Result<(), TaskError>;

    /// Current plugin state.
    fn plugin_state(&self) -> String;

    /// Sets and persists the plugin state without consulting the state
    /// machine.
    async fn set_plugin_state(&self, state: &str) -> Result<(), TaskError>;

    /// Whether `action` is legal from the current plugin state.
    fn can_transition(&self, action: &str) -> bool;

    /// Applies `action` through the state machine and persists the result.
    async fn transition(&self, action: &str) -> Result<(), TaskError>;

    /// Reads a local-store key.
    async fn read_local_store(&self, key: &str) -> Result<Option<Value>, TaskError>;

    /// Writes a local-store key.
    async fn write_local_store(&self, key: &str, value: Value) -> Result<(), TaskError>;

    /// Looks up a global-context key. Absence is not an error.
    fn read_global_store(&self, key: &str) -> Option<Value>;
}

/// A unit of business logic run inside a container.
///
/// `init` is called exactly once, before `start` or `execute`.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Wires the plugin to its container.
    fn init(&mut self, api: Arc<dyn PluginApi>);

    /// One-time task initialization.
    async fn start(&self, cancel: &CancellationToken) -> Result<ExecutionResponse, TaskError>;

    /// Handles one business action.
    async fn execute(
        &self,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResponse, TaskError>;
}

/// The plugin kinds this engine ships, dispatched by task type.
#[derive(Debug)]
pub enum TaskPlugin {
    /// Multi-step form.
    SimpleForm(SimpleForm),
    /// External event wait.
    WaitForEvent(WaitForEvent),
}

#[async_trait]
impl Plugin for TaskPlugin {
    fn init(&mut self, api: Arc<dyn PluginApi>) {
        match self {
            Self::SimpleForm(p) => p.init(api),
            Self::WaitForEvent(p) => p.init(api),
        }
    }

    async fn start(&self, cancel: &CancellationToken) -> Result<ExecutionResponse, TaskError> {
        match self {
            Self::SimpleForm(p) => p.start(cancel).await,
            Self::WaitForEvent(p) => p.start(cancel).await,
        }
    }

    async fn execute(
        &self,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResponse, TaskError> {
        match self {
            Self::SimpleForm(p) => p.execute(request, cancel).await,
            Self::WaitForEvent(p) => p.execute(request, cancel).await,
        }
    }
}

/// Returns the API a plugin was initialized with, or a plugin error if
/// `init` was never called.
pub(crate) fn require_api(api: &Option<Arc<dyn PluginApi>>) -> Result<&Arc<dyn PluginApi>, TaskError> {
    api.as_ref()
        .ok_or_else(|| TaskError::Plugin("plugin used before init".to_string()))
}
