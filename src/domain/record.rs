//! Task record: the persisted representation of one task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::types::{TaskStatus, TaskType};

/// Durable projection of a task and its container state.
///
/// All fields are public so that store implementors have full access. The
/// `version` field is owned by the storage layer: it is not serialized and
/// is filled from the backend's record version on every read.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use taskhost::{TaskRecord, TaskStatus, TaskType};
/// use uuid::Uuid;
///
/// let record = TaskRecord::new(
///     Uuid::new_v4(),
///     Uuid::new_v4(),
///     Uuid::new_v4(),
///     TaskType::SimpleForm,
///     json!({"title": "Export declaration"}),
/// );
/// assert_eq!(record.status, TaskStatus::Initialized);
/// assert!(record.plugin_state.is_empty());
/// assert!(record.local_state.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    /// Task identity.
    pub task_id: Uuid,

    /// Workflow the task is a step of.
    pub workflow_id: Uuid,

    /// Consignment the workflow runs for. Execution requests must name it.
    pub consignment_id: Uuid,

    /// Selects the plugin implementation.
    pub task_type: TaskType,

    /// Outer lifecycle status.
    pub status: TaskStatus,

    /// Plugin-owned business state. Empty means "not yet started".
    #[serde(default)]
    pub plugin_state: String,

    /// Plugin configuration blob, parsed by the executor factory.
    #[serde(default)]
    pub config: Value,

    /// Task-scoped key/value store written by the plugin.
    #[serde(default)]
    pub local_state: Map<String, Value>,

    /// Read-only snapshot of workflow-wide context.
    #[serde(default)]
    pub global_context: Map<String, Value>,

    /// User or system the task is assigned to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,

    /// Creation time.
    pub created_at: DateTime<Utc>,

    /// Last write time.
    pub updated_at: DateTime<Utc>,

    /// Storage version used for compare-and-swap writes.
    #[serde(skip)]
    pub version: u64,
}

impl TaskRecord {
    /// Creates a record in the `Initialized` status with an empty plugin
    /// state and empty stores.
    pub fn new(
        task_id: Uuid,
        workflow_id: Uuid,
        consignment_id: Uuid,
        task_type: TaskType,
        config: Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            task_id,
            workflow_id,
            consignment_id,
            task_type,
            status: TaskStatus::Initialized,
            plugin_state: String::new(),
            config,
            local_state: Map::new(),
            global_context: Map::new(),
            assignee: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Sets the global-context snapshot.
    pub fn with_global_context(mut self, global_context: Map<String, Value>) -> Self {
        self.global_context = global_context;
        self
    }

    /// Sets the assignee.
    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = Some(assignee.into());
        self
    }

    /// Bumps `updated_at` to now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Returns `true` if the outer status is terminal.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
