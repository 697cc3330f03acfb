//! Input for [`TaskManager::init_task`](crate::manager::TaskManager::init_task).

use uuid::Uuid;

use crate::domain::TaskRecord;
use crate::types::ExecutionRequest;

/// A task row already loaded by the orchestrator, plus what to run on it.
#[derive(Debug, Clone)]
pub struct TaskContext {
    /// The task as the orchestrator sees it.
    pub record: TaskRecord,
    /// Overrides the record's assignee when set.
    pub assignee: Option<String>,
    /// Business action to run. `None` starts the task.
    pub request: Option<ExecutionRequest>,
}

impl TaskContext {
    /// Context that starts `record`.
    pub fn new(record: TaskRecord) -> Self {
        Self {
            record,
            assignee: None,
            request: None,
        }
    }

    /// Sets the assignee.
    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = Some(assignee.into());
        self
    }

    /// Runs `request` instead of starting the task.
    pub fn with_request(mut self, request: ExecutionRequest) -> Self {
        self.request = Some(request);
        self
    }

    pub fn task_id(&self) -> Uuid {
        self.record.task_id
    }

    pub fn consignment_id(&self) -> Uuid {
        self.record.consignment_id
    }
}
