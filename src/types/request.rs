//! Transport-facing execute request and response.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::TaskError;
use crate::types::execution::ExecutionRequest;
use crate::types::status::TaskStatus;

/// Execution request as received from the transport layer.
///
/// A request with neither `action` nor `payload` starts the task; anything
/// else is routed to the plugin as an [`ExecutionRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteTaskRequest {
    /// Consignment the task belongs to.
    pub consignment_id: Uuid,
    /// Task to execute.
    pub task_id: Uuid,
    /// Action name, if the caller selects one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Opaque business payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl ExecuteTaskRequest {
    /// Checks that both identifiers are present.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Validation`] for a nil task or consignment ID.
    pub fn validate(&self) -> Result<(), TaskError> {
        if self.task_id.is_nil() {
            return Err(TaskError::Validation("task_id is required".to_string()));
        }
        if self.consignment_id.is_nil() {
            return Err(TaskError::Validation(
                "consignment_id is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Converts the business part of the request into a plugin request.
    /// Returns `None` when the request only starts the task.
    pub fn execution_request(&self) -> Option<ExecutionRequest> {
        if self.action.is_none() && self.payload.is_none() {
            return None;
        }
        Some(ExecutionRequest {
            action: self.action.clone().unwrap_or_default(),
            content: self.payload.clone(),
        })
    }
}

/// Result payload of a successful execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    /// Outer status after execution.
    pub status: TaskStatus,
    /// Plugin state after execution.
    pub plugin_state: String,
    /// Human-readable message from the plugin.
    pub message: String,
    /// Structured data returned by the plugin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Response handed back to the transport layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteTaskResponse {
    /// Whether execution succeeded.
    pub success: bool,
    /// Result on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    /// Error text on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecuteTaskResponse {
    /// Successful response.
    pub fn ok(result: TaskResult) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    /// Failed response carrying the error's display text.
    pub fn failed(err: &TaskError) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(err.to_string()),
        }
    }
}
