//! Error types for task execution.
//!
//! Provides [`TaskError`], the single error enum shared by the state machine,
//! plugins, containers, stores, and the task manager, plus an HTTP status
//! mapping for the transport boundary.

use http::StatusCode;
use thiserror::Error;
use uuid::Uuid;

use crate::types::TaskStatus;

/// Errors that can occur during task operations.
///
/// Variants carry the identifiers needed to diagnose the failure. Use
/// [`status_code`](TaskError::status_code) to pick the externally visible
/// HTTP status.
///
/// # Examples
///
/// ```
/// use taskhost::TaskError;
///
/// let err = TaskError::IllegalTransition {
///     state: "submitted".to_string(),
///     action: "submit".to_string(),
/// };
/// assert_eq!(err.status_code(), http::StatusCode::CONFLICT);
/// assert!(err.to_string().contains("submitted"));
/// ```
#[derive(Debug, Error)]
pub enum TaskError {
    /// The action has no edge out of the current plugin state.
    #[error("illegal transition: action {action:?} is not permitted in plugin state {state:?}")]
    IllegalTransition {
        /// Plugin state the transition was attempted from.
        state: String,
        /// Action that was rejected.
        action: String,
    },

    /// Missing or malformed identifiers or payload.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The outer status does not allow execution.
    #[error("task {task_id} is not ready for execution (status: {status})")]
    NotReady {
        /// The task ID.
        task_id: Uuid,
        /// The task's current status.
        status: TaskStatus,
    },

    /// Business logic failed, including exhausted outbound retries.
    #[error("plugin execution failed: {0}")]
    Plugin(String),

    /// The persistence layer failed.
    #[error("store error: {0}")]
    Store(String),

    /// No task with the given ID is known.
    #[error("task not found: {task_id}")]
    NotFound {
        /// The task ID that was not found.
        task_id: Uuid,
    },

    /// A compare-and-swap write lost against a concurrent writer.
    #[error(
        "concurrent modification of task {task_id}: expected version {expected}, found {actual}"
    )]
    ConcurrentModification {
        /// The task ID.
        task_id: Uuid,
        /// Version the writer read.
        expected: u64,
        /// Version found in storage.
        actual: u64,
    },

    /// The task already reached a terminal status.
    #[error("task {task_id} is terminal ({status}) and accepts no further transitions")]
    Terminal {
        /// The task ID.
        task_id: Uuid,
        /// The terminal status.
        status: TaskStatus,
    },

    /// An outcome would move the outer status backwards.
    #[error("task {task_id} cannot move from {from} back to {to}")]
    StatusRegression {
        /// The task ID.
        task_id: Uuid,
        /// Current status.
        from: TaskStatus,
        /// Rejected target status.
        to: TaskStatus,
    },

    /// The task-type tag has no registered plugin.
    #[error("unknown task type: {0}")]
    UnknownTaskType(String),

    /// An outbound HTTP call failed.
    #[error("external service call failed{}: {message}", status.map(|s| format!(" with status {s}")).unwrap_or_default())]
    Outbound {
        /// HTTP status, absent for network errors.
        status: Option<u16>,
        /// Response body or transport error text.
        message: String,
    },

    /// The operation observed its cancellation token.
    #[error("operation cancelled")]
    Cancelled,

    /// Configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

impl TaskError {
    /// Returns the HTTP status used when this error crosses the transport
    /// boundary.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::UnknownTaskType(_) => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::IllegalTransition { .. }
            | Self::NotReady { .. }
            | Self::ConcurrentModification { .. }
            | Self::Terminal { .. }
            | Self::StatusRegression { .. } => StatusCode::CONFLICT,
            Self::Outbound { .. } => StatusCode::BAD_GATEWAY,
            Self::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            Self::Plugin(_) | Self::Store(_) | Self::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }

    /// Whether the caller can retry after re-reading the task state.
    pub fn is_conflict(&self) -> bool {
        self.status_code() == StatusCode::CONFLICT
    }
}
