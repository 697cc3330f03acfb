//! Outer task status and task-type tags.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TaskError;

/// Coarse lifecycle stage of a task as seen by the orchestrator.
///
/// The status only moves forward: `Initialized -> InProgress -> Completed |
/// Failed`. Repeating the current non-terminal status is allowed so that an
/// edge may restate `InProgress`.
///
/// # Examples
///
/// ```
/// use taskhost::TaskStatus;
///
/// assert!(TaskStatus::Initialized.can_advance_to(&TaskStatus::Completed));
/// assert!(TaskStatus::InProgress.can_advance_to(&TaskStatus::InProgress));
/// assert!(!TaskStatus::InProgress.can_advance_to(&TaskStatus::Initialized));
/// assert!(!TaskStatus::Completed.can_advance_to(&TaskStatus::Failed));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Created but not yet started.
    Initialized,
    /// Started and awaiting further actions.
    InProgress,
    /// Finished successfully (terminal).
    Completed,
    /// Finished unsuccessfully (terminal).
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initialized => write!(f, "INITIALIZED"),
            Self::InProgress => write!(f, "IN_PROGRESS"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INITIALIZED" => Ok(Self::Initialized),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(TaskError::Validation(format!("unknown task status: {other}"))),
        }
    }
}

impl TaskStatus {
    /// Returns `true` for `Completed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns `true` if a plugin may be invoked for a task in this status.
    pub fn is_executable(&self) -> bool {
        !self.is_terminal()
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Initialized => 0,
            Self::InProgress => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    /// Returns `true` if moving to `next` keeps the status monotonic.
    pub fn can_advance_to(&self, next: &Self) -> bool {
        !self.is_terminal() && next.rank() >= self.rank()
    }

    /// Validates a move to `next`, naming the task in the error.
    ///
    /// # Errors
    ///
    /// - [`TaskError::Terminal`] when `self` is terminal.
    /// - [`TaskError::StatusRegression`] when `next` is an earlier stage.
    pub fn validate_advance(&self, task_id: Uuid, next: &Self) -> Result<(), TaskError> {
        if self.is_terminal() {
            return Err(TaskError::Terminal {
                task_id,
                status: *self,
            });
        }
        if next.rank() < self.rank() {
            return Err(TaskError::StatusRegression {
                task_id,
                from: *self,
                to: *next,
            });
        }
        Ok(())
    }
}

/// Tag selecting which plugin implementation runs a task.
///
/// Serialized in kebab case (`"simple-form"`); the upper snake case spelling
/// used by older records is accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    /// Multi-step form with optional external review.
    #[serde(alias = "SIMPLE_FORM")]
    SimpleForm,
    /// Notifies an external service and waits for its callback.
    #[serde(alias = "WAIT_FOR_EVENT")]
    WaitForEvent,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SimpleForm => write!(f, "simple-form"),
            Self::WaitForEvent => write!(f, "wait-for-event"),
        }
    }
}

impl FromStr for TaskType {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "simple-form" => Ok(Self::SimpleForm),
            "wait-for-event" => Ok(Self::WaitForEvent),
            _ => Err(TaskError::UnknownTaskType(s.to_string())),
        }
    }
}
