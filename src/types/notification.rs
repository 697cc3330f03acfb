//! Notification message sent to the upstream orchestrator.
//!
//! Delivery is best-effort; see
//! [`NotificationSender`](crate::manager::NotificationSender).

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::status::TaskStatus;

/// Closed set of signals an orchestrator can receive for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationSignal {
    /// The task started.
    InProgress,
    /// The task finished successfully.
    Completed,
    /// The task finished unsuccessfully.
    Rejected,
}

impl NotificationSignal {
    /// Maps a terminal outer status to its signal; non-terminal statuses
    /// produce no terminal signal.
    ///
    /// # Examples
    ///
    /// ```
    /// use taskhost::{NotificationSignal, TaskStatus};
    ///
    /// assert_eq!(
    ///     NotificationSignal::for_terminal_status(TaskStatus::Failed),
    ///     Some(NotificationSignal::Rejected)
    /// );
    /// assert_eq!(NotificationSignal::for_terminal_status(TaskStatus::InProgress), None);
    /// ```
    pub fn for_terminal_status(status: TaskStatus) -> Option<Self> {
        match status {
            TaskStatus::Completed => Some(Self::Completed),
            TaskStatus::Failed => Some(Self::Rejected),
            TaskStatus::Initialized | TaskStatus::InProgress => None,
        }
    }
}

impl fmt::Display for NotificationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress => write!(f, "IN_PROGRESS"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// A task ID paired with the signal emitted for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskNotification {
    /// The task the signal refers to.
    pub task_id: Uuid,
    /// The emitted signal.
    pub signal: NotificationSignal,
}

impl TaskNotification {
    /// Creates a notification.
    pub fn new(task_id: Uuid, signal: NotificationSignal) -> Self {
        Self { task_id, signal }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_serialization() {
        let id = Uuid::new_v4();
        let json = serde_json::to_value(TaskNotification::new(id, NotificationSignal::Rejected))
            .unwrap();
        assert_eq!(json["taskId"], id.to_string());
        assert_eq!(json["signal"], "REJECTED");
    }
}
