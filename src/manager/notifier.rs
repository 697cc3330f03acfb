//! Best-effort notification channel to the upstream orchestrator.
//!
//! Producers never wait: a full or closed channel drops the notification and
//! logs it. Nothing in the engine depends on a notification being delivered.

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::types::TaskNotification;

/// Creates a bounded notification channel. A capacity of zero is raised to
/// one.
pub fn notification_channel(
    capacity: usize,
) -> (NotificationSender, mpsc::Receiver<TaskNotification>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (NotificationSender { tx }, rx)
}

/// Cloneable, non-blocking producer half of the notification channel.
#[derive(Debug, Clone)]
pub struct NotificationSender {
    tx: mpsc::Sender<TaskNotification>,
}

impl NotificationSender {
    /// Wraps an existing sender.
    pub fn new(tx: mpsc::Sender<TaskNotification>) -> Self {
        Self { tx }
    }

    /// Offers `notification` without waiting. Returns whether it was queued.
    pub fn notify(&self, notification: TaskNotification) -> bool {
        match self.tx.try_send(notification) {
            Ok(()) => {
                tracing::debug!("notification queued");
                true
            },
            Err(TrySendError::Full(dropped)) => {
                tracing::warn!(
                    task_id = %dropped.task_id,
                    signal = %dropped.signal,
                    "notification channel full, dropping notification"
                );
                false
            },
            Err(TrySendError::Closed(dropped)) => {
                tracing::warn!(
                    task_id = %dropped.task_id,
                    signal = %dropped.signal,
                    "notification channel closed, dropping notification"
                );
                false
            },
        }
    }
}
