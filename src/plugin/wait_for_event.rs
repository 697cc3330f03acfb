//! Plugin that notifies an external service and waits for its callback.
//!
//! State graph:
//!
//! ```text
//! ""       ──START────► notified [IN_PROGRESS]
//! notified ──complete─► received [COMPLETED]
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::constants::ACTION_START;
use crate::error::TaskError;
use crate::fsm::PluginFsm;
use crate::outbound::OutboundClient;
use crate::plugin::{require_api, Plugin, PluginApi};
use crate::types::{ApiResponse, ExecutionRequest, ExecutionResponse, TaskStatus};

/// Plugin state after the external service accepted the notification.
pub const STATE_NOTIFIED: &str = "notified";
/// Plugin state after the callback arrived.
pub const STATE_RECEIVED: &str = "received";
/// Callback action.
pub const ACTION_COMPLETE: &str = "complete";

/// Configuration blob of a wait-for-event task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitForEventConfig {
    /// Endpoint notified on start. Required to start.
    #[serde(default)]
    pub external_service_url: Option<String>,
}

/// Actions a wait-for-event task accepts after start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitForEventAction {
    Complete,
}

impl WaitForEventAction {
    fn parse(action: &str) -> Result<Self, TaskError> {
        match action {
            ACTION_COMPLETE => Ok(Self::Complete),
            other => Err(TaskError::Validation(format!(
                "unsupported wait-for-event action {other:?}"
            ))),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => ACTION_COMPLETE,
        }
    }
}

/// Wait-for-event plugin.
pub struct WaitForEvent {
    api: Option<Arc<dyn PluginApi>>,
    config: WaitForEventConfig,
    client: OutboundClient,
}

impl fmt::Debug for WaitForEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitForEvent")
            .field("config", &self.config)
            .field("initialized", &self.api.is_some())
            .finish()
    }
}

impl WaitForEvent {
    /// Builds the plugin from its parsed configuration.
    pub fn new(config: WaitForEventConfig, client: OutboundClient) -> Self {
        Self {
            api: None,
            config,
            client,
        }
    }

    /// Parses a raw configuration blob. `null` is treated as empty.
    pub fn from_config(raw: &Value, client: OutboundClient) -> Result<Self, TaskError> {
        let config = if raw.is_null() {
            WaitForEventConfig::default()
        } else {
            serde_json::from_value(raw.clone()).map_err(|e| {
                TaskError::Validation(format!("invalid wait-for-event config: {e}"))
            })?
        };
        Ok(Self::new(config, client))
    }

    /// Transition table of this plugin type.
    pub fn fsm() -> PluginFsm {
        PluginFsm::from_edges([
            ("", ACTION_START, STATE_NOTIFIED, Some(TaskStatus::InProgress)),
            (STATE_NOTIFIED, ACTION_COMPLETE, STATE_RECEIVED, Some(TaskStatus::Completed)),
        ])
    }
}

#[async_trait]
impl Plugin for WaitForEvent {
    fn init(&mut self, api: Arc<dyn PluginApi>) {
        self.api = Some(api);
    }

    async fn start(&self, cancel: &CancellationToken) -> Result<ExecutionResponse, TaskError> {
        let api = require_api(&self.api)?;
        if !api.can_transition(ACTION_START) {
            return Ok(ExecutionResponse::message("WaitForEvent already started"));
        }
        let url = self
            .config
            .external_service_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                TaskError::Plugin("externalServiceUrl not configured in task config".to_string())
            })?;

        let payload = json!({
            "workflowId": api.workflow_id(),
            "taskId": api.task_id(),
        });

        // No state lock is held across the outbound call.
        let response = self
            .client
            .post_json(url, &payload, cancel)
            .await
            .map_err(|e| match e {
                TaskError::Cancelled => TaskError::Cancelled,
                other => TaskError::Plugin(format!("failed to notify external service: {other}")),
            })?;

        tracing::info!(
            task_id = %api.task_id(),
            workflow_id = %api.workflow_id(),
            url,
            "notified external service"
        );

        api.transition(ACTION_START).await?;
        Ok(
            ExecutionResponse::message("Notified external service, waiting for callback")
                .with_api_response(ApiResponse::ok(response)),
        )
    }

    async fn execute(
        &self,
        request: &ExecutionRequest,
        _cancel: &CancellationToken,
    ) -> Result<ExecutionResponse, TaskError> {
        let api = require_api(&self.api)?;
        let action = WaitForEventAction::parse(&request.action)?;
        api.transition(action.as_str()).await?;
        Ok(ExecutionResponse::message(
            "Task completed by external service",
        ))
    }
}
