//! Multi-step form plugin with optional external review.
//!
//! State graph (`[..]` is the outer status the edge sets):
//!
//! ```text
//! ""                       ──START──────► initialized      [IN_PROGRESS]
//! ""                       ──draft──────► draft            [IN_PROGRESS]
//! initialized | draft      ──draft──────► draft
//! "" | initialized | draft ──submit─────► submitted        [COMPLETED, or IN_PROGRESS with review]
//! submitted                ──acknowledge► awaiting_review                  (review only)
//! submitted | awaiting_review ──approve─► reviewed         [COMPLETED]     (review only)
//! submitted | awaiting_review ──reject──► rejected         [FAILED]        (review only)
//! ```
//!
//! `fetch` renders the form with data prepopulated from the global context
//! and never transitions. `verify` resolves `approve`/`reject` from the
//! request through an [`ActionResolver`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

use crate::constants::{
    ACTION_START, GLOBAL_CONTEXT_SCHEMA_KEY, LOCAL_KEY_FORM_DATA,
    LOCAL_KEY_PREPOPULATED_FORM_DATA, TASKS_API_PATH,
};
use crate::error::TaskError;
use crate::fsm::PluginFsm;
use crate::outbound::OutboundClient;
use crate::plugin::resolver::ActionResolver;
use crate::plugin::{require_api, Plugin, PluginApi};
use crate::types::{ApiResponse, ExecutionRequest, ExecutionResponse, TaskStatus};

/// Plugin state after start.
pub const STATE_INITIALIZED: &str = "initialized";
/// Plugin state after a draft save.
pub const STATE_DRAFT: &str = "draft";
/// Plugin state after submission.
pub const STATE_SUBMITTED: &str = "submitted";
/// Plugin state once the reviewer acknowledged the submission.
pub const STATE_AWAITING_REVIEW: &str = "awaiting_review";
/// Plugin state after an approving review.
pub const STATE_REVIEWED: &str = "reviewed";
/// Plugin state after a rejecting review.
pub const STATE_REJECTED: &str = "rejected";

/// Draft-save edge.
pub const ACTION_DRAFT: &str = "draft";
/// Submission edge.
pub const ACTION_SUBMIT: &str = "submit";
/// Reviewer acknowledgement edge.
pub const ACTION_ACKNOWLEDGE: &str = "acknowledge";
/// Approving review edge.
pub const ACTION_APPROVE: &str = "approve";
/// Rejecting review edge.
pub const ACTION_REJECT: &str = "reject";

/// Configuration blob of a simple-form task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleFormConfig {
    /// Form identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_id: Option<String>,
    /// Display title.
    #[serde(default)]
    pub title: String,
    /// JSON Schema of the form.
    #[serde(default)]
    pub schema: Value,
    /// Rendering hints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_schema: Option<Value>,
    /// Default form data; overrides prepopulated values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_data: Option<Value>,
    /// External system receiving submissions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_url: Option<String>,
    /// Whether an external reviewer decides the outcome after submission.
    #[serde(default, alias = "requiresOgaVerification")]
    pub requires_review: bool,
    /// How `verify` maps a request to `approve`/`reject`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<ActionResolver>,
}

impl SimpleFormConfig {
    /// The configured verification resolver, or `decision` with
    /// `APPROVED -> approve`.
    pub fn verification_resolver(&self) -> ActionResolver {
        self.verification
            .clone()
            .unwrap_or_else(|| ActionResolver::new("decision").map("APPROVED", ACTION_APPROVE))
    }
}

/// Rendered form returned by `fetch` and `start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormView {
    /// Form identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_id: Option<String>,
    /// Display title.
    pub title: String,
    /// JSON Schema.
    pub schema: Value,
    /// Rendering hints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_schema: Option<Value>,
    /// Prepopulated data.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub form_data: Value,
}

/// Actions a simple-form task accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimpleFormAction {
    /// Render the form.
    Fetch,
    /// Save a draft.
    Draft,
    /// Submit the form.
    Submit,
    /// Reviewer received the submission.
    Acknowledge,
    /// Reviewer decision.
    Verify,
}

impl SimpleFormAction {
    /// Parses an action name case-insensitively. The empty action is
    /// `Fetch`; legacy upper-case names are accepted.
    pub fn parse(action: &str) -> Result<Self, TaskError> {
        match action.to_ascii_lowercase().as_str() {
            "" | "fetch" | "fetch_form" => Ok(Self::Fetch),
            "draft" | "save_draft" => Ok(Self::Draft),
            "submit" | "submit_form" => Ok(Self::Submit),
            "acknowledge" => Ok(Self::Acknowledge),
            "verify" | "oga_verification" => Ok(Self::Verify),
            _ => Err(TaskError::Validation(format!(
                "unsupported simple-form action {action:?}"
            ))),
        }
    }
}

/// Simple-form plugin.
pub struct SimpleForm {
    api: Option<Arc<dyn PluginApi>>,
    config: SimpleFormConfig,
    client: OutboundClient,
    service_url: Option<String>,
}

impl fmt::Debug for SimpleForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleForm")
            .field("form_id", &self.config.form_id)
            .field("requires_review", &self.config.requires_review)
            .field("initialized", &self.api.is_some())
            .finish()
    }
}

impl SimpleForm {
    /// Builds the plugin. `service_url` is advertised to the submission
    /// endpoint as `{service_url}/api/tasks`.
    pub fn new(
        config: SimpleFormConfig,
        client: OutboundClient,
        service_url: Option<String>,
    ) -> Self {
        Self {
            api: None,
            config,
            client,
            service_url,
        }
    }

    /// Parses a raw configuration blob. `null` is treated as empty.
    pub fn from_config(
        raw: &Value,
        client: OutboundClient,
        service_url: Option<String>,
    ) -> Result<Self, TaskError> {
        let config = if raw.is_null() {
            SimpleFormConfig::default()
        } else {
            serde_json::from_value(raw.clone())
                .map_err(|e| TaskError::Validation(format!("invalid simple-form config: {e}")))?
        };
        Ok(Self::new(config, client, service_url))
    }

    /// The parsed configuration.
    pub fn config(&self) -> &SimpleFormConfig {
        &self.config
    }

    /// Transition table for a form with or without external review.
    pub fn fsm(requires_review: bool) -> PluginFsm {
        let submit_status = if requires_review {
            TaskStatus::InProgress
        } else {
            TaskStatus::Completed
        };

        let mut edges = vec![
            ("", ACTION_START, STATE_INITIALIZED, Some(TaskStatus::InProgress)),
            ("", ACTION_DRAFT, STATE_DRAFT, Some(TaskStatus::InProgress)),
            (STATE_INITIALIZED, ACTION_DRAFT, STATE_DRAFT, None),
            (STATE_DRAFT, ACTION_DRAFT, STATE_DRAFT, None),
            ("", ACTION_SUBMIT, STATE_SUBMITTED, Some(submit_status)),
            (STATE_INITIALIZED, ACTION_SUBMIT, STATE_SUBMITTED, Some(submit_status)),
            (STATE_DRAFT, ACTION_SUBMIT, STATE_SUBMITTED, Some(submit_status)),
        ];
        if requires_review {
            edges.extend([
                (STATE_SUBMITTED, ACTION_ACKNOWLEDGE, STATE_AWAITING_REVIEW, None),
                (STATE_SUBMITTED, ACTION_APPROVE, STATE_REVIEWED, Some(TaskStatus::Completed)),
                (STATE_AWAITING_REVIEW, ACTION_APPROVE, STATE_REVIEWED, Some(TaskStatus::Completed)),
                (STATE_SUBMITTED, ACTION_REJECT, STATE_REJECTED, Some(TaskStatus::Failed)),
                (STATE_AWAITING_REVIEW, ACTION_REJECT, STATE_REJECTED, Some(TaskStatus::Failed)),
            ]);
        }
        PluginFsm::from_edges(edges)
    }

    async fn render_form(&self, api: &Arc<dyn PluginApi>) -> Result<FormView, TaskError> {
        let form_data = self.prepopulated_form_data(api.as_ref());
        if let Err(e) = api
            .write_local_store(LOCAL_KEY_PREPOPULATED_FORM_DATA, form_data.clone())
            .await
        {
            tracing::warn!(task_id = %api.task_id(), error = %e, "failed to store prepopulated form data");
        }
        Ok(FormView {
            form_id: self.config.form_id.clone(),
            title: self.config.title.clone(),
            schema: self.config.schema.clone(),
            ui_schema: self.config.ui_schema.clone(),
            form_data,
        })
    }

    /// Builds form data from `x-globalContext` schema annotations, then
    /// deep-merges the configured form data over it.
    fn prepopulated_form_data(&self, api: &dyn PluginApi) -> Value {
        let mut data = build_form_data(&self.config.schema, api);
        if let Some(Value::Object(configured)) = &self.config.form_data {
            deep_merge(&mut data, configured);
        }
        if data.is_empty() {
            return self.config.form_data.clone().unwrap_or(Value::Null);
        }
        Value::Object(data)
    }

    async fn fetch(&self, api: &Arc<dyn PluginApi>) -> Result<ExecutionResponse, TaskError> {
        let view = self.render_form(api).await?;
        Ok(ExecutionResponse::message("Form schema retrieved successfully")
            .with_api_response(ApiResponse::ok(to_value(&view)?)))
    }

    async fn draft(
        &self,
        api: &Arc<dyn PluginApi>,
        request: &ExecutionRequest,
    ) -> Result<ExecutionResponse, TaskError> {
        let form_data = request.content_object()?.clone();
        ensure_legal(api.as_ref(), ACTION_DRAFT)?;
        api.write_local_store(LOCAL_KEY_FORM_DATA, Value::Object(form_data))
            .await?;
        api.transition(ACTION_DRAFT).await?;
        Ok(ExecutionResponse::message("Draft saved"))
    }

    async fn submit(
        &self,
        api: &Arc<dyn PluginApi>,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResponse, TaskError> {
        let form_data = Value::Object(request.content_object()?.clone());
        ensure_legal(api.as_ref(), ACTION_SUBMIT)?;

        let mut api_response = ApiResponse::ok(Value::Null);
        if let Some(url) = self.config.submission_url.as_deref().filter(|u| !u.is_empty()) {
            let payload = json!({
                "data": form_data,
                "taskId": api.task_id(),
                "consignmentId": api.consignment_id(),
                "serviceUrl": self.service_url.as_deref().map(|base| {
                    format!("{}{TASKS_API_PATH}", base.trim_end_matches('/'))
                }),
            });
            let response = self
                .client
                .post_json(url, &payload, cancel)
                .await
                .map_err(|e| match e {
                    TaskError::Cancelled => TaskError::Cancelled,
                    other => TaskError::Plugin(format!(
                        "failed to submit form to external system: {other}"
                    )),
                })?;
            tracing::info!(task_id = %api.task_id(), url, "form submitted to external system");
            api_response = ApiResponse::ok(response);
        }

        api.write_local_store(LOCAL_KEY_FORM_DATA, form_data).await?;
        api.transition(ACTION_SUBMIT).await?;
        let message = if self.config.requires_review {
            "Form submitted successfully, awaiting review"
        } else {
            "Form submitted successfully"
        };
        Ok(ExecutionResponse::message(message).with_api_response(api_response))
    }

    async fn verify(
        &self,
        api: &Arc<dyn PluginApi>,
        request: &ExecutionRequest,
    ) -> Result<ExecutionResponse, TaskError> {
        let content = request.content_object()?;
        let action = match self.config.verification_resolver().resolve(content) {
            Ok(action) => action,
            Err(e) => {
                tracing::info!(task_id = %api.task_id(), reason = %e, "verification not applied");
                return Ok(ExecutionResponse::message("Verification rejected or invalid"));
            },
        };
        api.transition(&action).await?;
        let message = if action == ACTION_REJECT {
            "Form rejected by reviewer"
        } else {
            "Form verified by reviewer"
        };
        Ok(ExecutionResponse::message(message))
    }
}

#[async_trait]
impl Plugin for SimpleForm {
    fn init(&mut self, api: Arc<dyn PluginApi>) {
        self.api = Some(api);
    }

    async fn start(&self, _cancel: &CancellationToken) -> Result<ExecutionResponse, TaskError> {
        let api = require_api(&self.api)?;
        if !api.can_transition(ACTION_START) {
            return Ok(ExecutionResponse::message("SimpleForm already started"));
        }
        let view = self.render_form(api).await?;
        api.transition(ACTION_START).await?;
        Ok(ExecutionResponse::message("SimpleForm task started successfully")
            .with_api_response(ApiResponse::ok(to_value(&view)?)))
    }

    async fn execute(
        &self,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResponse, TaskError> {
        let api = require_api(&self.api)?;
        match SimpleFormAction::parse(&request.action)? {
            SimpleFormAction::Fetch => self.fetch(api).await,
            SimpleFormAction::Draft => self.draft(api, request).await,
            SimpleFormAction::Submit => self.submit(api, request, cancel).await,
            SimpleFormAction::Acknowledge => {
                api.transition(ACTION_ACKNOWLEDGE).await?;
                Ok(ExecutionResponse::message("Submission acknowledged"))
            },
            SimpleFormAction::Verify => self.verify(api, request).await,
        }
    }
}

/// Fails early, before local writes or outbound calls, when `action` has no
/// edge from the current state.
fn ensure_legal(api: &dyn PluginApi, action: &str) -> Result<(), TaskError> {
    if api.can_transition(action) {
        Ok(())
    } else {
        Err(TaskError::IllegalTransition {
            state: api.plugin_state(),
            action: action.to_string(),
        })
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, TaskError> {
    serde_json::to_value(value).map_err(|e| TaskError::Plugin(format!("failed to encode response: {e}")))
}

/// Walks `schema.properties`, filling annotated fields from the global
/// store and recursing into `object` properties.
fn build_form_data(schema: &Value, api: &dyn PluginApi) -> Map<String, Value> {
    let mut data = Map::new();
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return data;
    };

    for (name, definition) in properties {
        if !definition.is_object() {
            continue;
        }
        if let Some(path) = definition.get(GLOBAL_CONTEXT_SCHEMA_KEY).and_then(Value::as_str) {
            if let Some(value) = lookup_global(api, path) {
                data.insert(name.clone(), value);
            }
        }
        if definition.get("type").and_then(Value::as_str) == Some("object") {
            let nested = build_form_data(definition, api);
            if !nested.is_empty() {
                data.insert(name.clone(), Value::Object(nested));
            }
        }
    }
    data
}

fn lookup_global(api: &dyn PluginApi, path: &str) -> Option<Value> {
    let mut segments = path.split('.');
    let root = api.read_global_store(segments.next().filter(|s| !s.is_empty())?)?;
    let mut current = &root;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current.clone())
}

/// Merges `overlay` into `base`; nested objects merge, anything else from
/// `overlay` replaces.
fn deep_merge(base: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, value) in overlay {
        if let (Some(Value::Object(existing)), Value::Object(incoming)) = (base.get_mut(key), value) {
            deep_merge(existing, incoming);
            continue;
        }
        base.insert(key.clone(), value.clone());
    }
}
