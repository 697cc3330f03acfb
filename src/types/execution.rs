//! Requests a plugin handles and the responses it returns.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TaskError;
use crate::types::status::TaskStatus;

/// One discrete business action routed to [`Plugin::execute`](crate::plugin::Plugin::execute).
///
/// `content` keeps the on-wire shape (any JSON document); plugins validate it
/// into their own typed structures on entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Action name. Plugins map it onto their closed action set.
    #[serde(default)]
    pub action: String,
    /// Optional business payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
}

impl ExecutionRequest {
    /// Creates a request without payload.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            content: None,
        }
    }

    /// Attaches a payload.
    pub fn with_content(mut self, content: Value) -> Self {
        self.content = Some(content);
        self
    }

    /// Returns the payload as a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Validation`] if the payload is missing or is not
    /// an object.
    pub fn content_object(&self) -> Result<&Map<String, Value>, TaskError> {
        match &self.content {
            Some(Value::Object(map)) => Ok(map),
            Some(other) => Err(TaskError::Validation(format!(
                "action {:?} expects an object payload, got {}",
                self.action,
                json_kind(other)
            ))),
            None => Err(TaskError::Validation(format!(
                "action {:?} requires a payload",
                self.action
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Error detail carried inside an [`ApiResponse`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Optional structured details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Structured payload a plugin hands back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    /// Whether the plugin considers the action successful.
    pub success: bool,
    /// Result data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Error detail when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl ApiResponse {
    /// Successful response carrying `data`.
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Failed response with a code and message.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
                details: None,
            }),
        }
    }
}

/// Result of a `start` or `execute` call.
///
/// The container fills `new_state` and `plugin_state` when the plugin state
/// changed during the call, so callers see state changes without re-reading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResponse {
    /// Outer status after the call, if the plugin state changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_state: Option<TaskStatus>,
    /// Plugin state after the call, if it changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_state: Option<String>,
    /// Human-readable outcome.
    #[serde(default)]
    pub message: String,
    /// Structured payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_response: Option<ApiResponse>,
}

impl ExecutionResponse {
    /// Response carrying only a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Attaches an [`ApiResponse`].
    pub fn with_api_response(mut self, api_response: ApiResponse) -> Self {
        self.api_response = Some(api_response);
        self
    }

    /// Returns `true` if the container recorded a state change.
    pub fn changed_state(&self) -> bool {
        self.plugin_state.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_object_requires_object() {
        let req = ExecutionRequest::new("submit").with_content(json!({"field": "value"}));
        assert_eq!(req.content_object().unwrap()["field"], "value");

        let req = ExecutionRequest::new("submit").with_content(json!([1, 2]));
        let err = req.content_object().unwrap_err();
        assert!(err.to_string().contains("array"));

        assert!(ExecutionRequest::new("submit").content_object().is_err());
    }

    #[test]
    fn message_only_response_omits_state() {
        let json = serde_json::to_value(ExecutionResponse::message("noop")).unwrap();
        assert_eq!(json, json!({"message": "noop"}));
    }
}
