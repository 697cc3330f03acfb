//! Declarative mapping from a request field to a state-machine action.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TaskError;

/// Resolves an action from the string at a dot-path `field` of the request
/// content. Values match `mapping` keys case-insensitively; `default` covers
/// a missing field or an unmapped value.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use taskhost::plugin::ActionResolver;
///
/// let resolver = ActionResolver::new("review.decision")
///     .map("APPROVED", "approve")
///     .map("REJECTED", "reject");
///
/// let content = json!({"review": {"decision": "approved"}});
/// assert_eq!(resolver.resolve(content.as_object().unwrap()).unwrap(), "approve");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResolver {
    /// Dot path into the request content.
    pub field: String,
    /// Field value to action.
    #[serde(default)]
    pub mapping: HashMap<String, String>,
    /// Fallback action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl ActionResolver {
    /// Resolver over `field` with an empty mapping.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            mapping: HashMap::new(),
            default: None,
        }
    }

    /// Adds a value-to-action mapping.
    pub fn map(mut self, value: impl Into<String>, action: impl Into<String>) -> Self {
        self.mapping.insert(value.into(), action.into());
        self
    }

    /// Sets the fallback action.
    pub fn with_default(mut self, action: impl Into<String>) -> Self {
        self.default = Some(action.into());
        self
    }

    /// Resolves the action for `content`.
    ///
    /// # Errors
    ///
    /// [`TaskError::Validation`] when the field is missing or unmapped and no
    /// default is set, or when the field is not a string.
    pub fn resolve(&self, content: &Map<String, Value>) -> Result<String, TaskError> {
        let Some(value) = value_by_path(content, &self.field) else {
            return self.default.clone().ok_or_else(|| {
                TaskError::Validation(format!("field {:?} not found in content", self.field))
            });
        };

        let Value::String(raw) = value else {
            return Err(TaskError::Validation(format!(
                "field {:?} is not a string",
                self.field
            )));
        };

        if let Some(action) = self
            .mapping
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(raw))
            .map(|(_, action)| action)
        {
            return Ok(action.clone());
        }

        self.default.clone().ok_or_else(|| {
            TaskError::Validation(format!(
                "no action mapped for field {:?} value {raw:?}",
                self.field
            ))
        })
    }
}

/// Looks up a dot-separated path such as `"trader.address.city"` in a JSON
/// object. Empty segments never match.
pub fn value_by_path<'a>(root: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next().filter(|s| !s.is_empty())?;
    let mut current = root.get(first)?;
    for segment in segments {
        if segment.is_empty() {
            return None;
        }
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn decision_resolver() -> ActionResolver {
        ActionResolver::new("decision").map("APPROVED", "approve")
    }

    #[rstest]
    #[case(json!({"decision": "APPROVED"}), Some("approve"))]
    #[case(json!({"decision": "approved"}), Some("approve"))]
    #[case(json!({"decision": "REJECTED"}), None)]
    #[case(json!({"decision": 1}), None)]
    #[case(json!({}), None)]
    fn resolves_decision(#[case] content: Value, #[case] expected: Option<&str>) {
        let result = decision_resolver().resolve(content.as_object().unwrap());
        assert_eq!(result.ok().as_deref(), expected);
    }

    #[test]
    fn default_covers_missing_and_unmapped() {
        let resolver = decision_resolver().with_default("hold");
        let unmapped = json!({"decision": "MAYBE"});
        assert_eq!(resolver.resolve(unmapped.as_object().unwrap()).unwrap(), "hold");
        assert_eq!(resolver.resolve(&Map::new()).unwrap(), "hold");

        // A non-string is malformed, not absent.
        let wrong_type = json!({"decision": true});
        assert!(resolver.resolve(wrong_type.as_object().unwrap()).is_err());
    }

    #[test]
    fn dot_paths() {
        let doc = json!({"a": {"b": {"c": 5}}, "x": 1});
        let doc = doc.as_object().unwrap();
        assert_eq!(value_by_path(doc, "a.b.c"), Some(&json!(5)));
        assert_eq!(value_by_path(doc, "x.y"), None);
        assert_eq!(value_by_path(doc, "a..b"), None);
        assert_eq!(value_by_path(doc, ""), None);
    }

    #[test]
    fn deserializes_from_config() {
        let resolver: ActionResolver = serde_json::from_value(json!({
            "field": "outcome",
            "mapping": {"OK": "approve"},
            "default": "reject"
        }))
        .unwrap();
        assert_eq!(resolver.default.as_deref(), Some("reject"));
    }
}
