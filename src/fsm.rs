//! Declarative, table-driven plugin state machine.
//!
//! A [`PluginFsm`] maps `(plugin state, action)` to a [`TransitionOutcome`].
//! The table is the only source of truth: there is no wildcard or default
//! edge, so self-loops such as repeated draft saves must be listed.
//!
//! # Examples
//!
//! ```
//! use taskhost::fsm::PluginFsm;
//! use taskhost::TaskStatus;
//!
//! let fsm = PluginFsm::from_edges([
//!     ("", "START", "notified", Some(TaskStatus::InProgress)),
//!     ("notified", "complete", "received", Some(TaskStatus::Completed)),
//! ]);
//!
//! assert!(fsm.can_transition("", "START"));
//! let outcome = fsm.transition("notified", "complete").unwrap();
//! assert_eq!(outcome.next_plugin_state, "received");
//! assert!(fsm.transition("received", "complete").is_err());
//! ```

use std::collections::HashMap;

use crate::error::TaskError;
use crate::types::TaskStatus;

/// Lookup key: the plugin state a transition leaves and the action taken.
/// An empty `from_state` is the pre-start condition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransitionKey {
    /// Plugin state before the transition.
    pub from_state: String,
    /// Action name.
    pub action: String,
}

impl TransitionKey {
    /// Creates a key.
    pub fn new(from_state: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            from_state: from_state.into(),
            action: action.into(),
        }
    }
}

/// What a transition produces. `next_status: None` leaves the outer status
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionOutcome {
    /// Plugin state after the transition.
    pub next_plugin_state: String,
    /// Outer status after the transition, if it changes.
    pub next_status: Option<TaskStatus>,
}

impl TransitionOutcome {
    /// Outcome that only moves the plugin state.
    pub fn to(next_plugin_state: impl Into<String>) -> Self {
        Self {
            next_plugin_state: next_plugin_state.into(),
            next_status: None,
        }
    }

    /// Sets the outer status the edge moves to.
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.next_status = Some(status);
        self
    }
}

/// Complete edge set of one plugin type.
pub type TransitionTable = HashMap<TransitionKey, TransitionOutcome>;

/// Immutable state machine over a [`TransitionTable`].
#[derive(Debug, Clone, Default)]
pub struct PluginFsm {
    transitions: TransitionTable,
}

impl PluginFsm {
    /// Builds a machine from a complete table.
    pub fn new(transitions: TransitionTable) -> Self {
        Self { transitions }
    }

    /// Builds a machine from `(from_state, action, next_state, next_status)`
    /// tuples. A later duplicate key replaces an earlier one.
    pub fn from_edges<'a, I>(edges: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str, &'a str, Option<TaskStatus>)>,
    {
        let transitions = edges
            .into_iter()
            .map(|(from, action, next, status)| {
                (
                    TransitionKey::new(from, action),
                    TransitionOutcome {
                        next_plugin_state: next.to_string(),
                        next_status: status,
                    },
                )
            })
            .collect();
        Self { transitions }
    }

    /// Returns `true` iff the table has an edge for `(state, action)`.
    pub fn can_transition(&self, state: &str, action: &str) -> bool {
        self.lookup(state, action).is_some()
    }

    /// Returns the configured outcome for `(state, action)`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::IllegalTransition`] naming the state and action
    /// when the table has no such edge.
    pub fn transition(&self, state: &str, action: &str) -> Result<TransitionOutcome, TaskError> {
        self.lookup(state, action)
            .cloned()
            .ok_or_else(|| TaskError::IllegalTransition {
                state: state.to_string(),
                action: action.to_string(),
            })
    }

    /// Iterates over every edge, for auditing the business-state graph.
    pub fn edges(&self) -> impl Iterator<Item = (&TransitionKey, &TransitionOutcome)> {
        self.transitions.iter()
    }

    /// Number of edges.
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    /// Returns `true` if the table has no edges.
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    fn lookup(&self, state: &str, action: &str) -> Option<&TransitionOutcome> {
        // Owned key needed for HashMap lookup by composite key.
        self.transitions.get(&TransitionKey::new(state, action))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn review_fsm() -> PluginFsm {
        PluginFsm::from_edges([
            ("", "draft", "draft", Some(TaskStatus::InProgress)),
            ("draft", "draft", "draft", None),
            ("draft", "submit", "submitted", Some(TaskStatus::Completed)),
        ])
    }

    #[test]
    fn explicit_self_loop_is_legal() {
        let fsm = review_fsm();
        let outcome = fsm.transition("draft", "draft").unwrap();
        assert_eq!(outcome, TransitionOutcome::to("draft"));
    }

    #[test]
    fn miss_names_state_and_action() {
        let err = review_fsm().transition("submitted", "submit").unwrap_err();
        match err {
            TaskError::IllegalTransition { state, action } => {
                assert_eq!(state, "submitted");
                assert_eq!(action, "submit");
            },
            other => panic!("expected IllegalTransition, got {other:?}"),
        }
    }

    #[test]
    fn no_implicit_case_folding() {
        let fsm = review_fsm();
        assert!(fsm.can_transition("draft", "submit"));
        assert!(!fsm.can_transition("draft", "SUBMIT"));
        assert!(!fsm.can_transition("Draft", "submit"));
    }

    #[test]
    fn later_duplicate_wins() {
        let fsm = PluginFsm::from_edges([
            ("", "go", "a", None),
            ("", "go", "b", Some(TaskStatus::InProgress)),
        ]);
        assert_eq!(fsm.len(), 1);
        assert_eq!(
            fsm.transition("", "go").unwrap(),
            TransitionOutcome::to("b").with_status(TaskStatus::InProgress)
        );
    }
}
