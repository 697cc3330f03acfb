//! Property-based tests for the transition table, outer-status ordering,
//! and record decoding.

use std::collections::HashMap;
use std::sync::Arc;

use proptest::prelude::*;
use serde_json::{json, Value};
use uuid::Uuid;

use taskhost::fsm::{PluginFsm, TransitionKey, TransitionOutcome};
use taskhost::store::{InMemoryTaskStore, TaskStore};
use taskhost::{Container, Plugin, PluginApi, TaskError, TaskRecord, TaskStatus, TaskType};

// ─── Arbitrary Strategies ───────────────────────────────────────────────────

fn arb_status() -> impl Strategy<Value = TaskStatus> {
    prop::sample::select(vec![
        TaskStatus::Initialized,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Failed,
    ])
}

fn arb_state() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["", "a", "b", "c", "d"]).prop_map(str::to_string)
}

fn arb_action() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["START", "go", "stop", "loop", "x"]).prop_map(str::to_string)
}

fn arb_table() -> impl Strategy<Value = HashMap<TransitionKey, TransitionOutcome>> {
    prop::collection::vec(
        (
            arb_state(),
            arb_action(),
            arb_state(),
            proptest::option::of(arb_status()),
        ),
        0..12,
    )
    .prop_map(|edges| {
        edges
            .into_iter()
            .map(|(from, action, next, status)| {
                (
                    TransitionKey::new(from, action),
                    TransitionOutcome {
                        next_plugin_state: next,
                        next_status: status,
                    },
                )
            })
            .collect()
    })
}

// ─── Property Tests: Transition Table ───────────────────────────────────────

proptest! {
    /// Present edges return exactly the configured outcome; absent edges fail.
    #[test]
    fn transition_is_table_lookup(
        table in arb_table(),
        state in arb_state(),
        action in arb_action(),
    ) {
        let fsm = PluginFsm::new(table.clone());
        let key = TransitionKey::new(state.clone(), action.clone());
        match table.get(&key) {
            Some(expected) => prop_assert_eq!(fsm.transition(&state, &action).unwrap(), expected.clone()),
            None => {
                let is_illegal = matches!(
                    fsm.transition(&state, &action),
                    Err(TaskError::IllegalTransition { .. })
                );
                prop_assert!(is_illegal);
            },
        }
    }

    /// `can_transition` agrees with `transition` for every pair.
    #[test]
    fn can_transition_iff_transition_succeeds(
        table in arb_table(),
        state in arb_state(),
        action in arb_action(),
    ) {
        let fsm = PluginFsm::new(table);
        prop_assert_eq!(fsm.can_transition(&state, &action), fsm.transition(&state, &action).is_ok());
    }

    /// Looking up the same pair twice yields the same outcome.
    #[test]
    fn transition_is_deterministic(
        table in arb_table(),
        state in arb_state(),
        action in arb_action(),
    ) {
        let fsm = PluginFsm::new(table);
        let first = fsm.transition(&state, &action).ok();
        let second = fsm.transition(&state, &action).ok();
        prop_assert_eq!(first, second);
    }
}

// ─── Property Tests: Outer Status ───────────────────────────────────────────

proptest! {
    /// Terminal statuses accept no further status.
    #[test]
    fn terminal_statuses_are_final(
        from in prop::sample::select(vec![TaskStatus::Completed, TaskStatus::Failed]),
        to in arb_status(),
    ) {
        prop_assert!(!from.can_advance_to(&to));
        prop_assert!(from.validate_advance(Uuid::nil(), &to).is_err());
    }

    /// Accepted advances never go backwards.
    #[test]
    fn advances_are_monotonic(from in arb_status(), to in arb_status()) {
        if from.can_advance_to(&to) {
            prop_assert!(!from.is_terminal());
            prop_assert!(from.validate_advance(Uuid::nil(), &to).is_ok());
            prop_assert!(!(to == TaskStatus::Initialized && from != TaskStatus::Initialized));
        }
    }

    /// Status names survive display and parse.
    #[test]
    fn status_display_parses_back(status in arb_status()) {
        let parsed: TaskStatus = status.to_string().parse().unwrap();
        prop_assert_eq!(parsed, status);
    }
}

// ─── Fuzz: decoding ─────────────────────────────────────────────────────────

proptest! {
    /// Arbitrary JSON never panics the record decoder.
    #[test]
    fn record_decoding_never_panics(
        key in "[a-zA-Z]{1,12}",
        value in prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            ".{0,20}".prop_map(Value::from),
        ],
    ) {
        let doc = json!({ key: value });
        let _ = serde_json::from_value::<TaskRecord>(doc);
    }

    /// Arbitrary tags either parse to a task type or fail with a typed error.
    #[test]
    fn task_type_parsing_is_total(tag in ".{0,24}") {
        match tag.parse::<TaskType>() {
            Ok(_) => {},
            Err(e) => prop_assert!(matches!(e, TaskError::UnknownTaskType(_))),
        }
    }
}

// ─── Container agrees with its table ────────────────────────────────────────

struct Idle;

#[async_trait::async_trait]
impl Plugin for Idle {
    fn init(&mut self, _api: Arc<dyn PluginApi>) {}

    async fn start(
        &self,
        _cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<taskhost::ExecutionResponse, TaskError> {
        Ok(taskhost::ExecutionResponse::default())
    }

    async fn execute(
        &self,
        _request: &taskhost::ExecutionRequest,
        _cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<taskhost::ExecutionResponse, TaskError> {
        Ok(taskhost::ExecutionResponse::default())
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Through a container, `can_transition` predicts `transition`, and an
    /// edge without a status leaves the outer status unchanged.
    #[test]
    fn container_can_transition_predicts_transition(
        table in arb_table(),
        actions in prop::collection::vec(arb_action(), 1..6),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
            let record = store
                .create(TaskRecord::new(
                    Uuid::new_v4(),
                    Uuid::new_v4(),
                    Uuid::new_v4(),
                    TaskType::WaitForEvent,
                    Value::Null,
                ))
                .await
                .unwrap();
            let fsm = Arc::new(PluginFsm::new(table.clone()));
            let container = Container::new(&record, store, Idle, Some(fsm)).await;

            for action in actions {
                let before_state = container.plugin_state();
                let before_status = container.status();
                let predicted = container.can_transition(&action);
                let result = container.transition(&action).await;
                prop_assert_eq!(predicted, result.is_ok());

                if result.is_ok() {
                    let outcome = &table[&TransitionKey::new(before_state, action)];
                    prop_assert_eq!(container.plugin_state(), outcome.next_plugin_state.clone());
                    match outcome.next_status {
                        Some(next) => prop_assert_eq!(container.status(), next),
                        None => prop_assert_eq!(container.status(), before_status),
                    }
                } else {
                    prop_assert_eq!(container.plugin_state(), before_state);
                    prop_assert_eq!(container.status(), before_status);
                }
            }
            Ok(())
        })?;
    }
}
