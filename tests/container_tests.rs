//! Integration tests for the container: serialized transitions, concurrent
//! executions of the same task, and local-store consistency.

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use taskhost::constants::LOCAL_KEY_FORM_DATA;
use taskhost::plugin::wait_for_event::{ACTION_COMPLETE, STATE_NOTIFIED, STATE_RECEIVED};
use taskhost::plugin::ExecutorFactory;
use taskhost::store::{InMemoryTaskStore, TaskStore};
use taskhost::{
    Container, EngineConfig, ExecutionRequest, TaskError, TaskRecord, TaskStatus, TaskType,
};

async fn container_for(
    task_type: TaskType,
    config: serde_json::Value,
) -> (Arc<Container>, Arc<dyn TaskStore>) {
    let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
    let record = store
        .create(TaskRecord::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            task_type,
            config,
        ))
        .await
        .unwrap();
    let factory = ExecutorFactory::from_config(&EngineConfig::default()).unwrap();
    let executor = factory.build(record.task_type, &record.config).unwrap();
    let container = Container::from_executor(&record, Arc::clone(&store), executor).await;
    (Arc::new(container), store)
}

fn exactly_one_illegal(
    a: Result<taskhost::ExecutionResponse, TaskError>,
    b: Result<taskhost::ExecutionResponse, TaskError>,
) {
    let oks = [a.is_ok(), b.is_ok()].into_iter().filter(|ok| *ok).count();
    assert_eq!(oks, 1, "exactly one execution must succeed");
    let err = a.err().or(b.err()).unwrap();
    assert!(
        matches!(err, TaskError::IllegalTransition { .. }),
        "loser must see an illegal transition, got {err:?}"
    );
}

mod concurrency {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callbacks_consume_edge_once() {
        let (container, store) = container_for(TaskType::WaitForEvent, json!({})).await;
        container.transition("START").await.unwrap();
        assert_eq!(container.plugin_state(), STATE_NOTIFIED);

        let request = ExecutionRequest::new(ACTION_COMPLETE);
        let cancel = CancellationToken::new();
        let (a, b) = tokio::join!(
            container.execute(&request, &cancel),
            container.execute(&request, &cancel)
        );
        exactly_one_illegal(a, b);

        let stored = store.get(container.task_id()).await.unwrap();
        assert_eq!(stored.plugin_state, STATE_RECEIVED);
        assert_eq!(stored.status, TaskStatus::Completed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_submits_from_spawned_tasks() {
        let (container, store) =
            container_for(TaskType::SimpleForm, json!({"requiresReview": true})).await;

        let spawn_submit = |field: &'static str| {
            let container = Arc::clone(&container);
            tokio::spawn(async move {
                container
                    .execute(
                        &ExecutionRequest::new("submit").with_content(json!({"field": field})),
                        &CancellationToken::new(),
                    )
                    .await
            })
        };
        let first = spawn_submit("one");
        let second = spawn_submit("two");
        let (first, second) = (first.await.unwrap(), second.await.unwrap());
        let winner = if first.is_ok() { "one" } else { "two" };
        exactly_one_illegal(first, second);

        let stored = store.get(container.task_id()).await.unwrap();
        assert_eq!(stored.plugin_state, "submitted");
        assert_eq!(stored.status, TaskStatus::InProgress);
        assert_eq!(stored.local_state[LOCAL_KEY_FORM_DATA], json!({"field": winner}));
    }

    #[tokio::test]
    async fn losing_submit_leaves_no_writes_or_calls() {
        let mut server = mockito::Server::new_async().await;
        let forward = server
            .mock("POST", "/submissions")
            .with_status(200)
            .with_body("{}")
            .expect(1)
            .create_async()
            .await;
        let (container, store) = container_for(
            TaskType::SimpleForm,
            json!({"submissionUrl": format!("{}/submissions", server.url())}),
        )
        .await;

        let one = ExecutionRequest::new("submit").with_content(json!({"field": "one"}));
        let two = ExecutionRequest::new("submit").with_content(json!({"field": "two"}));
        let cancel = CancellationToken::new();
        let (a, b) = tokio::join!(container.execute(&one, &cancel), container.execute(&two, &cancel));
        let winner = if a.is_ok() { "one" } else { "two" };
        exactly_one_illegal(a, b);

        let stored = store.get(container.task_id()).await.unwrap();
        assert_eq!(stored.plugin_state, "submitted");
        assert_eq!(stored.status, TaskStatus::Completed);
        assert_eq!(stored.local_state[LOCAL_KEY_FORM_DATA], json!({"field": winner}));
        forward.assert_async().await;
    }

    #[tokio::test]
    async fn failed_forward_writes_no_form_data() {
        let mut server = mockito::Server::new_async().await;
        let _forward = server
            .mock("POST", "/submissions")
            .with_status(422)
            .create_async()
            .await;
        let (container, store) = container_for(
            TaskType::SimpleForm,
            json!({"submissionUrl": format!("{}/submissions", server.url())}),
        )
        .await;

        let err = container
            .execute(
                &ExecutionRequest::new("submit").with_content(json!({"field": "one"})),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::Plugin(_)));

        let stored = store.get(container.task_id()).await.unwrap();
        assert_eq!(stored.plugin_state, "");
        assert!(!stored.local_state.contains_key(LOCAL_KEY_FORM_DATA));
    }
}

mod state_reporting {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn fetch_reports_no_change() {
        let (container, _store) = container_for(TaskType::SimpleForm, json!({"title": "T"})).await;
        container.start(&CancellationToken::new()).await.unwrap();

        let response = container
            .execute(&ExecutionRequest::new("fetch"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(!response.changed_state());
        assert_eq!(response.new_state, None);
        assert!(response.api_response.unwrap().success);
    }

    #[tokio::test]
    async fn repeated_start_is_a_no_op() {
        let (container, _store) = container_for(TaskType::SimpleForm, json!({})).await;
        let first = container.start(&CancellationToken::new()).await.unwrap();
        assert_eq!(first.new_state, Some(TaskStatus::InProgress));

        let second = container.start(&CancellationToken::new()).await.unwrap();
        assert!(!second.changed_state());
        assert_eq!(second.message, "SimpleForm already started");
    }

    #[tokio::test]
    async fn draft_self_loop_keeps_status() {
        let (container, store) = container_for(TaskType::SimpleForm, json!({})).await;
        let cancel = CancellationToken::new();
        container
            .execute(&ExecutionRequest::new("draft").with_content(json!({"a": 1})), &cancel)
            .await
            .unwrap();
        assert_eq!(container.status(), TaskStatus::InProgress);

        container
            .execute(&ExecutionRequest::new("draft").with_content(json!({"a": 2})), &cancel)
            .await
            .unwrap();
        assert_eq!(container.status(), TaskStatus::InProgress);
        assert_eq!(container.plugin_state(), "draft");
        assert_eq!(
            store.get_local_state(container.task_id()).await.unwrap()[LOCAL_KEY_FORM_DATA],
            json!({"a": 2})
        );
    }

    #[tokio::test]
    async fn illegal_submit_writes_nothing() {
        let (container, store) = container_for(TaskType::SimpleForm, json!({})).await;
        let cancel = CancellationToken::new();
        container
            .execute(&ExecutionRequest::new("submit").with_content(json!({"x": 1})), &cancel)
            .await
            .unwrap();

        let err = container
            .execute(&ExecutionRequest::new("draft").with_content(json!({"x": 2})), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::IllegalTransition { .. }));
        assert_eq!(
            store.get_local_state(container.task_id()).await.unwrap()[LOCAL_KEY_FORM_DATA],
            json!({"x": 1})
        );
    }
}

mod partial_writes {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::{Map, Value};

    /// In-memory store that refuses outer-status writes while `fail_status`
    /// is set.
    #[derive(Default)]
    struct StatusWriteFails {
        inner: InMemoryTaskStore,
        fail_status: AtomicBool,
    }

    #[async_trait]
    impl TaskStore for StatusWriteFails {
        async fn create(&self, record: TaskRecord) -> Result<TaskRecord, TaskError> {
            self.inner.create(record).await
        }
        async fn get(&self, task_id: Uuid) -> Result<TaskRecord, TaskError> {
            self.inner.get(task_id).await
        }
        async fn update(&self, record: &TaskRecord) -> Result<TaskRecord, TaskError> {
            self.inner.update(record).await
        }
        async fn update_status(
            &self,
            task_id: Uuid,
            status: TaskStatus,
        ) -> Result<TaskRecord, TaskError> {
            if self.fail_status.load(Ordering::SeqCst) {
                return Err(TaskError::Store("status write refused".to_string()));
            }
            self.inner.update_status(task_id, status).await
        }
        async fn update_plugin_state(
            &self,
            task_id: Uuid,
            plugin_state: &str,
        ) -> Result<TaskRecord, TaskError> {
            self.inner.update_plugin_state(task_id, plugin_state).await
        }
        async fn update_local_state(
            &self,
            task_id: Uuid,
            local_state: Map<String, Value>,
        ) -> Result<TaskRecord, TaskError> {
            self.inner.update_local_state(task_id, local_state).await
        }
        async fn get_plugin_state(&self, task_id: Uuid) -> Result<String, TaskError> {
            self.inner.get_plugin_state(task_id).await
        }
        async fn get_local_state(&self, task_id: Uuid) -> Result<Map<String, Value>, TaskError> {
            self.inner.get_local_state(task_id).await
        }
        async fn delete(&self, task_id: Uuid) -> Result<bool, TaskError> {
            self.inner.delete(task_id).await
        }
        async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<TaskRecord>, TaskError> {
            self.inner.list_by_status(status).await
        }
    }

    #[tokio::test]
    async fn failed_status_write_is_reconciled_on_rebuild() {
        let store = Arc::new(StatusWriteFails::default());
        let record = store
            .create(TaskRecord::new(
                Uuid::new_v4(),
                Uuid::new_v4(),
                Uuid::new_v4(),
                TaskType::WaitForEvent,
                json!({}),
            ))
            .await
            .unwrap();
        let factory = ExecutorFactory::from_config(&EngineConfig::default()).unwrap();
        let executor = factory.build(record.task_type, &record.config).unwrap();
        let container =
            Container::from_executor(&record, Arc::clone(&store) as Arc<dyn TaskStore>, executor).await;

        store.fail_status.store(true, Ordering::SeqCst);
        let err = container.transition("START").await.unwrap_err();
        assert!(matches!(err, TaskError::Store(_)));

        // Memory is ahead of the store: only the plugin state landed.
        assert_eq!(container.status(), TaskStatus::InProgress);
        assert_eq!(container.plugin_state(), STATE_NOTIFIED);
        let stored = store.get(record.task_id).await.unwrap();
        assert_eq!(stored.plugin_state, STATE_NOTIFIED);
        assert_eq!(stored.status, TaskStatus::Initialized);

        // A container rebuilt from the store trusts the store.
        store.fail_status.store(false, Ordering::SeqCst);
        let executor = factory.build(stored.task_type, &stored.config).unwrap();
        let rebuilt =
            Container::from_executor(&stored, Arc::clone(&store) as Arc<dyn TaskStore>, executor).await;
        assert_eq!(rebuilt.status(), TaskStatus::Initialized);
        assert_eq!(rebuilt.plugin_state(), STATE_NOTIFIED);

        rebuilt
            .execute(&ExecutionRequest::new(ACTION_COMPLETE), &CancellationToken::new())
            .await
            .unwrap();
        let stored = store.get(record.task_id).await.unwrap();
        assert_eq!(stored.plugin_state, STATE_RECEIVED);
        assert_eq!(stored.status, TaskStatus::Completed);
    }
}
