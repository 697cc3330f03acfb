//! FSM-driven plugin task execution engine.
//!
//! `taskhost` runs pluggable units of business logic ("plugins") inside a
//! per-task [`Container`](container::Container). Every state change a plugin
//! makes is checked against a declarative transition table
//! ([`PluginFsm`](fsm::PluginFsm)), persisted through a
//! [`TaskStore`](store::TaskStore), and reported to an upstream orchestrator
//! as a best-effort [`TaskNotification`](types::TaskNotification).
//!
//! # Architecture
//!
//! ```text
//! TaskManager ──> ExecutorFactory ──> (TaskPlugin, PluginFsm)
//!      │                                     │
//!      ├── TaskTransaction (one CAS write) <─┤ Container (sole state writer)
//!      │                                     │
//!      └── NotificationSender (drop-on-full) │ PluginApi <── Plugin::init
//! ```
//!
//! - [`fsm`]: pure `(plugin state, action) -> outcome` lookup.
//! - [`plugin`]: the [`Plugin`](plugin::Plugin) contract, the closed set of
//!   plugin kinds, and the factory that builds them from a task-type tag.
//! - [`container`]: per-task runtime binding a plugin to its state machine.
//! - [`manager`]: process-facing orchestration with a read-through cache.
//! - [`store`]: versioned KV backends, the generic task store, transactions.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use taskhost::config::EngineConfig;
//! use taskhost::manager::{notification_channel, TaskManager};
//! use taskhost::store::InMemoryTaskStore;
//!
//! # async fn example() -> Result<(), taskhost::TaskError> {
//! let config = EngineConfig::default();
//! let (sender, mut receiver) = notification_channel(config.notification_capacity);
//! let manager = TaskManager::from_config(&config, Arc::new(InMemoryTaskStore::new()), sender)?;
//!
//! tokio::spawn(async move {
//!     while let Some(notification) = receiver.recv().await {
//!         tracing::info!(task_id = %notification.task_id, signal = %notification.signal, "task signal");
//!     }
//! });
//! # drop(manager);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod container;
pub mod domain;
pub mod error;
pub mod fsm;
#[cfg(feature = "logging")]
pub mod logging;
pub mod manager;
pub mod outbound;
pub mod plugin;
pub mod store;
pub mod types;

pub use config::{EngineConfig, RetryConfig};
pub use container::Container;
pub use domain::TaskRecord;
pub use error::TaskError;
pub use fsm::{PluginFsm, TransitionKey, TransitionOutcome, TransitionTable};
pub use manager::{notification_channel, Execution, NotificationSender, TaskContext, TaskManager};
pub use outbound::OutboundClient;
pub use plugin::{Executor, ExecutorFactory, Plugin, PluginApi, TaskPlugin};
pub use store::{GenericTaskStore, InMemoryBackend, InMemoryTaskStore, LocalStore, TaskStore, TaskTransaction};
pub use types::{
    ApiError, ApiResponse, ExecuteTaskRequest, ExecuteTaskResponse, ExecutionRequest,
    ExecutionResponse, NotificationSignal, TaskNotification, TaskResult, TaskStatus, TaskType,
};
