//! Builds a plugin and its state machine from a task-type tag and a
//! configuration blob.

use std::sync::Arc;

use serde_json::Value;

use crate::config::EngineConfig;
use crate::error::TaskError;
use crate::fsm::PluginFsm;
use crate::outbound::OutboundClient;
use crate::plugin::simple_form::SimpleForm;
use crate::plugin::wait_for_event::WaitForEvent;
use crate::plugin::TaskPlugin;
use crate::types::TaskType;

/// A freshly built plugin paired with the state machine that governs it.
#[derive(Debug)]
pub struct Executor {
    /// The plugin, not yet initialized.
    pub plugin: TaskPlugin,
    /// Its transition table; `None` permits every action.
    pub fsm: Option<Arc<PluginFsm>>,
}

/// Builds [`Executor`]s. Transition tables without configuration-dependent
/// edges are built once and shared.
#[derive(Debug, Clone)]
pub struct ExecutorFactory {
    client: OutboundClient,
    service_url: Option<String>,
    wait_for_event_fsm: Arc<PluginFsm>,
    simple_form_fsm: Arc<PluginFsm>,
    simple_form_review_fsm: Arc<PluginFsm>,
}

impl ExecutorFactory {
    /// Creates a factory whose plugins share `client`.
    pub fn new(client: OutboundClient, service_url: Option<String>) -> Self {
        Self {
            client,
            service_url,
            wait_for_event_fsm: Arc::new(WaitForEvent::fsm()),
            simple_form_fsm: Arc::new(SimpleForm::fsm(false)),
            simple_form_review_fsm: Arc::new(SimpleForm::fsm(true)),
        }
    }

    /// Creates a factory from engine configuration.
    pub fn from_config(config: &EngineConfig) -> Result<Self, TaskError> {
        let client = OutboundClient::new(config.retry.clone())?;
        Ok(Self::new(client, config.service_url.clone()))
    }

    /// Builds the executor for `task_type` from its raw configuration.
    ///
    /// # Errors
    ///
    /// [`TaskError::Validation`] if `config` does not match the plugin's
    /// configuration shape.
    pub fn build(&self, task_type: TaskType, config: &Value) -> Result<Executor, TaskError> {
        match task_type {
            TaskType::SimpleForm => {
                let plugin =
                    SimpleForm::from_config(config, self.client.clone(), self.service_url.clone())?;
                let fsm = if plugin.config().requires_review {
                    Arc::clone(&self.simple_form_review_fsm)
                } else {
                    Arc::clone(&self.simple_form_fsm)
                };
                Ok(Executor {
                    plugin: TaskPlugin::SimpleForm(plugin),
                    fsm: Some(fsm),
                })
            },
            TaskType::WaitForEvent => Ok(Executor {
                plugin: TaskPlugin::WaitForEvent(WaitForEvent::from_config(
                    config,
                    self.client.clone(),
                )?),
                fsm: Some(Arc::clone(&self.wait_for_event_fsm)),
            }),
        }
    }

    /// Parses a task-type tag and builds its executor.
    ///
    /// # Errors
    ///
    /// [`TaskError::UnknownTaskType`] for an unrecognized tag.
    pub fn build_from_tag(&self, tag: &str, config: &Value) -> Result<Executor, TaskError> {
        self.build(tag.parse()?, config)
    }
}
