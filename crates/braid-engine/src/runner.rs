//! Workflow runner with channel-based triggering.
//!
//! The `WorkflowRunner` owns an mpsc channel for receiving trigger payloads
//! and starts an execution of one deployed workflow per payload.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::EngineError;
use crate::events::ExecutionNotifier;
use crate::orchestrator::Orchestrator;

/// A runner that starts executions of a workflow in response to trigger
/// payloads.
///
/// # Usage
///
/// ```ignore
/// let runner = WorkflowRunner::new(orchestrator, "orders");
///
/// // Get sender for external triggers (webhooks, timers, etc.)
/// let sender = runner.sender();
///
/// // Start the trigger loop
/// let cancel = CancellationToken::new();
/// runner.start(cancel).await?;
/// ```
pub struct WorkflowRunner<N: ExecutionNotifier + 'static> {
  sender: mpsc::Sender<Value>,
  receiver: mpsc::Receiver<Value>,
  orchestrator: Arc<Orchestrator<N>>,
  workflow_id: String,
}

impl<N: ExecutionNotifier + 'static> WorkflowRunner<N> {
  /// Create a runner whose buffer size comes from the orchestrator's config.
  pub fn new(orchestrator: Arc<Orchestrator<N>>, workflow_id: impl Into<String>) -> Self {
    let buffer_size = orchestrator.config().runner_buffer;
    Self::with_buffer_size(orchestrator, workflow_id, buffer_size)
  }

  /// Create a new workflow runner with a custom buffer size.
  pub fn with_buffer_size(
    orchestrator: Arc<Orchestrator<N>>,
    workflow_id: impl Into<String>,
    buffer_size: usize,
  ) -> Self {
    let (sender, receiver) = mpsc::channel(buffer_size);
    Self {
      sender,
      receiver,
      orchestrator,
      workflow_id: workflow_id.into(),
    }
  }

  /// Get a sender handle for triggering executions.
  pub fn sender(&self) -> mpsc::Sender<Value> {
    self.sender.clone()
  }

  /// Trigger an execution with the given payload.
  pub async fn run(&self, payload: Value) -> Result<(), EngineError> {
    self
      .sender
      .send(payload)
      .await
      .map_err(|_| EngineError::ChannelClosed)
  }

  /// Start the trigger loop.
  ///
  /// This blocks until the cancellation token is triggered or the channel
  /// closes. Executions run on their own; the loop only starts them.
  pub async fn start(mut self, cancel: CancellationToken) -> Result<(), EngineError> {
    info!(workflow_id = %self.workflow_id, "workflow_runner_started");

    loop {
      tokio::select! {
        _ = cancel.cancelled() => {
          info!(workflow_id = %self.workflow_id, "workflow_runner_cancelled");
          break;
        }
        payload = self.receiver.recv() => {
          let Some(payload) = payload else {
            info!(workflow_id = %self.workflow_id, "workflow_runner_channel_closed");
            break;
          };

          match self.orchestrator.start(&self.workflow_id, trigger_data(payload)).await {
            Ok(execution_id) => info!(
              workflow_id = %self.workflow_id,
              execution_id = %execution_id,
              "workflow_triggered"
            ),
            Err(e) => error!(
              workflow_id = %self.workflow_id,
              error = %e,
              "workflow_trigger_failed"
            ),
          }
        }
      }
    }

    Ok(())
  }

  pub fn orchestrator(&self) -> &Orchestrator<N> {
    &self.orchestrator
  }

  pub fn workflow_id(&self) -> &str {
    &self.workflow_id
  }
}

/// Object payloads become the initial data; anything else is kept under
/// `payload`.
fn trigger_data(payload: Value) -> Map<String, Value> {
  match payload {
    Value::Object(data) => data,
    Value::Null => Map::new(),
    other => Map::from_iter([("payload".to_string(), other)]),
  }
}
