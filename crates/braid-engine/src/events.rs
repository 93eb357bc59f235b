//! Execution events and notifiers for observability.
//!
//! Events are emitted while executions progress so that consumers can
//! observe them, persist them, stream them to UIs, etc.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted during workflow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
  /// An execution came to life.
  WorkflowStarted {
    execution_id: String,
    workflow_id: String,
    /// The execution whose START completion produced this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    triggered_by: Option<String>,
  },

  /// A node execution was handed to its component.
  NodeStarted {
    execution_id: String,
    node_id: String,
    node_execution_id: String,
  },

  /// A node execution completed and its successors were spawned.
  NodeCompleted {
    execution_id: String,
    node_id: String,
    node_execution_id: String,
    data: serde_json::Value,
  },

  /// A component call failed; the branch stops here.
  NodeFailed {
    execution_id: String,
    node_id: String,
    node_execution_id: String,
    error: String,
  },

  /// A join arrival is waiting for more branches.
  JoinWaiting {
    execution_id: String,
    node_id: String,
    node_execution_id: String,
    found: Vec<String>,
  },

  /// A join fired with the merged context of its arrivals.
  JoinFired {
    execution_id: String,
    node_id: String,
    node_execution_id: String,
  },

  /// An END node completed.
  WorkflowCompleted { execution_id: String },
}

impl ExecutionEvent {
  pub fn execution_id(&self) -> &str {
    match self {
      Self::WorkflowStarted { execution_id, .. }
      | Self::NodeStarted { execution_id, .. }
      | Self::NodeCompleted { execution_id, .. }
      | Self::NodeFailed { execution_id, .. }
      | Self::JoinWaiting { execution_id, .. }
      | Self::JoinFired { execution_id, .. }
      | Self::WorkflowCompleted { execution_id } => execution_id,
    }
  }
}

/// Trait for receiving execution events.
///
/// The orchestrator calls `notify` for each event; implementations decide
/// what to do with them (persist, broadcast, log, ignore, etc.).
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// A no-op notifier that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// A notifier that sends events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // NOTE: Unbounded so that a slow consumer never blocks a callback, which
  // may be running while an execution is locked.
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }

  /// Create a notifier together with the receiving end of its channel.
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<ExecutionEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self::new(sender), receiver)
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // Ignore send errors - receiver may have been dropped
    let _ = self.sender.send(event);
  }
}

impl<T: ExecutionNotifier + ?Sized> ExecutionNotifier for std::sync::Arc<T> {
  fn notify(&self, event: ExecutionEvent) {
    (**self).notify(event);
  }
}
