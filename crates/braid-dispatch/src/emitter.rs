//! Outcome reporting for component calls.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use braid_context::Context;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::DispatchError;
use crate::logger::NodeLogger;

/// Result of one activation or invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Outcome {
  Success(Context),
  Failure(DispatchError),
}

/// Receives the outcome of a component call.
///
/// Components call exactly one of `success` or `failure` per call.
pub trait Emitter: Send + Sync {
  fn success(&self, context: Context);

  fn failure(&self, error: DispatchError);

  /// Logger scoped to the node execution being served.
  fn logger(&self) -> NodeLogger;

  fn emit(&self, outcome: Outcome) {
    match outcome {
      Outcome::Success(context) => self.success(context),
      Outcome::Failure(error) => self.failure(error),
    }
  }
}

/// An emitter that forwards outcomes to an unbounded channel.
#[derive(Clone)]
pub struct ChannelEmitter {
  sender: mpsc::UnboundedSender<Outcome>,
  logger: NodeLogger,
}

impl ChannelEmitter {
  pub fn new(sender: mpsc::UnboundedSender<Outcome>, logger: NodeLogger) -> Self {
    Self { sender, logger }
  }
}

impl Emitter for ChannelEmitter {
  fn success(&self, context: Context) {
    let _ = self.sender.send(Outcome::Success(context));
  }

  fn failure(&self, error: DispatchError) {
    let _ = self.sender.send(Outcome::Failure(error));
  }

  fn logger(&self) -> NodeLogger {
    self.logger.clone()
  }
}

/// Forwards the first outcome only.
///
/// Wraps every emitter handed to a component, so a late failure report
/// (a panic after `success`, a duplicate remote response) cannot produce a
/// second callback for the same call.
pub(crate) struct OnceEmitter {
  inner: Arc<dyn Emitter>,
  fired: AtomicBool,
}

impl OnceEmitter {
  pub(crate) fn wrap(inner: Arc<dyn Emitter>) -> Arc<Self> {
    Arc::new(Self {
      inner,
      fired: AtomicBool::new(false),
    })
  }

  fn first(&self) -> bool {
    !self.fired.swap(true, Ordering::AcqRel)
  }
}

impl Emitter for OnceEmitter {
  fn success(&self, context: Context) {
    if self.first() {
      self.inner.success(context);
    }
  }

  fn failure(&self, error: DispatchError) {
    if self.first() {
      self.inner.failure(error);
    } else {
      tracing::debug!(error = %error, "late_failure_ignored");
    }
  }

  fn logger(&self) -> NodeLogger {
    self.inner.logger()
  }
}
