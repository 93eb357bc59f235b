use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a component call did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum DispatchError {
  /// Nothing is registered under the referenced component id.
  #[error("component not found: {0}")]
  ComponentNotFound(String),

  /// The component rejected its configuration.
  #[error("invalid component configuration: {0}")]
  InvalidConfig(String),

  /// The component reported a failure.
  #[error("component failed: {0}")]
  Component(String),

  /// The call never finished: the task panicked or was cancelled.
  #[error("component call interrupted: {0}")]
  Interrupted(String),
}
