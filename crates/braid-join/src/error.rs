use thiserror::Error;

/// Failure to resolve the sibling arrivals of a join.
#[derive(Debug, Error)]
pub enum LookupError {
  #[error("execution not found: {0}")]
  ExecutionNotFound(String),

  #[error("execution lookup unavailable: {0}")]
  Unavailable(String),
}

#[derive(Debug, Error)]
pub enum JoinError {
  #[error("invalid join configuration: {0}")]
  InvalidConfig(String),

  #[error("node execution {node_execution_id} is not an arrival of join node {node_id}")]
  NotInGroup {
    node_id: String,
    node_execution_id: String,
  },

  #[error(transparent)]
  Lookup(#[from] LookupError),
}
