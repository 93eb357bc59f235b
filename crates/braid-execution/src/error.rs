use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutionError {
  #[error("node execution not found: {0}")]
  NodeExecutionNotFound(String),

  #[error("node execution {from} references unknown child {to}")]
  DanglingChild { from: String, to: String },
}
