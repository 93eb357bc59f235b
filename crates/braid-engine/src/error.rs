use braid_execution::ExecutionError;
use braid_join::{JoinError, LookupError};
use braid_store::StoreError;
use braid_workflow::WorkflowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NavigationError {
  #[error("node execution not found: {0}")]
  NodeExecutionNotFound(String),

  #[error("node {node_id} not found in workflow {workflow_id}")]
  NodeNotFound {
    workflow_id: String,
    node_id: String,
  },

  #[error(transparent)]
  Execution(#[from] ExecutionError),
}

#[derive(Debug, Error)]
pub enum EngineError {
  #[error("workflow not found: {0}")]
  WorkflowNotFound(String),

  #[error("execution not found: {0}")]
  ExecutionNotFound(String),

  #[error("workflow runner channel closed")]
  ChannelClosed,

  #[error(transparent)]
  Workflow(#[from] WorkflowError),

  #[error(transparent)]
  Navigation(#[from] NavigationError),

  #[error(transparent)]
  Join(#[from] JoinError),

  #[error(transparent)]
  Lookup(#[from] LookupError),

  #[error(transparent)]
  Execution(#[from] ExecutionError),

  #[error(transparent)]
  Store(#[from] StoreError),
}
