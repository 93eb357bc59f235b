//! Braid Store
//!
//! This crate provides the storage trait for workflow definitions and
//! executions, and an in-memory implementation.
//!
//! The [`Store`] trait defines operations for:
//! - Saving and loading workflow definitions
//! - Saving executions, looking them up by id, and querying them by
//!   [`ExecutionField`]

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use braid_execution::WorkflowExecution;
use braid_workflow::Workflow;
use serde::{Deserialize, Serialize};

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  /// The requested record was not found.
  #[error("not found: {0}")]
  NotFound(String),

  /// The backing store failed.
  #[error("backend error: {0}")]
  Backend(String),
}

/// Execution attributes that can be queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionField {
  WorkflowId,
  Status,
}

impl ExecutionField {
  /// The value of this field on `execution`, as stored.
  pub fn value_of<'a>(&self, execution: &'a WorkflowExecution) -> &'a str {
    match self {
      Self::WorkflowId => &execution.workflow_id,
      Self::Status => execution.status.as_str(),
    }
  }
}

/// Storage trait for workflow definitions and executions.
#[async_trait]
pub trait Store: Send + Sync {
  /// Insert or replace a workflow definition.
  async fn save_workflow(&self, workflow: &Workflow) -> Result<(), StoreError>;

  /// Get a workflow definition by ID.
  async fn find_workflow(&self, workflow_id: &str) -> Result<Workflow, StoreError>;

  /// Insert or replace an execution.
  async fn save(&self, execution: &WorkflowExecution) -> Result<(), StoreError>;

  /// Get an execution by ID.
  async fn find_by_id(&self, execution_id: &str) -> Result<WorkflowExecution, StoreError>;

  /// List the executions whose `field` equals `value`, oldest first.
  async fn find_by_field(
    &self,
    field: ExecutionField,
    value: &str,
  ) -> Result<Vec<WorkflowExecution>, StoreError>;
}
