use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use braid_execution::WorkflowExecution;
use braid_workflow::Workflow;
use tokio::sync::RwLock;

use crate::{ExecutionField, Store, StoreError};

/// In-memory store. Clones share the same records.
#[derive(Clone, Default)]
pub struct MemoryStore {
  workflows: Arc<RwLock<HashMap<String, Workflow>>>,
  executions: Arc<RwLock<HashMap<String, WorkflowExecution>>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl Store for MemoryStore {
  async fn save_workflow(&self, workflow: &Workflow) -> Result<(), StoreError> {
    let mut workflows = self.workflows.write().await;
    workflows.insert(workflow.workflow_id.clone(), workflow.clone());
    Ok(())
  }

  async fn find_workflow(&self, workflow_id: &str) -> Result<Workflow, StoreError> {
    let workflows = self.workflows.read().await;
    workflows
      .get(workflow_id)
      .cloned()
      .ok_or_else(|| StoreError::NotFound(workflow_id.to_string()))
  }

  async fn save(&self, execution: &WorkflowExecution) -> Result<(), StoreError> {
    let mut executions = self.executions.write().await;
    executions.insert(execution.execution_id.clone(), execution.clone());
    Ok(())
  }

  async fn find_by_id(&self, execution_id: &str) -> Result<WorkflowExecution, StoreError> {
    let executions = self.executions.read().await;
    executions
      .get(execution_id)
      .cloned()
      .ok_or_else(|| StoreError::NotFound(execution_id.to_string()))
  }

  async fn find_by_field(
    &self,
    field: ExecutionField,
    value: &str,
  ) -> Result<Vec<WorkflowExecution>, StoreError> {
    let executions = self.executions.read().await;
    let mut found: Vec<WorkflowExecution> = executions
      .values()
      .filter(|execution| field.value_of(execution) == value)
      .cloned()
      .collect();
    found.sort_by_key(|execution| execution.started_at);
    Ok(found)
  }
}
