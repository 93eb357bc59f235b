//! Registry of live executions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use braid_execution::{WorkflowExecution, WorkflowNodeExecution};
use braid_join::{ExecutionLookup, LookupError};

/// Live executions, each behind its own mutex.
///
/// Navigation and join evaluation for an execution run while holding its
/// mutex; nothing holds it across an `.await`.
#[derive(Default)]
pub struct ExecutionTable {
  executions: RwLock<HashMap<String, Arc<Mutex<WorkflowExecution>>>>,
}

impl ExecutionTable {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&self, execution: WorkflowExecution) {
    let mut executions = self.executions.write().unwrap_or_else(PoisonError::into_inner);
    executions.insert(execution.execution_id.clone(), Arc::new(Mutex::new(execution)));
  }

  pub fn contains(&self, execution_id: &str) -> bool {
    self
      .executions
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .contains_key(execution_id)
  }

  fn entry(&self, execution_id: &str) -> Result<Arc<Mutex<WorkflowExecution>>, LookupError> {
    self
      .executions
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .get(execution_id)
      .cloned()
      .ok_or_else(|| LookupError::ExecutionNotFound(execution_id.to_string()))
  }

  /// Run `f` on the execution while holding its lock.
  pub fn with_execution<R>(
    &self,
    execution_id: &str,
    f: impl FnOnce(&mut WorkflowExecution) -> R,
  ) -> Result<R, LookupError> {
    let entry = self.entry(execution_id)?;
    let mut execution = entry
      .lock()
      .map_err(|_| LookupError::Unavailable(format!("execution {execution_id} is poisoned")))?;
    Ok(f(&mut execution))
  }

  /// A copy of the execution's current state.
  pub fn snapshot(&self, execution_id: &str) -> Result<WorkflowExecution, LookupError> {
    self.with_execution(execution_id, |execution| execution.clone())
  }
}

impl ExecutionLookup for ExecutionTable {
  fn with_siblings(
    &self,
    execution_id: &str,
    node_id: &str,
    decide: &mut dyn FnMut(&mut [&mut WorkflowNodeExecution]),
  ) -> Result<(), LookupError> {
    self.with_execution(execution_id, |execution| {
      decide(&mut execution.executions_of_mut(node_id));
    })
  }
}
