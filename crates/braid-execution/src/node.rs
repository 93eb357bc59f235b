use braid_context::{Context, NodeState};
use serde::{Deserialize, Serialize};

/// One activation of a definition node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNodeExecution {
  pub id: String,
  /// Id of the definition node this activation runs.
  pub node_id: String,
  pub state: NodeState,
  pub context: Context,
  /// Ids of the node executions spawned when this one completed.
  #[serde(default)]
  pub children: Vec<String>,
  /// Arrival order within the owning execution.
  pub sequence: u64,
}

impl WorkflowNodeExecution {
  pub fn new(node_id: impl Into<String>, context: Context, sequence: u64) -> Self {
    Self {
      id: uuid::Uuid::new_v4().to_string(),
      node_id: node_id.into(),
      state: NodeState::Idle,
      context,
      children: Vec::new(),
      sequence,
    }
  }

  pub fn is_done(&self) -> bool {
    self.state == NodeState::Done
  }
}

/// Nested view of an execution.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionTree {
  Node {
    execution: WorkflowNodeExecution,
    children: Vec<ExecutionTree>,
  },
  /// A node execution already placed elsewhere in the tree.
  Link { id: String },
}

impl ExecutionTree {
  pub fn id(&self) -> &str {
    match self {
      Self::Node { execution, .. } => &execution.id,
      Self::Link { id } => id,
    }
  }
}
