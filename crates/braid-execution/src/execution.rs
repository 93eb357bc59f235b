use std::collections::{HashMap, HashSet};

use braid_context::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ExecutionError;
use crate::node::{ExecutionTree, WorkflowNodeExecution};

/// Status of a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
  InProgress,
  Success,
}

impl ExecutionStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::InProgress => "in_progress",
      Self::Success => "success",
    }
  }
}

/// One run of a workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
  pub execution_id: String,
  pub workflow_id: String,
  pub status: ExecutionStatus,
  pub root_ids: Vec<String>,
  pub nodes: HashMap<String, WorkflowNodeExecution>,
  pub started_at: DateTime<Utc>,
  pub completed_at: Option<DateTime<Utc>>,
  /// Next arrival sequence to hand out.
  #[serde(default)]
  next_sequence: u64,
}

impl WorkflowExecution {
  pub fn new(workflow_id: impl Into<String>) -> Self {
    Self {
      execution_id: uuid::Uuid::new_v4().to_string(),
      workflow_id: workflow_id.into(),
      status: ExecutionStatus::InProgress,
      root_ids: Vec::new(),
      nodes: HashMap::new(),
      started_at: Utc::now(),
      completed_at: None,
      next_sequence: 0,
    }
  }

  fn bump_sequence(&mut self) -> u64 {
    let sequence = self.next_sequence;
    self.next_sequence += 1;
    sequence
  }

  /// Add a root node execution for definition node `node_id`.
  pub fn add_root(&mut self, node_id: impl Into<String>, context: Context) -> String {
    let sequence = self.bump_sequence();
    let node = WorkflowNodeExecution::new(node_id, context, sequence);
    let id = node.id.clone();
    self.root_ids.push(id.clone());
    self.nodes.insert(id.clone(), node);
    id
  }

  /// Add a node execution spawned by `parent_id`.
  pub fn add_child(
    &mut self,
    parent_id: &str,
    node_id: impl Into<String>,
    context: Context,
  ) -> Result<String, ExecutionError> {
    if !self.nodes.contains_key(parent_id) {
      return Err(ExecutionError::NodeExecutionNotFound(parent_id.to_string()));
    }

    let sequence = self.bump_sequence();
    let node = WorkflowNodeExecution::new(node_id, context, sequence);
    let id = node.id.clone();
    self.nodes.insert(id.clone(), node);
    if let Some(parent) = self.nodes.get_mut(parent_id) {
      parent.children.push(id.clone());
    }
    Ok(id)
  }

  /// Give `id` the next arrival sequence, moving it behind every node
  /// execution that arrived before it.
  pub fn stamp_arrival(&mut self, id: &str) -> Result<u64, ExecutionError> {
    if !self.nodes.contains_key(id) {
      return Err(ExecutionError::NodeExecutionNotFound(id.to_string()));
    }
    let sequence = self.bump_sequence();
    if let Some(node) = self.nodes.get_mut(id) {
      node.sequence = sequence;
    }
    Ok(sequence)
  }

  pub fn node(&self, id: &str) -> Option<&WorkflowNodeExecution> {
    self.nodes.get(id)
  }

  pub fn node_mut(&mut self, id: &str) -> Option<&mut WorkflowNodeExecution> {
    self.nodes.get_mut(id)
  }

  /// Every activation of definition node `node_id`, in arrival order.
  pub fn executions_of(&self, node_id: &str) -> Vec<&WorkflowNodeExecution> {
    let mut found: Vec<_> = self
      .nodes
      .values()
      .filter(|n| n.node_id == node_id)
      .collect();
    found.sort_by_key(|n| n.sequence);
    found
  }

  /// Mutable variant of [`Self::executions_of`].
  pub fn executions_of_mut(&mut self, node_id: &str) -> Vec<&mut WorkflowNodeExecution> {
    let mut found: Vec<_> = self
      .nodes
      .values_mut()
      .filter(|n| n.node_id == node_id)
      .collect();
    found.sort_by_key(|n| n.sequence);
    found
  }

  pub fn is_complete(&self) -> bool {
    self.status == ExecutionStatus::Success
  }

  pub fn complete(&mut self) {
    self.status = ExecutionStatus::Success;
    self.completed_at = Some(Utc::now());
  }

  /// Deep copy with fresh identifiers for the execution and every node
  /// execution. Returns the copy and the old→new node-execution id map.
  ///
  /// The copy starts over as in progress; contexts, states and arrival
  /// order are carried across.
  pub fn renew(&self) -> (Self, HashMap<String, String>) {
    let remap: HashMap<String, String> = self
      .nodes
      .keys()
      .map(|id| (id.clone(), uuid::Uuid::new_v4().to_string()))
      .collect();
    let rename = |id: &String| remap.get(id).cloned().unwrap_or_else(|| id.clone());

    let nodes = self
      .nodes
      .values()
      .map(|node| {
        let renewed = WorkflowNodeExecution {
          id: rename(&node.id),
          node_id: node.node_id.clone(),
          state: node.state,
          context: node.context.renew(),
          children: node.children.iter().map(rename).collect(),
          sequence: node.sequence,
        };
        (renewed.id.clone(), renewed)
      })
      .collect();

    let renewed = Self {
      execution_id: uuid::Uuid::new_v4().to_string(),
      workflow_id: self.workflow_id.clone(),
      status: ExecutionStatus::InProgress,
      root_ids: self.root_ids.iter().map(rename).collect(),
      nodes,
      started_at: Utc::now(),
      completed_at: None,
      next_sequence: self.next_sequence,
    };
    (renewed, remap)
  }

  /// Nested view of the execution. A node execution reached a second time
  /// becomes [`ExecutionTree::Link`].
  pub fn inflate(&self) -> Vec<ExecutionTree> {
    let mut placed = HashSet::new();
    self
      .root_ids
      .iter()
      .filter_map(|id| self.inflate_node(id, &mut placed))
      .collect()
  }

  fn inflate_node(&self, id: &str, placed: &mut HashSet<String>) -> Option<ExecutionTree> {
    if !placed.insert(id.to_string()) {
      return Some(ExecutionTree::Link { id: id.to_string() });
    }
    let execution = self.nodes.get(id)?;
    let children = execution
      .children
      .iter()
      .filter_map(|child| self.inflate_node(child, placed))
      .collect();
    Some(ExecutionTree::Node {
      execution: execution.clone(),
      children,
    })
  }

  /// Replace the node executions with the content of a nested view.
  ///
  /// Ids already mapped are not descended into again.
  pub fn flatten(&mut self, roots: &[ExecutionTree]) -> Result<(), ExecutionError> {
    let mut nodes = HashMap::new();
    for root in roots {
      flatten_into(root, &mut nodes);
    }

    let root_ids: Vec<String> = roots.iter().map(|r| r.id().to_string()).collect();
    if let Some(missing) = root_ids.iter().find(|id| !nodes.contains_key(*id)) {
      return Err(ExecutionError::NodeExecutionNotFound(missing.clone()));
    }
    for node in nodes.values() {
      if let Some(child) = node.children.iter().find(|c| !nodes.contains_key(*c)) {
        return Err(ExecutionError::DanglingChild {
          from: node.id.clone(),
          to: child.clone(),
        });
      }
    }

    self.next_sequence = nodes
      .values()
      .map(|n| n.sequence + 1)
      .max()
      .unwrap_or(0)
      .max(self.next_sequence);
    self.nodes = nodes;
    self.root_ids = root_ids;
    Ok(())
  }
}

fn flatten_into(tree: &ExecutionTree, nodes: &mut HashMap<String, WorkflowNodeExecution>) {
  let ExecutionTree::Node {
    execution,
    children,
  } = tree
  else {
    return;
  };
  if nodes.contains_key(&execution.id) {
    return;
  }

  let mut flat = execution.clone();
  flat.children = children.iter().map(|c| c.id().to_string()).collect();
  nodes.insert(flat.id.clone(), flat);

  for child in children {
    flatten_into(child, nodes);
  }
}
