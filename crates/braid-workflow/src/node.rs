use braid_config::NodeType;
use serde::{Deserialize, Serialize};

/// A node of the definition graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
  pub id: String,
  /// Human key used for decision routing and execution history.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub key: Option<String>,
  pub node_type: NodeType,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub component: Option<String>,
  #[serde(default)]
  pub config: serde_json::Value,
  /// Ids of the following nodes, in order.
  #[serde(default)]
  pub children: Vec<String>,
}

impl WorkflowNode {
  /// Create a node with a fresh identifier.
  pub fn new(key: Option<String>, node_type: NodeType) -> Self {
    Self {
      id: uuid::Uuid::new_v4().to_string(),
      key,
      node_type,
      component: None,
      config: serde_json::Value::Null,
      children: Vec::new(),
    }
  }

  /// Name of this node in decisions and history: its key, or its id when
  /// it has none.
  pub fn route_key(&self) -> &str {
    self.key.as_deref().unwrap_or(&self.id)
  }

  pub fn is_type(&self, node_type: NodeType) -> bool {
    self.node_type == node_type
  }
}

/// Nested view of a definition graph.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeNode {
  /// First placement of a node on the walk, with its children.
  Node {
    node: WorkflowNode,
    children: Vec<TreeNode>,
  },
  /// A node already placed elsewhere in the tree (shared child or cycle).
  Link { id: String },
}

impl TreeNode {
  pub fn leaf(node: WorkflowNode) -> Self {
    Self::Node {
      node,
      children: Vec::new(),
    }
  }

  pub fn id(&self) -> &str {
    match self {
      Self::Node { node, .. } => &node.id,
      Self::Link { id } => id,
    }
  }
}
