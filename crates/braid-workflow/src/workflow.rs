use std::collections::{HashMap, HashSet};

use braid_config::{NodeType, WorkflowDef};
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::graph::Graph;
use crate::node::{TreeNode, WorkflowNode};

/// A workflow definition: root ids plus a flat id→node map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
  pub workflow_id: String,
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  pub root_ids: Vec<String>,
  pub nodes: HashMap<String, WorkflowNode>,
}

impl Workflow {
  /// Build a workflow from a tree of nodes.
  pub fn from_tree(
    workflow_id: impl Into<String>,
    name: impl Into<String>,
    roots: &[TreeNode],
  ) -> Result<Self, WorkflowError> {
    let (nodes, root_ids) = Self::flatten(roots)?;
    Ok(Self {
      workflow_id: workflow_id.into(),
      name: name.into(),
      description: None,
      root_ids,
      nodes,
    })
  }

  /// Build a workflow from a declarative definition.
  ///
  /// Every node gets a fresh id; `next` keys become child ids. Roots are the
  /// START nodes, or the nodes without incoming edges when there is no START.
  /// A WAIT node needs two or more incoming edges or an explicit `await`.
  pub fn from_def(def: WorkflowDef) -> Result<Self, WorkflowError> {
    let mut ids_by_key: HashMap<String, String> = HashMap::new();
    let mut order = Vec::with_capacity(def.nodes.len());
    let mut nodes = HashMap::with_capacity(def.nodes.len());

    for node_def in &def.nodes {
      let node = WorkflowNode::new(Some(node_def.key.clone()), node_def.node_type);
      if ids_by_key
        .insert(node_def.key.clone(), node.id.clone())
        .is_some()
      {
        return Err(WorkflowError::DuplicateKey(node_def.key.clone()));
      }
      order.push(node.id.clone());
      nodes.insert(node.id.clone(), node);
    }

    for node_def in def.nodes {
      let children = node_def
        .next
        .iter()
        .map(|next| {
          ids_by_key
            .get(next)
            .cloned()
            .ok_or_else(|| WorkflowError::InvalidEdge {
              from: node_def.key.clone(),
              to: next.clone(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

      let id = &ids_by_key[&node_def.key];
      if let Some(node) = nodes.get_mut(id) {
        node.component = node_def.component;
        node.config = node_def.config;
        node.children = children;
      }
    }

    let graph = Graph::new(&nodes);
    for id in &order {
      let node = &nodes[id];
      if node.is_type(NodeType::Wait)
        && !graph.is_join_point(id)
        && node.config.get("await").is_none()
      {
        return Err(WorkflowError::UnboundJoin(node.route_key().to_string()));
      }
    }

    let mut root_ids: Vec<String> = order
      .iter()
      .filter(|id| nodes[*id].is_type(NodeType::Start))
      .cloned()
      .collect();

    if root_ids.is_empty() {
      let entry_points: HashSet<&String> = graph.entry_points().iter().collect();
      root_ids = order
        .iter()
        .filter(|id| entry_points.contains(id))
        .cloned()
        .collect();
    }

    if root_ids.is_empty() {
      return Err(WorkflowError::NoEntryPoints);
    }

    Ok(Self {
      workflow_id: def
        .workflow_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
      name: def.name,
      description: def.description,
      root_ids,
      nodes,
    })
  }

  /// Walk `roots` depth-first into an id→node map and a root-id list.
  ///
  /// An id already in the map is never descended into again, so trees that
  /// repeat nodes (shared children, cycles) flatten to one entry per id.
  /// Each node's child list is rewritten from its tree children.
  pub fn flatten(
    roots: &[TreeNode],
  ) -> Result<(HashMap<String, WorkflowNode>, Vec<String>), WorkflowError> {
    let mut nodes = HashMap::new();
    let mut root_ids = Vec::with_capacity(roots.len());

    for root in roots {
      root_ids.push(root.id().to_string());
      flatten_into(root, &mut nodes);
    }

    for id in &root_ids {
      if !nodes.contains_key(id) {
        return Err(WorkflowError::NodeNotFound(id.clone()));
      }
    }
    for node in nodes.values() {
      for child in &node.children {
        if !nodes.contains_key(child) {
          return Err(WorkflowError::InvalidEdge {
            from: node.id.clone(),
            to: child.clone(),
          });
        }
      }
    }

    Ok((nodes, root_ids))
  }

  /// Rebuild the nested view from the flat map.
  ///
  /// A node is expanded the first time the walk reaches it; later
  /// references to it become [`TreeNode::Link`].
  pub fn inflate(&self) -> Vec<TreeNode> {
    let mut placed = HashSet::new();
    self
      .root_ids
      .iter()
      .filter_map(|id| self.inflate_node(id, &mut placed))
      .collect()
  }

  fn inflate_node(&self, id: &str, placed: &mut HashSet<String>) -> Option<TreeNode> {
    if !placed.insert(id.to_string()) {
      return Some(TreeNode::Link { id: id.to_string() });
    }
    let node = self.nodes.get(id)?;
    let children = node
      .children
      .iter()
      .filter_map(|child| self.inflate_node(child, placed))
      .collect();
    Some(TreeNode::Node {
      node: node.clone(),
      children,
    })
  }

  /// Take over the content of `other` while keeping node identities stable.
  ///
  /// Scalar fields are copied. Each node of `other` is matched by key
  /// against this workflow: a content-equal match keeps the existing id,
  /// anything else gets a fresh id. `None` leaves the workflow unchanged.
  pub fn merge_from(&mut self, other: Option<&Workflow>) {
    let Some(other) = other else {
      return;
    };

    self.name = other.name.clone();
    self.description = other.description.clone();

    let mut remap: HashMap<String, String> = HashMap::with_capacity(other.nodes.len());
    let mut claimed: HashSet<String> = HashSet::new();

    // Sorted so that duplicate keys resolve the same way on every run.
    let mut incoming_ids: Vec<&String> = other.nodes.keys().collect();
    incoming_ids.sort();

    for incoming_id in incoming_ids {
      let incoming = &other.nodes[incoming_id];
      let preserved = incoming
        .key
        .as_deref()
        .and_then(|key| self.node_by_key(key))
        .filter(|existing| !claimed.contains(&existing.id))
        .filter(|existing| self.same_content(existing, other, incoming))
        .map(|existing| existing.id.clone());

      let id = preserved.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
      claimed.insert(id.clone());
      remap.insert(incoming_id.clone(), id);
    }

    let rename = |id: &String| remap.get(id).cloned().unwrap_or_else(|| id.clone());

    self.nodes = other
      .nodes
      .values()
      .map(|incoming| {
        let mut node = incoming.clone();
        node.id = rename(&incoming.id);
        node.children = incoming.children.iter().map(rename).collect();
        (node.id.clone(), node)
      })
      .collect();
    self.root_ids = other.root_ids.iter().map(rename).collect();
  }

  fn same_content(&self, existing: &WorkflowNode, other: &Workflow, incoming: &WorkflowNode) -> bool {
    existing.node_type == incoming.node_type
      && existing.component == incoming.component
      && existing.config == incoming.config
      && self.child_keys(existing) == other.child_keys(incoming)
  }

  fn child_keys(&self, node: &WorkflowNode) -> Vec<Option<String>> {
    node
      .children
      .iter()
      .map(|id| self.nodes.get(id).and_then(|child| child.key.clone()))
      .collect()
  }

  /// Build the adjacency graph for traversal.
  pub fn graph(&self) -> Graph {
    Graph::new(&self.nodes)
  }

  /// Get a node by ID.
  pub fn node(&self, node_id: &str) -> Option<&WorkflowNode> {
    self.nodes.get(node_id)
  }

  /// Get a node by key.
  pub fn node_by_key(&self, key: &str) -> Option<&WorkflowNode> {
    self
      .nodes
      .values()
      .find(|node| node.key.as_deref() == Some(key))
  }

  /// Nodes following `node_id`, in definition order.
  pub fn children(&self, node_id: &str) -> Vec<&WorkflowNode> {
    self
      .nodes
      .get(node_id)
      .map(|node| {
        node
          .children
          .iter()
          .filter_map(|child| self.nodes.get(child))
          .collect()
      })
      .unwrap_or_default()
  }

  /// Nodes that list `node_id` as a child.
  pub fn parents_of(&self, node_id: &str) -> Vec<&WorkflowNode> {
    self
      .graph()
      .upstream(node_id)
      .iter()
      .filter_map(|id| self.nodes.get(id))
      .collect()
  }

  pub fn roots(&self) -> impl Iterator<Item = &WorkflowNode> {
    self.root_ids.iter().filter_map(|id| self.nodes.get(id))
  }
}

fn flatten_into(tree: &TreeNode, nodes: &mut HashMap<String, WorkflowNode>) {
  let TreeNode::Node { node, children } = tree else {
    return;
  };
  if nodes.contains_key(&node.id) {
    return;
  }

  let mut flat = node.clone();
  flat.children = children.iter().map(|child| child.id().to_string()).collect();
  nodes.insert(flat.id.clone(), flat);

  for child in children {
    flatten_into(child, nodes);
  }
}
