use std::collections::{HashMap, HashSet};

use crate::node::WorkflowNode;

/// Incoming-edge view of a definition, for roots and join analysis.
#[derive(Debug, Clone)]
pub struct Graph {
  /// Reverse adjacency: node_id -> list of upstream node_ids.
  reverse_adjacency: HashMap<String, Vec<String>>,
  /// Nodes with no incoming edges.
  entry_points: Vec<String>,
  /// Nodes with multiple incoming edges (join points).
  join_points: HashSet<String>,
}

impl Graph {
  /// Build a graph from the nodes' child lists.
  pub fn new(nodes: &HashMap<String, WorkflowNode>) -> Self {
    let mut reverse_adjacency: HashMap<String, Vec<String>> = nodes
      .keys()
      .map(|id| (id.clone(), Vec::new()))
      .collect();

    for (from, node) in nodes {
      for to in &node.children {
        reverse_adjacency
          .entry(to.clone())
          .or_default()
          .push(from.clone());
      }
    }

    // Sorted so callers see a stable order regardless of map iteration.
    let mut entry_points: Vec<String> = nodes
      .keys()
      .filter(|id| reverse_adjacency.get(*id).is_none_or(|v| v.is_empty()))
      .cloned()
      .collect();
    entry_points.sort();

    for upstream in reverse_adjacency.values_mut() {
      upstream.sort();
    }

    let join_points: HashSet<String> = reverse_adjacency
      .iter()
      .filter(|(_, incoming)| incoming.len() > 1)
      .map(|(id, _)| id.clone())
      .collect();

    Self {
      reverse_adjacency,
      entry_points,
      join_points,
    }
  }

  /// Get entry points (nodes with no incoming edges).
  pub fn entry_points(&self) -> &[String] {
    &self.entry_points
  }

  /// Get upstream nodes for a given node.
  pub fn upstream(&self, node_id: &str) -> &[String] {
    self
      .reverse_adjacency
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Check if a node is a join point (has multiple incoming edges).
  pub fn is_join_point(&self, node_id: &str) -> bool {
    self.join_points.contains(node_id)
  }

  /// Get all join points.
  pub fn join_points(&self) -> &HashSet<String> {
    &self.join_points
  }
}
