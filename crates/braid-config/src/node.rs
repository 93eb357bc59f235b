use serde::{Deserialize, Serialize};

/// The role a node plays in a process graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
  /// Entry point. Each completion starts a new logical run.
  Start,
  /// Routes to the subset of children selected by a recorded decision.
  Decision,
  /// An ordinary step implemented by a component.
  Task,
  /// A join: waits for several incoming branches before continuing.
  Wait,
  /// Marks the run as successfully finished.
  End,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
  /// Human key, unique within the definition. Used for decision routing
  /// and as the node's name in execution history.
  pub key: String,
  #[serde(rename = "type")]
  pub node_type: NodeType,
  /// Component reference, e.g. "mailer" or "my-org/rules".
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub component: Option<String>,
  /// Component-defined configuration (address, resource, await list, ...).
  #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
  pub config: serde_json::Value,
  /// Keys of the nodes that follow this one, in order.
  #[serde(default)]
  pub next: Vec<String>,
}

impl NodeDef {
  pub fn new(key: impl Into<String>, node_type: NodeType) -> Self {
    Self {
      key: key.into(),
      node_type,
      component: None,
      config: serde_json::Value::Null,
      next: Vec::new(),
    }
  }

  pub fn with_component(mut self, component: impl Into<String>) -> Self {
    self.component = Some(component.into());
    self
  }

  pub fn with_config(mut self, config: serde_json::Value) -> Self {
    self.config = config;
    self
  }

  pub fn with_next<I, S>(mut self, next: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.next = next.into_iter().map(Into::into).collect();
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_node_type_snake_case() {
    let node: NodeDef = serde_json::from_value(json!({
      "key": "gate",
      "type": "wait",
      "config": { "await": ["a", "b"] },
      "next": ["end"]
    }))
    .unwrap();

    assert_eq!(node.node_type, NodeType::Wait);
    assert_eq!(node.config["await"][1], "b");
    assert_eq!(node.next, vec!["end".to_string()]);
    assert!(node.component.is_none());
  }

  #[test]
  fn test_null_config_is_skipped() {
    let node = NodeDef::new("end", NodeType::End);
    let value = serde_json::to_value(&node).unwrap();

    assert!(value.get("config").is_none());
    assert!(value.get("component").is_none());
    assert_eq!(value["type"], "end");
  }
}
