use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::node::NodeDef;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDef {
  /// Stable identifier. Generated when the definition is built if absent.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub workflow_id: Option<String>,
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  pub nodes: Vec<NodeDef>,
}

impl WorkflowDef {
  /// Parse a definition from a JSON string.
  pub fn from_json(content: &str) -> Result<Self, ConfigError> {
    Ok(serde_json::from_str(content)?)
  }

  /// Read and parse a definition file.
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.display().to_string(),
      source,
    })?;
    Self::from_json(&content)
  }

  /// Get a node definition by key.
  pub fn node(&self, key: &str) -> Option<&NodeDef> {
    self.nodes.iter().find(|n| n.key == key)
  }
}
