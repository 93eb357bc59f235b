use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The choice recorded for a DECISION node: which of its children run.
///
/// Options are keyed by the children's route keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDecision {
  pub key: String,
  #[serde(default)]
  pub options: BTreeMap<String, bool>,
}

impl WorkflowDecision {
  /// Create a decision with every option unselected.
  pub fn new<I, S>(key: impl Into<String>, options: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      key: key.into(),
      options: options.into_iter().map(|o| (o.into(), false)).collect(),
    }
  }

  pub fn set(&mut self, option: impl Into<String>, selected: bool) {
    self.options.insert(option.into(), selected);
  }

  pub fn is_selected(&self, option: &str) -> bool {
    self.options.get(option).copied().unwrap_or(false)
  }

  /// Options currently set to true, in key order.
  pub fn selected(&self) -> impl Iterator<Item = &str> {
    self
      .options
      .iter()
      .filter(|(_, selected)| **selected)
      .map(|(option, _)| option.as_str())
  }

  /// Collapse a duplicate decision for the same node into this one.
  /// An option selected on either side stays selected.
  pub fn absorb(&mut self, other: &WorkflowDecision) {
    debug_assert_eq!(self.key, other.key);
    for (option, selected) in &other.options {
      let entry = self.options.entry(option.clone()).or_insert(false);
      *entry |= *selected;
    }
  }
}
