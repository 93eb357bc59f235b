//! Execution history records.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// State of a visited node, as recorded in history and on node executions.
///
/// Ordered by progress so that merging two records keeps the furthest state.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
  #[default]
  Idle,
  Working,
  Waiting,
  Done,
}

/// Records that a node key was reached, and from which node keys.
///
/// Parents are node keys rather than execution ids, so records coming from
/// different branches can be compared and merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowGraphNode {
  pub key: String,
  pub state: NodeState,
  #[serde(default)]
  pub parents: BTreeSet<String>,
  /// How many times the key was entered along this history.
  #[serde(default = "first_visit")]
  pub visits: u32,
  /// Tick of the owning context at which the key was last entered.
  #[serde(default)]
  pub entered: u64,
  /// Tick at which a join closed this key, if it ever did.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub closed: Option<u64>,
}

fn first_visit() -> u32 {
  1
}

impl WorkflowGraphNode {
  pub fn new(key: impl Into<String>, state: NodeState) -> Self {
    Self {
      key: key.into(),
      state,
      parents: BTreeSet::new(),
      visits: first_visit(),
      entered: 0,
      closed: None,
    }
  }

  pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
    self.parents.insert(parent.into());
    self
  }

  /// A record with no parents starts the history.
  pub fn is_root(&self) -> bool {
    self.parents.is_empty()
  }

  /// Fold another record of the same key into this one.
  ///
  /// Parent sets are unioned; the furthest state, the highest visit count
  /// and the latest ticks win.
  pub fn absorb(&mut self, other: &WorkflowGraphNode) {
    debug_assert_eq!(self.key, other.key);
    self.parents.extend(other.parents.iter().cloned());
    self.state = self.state.max(other.state);
    self.visits = self.visits.max(other.visits);
    self.entered = self.entered.max(other.entered);
    self.closed = self.closed.max(other.closed);
  }

  /// Whether the key was entered after the tick `horizon`.
  pub fn entered_after(&self, horizon: u64) -> bool {
    self.entered > horizon
  }
}
