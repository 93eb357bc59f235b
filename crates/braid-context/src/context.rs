//! Branch context.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::decision::WorkflowDecision;
use crate::history::{NodeState, WorkflowGraphNode};

/// Snapshot of one branch: data, decisions and execution history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
  #[serde(default)]
  data: Map<String, Value>,
  #[serde(default)]
  decisions: Vec<WorkflowDecision>,
  #[serde(default)]
  graph: Vec<WorkflowGraphNode>,
  /// Logical clock stamping history records; merges keep the highest.
  #[serde(default)]
  clock: u64,
}

impl Context {
  pub fn new() -> Self {
    Self::default()
  }

  /// Create a context seeded with data and no history.
  pub fn with_data(data: Map<String, Value>) -> Self {
    Self {
      data,
      ..Self::default()
    }
  }

  /// Copy this context for hand-off to another node or branch.
  pub fn renew(&self) -> Self {
    self.clone()
  }

  /// Start a new logical run from this context.
  ///
  /// Data is carried over; decisions and history are dropped and `start_key`
  /// becomes the only (completed) history record.
  pub fn restart(&self, start_key: &str) -> Self {
    let mut restarted = Self::with_data(self.data.clone());
    restarted.record_visit(start_key, NodeState::Done, None);
    restarted
  }

  // -- data --

  pub fn data(&self) -> &Map<String, Value> {
    &self.data
  }

  pub fn data_mut(&mut self) -> &mut Map<String, Value> {
    &mut self.data
  }

  pub fn get(&self, key: &str) -> Option<&Value> {
    self.data.get(key)
  }

  pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
    self.data.insert(key.into(), value)
  }

  /// Copy every data entry of `other` into this context.
  ///
  /// With `overwrite` set, values from `other` replace existing ones;
  /// otherwise existing values are kept.
  pub fn merge_data(&mut self, other: &Context, overwrite: bool) {
    for (key, value) in &other.data {
      if overwrite || !self.data.contains_key(key) {
        self.data.insert(key.clone(), value.clone());
      }
    }
  }

  // -- decisions --

  pub fn decisions(&self) -> &[WorkflowDecision] {
    &self.decisions
  }

  pub fn decision(&self, key: &str) -> Option<&WorkflowDecision> {
    self.decisions.iter().find(|d| d.key == key)
  }

  /// Record a fresh decision for `key` with every option unselected,
  /// replacing any decision recorded earlier for the same key.
  pub fn init_decision<I, S>(&mut self, key: &str, options: I)
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let decision = WorkflowDecision::new(key, options);
    match self.decisions.iter_mut().find(|d| d.key == key) {
      Some(existing) => *existing = decision,
      None => self.decisions.push(decision),
    }
  }

  /// Select or deselect one option of the decision recorded for `key`.
  pub fn decide(&mut self, key: &str, option: impl Into<String>, selected: bool) {
    match self.decisions.iter_mut().find(|d| d.key == key) {
      Some(decision) => decision.set(option, selected),
      None => {
        let mut decision = WorkflowDecision::new(key, std::iter::empty::<String>());
        decision.set(option, selected);
        self.decisions.push(decision);
      }
    }
  }

  // -- history --

  pub fn graph(&self) -> &[WorkflowGraphNode] {
    &self.graph
  }

  pub fn graph_node(&self, key: &str) -> Option<&WorkflowGraphNode> {
    self.graph.iter().find(|n| n.key == key)
  }

  /// How many times `key` was entered along this history (0 if never).
  pub fn visits(&self, key: &str) -> u32 {
    self.graph_node(key).map(|n| n.visits).unwrap_or(0)
  }

  /// Record that `key` was entered from `parent`.
  ///
  /// A key already in the history is updated in place: the parent is added
  /// to its parent set and its visit count goes up. The history never holds
  /// two records for one key.
  pub fn record_visit(&mut self, key: &str, state: NodeState, parent: Option<&str>) {
    let tick = self.tick();
    match self.graph.iter_mut().find(|n| n.key == key) {
      Some(node) => {
        if let Some(parent) = parent {
          node.parents.insert(parent.to_string());
        }
        node.state = state;
        node.visits += 1;
        node.entered = tick;
      }
      None => {
        let mut node = WorkflowGraphNode::new(key, state);
        if let Some(parent) = parent {
          node.parents.insert(parent.to_string());
        }
        node.entered = tick;
        self.graph.push(node);
      }
    }
  }

  /// Update the state of `key`, adding a root record if it is missing.
  pub fn set_state(&mut self, key: &str, state: NodeState) {
    match self.graph.iter().position(|n| n.key == key) {
      Some(index) => self.graph[index].state = state,
      None => {
        let mut node = WorkflowGraphNode::new(key, state);
        node.entered = self.tick();
        self.graph.push(node);
      }
    }
  }

  /// Mark `key` DONE and stamp it closed at the current tick.
  ///
  /// Records entered up to this point lie before the close; anything
  /// entered afterwards is newer than it.
  pub fn close(&mut self, key: &str) {
    self.set_state(key, NodeState::Done);
    let clock = self.clock;
    if let Some(node) = self.graph.iter_mut().find(|n| n.key == key) {
      node.closed = Some(clock);
    }
  }

  /// Current tick of the history clock.
  pub fn clock(&self) -> u64 {
    self.clock
  }

  fn tick(&mut self) -> u64 {
    self.clock += 1;
    self.clock
  }

  /// Union the history and decisions of `other` into this context.
  ///
  /// Records sharing a key collapse into one with merged parents; decisions
  /// sharing a key collapse into one. Data is left untouched.
  pub fn merge_history(&mut self, other: &Context) {
    self.clock = self.clock.max(other.clock);
    for node in &other.graph {
      match self.graph.iter_mut().find(|n| n.key == node.key) {
        Some(existing) => existing.absorb(node),
        None => self.graph.push(node.clone()),
      }
    }

    for decision in &other.decisions {
      match self.decisions.iter_mut().find(|d| d.key == decision.key) {
        Some(existing) => existing.absorb(decision),
        None => self.decisions.push(decision.clone()),
      }
    }
  }
}

impl From<Map<String, Value>> for Context {
  fn from(data: Map<String, Value>) -> Self {
    Self::with_data(data)
  }
}
