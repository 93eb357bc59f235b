use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
  #[error("node not found: {0}")]
  NodeNotFound(String),

  #[error("edge references unknown node: from={from}, to={to}")]
  InvalidEdge { from: String, to: String },

  #[error("duplicate node key: {0}")]
  DuplicateKey(String),

  #[error("wait node {0} has fewer than two incoming edges and no await list")]
  UnboundJoin(String),

  #[error("no entry points found (all nodes have incoming edges)")]
  NoEntryPoints,
}
