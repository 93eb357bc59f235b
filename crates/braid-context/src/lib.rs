//! Braid Context
//!
//! Per-branch state carried through a workflow run. A [`Context`] holds:
//! - free-form data (`serde_json` values keyed by name)
//! - the decisions recorded so far ([`WorkflowDecision`])
//! - the execution history ([`WorkflowGraphNode`]), one record per visited
//!   node key with the keys of the nodes it was reached from
//!
//! Contexts are never shared between branches. Every hand-off copies the
//! context by value with [`Context::renew`], so a branch can only ever grow
//! its own history.

mod context;
mod decision;
mod history;

pub use context::Context;
pub use decision::WorkflowDecision;
pub use history::{NodeState, WorkflowGraphNode};
