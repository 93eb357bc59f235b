//! Braid Execution
//!
//! The runtime mirror of a workflow definition. A [`WorkflowExecution`]
//! holds one [`WorkflowNodeExecution`] per activation of a definition node,
//! stored like the definition itself: a flat id→node-execution map plus the
//! root ids. [`ExecutionTree`] is the nested view, derived on demand.
//!
//! Node executions carry their own [`braid_context::Context`] and an arrival
//! `sequence` that orders them within the execution.

mod error;
mod execution;
mod node;

pub use error::ExecutionError;
pub use execution::{ExecutionStatus, WorkflowExecution};
pub use node::{ExecutionTree, WorkflowNodeExecution};
