//! Braid Workflow
//!
//! This crate provides the definition graph for braid. A [`Workflow`] owns
//! its nodes in a flat id→node map plus a list of root ids; the nested
//! [`TreeNode`] view is derived from it on demand.
//!
//! Process graphs may loop, so both directions of the conversion are
//! cycle-tolerant:
//! - [`Workflow::flatten`] never descends into an id it has already mapped
//! - [`Workflow::inflate`] emits a [`TreeNode::Link`] for an id it has
//!   already placed
//!
//! Definitions authored as a [`braid_config::WorkflowDef`] are turned into a
//! graph with [`Workflow::from_def`].

mod error;
mod graph;
mod node;
mod workflow;

pub use braid_config::NodeType;
pub use error::WorkflowError;
pub use graph::Graph;
pub use node::{TreeNode, WorkflowNode};
pub use workflow::Workflow;
