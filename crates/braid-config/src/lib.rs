//! Braid Config
//!
//! This crate contains the serializable process definition types for braid.
//! These types represent workflow definitions as they are authored, before
//! they are turned into a `Workflow` graph by `braid-workflow`.
//!
//! A definition names its nodes by key and links them through ordered
//! `next` lists:
//!
//! ```json
//! {
//!   "name": "approve-order",
//!   "nodes": [
//!     { "key": "start", "type": "start", "next": ["check"] },
//!     { "key": "check", "type": "decision", "component": "rules", "next": ["ship", "reject"] },
//!     { "key": "ship", "type": "task", "component": "shipper", "next": ["end"] },
//!     { "key": "reject", "type": "task", "component": "mailer", "next": ["end"] },
//!     { "key": "end", "type": "end" }
//!   ]
//! }
//! ```
//!
//! Definitions can be loaded from JSON strings or files.

mod error;
mod node;
mod workflow;

pub use error::ConfigError;
pub use node::{NodeDef, NodeType};
pub use workflow::WorkflowDef;
