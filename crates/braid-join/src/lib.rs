//! Braid Join
//!
//! Synchronization of concurrently running branches at WAIT nodes.
//!
//! Every branch arrives at a join with its own [`braid_context::Context`].
//! The engine unions the histories of all arrivals of the same iteration,
//! computes which awaited keys are reachable in the union, and fires once
//! the configured [`WaitMode`] is met:
//!
//! - [`found_keys`] answers "which keys are reachable without passing back
//!   through this join"
//! - [`JoinEngine::activate`] lets a branch in when it carries at least one
//!   awaited key
//! - [`JoinEngine::run`] evaluates the group under the lock of an
//!   [`ExecutionLookup`] and returns [`JoinOutcome::Fired`] exactly once per
//!   group and iteration

mod config;
mod engine;
mod error;
mod merge;
mod reachability;

pub use config::{JoinConfig, MergeStrategy, WaitMode};
pub use engine::{ExecutionLookup, JoinEngine, JoinOutcome, JoinRequest};
pub use error::{JoinError, LookupError};
pub use merge::merge_contexts;
pub use reachability::found_keys;
