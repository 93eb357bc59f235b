//! Braid Engine
//!
//! This crate drives workflow executions: it moves node executions through
//! their components, evaluates joins and spawns successors. It also provides
//! a `WorkflowRunner` for channel-based triggering.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      WorkflowRunner                         │
//! │  - owns mpsc channel (sender + receiver)                    │
//! │  - each payload starts an execution                         │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Orchestrator                           │
//! │  - deploy(workflow), start(workflow_id, data)               │
//! │  - activation → invocation → navigation per node execution  │
//! │  - WAIT nodes go through the JoinEngine                     │
//! │  - snapshots persisted to the Store, events to a notifier   │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Dispatcher                            │
//! │  - local components on the tokio pool                       │
//! │  - remote components over the EventBus                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use braid_engine::{Orchestrator, OrchestratorConfig, register_builtins};
//!
//! let mut registry = ComponentRegistry::new();
//! register_builtins(&mut registry);
//!
//! let orchestrator = Orchestrator::new(
//!   OrchestratorConfig::default(),
//!   Arc::new(MemoryStore::new()),
//!   Arc::new(registry),
//!   Arc::new(TracingLogSink),
//! );
//! orchestrator.deploy(workflow).await?;
//! let execution_id = orchestrator.start("orders", data).await?;
//! ```

mod builtin;
mod config;
mod error;
mod events;
mod navigator;
mod orchestrator;
mod runner;
mod table;

pub use builtin::register_builtins;
pub use config::OrchestratorConfig;
pub use error::{EngineError, NavigationError};
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use navigator::{Navigation, navigate};
pub use orchestrator::Orchestrator;
pub use runner::WorkflowRunner;
pub use table::ExecutionTable;
