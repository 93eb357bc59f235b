//! Braid Dispatch
//!
//! This crate connects workflow nodes to the components that implement
//! them. A [`Component`] is asked twice per node execution: once whether it
//! can activate, once to run. It answers through an [`Emitter`], at most
//! once per call.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Dispatcher                           │
//! │  - no component reference   → pass-through success           │
//! │  - registered in registry   → spawned on the tokio pool      │
//! │  - anything else            → request published on EventBus  │
//! └──────────────────────────────────────────────────────────────┘
//!                 │                                 │
//!                 ▼                                 ▼
//! ┌──────────────────────────────┐  ┌────────────────────────────┐
//! │      ComponentRegistry       │  │       RemoteRuntime        │
//! │  - factories by component id │  │  - answers requests from   │
//! │  - instances per (id, actor) │  │    its own registry        │
//! └──────────────────────────────┘  └────────────────────────────┘
//! ```
//!
//! Requests and responses carry an [`EventHeader`]: a response shares the
//! correlation id of its request and names the request's event id as its
//! causation id.

mod bus;
mod component;
mod dispatcher;
mod emitter;
mod error;
mod events;
mod logger;
mod registry;
mod remote;

pub use bus::EventBus;
pub use component::{Component, ComponentFactory};
pub use dispatcher::{DispatchRequest, Dispatcher, Phase};
pub use emitter::{ChannelEmitter, Emitter, Outcome};
pub use error::DispatchError;
pub use events::{EventHeader, NodeScope, RemoteEvent};
pub use logger::{LogLevel, LogRecord, LogSink, MemoryLogSink, NodeLogger, TracingLogSink};
pub use registry::ComponentRegistry;
pub use remote::RemoteRuntime;
