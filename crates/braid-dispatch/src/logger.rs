//! Structured per-node logging.
//!
//! Components log through a [`NodeLogger`], which stamps every record with
//! the node execution it belongs to, mirrors it to `tracing` and hands it to
//! a [`LogSink`].

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::NodeScope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
  Debug,
  Info,
  Warn,
  Error,
}

impl fmt::Display for LogLevel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let level = match self {
      Self::Debug => "debug",
      Self::Info => "info",
      Self::Warn => "warn",
      Self::Error => "error",
    };
    f.write_str(level)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
  pub level: LogLevel,
  pub workflow_id: String,
  pub execution_id: String,
  pub node_id: String,
  pub node_execution_id: String,
  pub message: String,
  pub timestamp: DateTime<Utc>,
}

/// Destination for node log records.
pub trait LogSink: Send + Sync {
  fn write(&self, record: LogRecord);
}

/// Keeps records in memory, in write order.
#[derive(Debug, Clone, Default)]
pub struct MemoryLogSink {
  records: Arc<Mutex<Vec<LogRecord>>>,
}

impl MemoryLogSink {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn records(&self) -> Vec<LogRecord> {
    self
      .records
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  /// Records written for one node execution.
  pub fn records_for(&self, node_execution_id: &str) -> Vec<LogRecord> {
    self
      .records()
      .into_iter()
      .filter(|r| r.node_execution_id == node_execution_id)
      .collect()
  }
}

impl LogSink for MemoryLogSink {
  fn write(&self, record: LogRecord) {
    self
      .records
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .push(record);
  }
}

/// Discards records; the `tracing` mirror is their only trace.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
  fn write(&self, _record: LogRecord) {}
}

#[derive(Clone)]
pub struct NodeLogger {
  scope: NodeScope,
  sink: Arc<dyn LogSink>,
}

impl NodeLogger {
  pub fn new(scope: NodeScope, sink: Arc<dyn LogSink>) -> Self {
    Self { scope, sink }
  }

  pub fn scope(&self) -> &NodeScope {
    &self.scope
  }

  pub fn debug(&self, message: impl Into<String>) {
    self.log(LogLevel::Debug, message);
  }

  pub fn info(&self, message: impl Into<String>) {
    self.log(LogLevel::Info, message);
  }

  pub fn warn(&self, message: impl Into<String>) {
    self.log(LogLevel::Warn, message);
  }

  pub fn error(&self, message: impl Into<String>) {
    self.log(LogLevel::Error, message);
  }

  pub fn log(&self, level: LogLevel, message: impl Into<String>) {
    let message = message.into();
    let scope = &self.scope;

    macro_rules! mirror {
      ($macro:ident) => {
        tracing::$macro!(
          workflow_id = %scope.workflow_id,
          execution_id = %scope.execution_id,
          node_id = %scope.node_id,
          node_execution_id = %scope.node_execution_id,
          "{}",
          message
        )
      };
    }
    match level {
      LogLevel::Debug => mirror!(debug),
      LogLevel::Info => mirror!(info),
      LogLevel::Warn => mirror!(warn),
      LogLevel::Error => mirror!(error),
    }

    self.sink.write(LogRecord {
      level,
      workflow_id: scope.workflow_id.clone(),
      execution_id: scope.execution_id.clone(),
      node_id: scope.node_id.clone(),
      node_execution_id: scope.node_execution_id.clone(),
      message,
      timestamp: Utc::now(),
    });
  }
}
