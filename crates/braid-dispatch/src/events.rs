//! Remote dispatch events.

use braid_context::Context;
use serde::{Deserialize, Serialize};

use crate::emitter::Outcome;

/// Identifies the node execution a call is made for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeScope {
  pub workflow_id: String,
  pub execution_id: String,
  pub node_id: String,
  pub node_execution_id: String,
}

impl NodeScope {
  pub fn new(
    workflow_id: impl Into<String>,
    execution_id: impl Into<String>,
    node_id: impl Into<String>,
    node_execution_id: impl Into<String>,
  ) -> Self {
    Self {
      workflow_id: workflow_id.into(),
      execution_id: execution_id.into(),
      node_id: node_id.into(),
      node_execution_id: node_execution_id.into(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventHeader {
  pub event_id: String,
  /// Shared by a request and every event answering it.
  pub correlation_id: String,
  /// Event id of the event this one answers.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub causation_id: Option<String>,
  #[serde(flatten)]
  pub scope: NodeScope,
}

impl EventHeader {
  /// Header for a new request: fresh event and correlation ids.
  pub fn request(scope: NodeScope) -> Self {
    Self {
      event_id: uuid::Uuid::new_v4().to_string(),
      correlation_id: uuid::Uuid::new_v4().to_string(),
      causation_id: None,
      scope,
    }
  }

  /// Header for an event answering this one.
  pub fn reply(&self) -> Self {
    Self {
      event_id: uuid::Uuid::new_v4().to_string(),
      correlation_id: self.correlation_id.clone(),
      causation_id: Some(self.event_id.clone()),
      scope: self.scope.clone(),
    }
  }
}

/// Events exchanged with components that are not registered locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RemoteEvent {
  ActivationRequest {
    header: EventHeader,
    component: String,
    #[serde(default)]
    config: serde_json::Value,
    context: Context,
  },
  ActivationResponse {
    header: EventHeader,
    outcome: Outcome,
  },
  InvocationRequest {
    header: EventHeader,
    component: String,
    #[serde(default)]
    config: serde_json::Value,
    context: Context,
    /// The component may answer with several successes.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    repeatable: bool,
  },
  InvocationResponse {
    header: EventHeader,
    outcome: Outcome,
  },
}

impl RemoteEvent {
  pub fn header(&self) -> &EventHeader {
    match self {
      Self::ActivationRequest { header, .. }
      | Self::ActivationResponse { header, .. }
      | Self::InvocationRequest { header, .. }
      | Self::InvocationResponse { header, .. } => header,
    }
  }

  pub fn is_response(&self) -> bool {
    matches!(
      self,
      Self::ActivationResponse { .. } | Self::InvocationResponse { .. }
    )
  }
}
