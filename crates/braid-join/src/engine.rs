//! Join evaluation.

use std::collections::BTreeSet;
use std::sync::Arc;

use braid_context::{Context, NodeState};
use braid_execution::WorkflowNodeExecution;
use tracing::{debug, info};

use crate::config::JoinConfig;
use crate::error::{JoinError, LookupError};
use crate::merge::merge_contexts;
use crate::reachability::found_keys;

/// Access to the arrivals of a join within one execution.
pub trait ExecutionLookup: Send + Sync {
  /// Call `decide` with every node execution of `execution_id` that runs
  /// definition node `node_id`, in arrival order.
  ///
  /// Implementations hold the execution's lock for the whole call, so
  /// `decide` sees and updates the group atomically.
  fn with_siblings(
    &self,
    execution_id: &str,
    node_id: &str,
    decide: &mut dyn FnMut(&mut [&mut WorkflowNodeExecution]),
  ) -> Result<(), LookupError>;
}

/// One arrival at a join.
#[derive(Debug, Clone, Copy)]
pub struct JoinRequest<'a> {
  pub execution_id: &'a str,
  /// Definition node id of the join.
  pub node_id: &'a str,
  /// Route key of the join, as it appears in branch histories.
  pub join_key: &'a str,
  pub node_execution_id: &'a str,
  pub config: &'a JoinConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinOutcome {
  /// The join fired with the merged context of every arrival.
  Fired(Context),
  /// Not enough awaited keys yet; `found` lists the matched ones.
  Waiting { found: BTreeSet<String> },
  /// The group already fired; this arrival adds nothing and is closed.
  Absorbed,
}

pub struct JoinEngine {
  lookup: Arc<dyn ExecutionLookup>,
}

impl JoinEngine {
  pub fn new(lookup: Arc<dyn ExecutionLookup>) -> Self {
    Self { lookup }
  }

  /// Whether a branch carrying `context` may enter the join: at least one
  /// awaited key must be reachable in its history.
  pub fn activate(&self, config: &JoinConfig, join_key: &str, context: &Context) -> bool {
    let found = found_keys(context.graph(), join_key);
    config.matched(&found).next().is_some()
  }

  /// Evaluate the join after `request`'s arrival.
  pub fn run(&self, request: JoinRequest<'_>) -> Result<JoinOutcome, JoinError> {
    let mut result = None;
    self
      .lookup
      .with_siblings(
        request.execution_id,
        request.node_id,
        &mut |members: &mut [&mut WorkflowNodeExecution]| {
          result = Some(evaluate(&request, members));
        },
      )?;

    result.unwrap_or_else(|| {
      Err(JoinError::NotInGroup {
        node_id: request.node_id.to_string(),
        node_execution_id: request.node_execution_id.to_string(),
      })
    })
  }
}

fn evaluate(
  request: &JoinRequest<'_>,
  members: &mut [&mut WorkflowNodeExecution],
) -> Result<JoinOutcome, JoinError> {
  let arrival = members
    .iter()
    .find(|m| m.id == request.node_execution_id)
    .ok_or_else(|| JoinError::NotInGroup {
      node_id: request.node_id.to_string(),
      node_execution_id: request.node_execution_id.to_string(),
    })?;
  let iteration = arrival.context.visits(request.join_key);

  let mut group: Vec<&mut WorkflowNodeExecution> = members
    .iter_mut()
    .filter(|m| m.context.visits(request.join_key) == iteration)
    .map(|m| &mut **m)
    .collect();
  group.sort_by_key(|m| m.sequence);

  if group.iter().any(|m| m.is_done()) {
    for member in group.iter_mut() {
      if member.id == request.node_execution_id {
        member.state = NodeState::Done;
      }
    }
    debug!(
      execution_id = %request.execution_id,
      node_execution_id = %request.node_execution_id,
      join_key = %request.join_key,
      iteration,
      "join_absorbed"
    );
    return Ok(JoinOutcome::Absorbed);
  }

  let mut merged = merge_contexts(group.iter().map(|m| &m.context), request.config.merge);
  let found = found_keys(merged.graph(), request.join_key);

  if !request.config.is_satisfied(&found) {
    let matched: BTreeSet<String> = request.config.matched(&found).map(str::to_string).collect();
    for member in group.iter_mut() {
      if member.id == request.node_execution_id {
        member.state = NodeState::Waiting;
        member.context.set_state(request.join_key, NodeState::Waiting);
      }
    }
    info!(
      execution_id = %request.execution_id,
      node_execution_id = %request.node_execution_id,
      join_key = %request.join_key,
      iteration,
      arrivals = group.len(),
      found = ?matched,
      awaited = ?request.config.awaited,
      "join_waiting"
    );
    return Ok(JoinOutcome::Waiting { found: matched });
  }

  merged.close(request.join_key);
  for member in group.iter_mut() {
    member.state = NodeState::Done;
    member.context.close(request.join_key);
  }
  info!(
    execution_id = %request.execution_id,
    node_execution_id = %request.node_execution_id,
    join_key = %request.join_key,
    iteration,
    arrivals = group.len(),
    "join_fired"
  );
  Ok(JoinOutcome::Fired(merged))
}
