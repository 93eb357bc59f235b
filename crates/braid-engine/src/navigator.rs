//! Advancing an execution past a completed node.
//!
//! A node execution moves IDLE → WORKING → (WAITING) → DONE, and its
//! successors are only created once it is DONE. [`navigate`] performs that
//! last step: it closes the completed node execution and spawns one node
//! execution per selected child, each with its own copy of the context.

use braid_context::{Context, NodeState};
use braid_execution::WorkflowExecution;
use braid_workflow::{NodeType, Workflow, WorkflowNode};

use crate::error::NavigationError;

/// What [`navigate`] did.
#[derive(Debug)]
pub struct Navigation {
  /// The execution the spawned node executions belong to: the renewed one
  /// after a START, otherwise the navigated one.
  pub execution_id: String,
  /// Node executions created for the selected children, in child order.
  pub spawned: Vec<String>,
  /// The fresh run produced by a START completion.
  pub renewed: Option<WorkflowExecution>,
  /// Whether an END completion finished the execution.
  pub completed: bool,
}

/// Close node execution `completed_id` with `context` and spawn its
/// successors.
pub fn navigate(
  workflow: &Workflow,
  execution: &mut WorkflowExecution,
  completed_id: &str,
  mut context: Context,
) -> Result<Navigation, NavigationError> {
  let node_id = execution
    .node(completed_id)
    .ok_or_else(|| NavigationError::NodeExecutionNotFound(completed_id.to_string()))?
    .node_id
    .clone();
  let node = workflow
    .node(&node_id)
    .ok_or_else(|| NavigationError::NodeNotFound {
      workflow_id: workflow.workflow_id.clone(),
      node_id: node_id.clone(),
    })?;
  let key = node.route_key();

  context.set_state(key, NodeState::Done);
  close(execution, completed_id, context.clone())?;

  let selected = select_children(workflow, node, &context);

  if node.is_type(NodeType::Start) {
    let (mut renewed, remap) = execution.renew();
    let counterpart = remap
      .get(completed_id)
      .cloned()
      .ok_or_else(|| NavigationError::NodeExecutionNotFound(completed_id.to_string()))?;
    let restarted = context.restart(key);
    close(&mut renewed, &counterpart, restarted.clone())?;

    let spawned = spawn(workflow, &mut renewed, &counterpart, key, &selected, &restarted)?;
    return Ok(Navigation {
      execution_id: renewed.execution_id.clone(),
      spawned,
      renewed: Some(renewed),
      completed: false,
    });
  }

  let spawned = spawn(workflow, execution, completed_id, key, &selected, &context)?;
  let completed = node.is_type(NodeType::End);
  if completed {
    execution.complete();
  }

  Ok(Navigation {
    execution_id: execution.execution_id.clone(),
    spawned,
    renewed: None,
    completed,
  })
}

fn close(
  execution: &mut WorkflowExecution,
  id: &str,
  context: Context,
) -> Result<(), NavigationError> {
  let node_execution = execution
    .node_mut(id)
    .ok_or_else(|| NavigationError::NodeExecutionNotFound(id.to_string()))?;
  node_execution.state = NodeState::Done;
  node_execution.context = context;
  Ok(())
}

/// Children to continue with. A DECISION with a recorded decision keeps only
/// the children whose route key is selected, possibly none.
fn select_children<'a>(
  workflow: &'a Workflow,
  node: &WorkflowNode,
  context: &Context,
) -> Vec<&'a WorkflowNode> {
  let children = workflow.children(&node.id);
  if !node.is_type(NodeType::Decision) {
    return children;
  }

  match context.decision(node.route_key()) {
    Some(decision) => children
      .into_iter()
      .filter(|child| decision.is_selected(child.route_key()))
      .collect(),
    None => children,
  }
}

/// The context a child starts with: a copy of its parent's, with the child
/// recorded as entered from `parent_key`.
pub(crate) fn child_context(
  workflow: &Workflow,
  parent_key: Option<&str>,
  child: &WorkflowNode,
  context: &Context,
) -> Context {
  let mut child_context = context.renew();
  child_context.record_visit(child.route_key(), NodeState::Idle, parent_key);
  if child.is_type(NodeType::Decision) {
    child_context.init_decision(
      child.route_key(),
      workflow.children(&child.id).iter().map(|c| c.route_key()),
    );
  }
  child_context
}

fn spawn(
  workflow: &Workflow,
  execution: &mut WorkflowExecution,
  parent_id: &str,
  parent_key: &str,
  children: &[&WorkflowNode],
  context: &Context,
) -> Result<Vec<String>, NavigationError> {
  children
    .iter()
    .map(|child| -> Result<String, NavigationError> {
      let child_context = child_context(workflow, Some(parent_key), child, context);
      Ok(execution.add_child(parent_id, child.id.clone(), child_context)?)
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use braid_config::{NodeDef, WorkflowDef};
  use serde_json::json;

  fn workflow(nodes: Vec<NodeDef>) -> Workflow {
    Workflow::from_def(WorkflowDef {
      workflow_id: Some("wf".to_string()),
      name: "wf".to_string(),
      description: None,
      nodes,
    })
    .unwrap()
  }

  /// An execution with one node execution for `key`, entered from nothing.
  fn execution_at(workflow: &Workflow, key: &str) -> (WorkflowExecution, String, Context) {
    let node = workflow.node_by_key(key).unwrap();
    let context = child_context(workflow, None, node, &Context::new());
    let mut execution = WorkflowExecution::new(&workflow.workflow_id);
    let id = execution.add_root(node.id.clone(), context.clone());
    (execution, id, context)
  }

  fn spawned_keys(workflow: &Workflow, execution: &WorkflowExecution, ids: &[String]) -> Vec<String> {
    ids
      .iter()
      .map(|id| {
        let node_id = &execution.node(id).unwrap().node_id;
        workflow.node(node_id).unwrap().route_key().to_string()
      })
      .collect()
  }

  fn branching() -> Workflow {
    workflow(vec![
      NodeDef::new("start", NodeType::Start).with_next(["choose"]),
      NodeDef::new("choose", NodeType::Decision).with_next(["a", "b"]),
      NodeDef::new("a", NodeType::Task).with_next(["end"]),
      NodeDef::new("b", NodeType::Task).with_next(["end"]),
      NodeDef::new("end", NodeType::End),
    ])
  }

  #[test]
  fn test_task_spawns_children_with_history() {
    let wf = branching();
    let (mut execution, id, mut context) = execution_at(&wf, "a");
    context.insert("x", json!(1));

    let nav = navigate(&wf, &mut execution, &id, context).unwrap();

    assert_eq!(spawned_keys(&wf, &execution, &nav.spawned), vec!["end"]);
    assert_eq!(execution.node(&id).unwrap().state, NodeState::Done);
    assert_eq!(execution.node(&id).unwrap().children, nav.spawned);

    let child = execution.node(&nav.spawned[0]).unwrap();
    assert_eq!(child.state, NodeState::Idle);
    assert_eq!(child.context.get("x"), Some(&json!(1)));
    let end = child.context.graph_node("end").unwrap();
    assert_eq!(end.state, NodeState::Idle);
    assert!(end.parents.contains("a"));
    assert_eq!(child.context.graph_node("a").unwrap().state, NodeState::Done);
  }

  #[test]
  fn test_decision_selects_true_children() {
    let wf = branching();
    let (mut execution, id, mut context) = execution_at(&wf, "choose");
    assert_eq!(context.decision("choose").unwrap().selected().count(), 0);
    context.decide("choose", "a", true);

    let nav = navigate(&wf, &mut execution, &id, context).unwrap();
    assert_eq!(spawned_keys(&wf, &execution, &nav.spawned), vec!["a"]);
  }

  #[test]
  fn test_decision_with_nothing_selected_ends_the_branch() {
    let wf = branching();
    let (mut execution, id, context) = execution_at(&wf, "choose");

    let nav = navigate(&wf, &mut execution, &id, context).unwrap();
    assert!(nav.spawned.is_empty());
    assert!(!nav.completed);
    assert_eq!(execution.node(&id).unwrap().state, NodeState::Done);
  }

  #[test]
  fn test_decision_child_gets_fresh_decision() {
    let wf = branching();
    let (mut execution, id, mut context) = execution_at(&wf, "start");
    context.insert("order", json!("o-1"));

    let nav = navigate(&wf, &mut execution, &id, context).unwrap();
    let renewed = nav.renewed.unwrap();
    let choose = renewed.node(&nav.spawned[0]).unwrap();
    let decision = choose.context.decision("choose").unwrap();
    assert_eq!(decision.options.len(), 2);
    assert!(!decision.is_selected("a"));
    assert!(!decision.is_selected("b"));
  }

  #[test]
  fn test_start_renews_the_execution() {
    let wf = branching();
    let (mut execution, id, mut context) = execution_at(&wf, "start");
    context.insert("order", json!("o-1"));
    context.decide("stale", "x", true);

    let nav = navigate(&wf, &mut execution, &id, context).unwrap();
    let renewed = nav.renewed.expect("start should renew");

    assert_ne!(renewed.execution_id, execution.execution_id);
    assert_eq!(nav.execution_id, renewed.execution_id);
    assert!(execution.node(&id).unwrap().children.is_empty());
    assert_eq!(execution.node(&id).unwrap().state, NodeState::Done);

    let start = renewed.node(&renewed.root_ids[0]).unwrap();
    assert_ne!(start.id, id);
    assert_eq!(start.state, NodeState::Done);
    assert_eq!(start.children, nav.spawned);
    assert_eq!(start.context.graph().len(), 1);
    assert_eq!(start.context.get("order"), Some(&json!("o-1")));
    assert!(start.context.decision("stale").is_none());

    let child = renewed.node(&nav.spawned[0]).unwrap();
    let keys: Vec<_> = child.context.graph().iter().map(|n| n.key.as_str()).collect();
    assert_eq!(keys, vec!["start", "choose"]);
  }

  #[test]
  fn test_end_completes_the_execution() {
    let wf = branching();
    let (mut execution, id, context) = execution_at(&wf, "end");

    let nav = navigate(&wf, &mut execution, &id, context).unwrap();
    assert!(nav.completed);
    assert!(nav.spawned.is_empty());
    assert!(execution.is_complete());
    assert!(execution.completed_at.is_some());
  }

  #[test]
  fn test_loop_increments_visits() {
    let wf = workflow(vec![
      NodeDef::new("start", NodeType::Start).with_next(["work"]),
      NodeDef::new("work", NodeType::Task).with_next(["again"]),
      NodeDef::new("again", NodeType::Decision).with_next(["work", "end"]),
      NodeDef::new("end", NodeType::End),
    ]);
    let (mut execution, id, mut context) = execution_at(&wf, "again");
    context.record_visit("work", NodeState::Done, None);
    context.decide("again", "work", true);

    let nav = navigate(&wf, &mut execution, &id, context).unwrap();
    let work = execution.node(&nav.spawned[0]).unwrap();
    assert_eq!(work.context.visits("work"), 2);
    assert!(work.context.graph_node("work").unwrap().parents.contains("again"));
  }

  #[test]
  fn test_unknown_node_execution() {
    let wf = branching();
    let mut execution = WorkflowExecution::new("wf");
    assert!(matches!(
      navigate(&wf, &mut execution, "missing", Context::new()),
      Err(NavigationError::NodeExecutionNotFound(_))
    ));
  }

  #[test]
  fn test_unknown_static_node() {
    let wf = branching();
    let mut execution = WorkflowExecution::new("wf");
    let id = execution.add_root("not-in-workflow", Context::new());
    assert!(matches!(
      navigate(&wf, &mut execution, &id, Context::new()),
      Err(NavigationError::NodeNotFound { .. })
    ));
  }
}
