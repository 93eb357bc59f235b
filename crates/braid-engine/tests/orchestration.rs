use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use braid_config::{NodeDef, NodeType, WorkflowDef};
use braid_context::{Context, NodeState};
use braid_dispatch::{
  Component, ComponentRegistry, DispatchError, Emitter, LogLevel, MemoryLogSink, RemoteRuntime,
};
use braid_engine::{
  ChannelNotifier, ExecutionEvent, Orchestrator, OrchestratorConfig, register_builtins,
};
use braid_execution::ExecutionStatus;
use braid_store::{ExecutionField, MemoryStore, Store};
use braid_workflow::Workflow;
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct Counter;

#[async_trait]
impl Component for Counter {
  async fn run(&self, mut context: Context, emitter: Arc<dyn Emitter>) {
    let n = context.get("n").and_then(Value::as_i64).unwrap_or(0) + 1;
    context.insert("n", json!(n));
    context.insert("state", json!(if n >= 3 { "stop" } else { "go" }));
    emitter.success(context);
  }
}

struct Broken;

#[async_trait]
impl Component for Broken {
  async fn run(&self, _context: Context, emitter: Arc<dyn Emitter>) {
    emitter.failure(DispatchError::Component("boom".to_string()));
  }
}

struct Doubler;

#[async_trait]
impl Component for Doubler {
  async fn run(&self, mut context: Context, emitter: Arc<dyn Emitter>) {
    let n = context.get("n").and_then(Value::as_i64).unwrap_or(0);
    context.insert("n", json!(n * 2));
    emitter.success(context);
  }
}

/// A trigger: reports success three times, 20ms apart.
struct Ticker;

#[async_trait]
impl Component for Ticker {
  async fn run(&self, context: Context, emitter: Arc<dyn Emitter>) {
    for tick in 1..=3 {
      let mut context = context.clone();
      context.insert("tick", json!(tick));
      emitter.success(context);
      tokio::time::sleep(Duration::from_millis(20)).await;
    }
  }
}

struct Harness {
  orchestrator: Orchestrator<ChannelNotifier>,
  events: mpsc::UnboundedReceiver<ExecutionEvent>,
  store: MemoryStore,
  sink: MemoryLogSink,
}

impl Harness {
  fn new() -> Self {
    let mut registry = ComponentRegistry::new();
    register_builtins(&mut registry)
      .register("counter", || Box::new(Counter) as Box<dyn Component>)
      .register("broken", || Box::new(Broken) as Box<dyn Component>)
      .register("ticker", || Box::new(Ticker) as Box<dyn Component>);

    let (notifier, events) = ChannelNotifier::channel();
    let store = MemoryStore::new();
    let sink = MemoryLogSink::new();
    let orchestrator = Orchestrator::with_notifier(
      OrchestratorConfig::default(),
      Arc::new(store.clone()),
      Arc::new(registry),
      Arc::new(sink.clone()),
      notifier,
    );
    Self {
      orchestrator,
      events,
      store,
      sink,
    }
  }

  async fn deploy(&self, nodes: Vec<NodeDef>) -> Arc<Workflow> {
    let workflow = Workflow::from_def(WorkflowDef {
      workflow_id: Some("wf".to_string()),
      name: "wf".to_string(),
      description: None,
      nodes,
    })
    .unwrap();
    self.orchestrator.deploy(workflow).await.unwrap()
  }

  async fn start(&self, data: Value) -> String {
    let Value::Object(data) = data else {
      panic!("start data must be an object");
    };
    self.orchestrator.start("wf", data).await.unwrap()
  }

  /// Collect events up to and including the first one matching `done`.
  async fn until(&mut self, done: impl Fn(&ExecutionEvent) -> bool) -> Vec<ExecutionEvent> {
    let mut seen = Vec::new();
    loop {
      let event = tokio::time::timeout(Duration::from_secs(5), self.events.recv())
        .await
        .expect("timed out waiting for events")
        .expect("notifier closed");
      let finished = done(&event);
      seen.push(event);
      if finished {
        return seen;
      }
    }
  }

  async fn until_completed(&mut self) -> Vec<ExecutionEvent> {
    self
      .until(|e| matches!(e, ExecutionEvent::WorkflowCompleted { .. }))
      .await
  }

  /// Collect whatever else arrives within `wait`.
  async fn drain(&mut self, wait: Duration) -> Vec<ExecutionEvent> {
    tokio::time::sleep(wait).await;
    let mut rest = Vec::new();
    while let Ok(event) = self.events.try_recv() {
      rest.push(event);
    }
    rest
  }
}

fn node_id(workflow: &Workflow, key: &str) -> String {
  workflow.node_by_key(key).unwrap().id.clone()
}

fn started(events: &[ExecutionEvent], node: &str) -> usize {
  events
    .iter()
    .filter(|e| matches!(e, ExecutionEvent::NodeStarted { node_id, .. } if node_id == node))
    .count()
}

fn completed_data(events: &[ExecutionEvent], node: &str) -> Map<String, Value> {
  events
    .iter()
    .find_map(|e| match e {
      ExecutionEvent::NodeCompleted { node_id, data, .. } if node_id == node => {
        data.as_object().cloned()
      }
      _ => None,
    })
    .unwrap_or_else(|| panic!("{node} never completed"))
}

fn run_id(events: &[ExecutionEvent]) -> String {
  events
    .iter()
    .find_map(|e| match e {
      ExecutionEvent::WorkflowStarted {
        execution_id,
        triggered_by: Some(_),
        ..
      } => Some(execution_id.clone()),
      _ => None,
    })
    .expect("start node should have produced a run")
}

fn fan_in(branches: &[&str], join: Value) -> Vec<NodeDef> {
  let mut nodes = vec![
    NodeDef::new("start", NodeType::Start).with_next(["fork"]),
    NodeDef::new("fork", NodeType::Task).with_next(branches.iter().copied()),
  ];
  for branch in branches {
    nodes.push(
      NodeDef::new(*branch, NodeType::Task)
        .with_component("set")
        .with_config(json!({ *branch: true }))
        .with_next(["join"]),
    );
  }
  nodes.push(
    NodeDef::new("join", NodeType::Wait)
      .with_config(join)
      .with_next(["end"]),
  );
  nodes.push(NodeDef::new("end", NodeType::End));
  nodes
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn decision_routes_to_selected_branch() {
  let mut h = Harness::new();
  let workflow = h
    .deploy(vec![
      NodeDef::new("start", NodeType::Start).with_next(["choose"]),
      NodeDef::new("choose", NodeType::Decision)
        .with_component("switch")
        .with_config(json!({"field": "route", "cases": {"left": "a", "right": "b"}}))
        .with_next(["a", "b"]),
      NodeDef::new("a", NodeType::Task)
        .with_component("set")
        .with_config(json!({"took": "a"}))
        .with_next(["end"]),
      NodeDef::new("b", NodeType::Task)
        .with_component("set")
        .with_config(json!({"took": "b"}))
        .with_next(["end"]),
      NodeDef::new("end", NodeType::End),
    ])
    .await;

  h.start(json!({"route": "left"})).await;
  let events = h.until_completed().await;

  assert_eq!(started(&events, &node_id(&workflow, "a")), 1);
  assert_eq!(started(&events, &node_id(&workflow, "b")), 0);
  let data = completed_data(&events, &node_id(&workflow, "end"));
  assert_eq!(data["took"], "a");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn start_renews_into_a_fresh_run() {
  let mut h = Harness::new();
  h.deploy(vec![
    NodeDef::new("start", NodeType::Start).with_next(["end"]),
    NodeDef::new("end", NodeType::End),
  ])
  .await;

  let carrier = h.start(json!({"order": 7})).await;
  let events = h.until_completed().await;

  assert!(matches!(
    &events[0],
    ExecutionEvent::WorkflowStarted { execution_id, triggered_by: None, .. } if *execution_id == carrier
  ));
  let run = run_id(&events);
  assert_ne!(run, carrier);
  assert!(events.iter().any(|e| matches!(
    e,
    ExecutionEvent::WorkflowStarted { execution_id, triggered_by: Some(by), .. }
      if *execution_id == run && *by == carrier
  )));
  assert_eq!(events.last().unwrap().execution_id(), run);

  h.orchestrator.flush().await;
  let carrier_execution = h.orchestrator.execution(&carrier).await.unwrap();
  assert_eq!(carrier_execution.status, ExecutionStatus::InProgress);
  let run_execution = h.orchestrator.execution(&run).await.unwrap();
  assert!(run_execution.is_complete());

  let end = run_execution
    .nodes
    .values()
    .find(|n| n.context.graph_node("end").is_some())
    .unwrap();
  assert_eq!(end.context.get("order"), Some(&json!(7)));
  let keys: Vec<_> = end.context.graph().iter().map(|n| n.key.as_str()).collect();
  assert_eq!(keys, vec!["start", "end"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn join_all_waits_for_every_branch() {
  let mut h = Harness::new();
  let workflow = h.deploy(fan_in(&["a", "b", "c"], Value::Null)).await;

  h.start(json!({})).await;
  let mut events = h.until_completed().await;
  events.extend(h.drain(Duration::from_millis(50)).await);

  let fired = events
    .iter()
    .filter(|e| matches!(e, ExecutionEvent::JoinFired { .. }))
    .count();
  assert_eq!(fired, 1);
  assert_eq!(started(&events, &node_id(&workflow, "end")), 1);

  let data = completed_data(&events, &node_id(&workflow, "end"));
  for branch in ["a", "b", "c"] {
    assert_eq!(data[branch], true, "{branch} missing from merged data");
  }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn join_threshold_fires_once() {
  for _ in 0..10 {
    let mut h = Harness::new();
    let workflow = h
      .deploy(fan_in(
        &["a", "b", "c", "d"],
        json!({"await": ["a", "b", "c", "d"], "mode": "threshold", "threshold": 2}),
      ))
      .await;

    let carrier = h.start(json!({})).await;
    let mut events = h.until_completed().await;
    events.extend(h.drain(Duration::from_millis(50)).await);

    let fired = events
      .iter()
      .filter(|e| matches!(e, ExecutionEvent::JoinFired { .. }))
      .count();
    assert_eq!(fired, 1);
    assert_eq!(started(&events, &node_id(&workflow, "end")), 1);
    assert_eq!(
      events
        .iter()
        .filter(|e| matches!(e, ExecutionEvent::WorkflowCompleted { .. }))
        .count(),
      1
    );

    // Every arrival ends up closed, including the late ones.
    let run = h.orchestrator.execution(&run_id(&events)).await.unwrap();
    let joins = run.executions_of(&node_id(&workflow, "join"));
    assert_eq!(joins.len(), 4);
    assert!(joins.iter().all(|n| n.is_done()));
    assert_ne!(run.execution_id, carrier);
  }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn join_merge_strategies() {
  for (merge, expected) in [("pick_last", "slow"), ("pick_first", "fast")] {
    let mut h = Harness::new();
    let workflow = h
      .deploy(vec![
        NodeDef::new("start", NodeType::Start).with_next(["fast", "wait"]),
        NodeDef::new("fast", NodeType::Task)
          .with_component("set")
          .with_config(json!({"winner": "fast"}))
          .with_next(["join"]),
        NodeDef::new("wait", NodeType::Task)
          .with_component("delay")
          .with_config(json!({"ms": 50}))
          .with_next(["slow"]),
        NodeDef::new("slow", NodeType::Task)
          .with_component("set")
          .with_config(json!({"winner": "slow"}))
          .with_next(["join"]),
        NodeDef::new("join", NodeType::Wait)
          .with_config(json!({"merge": merge}))
          .with_next(["end"]),
        NodeDef::new("end", NodeType::End),
      ])
      .await;

    h.start(json!({})).await;
    let events = h.until_completed().await;

    assert!(
      events
        .iter()
        .any(|e| matches!(e, ExecutionEvent::JoinWaiting { found, .. } if found == &["fast"]))
    );
    let data = completed_data(&events, &node_id(&workflow, "end"));
    assert_eq!(data["winner"], expected, "merge {merge}");
  }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn loops_revisit_nodes() {
  let mut h = Harness::new();
  let workflow = h
    .deploy(vec![
      NodeDef::new("start", NodeType::Start).with_next(["work"]),
      NodeDef::new("work", NodeType::Task)
        .with_component("counter")
        .with_next(["again"]),
      NodeDef::new("again", NodeType::Decision)
        .with_component("switch")
        .with_config(json!({"field": "state", "cases": {"go": "work", "stop": "end"}}))
        .with_next(["work", "end"]),
      NodeDef::new("end", NodeType::End),
    ])
    .await;

  h.start(json!({})).await;
  let events = h.until_completed().await;

  assert_eq!(started(&events, &node_id(&workflow, "work")), 3);
  assert_eq!(completed_data(&events, &node_id(&workflow, "end"))["n"], 3);

  let run = h.orchestrator.execution(&run_id(&events)).await.unwrap();
  let end = run.executions_of(&node_id(&workflow, "end"))[0];
  assert_eq!(end.context.visits("work"), 3);
  assert_eq!(end.context.visits("again"), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn loop_through_a_fork_rejoins_every_pass() {
  let mut h = Harness::new();
  let workflow = h
    .deploy(vec![
      NodeDef::new("start", NodeType::Start).with_next(["split"]),
      NodeDef::new("split", NodeType::Task).with_next(["a", "slow"]),
      NodeDef::new("a", NodeType::Task)
        .with_component("set")
        .with_config(json!({"a": true}))
        .with_next(["join"]),
      NodeDef::new("slow", NodeType::Task)
        .with_component("delay")
        .with_config(json!({"ms": 100}))
        .with_next(["c"]),
      NodeDef::new("c", NodeType::Task)
        .with_component("set")
        .with_config(json!({"c": true}))
        .with_next(["join"]),
      NodeDef::new("join", NodeType::Wait)
        .with_config(json!({"await": ["a", "c"]}))
        .with_next(["count"]),
      NodeDef::new("count", NodeType::Task)
        .with_component("counter")
        .with_next(["again"]),
      NodeDef::new("again", NodeType::Decision)
        .with_component("switch")
        .with_config(json!({"field": "state", "cases": {"go": "split", "stop": "end"}}))
        .with_next(["split", "end"]),
      NodeDef::new("end", NodeType::End),
    ])
    .await;
  let c = node_id(&workflow, "c");

  h.start(json!({})).await;
  let events = h.until_completed().await;

  let order: Vec<&str> = events
    .iter()
    .filter_map(|e| match e {
      ExecutionEvent::NodeCompleted { node_id, .. } if *node_id == c => Some("c_done"),
      ExecutionEvent::JoinFired { .. } => Some("join_fired"),
      _ => None,
    })
    .collect();
  assert_eq!(order, ["c_done", "join_fired"].repeat(3));
  assert_eq!(completed_data(&events, &node_id(&workflow, "end"))["n"], 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn long_lived_start_triggers_a_run_per_success() {
  let mut h = Harness::new();
  let workflow = h
    .deploy(vec![
      NodeDef::new("start", NodeType::Start)
        .with_component("ticker")
        .with_next(["end"]),
      NodeDef::new("end", NodeType::End),
    ])
    .await;

  let carrier = h.start(json!({})).await;
  let mut events = Vec::new();
  for _ in 0..3 {
    events.extend(h.until_completed().await);
  }
  events.extend(h.drain(Duration::from_millis(100)).await);

  let runs: Vec<&str> = events
    .iter()
    .filter_map(|e| match e {
      ExecutionEvent::WorkflowStarted {
        execution_id,
        triggered_by: Some(by),
        ..
      } if *by == carrier => Some(execution_id.as_str()),
      _ => None,
    })
    .collect();
  assert_eq!(runs.len(), 3);
  let completed: Vec<&str> = events
    .iter()
    .filter_map(|e| match e {
      ExecutionEvent::WorkflowCompleted { execution_id } => Some(execution_id.as_str()),
      _ => None,
    })
    .collect();
  assert_eq!(completed.len(), 3);
  for run in &runs {
    assert!(completed.contains(run));
  }

  let end = node_id(&workflow, "end");
  let mut ticks: Vec<i64> = events
    .iter()
    .filter_map(|e| match e {
      ExecutionEvent::NodeCompleted { node_id, data, .. } if *node_id == end => data["tick"].as_i64(),
      _ => None,
    })
    .collect();
  ticks.sort_unstable();
  assert_eq!(ticks, vec![1, 2, 3]);

  h.orchestrator.flush().await;
  let carrier_execution = h.orchestrator.execution(&carrier).await.unwrap();
  assert_eq!(carrier_execution.status, ExecutionStatus::InProgress);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unknown_component_fails_the_node() {
  let mut h = Harness::new();
  let workflow = h
    .deploy(vec![
      NodeDef::new("start", NodeType::Start).with_next(["mail"]),
      NodeDef::new("mail", NodeType::Task)
        .with_component("mailer")
        .with_next(["end"]),
      NodeDef::new("end", NodeType::End),
    ])
    .await;

  h.start(json!({})).await;
  let events = h
    .until(|e| matches!(e, ExecutionEvent::NodeFailed { .. }))
    .await;
  let Some(ExecutionEvent::NodeFailed { node_id, error, .. }) = events.last() else {
    unreachable!()
  };
  assert_eq!(*node_id, workflow.node_by_key("mail").unwrap().id);
  assert!(error.contains("mailer"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn refused_join_arrivals_go_back_to_idle() {
  let mut h = Harness::new();
  let workflow = h
    .deploy(fan_in(&["a", "b"], json!({"await": ["elsewhere"]})))
    .await;
  let (a, b) = (node_id(&workflow, "a"), node_id(&workflow, "b"));

  h.start(json!({})).await;
  let mut events = h
    .until(|e| matches!(e, ExecutionEvent::NodeCompleted { node_id, .. } if *node_id == a || *node_id == b))
    .await;
  events.extend(h.drain(Duration::from_millis(200)).await);

  assert!(
    !events
      .iter()
      .any(|e| matches!(e, ExecutionEvent::JoinFired { .. } | ExecutionEvent::WorkflowCompleted { .. }))
  );

  h.orchestrator.flush().await;
  let run = h.orchestrator.execution(&run_id(&events)).await.unwrap();
  let joins = run.executions_of(&node_id(&workflow, "join"));
  assert_eq!(joins.len(), 2);
  assert!(joins.iter().all(|n| n.state == NodeState::Idle));
  assert_eq!(run.status, ExecutionStatus::InProgress);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn remote_components_answer_over_the_bus() {
  let mut h = Harness::new();
  let mut remote = ComponentRegistry::new();
  remote.register("doubler", || Box::new(Doubler) as Box<dyn Component>);
  let cancel = CancellationToken::new();
  let server = RemoteRuntime::new(
    Arc::new(remote),
    h.orchestrator.bus(),
    Arc::new(MemoryLogSink::new()),
  )
  .spawn(cancel.clone());

  let workflow = h
    .deploy(vec![
      NodeDef::new("start", NodeType::Start).with_next(["double"]),
      NodeDef::new("double", NodeType::Task)
        .with_component("doubler")
        .with_next(["end"]),
      NodeDef::new("end", NodeType::End),
    ])
    .await;

  h.start(json!({"n": 21})).await;
  let events = h.until_completed().await;
  assert_eq!(completed_data(&events, &node_id(&workflow, "double"))["n"], 42);

  cancel.cancel();
  server.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_node_stops_its_branch() {
  let mut h = Harness::new();
  let workflow = h
    .deploy(vec![
      NodeDef::new("start", NodeType::Start).with_next(["explode"]),
      NodeDef::new("explode", NodeType::Task)
        .with_component("broken")
        .with_next(["end"]),
      NodeDef::new("end", NodeType::End),
    ])
    .await;
  let explode = node_id(&workflow, "explode");

  h.start(json!({})).await;
  let events = h
    .until(|e| matches!(e, ExecutionEvent::NodeFailed { .. }))
    .await;
  let ExecutionEvent::NodeFailed {
    execution_id,
    node_id,
    node_execution_id,
    error,
  } = events.last().unwrap()
  else {
    unreachable!()
  };
  assert_eq!(*node_id, explode);
  assert!(error.contains("boom"));

  let rest = h.drain(Duration::from_millis(50)).await;
  assert!(
    !rest
      .iter()
      .any(|e| matches!(e, ExecutionEvent::WorkflowCompleted { .. }))
  );

  let execution = h.orchestrator.execution(execution_id).await.unwrap();
  assert_eq!(execution.status, ExecutionStatus::InProgress);

  let records = h.sink.records_for(node_execution_id);
  assert!(
    records
      .iter()
      .any(|r| r.level == LogLevel::Error && r.message.contains("boom"))
  );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn executions_are_persisted() {
  let mut h = Harness::new();
  h.deploy(vec![
    NodeDef::new("start", NodeType::Start).with_next(["end"]),
    NodeDef::new("end", NodeType::End),
  ])
  .await;

  h.start(json!({})).await;
  h.until_completed().await;
  h.start(json!({})).await;
  h.until_completed().await;
  h.orchestrator.flush().await;

  let store = h.orchestrator.store();
  let all = store
    .find_by_field(ExecutionField::WorkflowId, "wf")
    .await
    .unwrap();
  assert_eq!(all.len(), 4);
  let done = store
    .find_by_field(ExecutionField::Status, "success")
    .await
    .unwrap();
  assert_eq!(done.len(), 2);
  // The carriers stay open for further triggers.
  let open = store
    .find_by_field(ExecutionField::Status, "in_progress")
    .await
    .unwrap();
  assert_eq!(open.len(), 2);
  assert!(h.store.find_workflow("wf").await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn redeploy_keeps_unchanged_node_ids() {
  let h = Harness::new();
  let first = h
    .deploy(vec![
      NodeDef::new("start", NodeType::Start).with_next(["end"]),
      NodeDef::new("end", NodeType::End),
    ])
    .await;
  let second = h
    .deploy(vec![
      NodeDef::new("start", NodeType::Start).with_next(["end"]),
      NodeDef::new("end", NodeType::End).with_component("log"),
    ])
    .await;

  assert_eq!(node_id(&first, "start"), node_id(&second, "start"));
  assert_ne!(node_id(&first, "end"), node_id(&second, "end"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unknown_workflow_is_rejected() {
  let h = Harness::new();
  assert!(h.orchestrator.start("nope", Map::new()).await.is_err());
}
