//! Driving executions from component callbacks.
//!
//! The orchestrator owns the live [`ExecutionTable`]. Every node execution
//! goes through the same cycle:
//!
//! 1. activation: the component is asked whether it can activate (WAIT
//!    nodes ask the join engine instead)
//! 2. invocation: the component runs (WAIT nodes evaluate the join)
//! 3. completion: [`navigate`] closes the node execution and spawns its
//!    successors, which start their own cycle
//!
//! Callbacks run synchronously on whichever task reports the outcome; the
//! execution's lock is held only while navigating or evaluating a join.
//! Snapshots are persisted in order by a background task.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use braid_context::{Context, NodeState};
use braid_dispatch::{
  ComponentRegistry, DispatchError, DispatchRequest, Dispatcher, Emitter, EventBus, LogSink,
  NodeLogger, NodeScope, Phase,
};
use braid_execution::WorkflowExecution;
use braid_join::{JoinConfig, JoinEngine, JoinError, JoinOutcome, JoinRequest};
use braid_store::Store;
use braid_workflow::{NodeType, Workflow, WorkflowNode};
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::OrchestratorConfig;
use crate::error::EngineError;
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::navigator::{child_context, navigate};
use crate::table::ExecutionTable;

enum Persist {
  Save(Box<WorkflowExecution>),
  Flush(oneshot::Sender<()>),
}

/// The workflow orchestrator.
///
/// Generic over `N: ExecutionNotifier` to allow different notification
/// strategies. Use `Orchestrator::new()` for no-op notifications, or
/// `Orchestrator::with_notifier()` to observe [`ExecutionEvent`]s.
pub struct Orchestrator<N: ExecutionNotifier + 'static = NoopNotifier> {
  inner: Arc<Inner<N>>,
}

struct Inner<N: ExecutionNotifier> {
  config: OrchestratorConfig,
  store: Arc<dyn Store>,
  table: Arc<ExecutionTable>,
  joins: JoinEngine,
  dispatcher: Dispatcher,
  bus: EventBus,
  sink: Arc<dyn LogSink>,
  notifier: N,
  workflows: RwLock<HashMap<String, Arc<Workflow>>>,
  persist: mpsc::UnboundedSender<Persist>,
  cancel: CancellationToken,
}

impl Orchestrator<NoopNotifier> {
  /// Create an orchestrator with no-op notifications.
  ///
  /// Must be called from within a tokio runtime.
  pub fn new(
    config: OrchestratorConfig,
    store: Arc<dyn Store>,
    registry: Arc<ComponentRegistry>,
    sink: Arc<dyn LogSink>,
  ) -> Self {
    Self::with_notifier(config, store, registry, sink, NoopNotifier)
  }
}

impl<N: ExecutionNotifier + 'static> Orchestrator<N> {
  /// Create an orchestrator with a custom notifier.
  pub fn with_notifier(
    config: OrchestratorConfig,
    store: Arc<dyn Store>,
    registry: Arc<ComponentRegistry>,
    sink: Arc<dyn LogSink>,
    notifier: N,
  ) -> Self {
    let cancel = CancellationToken::new();
    let bus = EventBus::new(config.event_buffer);
    let table = Arc::new(ExecutionTable::new());
    let dispatcher = Dispatcher::new(registry, bus.clone(), cancel.child_token());
    let (persist, persist_rx) = mpsc::unbounded_channel();
    tokio::spawn(run_persister(store.clone(), persist_rx));

    Self {
      inner: Arc::new(Inner {
        config,
        store,
        joins: JoinEngine::new(table.clone()),
        table,
        dispatcher,
        bus,
        sink,
        notifier,
        workflows: RwLock::new(HashMap::new()),
        persist,
        cancel,
      }),
    }
  }

  pub fn config(&self) -> &OrchestratorConfig {
    &self.inner.config
  }

  /// The bus remote components are reached through.
  pub fn bus(&self) -> EventBus {
    self.inner.bus.clone()
  }

  /// Publish a workflow definition.
  ///
  /// A definition already stored under the same id takes over the new
  /// content, keeping the ids of unchanged nodes so that in-flight
  /// executions still resolve them.
  #[instrument(
    name = "orchestrator_deploy",
    skip(self, workflow),
    fields(workflow_id = %workflow.workflow_id)
  )]
  pub async fn deploy(&self, workflow: Workflow) -> Result<Arc<Workflow>, EngineError> {
    let merged = match self.inner.store.find_workflow(&workflow.workflow_id).await {
      Ok(mut existing) => {
        existing.merge_from(Some(&workflow));
        existing
      }
      Err(braid_store::StoreError::NotFound(_)) => workflow,
      Err(e) => return Err(e.into()),
    };

    self.inner.store.save_workflow(&merged).await?;
    let merged = Arc::new(merged);
    self
      .inner
      .workflows
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(merged.workflow_id.clone(), merged.clone());

    info!(nodes = merged.nodes.len(), "workflow_deployed");
    Ok(merged)
  }

  /// Start an execution of a deployed workflow with `data` as the initial
  /// context data. Returns the new execution's id.
  ///
  /// Each root node gets a node execution. When a root is a START node, its
  /// completion renews the execution into a fresh run; the started
  /// execution then only records that trigger.
  #[instrument(
    name = "orchestrator_start",
    skip(self, workflow_id, data),
    fields(workflow_id = %workflow_id)
  )]
  pub async fn start(
    &self,
    workflow_id: &str,
    data: Map<String, Value>,
  ) -> Result<String, EngineError> {
    let workflow = self.workflow(workflow_id).await?;

    let mut execution = WorkflowExecution::new(workflow_id);
    let seed = Context::with_data(data);
    let mut roots = Vec::with_capacity(workflow.root_ids.len());
    for root in workflow.roots() {
      let context = child_context(&workflow, None, root, &seed);
      roots.push(execution.add_root(root.id.clone(), context));
    }

    let execution_id = execution.execution_id.clone();
    self.inner.table.insert(execution);
    self.inner.persist(&execution_id);

    info!(execution_id = %execution_id, roots = roots.len(), "workflow_started");
    self.inner.notifier.notify(ExecutionEvent::WorkflowStarted {
      execution_id: execution_id.clone(),
      workflow_id: workflow_id.to_string(),
      triggered_by: None,
    });

    for root in &roots {
      self.inner.activate(&execution_id, root);
    }
    Ok(execution_id)
  }

  async fn workflow(&self, workflow_id: &str) -> Result<Arc<Workflow>, EngineError> {
    if let Some(workflow) = self.inner.cached_workflow(workflow_id) {
      return Ok(workflow);
    }

    let workflow = match self.inner.store.find_workflow(workflow_id).await {
      Ok(workflow) => Arc::new(workflow),
      Err(braid_store::StoreError::NotFound(_)) => {
        return Err(EngineError::WorkflowNotFound(workflow_id.to_string()));
      }
      Err(e) => return Err(e.into()),
    };
    self
      .inner
      .workflows
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(workflow_id.to_string(), workflow.clone());
    Ok(workflow)
  }

  /// Current state of a live execution, or the stored one.
  pub async fn execution(&self, execution_id: &str) -> Result<WorkflowExecution, EngineError> {
    match self.inner.table.snapshot(execution_id) {
      Ok(execution) => Ok(execution),
      Err(_) => self
        .inner
        .store
        .find_by_id(execution_id)
        .await
        .map_err(|_| EngineError::ExecutionNotFound(execution_id.to_string())),
    }
  }

  /// Wait until every snapshot persisted so far has reached the store.
  pub async fn flush(&self) {
    let (tx, rx) = oneshot::channel();
    if self.inner.persist.send(Persist::Flush(tx)).is_ok() {
      let _ = rx.await;
    }
  }

  /// Stop listening for remote responses.
  pub fn shutdown(&self) {
    self.inner.cancel.cancel();
  }

  pub fn store(&self) -> Arc<dyn Store> {
    self.inner.store.clone()
  }
}

impl<N: ExecutionNotifier + 'static> Drop for Orchestrator<N> {
  fn drop(&mut self) {
    self.inner.cancel.cancel();
  }
}

/// What a node execution needs to be dispatched.
struct Prepared {
  workflow: Arc<Workflow>,
  node: WorkflowNode,
  scope: NodeScope,
  context: Context,
}

impl<N: ExecutionNotifier + 'static> Inner<N> {
  fn cached_workflow(&self, workflow_id: &str) -> Option<Arc<Workflow>> {
    self
      .workflows
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .get(workflow_id)
      .cloned()
  }

  fn logger(&self, scope: &NodeScope) -> NodeLogger {
    NodeLogger::new(scope.clone(), self.sink.clone())
  }

  fn persist(&self, execution_id: &str) {
    match self.table.snapshot(execution_id) {
      Ok(snapshot) => {
        let _ = self.persist.send(Persist::Save(Box::new(snapshot)));
      }
      Err(e) => warn!(execution_id = %execution_id, error = %e, "persist_skipped"),
    }
  }

  /// Mark a node execution WORKING and collect what dispatching it needs.
  ///
  /// Returns `None` for a node execution that is already DONE, such as a
  /// join arrival closed by a group that fired before it was activated.
  fn prepare(
    &self,
    execution_id: &str,
    node_execution_id: &str,
  ) -> Result<Option<Prepared>, EngineError> {
    type Claimed = Option<(String, String, Context)>;
    let claimed = self.table.with_execution(execution_id, |execution| {
      let workflow_id = execution.workflow_id.clone();
      let node_execution = execution
        .node_mut(node_execution_id)
        .ok_or_else(|| EngineError::ExecutionNotFound(node_execution_id.to_string()))?;
      if node_execution.is_done() {
        return Ok::<Claimed, EngineError>(None);
      }
      node_execution.state = NodeState::Working;
      Ok::<Claimed, EngineError>(Some((
        workflow_id,
        node_execution.node_id.clone(),
        node_execution.context.clone(),
      )))
    })??;
    let Some((workflow_id, node_id, context)) = claimed else {
      return Ok(None);
    };

    let workflow = self
      .cached_workflow(&workflow_id)
      .ok_or_else(|| EngineError::WorkflowNotFound(workflow_id.clone()))?;
    let node = workflow
      .node(&node_id)
      .cloned()
      .ok_or_else(|| EngineError::WorkflowNotFound(format!("{workflow_id}/{node_id}")))?;

    let mut context = context;
    context.set_state(node.route_key(), NodeState::Working);
    let scope = NodeScope::new(workflow_id, execution_id, node_id, node_execution_id);
    Ok(Some(Prepared {
      workflow,
      node,
      scope,
      context,
    }))
  }

  /// Begin the cycle of one node execution.
  fn activate(self: &Arc<Self>, execution_id: &str, node_execution_id: &str) {
    let prepared = match self.prepare(execution_id, node_execution_id) {
      Ok(Some(prepared)) => prepared,
      Ok(None) => {
        debug!(
          execution_id = %execution_id,
          node_execution_id = %node_execution_id,
          "node_already_done"
        );
        return;
      }
      Err(e) => {
        error!(
          execution_id = %execution_id,
          node_execution_id = %node_execution_id,
          error = %e,
          "node_activation_failed"
        );
        return;
      }
    };

    let scope = prepared.scope.clone();
    debug!(
      execution_id = %scope.execution_id,
      node_id = %scope.node_id,
      node_execution_id = %scope.node_execution_id,
      node_type = ?prepared.node.node_type,
      "node_started"
    );
    self.notifier.notify(ExecutionEvent::NodeStarted {
      execution_id: scope.execution_id.clone(),
      node_id: scope.node_id.clone(),
      node_execution_id: scope.node_execution_id.clone(),
    });

    if prepared.node.is_type(NodeType::Wait) {
      self.enter_join(prepared);
      return;
    }

    let request = DispatchRequest {
      scope: scope.clone(),
      component: prepared.node.component.clone(),
      config: prepared.node.config.clone(),
      context: prepared.context,
      repeatable: prepared.node.is_type(NodeType::Start),
    };
    let emitter = Arc::new(NodeEmitter {
      inner: self.clone(),
      request: request.clone(),
      phase: Phase::Activate,
      logger: self.logger(&scope),
    });
    self.dispatcher.activate(request, emitter);
  }

  fn invoke(self: &Arc<Self>, mut request: DispatchRequest, context: Context) {
    request.context = context;
    let emitter = Arc::new(NodeEmitter {
      inner: self.clone(),
      request: request.clone(),
      phase: Phase::Run,
      logger: self.logger(&request.scope),
    });
    self.dispatcher.run(request, emitter);
  }

  /// Close a node execution and activate whatever it spawned.
  fn complete(self: &Arc<Self>, scope: &NodeScope, context: Context) {
    let Some(workflow) = self.cached_workflow(&scope.workflow_id) else {
      error!(workflow_id = %scope.workflow_id, "workflow_not_loaded");
      return;
    };
    let data = Value::Object(context.data().clone());

    let navigation = self.table.with_execution(&scope.execution_id, |execution| {
      navigate(&workflow, execution, &scope.node_execution_id, context)
    });
    let navigation = match navigation {
      Ok(Ok(navigation)) => navigation,
      Ok(Err(e)) => {
        self.fail(scope, DispatchError::Component(e.to_string()));
        return;
      }
      Err(e) => {
        warn!(
          execution_id = %scope.execution_id,
          node_execution_id = %scope.node_execution_id,
          error = %e,
          "node_completion_dropped"
        );
        return;
      }
    };

    info!(
      execution_id = %scope.execution_id,
      node_id = %scope.node_id,
      node_execution_id = %scope.node_execution_id,
      spawned = navigation.spawned.len(),
      "node_completed"
    );
    self.notifier.notify(ExecutionEvent::NodeCompleted {
      execution_id: scope.execution_id.clone(),
      node_id: scope.node_id.clone(),
      node_execution_id: scope.node_execution_id.clone(),
      data,
    });

    if let Some(run) = navigation.renewed {
      // The carrier stays in progress: its START may trigger again.
      self.persist(&scope.execution_id);

      let run_id = run.execution_id.clone();
      self.table.insert(run);
      info!(
        execution_id = %run_id,
        triggered_by = %scope.execution_id,
        "workflow_started"
      );
      self.notifier.notify(ExecutionEvent::WorkflowStarted {
        execution_id: run_id,
        workflow_id: scope.workflow_id.clone(),
        triggered_by: Some(scope.execution_id.clone()),
      });
    }
    self.persist(&navigation.execution_id);

    if navigation.completed {
      info!(execution_id = %navigation.execution_id, "workflow_completed");
      self.notifier.notify(ExecutionEvent::WorkflowCompleted {
        execution_id: navigation.execution_id.clone(),
      });
    }

    for id in &navigation.spawned {
      self.activate(&navigation.execution_id, id);
    }
  }

  fn fail(&self, scope: &NodeScope, error: DispatchError) {
    error!(
      execution_id = %scope.execution_id,
      node_id = %scope.node_id,
      node_execution_id = %scope.node_execution_id,
      error = %error,
      "node_failed"
    );
    self.logger(scope).error(error.to_string());
    self.notifier.notify(ExecutionEvent::NodeFailed {
      execution_id: scope.execution_id.clone(),
      node_id: scope.node_id.clone(),
      node_execution_id: scope.node_execution_id.clone(),
      error: error.to_string(),
    });
    self.persist(&scope.execution_id);
  }

  fn join_config(workflow: &Workflow, node: &WorkflowNode) -> Result<JoinConfig, JoinError> {
    let parents: Vec<String> = workflow
      .parents_of(&node.id)
      .iter()
      .map(|parent| parent.route_key().to_string())
      .collect();
    JoinConfig::parse(&node.config, &parents)
  }

  /// Activation and invocation of a WAIT node.
  fn enter_join(self: &Arc<Self>, prepared: Prepared) {
    let Prepared {
      workflow,
      node,
      scope,
      context,
    } = prepared;
    let join_key = node.route_key();

    let config = match Self::join_config(&workflow, &node) {
      Ok(config) => config,
      Err(e) => {
        self.fail(&scope, DispatchError::InvalidConfig(e.to_string()));
        return;
      }
    };

    if !self.joins.activate(&config, join_key, &context) {
      info!(
        execution_id = %scope.execution_id,
        node_execution_id = %scope.node_execution_id,
        join_key = %join_key,
        "join_activation_refused"
      );
      let reset = self.table.with_execution(&scope.execution_id, |execution| {
        if let Some(node_execution) = execution.node_mut(&scope.node_execution_id) {
          node_execution.state = NodeState::Idle;
        }
      });
      if let Err(e) = reset {
        warn!(
          execution_id = %scope.execution_id,
          node_execution_id = %scope.node_execution_id,
          error = %e,
          "join_reset_dropped"
        );
        return;
      }
      self.persist(&scope.execution_id);
      return;
    }

    let stamped = self
      .table
      .with_execution(&scope.execution_id, |execution| {
        execution
          .stamp_arrival(&scope.node_execution_id)
          .map_err(EngineError::from)
      })
      .map_err(EngineError::from)
      .and_then(|stamped| stamped);
    if let Err(e) = stamped {
      warn!(execution_id = %scope.execution_id, error = %e, "join_arrival_dropped");
      return;
    }

    let outcome = self.joins.run(JoinRequest {
      execution_id: &scope.execution_id,
      node_id: &scope.node_id,
      join_key,
      node_execution_id: &scope.node_execution_id,
      config: &config,
    });

    match outcome {
      Ok(JoinOutcome::Fired(merged)) => {
        self.notifier.notify(ExecutionEvent::JoinFired {
          execution_id: scope.execution_id.clone(),
          node_id: scope.node_id.clone(),
          node_execution_id: scope.node_execution_id.clone(),
        });
        self.complete(&scope, merged);
      }
      Ok(JoinOutcome::Waiting { found }) => {
        self.logger(&scope).info(format!(
          "waiting at {join_key}: found {found:?} of {:?}",
          config.awaited
        ));
        self.notifier.notify(ExecutionEvent::JoinWaiting {
          execution_id: scope.execution_id.clone(),
          node_id: scope.node_id.clone(),
          node_execution_id: scope.node_execution_id.clone(),
          found: found.into_iter().collect(),
        });
        self.persist(&scope.execution_id);
      }
      Ok(JoinOutcome::Absorbed) => {
        self.persist(&scope.execution_id);
      }
      Err(JoinError::Lookup(e)) => {
        // The arrival stays where it is; a later arrival re-evaluates.
        warn!(
          execution_id = %scope.execution_id,
          node_execution_id = %scope.node_execution_id,
          error = %e,
          "join_lookup_failed"
        );
      }
      Err(e) => self.fail(&scope, DispatchError::Component(e.to_string())),
    }
  }
}

/// Routes the outcome of one component call back into the orchestrator.
struct NodeEmitter<N: ExecutionNotifier + 'static> {
  inner: Arc<Inner<N>>,
  request: DispatchRequest,
  phase: Phase,
  logger: NodeLogger,
}

impl<N: ExecutionNotifier + 'static> Emitter for NodeEmitter<N> {
  fn success(&self, context: Context) {
    match self.phase {
      Phase::Activate => self.inner.invoke(self.request.clone(), context),
      Phase::Run => self.inner.complete(&self.request.scope, context),
    }
  }

  fn failure(&self, error: DispatchError) {
    self.inner.fail(&self.request.scope, error);
  }

  fn logger(&self) -> NodeLogger {
    self.logger.clone()
  }
}

async fn run_persister(store: Arc<dyn Store>, mut receiver: mpsc::UnboundedReceiver<Persist>) {
  while let Some(command) = receiver.recv().await {
    match command {
      Persist::Save(execution) => {
        if let Err(e) = store.save(&execution).await {
          error!(
            execution_id = %execution.execution_id,
            error = %e,
            "execution_persist_failed"
          );
        }
      }
      Persist::Flush(done) => {
        let _ = done.send(());
      }
    }
  }
}
