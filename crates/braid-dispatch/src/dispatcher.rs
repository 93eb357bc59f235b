//! Routing of component calls to local instances or the event bus.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use braid_context::Context;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::EventBus;
use crate::emitter::{Emitter, OnceEmitter, Outcome};
use crate::error::DispatchError;
use crate::events::{EventHeader, NodeScope, RemoteEvent};
use crate::registry::ComponentRegistry;

/// Which of the two component calls is being made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  Activate,
  Run,
}

/// Everything needed to call a node's component.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
  pub scope: NodeScope,
  /// Component reference; `None` makes the node pass-through.
  pub component: Option<String>,
  pub config: serde_json::Value,
  pub context: Context,
  /// Let the run report success more than once, as a long-lived START
  /// component does for every run it triggers.
  pub repeatable: bool,
}

struct PendingCall {
  emitter: Arc<dyn Emitter>,
  repeatable: bool,
}

type Pending = Arc<Mutex<HashMap<String, PendingCall>>>;

/// Sends component calls to where the component lives.
///
/// Registered components run as tasks on the tokio pool. Other references
/// are published as requests on the [`EventBus`]; the matching response is
/// delivered to the emitter waiting on its correlation id.
pub struct Dispatcher {
  registry: Arc<ComponentRegistry>,
  bus: EventBus,
  pending: Pending,
  listener: JoinHandle<()>,
}

impl Dispatcher {
  /// Create a dispatcher and start listening for remote responses.
  ///
  /// Must be called from within a tokio runtime. The listener stops when
  /// `cancel` fires or the bus closes.
  pub fn new(registry: Arc<ComponentRegistry>, bus: EventBus, cancel: CancellationToken) -> Self {
    let pending: Pending = Arc::default();
    let listener = tokio::spawn(listen(bus.subscribe(), pending.clone(), cancel));
    Self {
      registry,
      bus,
      pending,
      listener,
    }
  }

  /// Ask the node's component whether it can activate.
  pub fn activate(&self, request: DispatchRequest, emitter: Arc<dyn Emitter>) {
    self.dispatch(Phase::Activate, request, emitter);
  }

  /// Run the node's component.
  pub fn run(&self, request: DispatchRequest, emitter: Arc<dyn Emitter>) {
    self.dispatch(Phase::Run, request, emitter);
  }

  /// Call the component for `phase`.
  ///
  /// The emitter sees exactly one outcome, except for repeatable runs, which
  /// may succeed any number of times.
  pub fn dispatch(&self, phase: Phase, request: DispatchRequest, emitter: Arc<dyn Emitter>) {
    let repeatable = request.repeatable && phase == Phase::Run;
    let emitter: Arc<dyn Emitter> = if repeatable {
      emitter
    } else {
      OnceEmitter::wrap(emitter)
    };

    let Some(component_id) = request.component.as_deref() else {
      emitter.success(request.context);
      return;
    };

    if self.registry.contains(component_id) {
      self.dispatch_local(phase, component_id, &request, emitter);
    } else {
      self.dispatch_remote(phase, component_id.to_string(), request, emitter);
    }
  }

  fn dispatch_local(
    &self,
    phase: Phase,
    component_id: &str,
    request: &DispatchRequest,
    emitter: Arc<dyn Emitter>,
  ) {
    let component =
      match self
        .registry
        .instance(component_id, &request.scope.node_id, &request.config)
      {
        Ok(component) => component,
        Err(e) => {
          emitter.failure(e);
          return;
        }
      };

    debug!(
      component_id,
      node_execution_id = %request.scope.node_execution_id,
      phase = ?phase,
      "dispatch_local"
    );

    let context = request.context.clone();
    let task_emitter = emitter.clone();
    let handle = tokio::spawn(async move {
      match phase {
        Phase::Activate => component.can_activate(context, task_emitter).await,
        Phase::Run => component.run(context, task_emitter).await,
      }
    });

    // Panics and cancellation surface as a join error.
    tokio::spawn(async move {
      if let Err(e) = handle.await {
        emitter.failure(DispatchError::Interrupted(e.to_string()));
      }
    });
  }

  fn dispatch_remote(
    &self,
    phase: Phase,
    component: String,
    request: DispatchRequest,
    emitter: Arc<dyn Emitter>,
  ) {
    // The listener is always subscribed; anyone else could be a runtime.
    if self.bus.subscriber_count() <= 1 {
      warn!(
        component = %component,
        node_execution_id = %request.scope.node_execution_id,
        phase = ?phase,
        "dispatch_no_remote_runtime"
      );
      emitter.failure(DispatchError::ComponentNotFound(component));
      return;
    }

    let repeatable = request.repeatable && phase == Phase::Run;
    let header = EventHeader::request(request.scope);
    self
      .pending
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(
        header.correlation_id.clone(),
        PendingCall {
          emitter,
          repeatable,
        },
      );

    info!(
      component = %component,
      correlation_id = %header.correlation_id,
      node_execution_id = %header.scope.node_execution_id,
      phase = ?phase,
      "dispatch_remote"
    );

    let event = match phase {
      Phase::Activate => RemoteEvent::ActivationRequest {
        header,
        component,
        config: request.config,
        context: request.context,
      },
      Phase::Run => RemoteEvent::InvocationRequest {
        header,
        component,
        config: request.config,
        context: request.context,
        repeatable,
      },
    };
    self.bus.publish(event);
  }

  /// Number of remote calls still waiting for a response.
  pub fn pending_count(&self) -> usize {
    self
      .pending
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .len()
  }

  pub fn registry(&self) -> &ComponentRegistry {
    &self.registry
  }
}

impl Drop for Dispatcher {
  fn drop(&mut self) {
    self.listener.abort();
  }
}

async fn listen(
  mut receiver: broadcast::Receiver<RemoteEvent>,
  pending: Pending,
  cancel: CancellationToken,
) {
  loop {
    let event = tokio::select! {
      _ = cancel.cancelled() => break,
      event = receiver.recv() => event,
    };

    match event {
      Ok(event) => deliver(&pending, event),
      Err(RecvError::Lagged(skipped)) => {
        warn!(skipped, "dispatch_listener_lagged");
      }
      Err(RecvError::Closed) => break,
    }
  }
}

fn deliver(pending: &Pending, event: RemoteEvent) {
  let (header, outcome) = match event {
    RemoteEvent::ActivationResponse { header, outcome }
    | RemoteEvent::InvocationResponse { header, outcome } => (header, outcome),
    _ => return,
  };

  let emitter = {
    let mut pending = pending.lock().unwrap_or_else(PoisonError::into_inner);
    // A repeatable call stays pending until it fails.
    let keep = pending
      .get(&header.correlation_id)
      .is_some_and(|call| call.repeatable && matches!(outcome, Outcome::Success(_)));
    if keep {
      pending
        .get(&header.correlation_id)
        .map(|call| call.emitter.clone())
    } else {
      pending
        .remove(&header.correlation_id)
        .map(|call| call.emitter)
    }
  };

  match emitter {
    Some(emitter) => {
      debug!(
        correlation_id = %header.correlation_id,
        causation_id = ?header.causation_id,
        "remote_response_received"
      );
      emitter.emit(outcome);
    }
    None => debug!(
      correlation_id = %header.correlation_id,
      "remote_response_unmatched"
    ),
  }
}
