//! Serving component requests published on the event bus.

use std::sync::Arc;

use braid_context::Context;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::bus::EventBus;
use crate::component::Component;
use crate::dispatcher::Phase;
use crate::emitter::{Emitter, OnceEmitter, Outcome};
use crate::error::DispatchError;
use crate::events::{EventHeader, RemoteEvent};
use crate::logger::{LogSink, NodeLogger};
use crate::registry::ComponentRegistry;

/// Answers activation and invocation requests from its own registry.
///
/// This is the other end of [`crate::Dispatcher`]'s remote route: a process
/// hosting components subscribes to the shared bus and replies with
/// correlated response events.
pub struct RemoteRuntime {
  registry: Arc<ComponentRegistry>,
  bus: EventBus,
  sink: Arc<dyn LogSink>,
}

impl RemoteRuntime {
  pub fn new(registry: Arc<ComponentRegistry>, bus: EventBus, sink: Arc<dyn LogSink>) -> Self {
    Self {
      registry,
      bus,
      sink,
    }
  }

  /// Start serving requests until `cancel` fires or the bus closes.
  pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
    let mut receiver = self.bus.subscribe();
    tokio::spawn(async move {
      info!(
        components = self.registry.component_ids().count(),
        "remote_runtime_started"
      );
      loop {
        let event = tokio::select! {
          _ = cancel.cancelled() => break,
          event = receiver.recv() => event,
        };

        match event {
          Ok(event) => self.serve(event),
          Err(RecvError::Lagged(skipped)) => warn!(skipped, "remote_runtime_lagged"),
          Err(RecvError::Closed) => break,
        }
      }
      info!("remote_runtime_stopped");
    })
  }

  fn serve(&self, event: RemoteEvent) {
    let (phase, header, component_id, config, context, repeatable) = match event {
      RemoteEvent::ActivationRequest {
        header,
        component,
        config,
        context,
      } => (Phase::Activate, header, component, config, context, false),
      RemoteEvent::InvocationRequest {
        header,
        component,
        config,
        context,
        repeatable,
      } => (Phase::Run, header, component, config, context, repeatable),
      _ => return,
    };

    let reply: Arc<dyn Emitter> = Arc::new(ReplyEmitter {
      bus: self.bus.clone(),
      request: header.clone(),
      phase,
      logger: NodeLogger::new(header.scope.clone(), self.sink.clone()),
    });
    let emitter: Arc<dyn Emitter> = if repeatable {
      reply
    } else {
      OnceEmitter::wrap(reply)
    };

    if !self.registry.contains(&component_id) {
      error!(
        component = %component_id,
        correlation_id = %header.correlation_id,
        "remote_component_not_found"
      );
      emitter.failure(DispatchError::ComponentNotFound(component_id));
      return;
    }

    let component = match self
      .registry
      .instance(&component_id, &header.scope.node_id, &config)
    {
      Ok(component) => component,
      Err(e) => {
        emitter.failure(e);
        return;
      }
    };

    let task_emitter = emitter.clone();
    let handle = tokio::spawn(async move {
      call(component.as_ref(), phase, context, task_emitter).await;
    });
    tokio::spawn(async move {
      if let Err(e) = handle.await {
        emitter.failure(DispatchError::Interrupted(e.to_string()));
      }
    });
  }
}

async fn call(
  component: &dyn Component,
  phase: Phase,
  context: Context,
  emitter: Arc<dyn Emitter>,
) {
  match phase {
    Phase::Activate => component.can_activate(context, emitter).await,
    Phase::Run => component.run(context, emitter).await,
  }
}

/// Publishes the outcome of a served request as its response event.
struct ReplyEmitter {
  bus: EventBus,
  request: EventHeader,
  phase: Phase,
  logger: NodeLogger,
}

impl ReplyEmitter {
  fn reply(&self, outcome: Outcome) {
    let header = self.request.reply();
    let event = match self.phase {
      Phase::Activate => RemoteEvent::ActivationResponse { header, outcome },
      Phase::Run => RemoteEvent::InvocationResponse { header, outcome },
    };
    self.bus.publish(event);
  }
}

impl Emitter for ReplyEmitter {
  fn success(&self, context: Context) {
    self.reply(Outcome::Success(context));
  }

  fn failure(&self, error: DispatchError) {
    self.logger.error(error.to_string());
    self.reply(Outcome::Failure(error));
  }

  fn logger(&self) -> NodeLogger {
    self.logger.clone()
  }
}
