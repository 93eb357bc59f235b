use std::sync::Arc;

use async_trait::async_trait;
use braid_context::Context;

use crate::emitter::Emitter;
use crate::error::DispatchError;

/// A pluggable implementation of workflow steps.
///
/// One instance serves one actor (the node it is bound to) and is reused for
/// every execution of that node.
#[async_trait]
pub trait Component: Send + Sync {
  /// Apply the node's configuration. Called once, before first use.
  fn configure(&mut self, _config: &serde_json::Value) -> Result<(), DispatchError> {
    Ok(())
  }

  /// Decide whether the node may run with `context`.
  ///
  /// The default always agrees and hands the context back unchanged.
  async fn can_activate(&self, context: Context, emitter: Arc<dyn Emitter>) {
    emitter.success(context);
  }

  /// Perform the step and report the resulting context.
  async fn run(&self, context: Context, emitter: Arc<dyn Emitter>);
}

/// Builds fresh component instances.
pub trait ComponentFactory: Send + Sync {
  fn create(&self) -> Box<dyn Component>;
}

impl<F> ComponentFactory for F
where
  F: Fn() -> Box<dyn Component> + Send + Sync,
{
  fn create(&self) -> Box<dyn Component> {
    self()
  }
}
