/// Configuration for the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
  /// Capacity of the remote dispatch event bus.
  pub event_buffer: usize,
  /// Capacity of a [`crate::WorkflowRunner`]'s trigger channel.
  pub runner_buffer: usize,
}

impl Default for OrchestratorConfig {
  fn default() -> Self {
    Self {
      event_buffer: 256,
      runner_buffer: 100,
    }
  }
}
