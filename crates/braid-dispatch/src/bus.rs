use tokio::sync::broadcast;

use crate::events::RemoteEvent;

/// Event bus using a tokio broadcast channel.
/// All subscribers receive all events.
#[derive(Clone)]
pub struct EventBus {
  tx: broadcast::Sender<RemoteEvent>,
}

impl EventBus {
  pub fn new(capacity: usize) -> Self {
    let (tx, _) = broadcast::channel(capacity);
    Self { tx }
  }

  pub fn publish(&self, event: RemoteEvent) {
    // No subscribers is not an error: the event is simply dropped.
    let _ = self.tx.send(event);
  }

  pub fn subscribe(&self) -> broadcast::Receiver<RemoteEvent> {
    self.tx.subscribe()
  }

  /// Number of live receivers.
  pub fn subscriber_count(&self) -> usize {
    self.tx.receiver_count()
  }
}

impl Default for EventBus {
  fn default() -> Self {
    Self::new(256)
  }
}
