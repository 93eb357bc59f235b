use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::component::{Component, ComponentFactory};
use crate::error::DispatchError;

/// Cache key for configured component instances.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
struct InstanceKey {
  component_id: String,
  actor: String,
}

/// Component factories by id, plus the instances built from them.
#[derive(Default)]
pub struct ComponentRegistry {
  factories: HashMap<String, Arc<dyn ComponentFactory>>,
  instances: RwLock<HashMap<InstanceKey, Arc<dyn Component>>>,
}

impl ComponentRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a factory under `component_id`, replacing any previous one.
  pub fn register(
    &mut self,
    component_id: impl Into<String>,
    factory: impl ComponentFactory + 'static,
  ) -> &mut Self {
    self.factories.insert(component_id.into(), Arc::new(factory));
    self
  }

  pub fn contains(&self, component_id: &str) -> bool {
    self.factories.contains_key(component_id)
  }

  pub fn component_ids(&self) -> impl Iterator<Item = &str> {
    self.factories.keys().map(String::as_str)
  }

  /// Get the instance serving `actor`, or build and configure one.
  pub fn instance(
    &self,
    component_id: &str,
    actor: &str,
    config: &serde_json::Value,
  ) -> Result<Arc<dyn Component>, DispatchError> {
    let key = InstanceKey {
      component_id: component_id.to_string(),
      actor: actor.to_string(),
    };

    // Try read lock first
    {
      let instances = self.instances.read().unwrap_or_else(PoisonError::into_inner);
      if let Some(instance) = instances.get(&key) {
        return Ok(instance.clone());
      }
    }

    let factory = self
      .factories
      .get(component_id)
      .ok_or_else(|| DispatchError::ComponentNotFound(component_id.to_string()))?;
    let mut component = factory.create();
    component.configure(config)?;
    let component: Arc<dyn Component> = Arc::from(component);

    let mut instances = self.instances.write().unwrap_or_else(PoisonError::into_inner);
    // Another caller may have built the same actor meanwhile; keep theirs.
    let instance = instances.entry(key).or_insert_with(|| {
      debug!(component_id, actor, "component_instance_created");
      component
    });
    Ok(instance.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::emitter::Emitter;
  use async_trait::async_trait;
  use braid_context::Context;
  use serde_json::json;
  use std::sync::atomic::{AtomicUsize, Ordering};

  struct Greeter {
    greeting: String,
  }

  #[async_trait]
  impl Component for Greeter {
    fn configure(&mut self, config: &serde_json::Value) -> Result<(), DispatchError> {
      self.greeting = config["greeting"]
        .as_str()
        .ok_or_else(|| DispatchError::InvalidConfig("greeting is required".to_string()))?
        .to_string();
      Ok(())
    }

    async fn run(&self, mut context: Context, emitter: Arc<dyn Emitter>) {
      context.insert("greeting", json!(self.greeting));
      emitter.success(context);
    }
  }

  fn greeter() -> Box<dyn Component> {
    Box::new(Greeter {
      greeting: String::new(),
    })
  }

  #[test]
  fn test_instances_cached_per_actor() {
    static CREATED: AtomicUsize = AtomicUsize::new(0);
    let mut registry = ComponentRegistry::new();
    registry.register("greeter", || {
      CREATED.fetch_add(1, Ordering::SeqCst);
      greeter()
    });

    let config = json!({ "greeting": "hi" });
    let a1 = registry.instance("greeter", "node-a", &config).unwrap();
    let a2 = registry.instance("greeter", "node-a", &config).unwrap();
    let b = registry.instance("greeter", "node-b", &config).unwrap();

    assert!(Arc::ptr_eq(&a1, &a2));
    assert!(!Arc::ptr_eq(&a1, &b));
    assert_eq!(CREATED.load(Ordering::SeqCst), 2);
  }

  #[test]
  fn test_unknown_component() {
    let registry = ComponentRegistry::new();
    let err = registry
      .instance("missing", "node", &serde_json::Value::Null)
      .err()
      .unwrap();
    assert_eq!(err, DispatchError::ComponentNotFound("missing".to_string()));
  }

  #[test]
  fn test_configuration_errors_are_not_cached() {
    let mut registry = ComponentRegistry::new();
    registry.register("greeter", greeter);

    let err = registry
      .instance("greeter", "node", &json!({}))
      .err()
      .unwrap();
    assert!(matches!(err, DispatchError::InvalidConfig(_)));

    assert!(
      registry
        .instance("greeter", "node", &json!({ "greeting": "hello" }))
        .is_ok()
    );
  }
}
