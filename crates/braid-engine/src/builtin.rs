//! Components shipped with the engine.
//!
//! | id       | config                                  | effect                          |
//! |----------|-----------------------------------------|---------------------------------|
//! | `set`    | object of values                        | inserts every value into data   |
//! | `log`    | `{ "message": string }`                 | writes an info record           |
//! | `switch` | `{ "field", "cases", "default" }`       | selects a decision option       |
//! | `delay`  | `{ "ms": integer }`                     | sleeps before completing        |

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use braid_context::{Context, NodeState};
use braid_dispatch::{Component, ComponentRegistry, DispatchError, Emitter};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Register every built-in component under its id.
pub fn register_builtins(registry: &mut ComponentRegistry) -> &mut ComponentRegistry {
  registry
    .register("set", || Box::new(SetComponent::default()) as Box<dyn Component>)
    .register("log", || Box::new(LogComponent::default()) as Box<dyn Component>)
    .register("switch", || Box::new(SwitchComponent::default()) as Box<dyn Component>)
    .register("delay", || Box::new(DelayComponent::default()) as Box<dyn Component>)
}

fn invalid(component: &str, e: impl std::fmt::Display) -> DispatchError {
  DispatchError::InvalidConfig(format!("{component}: {e}"))
}

#[derive(Default)]
struct SetComponent {
  values: Map<String, Value>,
}

#[async_trait]
impl Component for SetComponent {
  fn configure(&mut self, config: &Value) -> Result<(), DispatchError> {
    self.values = match config {
      Value::Null => Map::new(),
      Value::Object(values) => values.clone(),
      other => return Err(invalid("set", format!("expected an object, got {other}"))),
    };
    Ok(())
  }

  async fn run(&self, mut context: Context, emitter: Arc<dyn Emitter>) {
    for (key, value) in &self.values {
      context.insert(key.clone(), value.clone());
    }
    emitter.success(context);
  }
}

#[derive(Default, Deserialize)]
struct LogComponent {
  #[serde(default)]
  message: Option<String>,
}

#[async_trait]
impl Component for LogComponent {
  fn configure(&mut self, config: &Value) -> Result<(), DispatchError> {
    if !config.is_null() {
      *self = serde_json::from_value(config.clone()).map_err(|e| invalid("log", e))?;
    }
    Ok(())
  }

  async fn run(&self, context: Context, emitter: Arc<dyn Emitter>) {
    let message = match &self.message {
      Some(message) => message.clone(),
      None => Value::Object(context.data().clone()).to_string(),
    };
    emitter.logger().info(message);
    emitter.success(context);
  }
}

/// Routes a DECISION node on one data field.
///
/// `cases` maps field values to option keys; a string field is matched as
/// is, any other value by its JSON text. Without a matching case the
/// `default` option is selected, if any.
#[derive(Default, Deserialize)]
struct SwitchComponent {
  field: String,
  #[serde(default)]
  cases: HashMap<String, String>,
  #[serde(default)]
  default: Option<String>,
  /// Decision key; the node being run when unset.
  #[serde(default)]
  decision: Option<String>,
}

impl SwitchComponent {
  fn option_for(&self, context: &Context) -> Option<&str> {
    let value = context.get(&self.field).map(|value| match value {
      Value::String(s) => s.clone(),
      other => other.to_string(),
    });
    value
      .and_then(|value| self.cases.get(&value))
      .or(self.default.as_ref())
      .map(String::as_str)
  }

  fn decision_key(&self, context: &Context) -> Option<String> {
    self.decision.clone().or_else(|| {
      context
        .graph()
        .iter()
        .find(|node| node.state == NodeState::Working)
        .map(|node| node.key.clone())
    })
  }
}

#[async_trait]
impl Component for SwitchComponent {
  fn configure(&mut self, config: &Value) -> Result<(), DispatchError> {
    *self = serde_json::from_value(config.clone()).map_err(|e| invalid("switch", e))?;
    Ok(())
  }

  async fn run(&self, mut context: Context, emitter: Arc<dyn Emitter>) {
    let Some(key) = self.decision_key(&context) else {
      emitter.failure(DispatchError::Component(
        "switch: no decision to make".to_string(),
      ));
      return;
    };

    match self.option_for(&context).map(str::to_string) {
      Some(option) => {
        emitter
          .logger()
          .debug(format!("{key}: {} selects {option}", self.field));
        context.decide(&key, option, true);
      }
      None => emitter
        .logger()
        .warn(format!("{key}: no case for {}, nothing selected", self.field)),
    }
    emitter.success(context);
  }
}

#[derive(Default, Deserialize)]
struct DelayComponent {
  #[serde(default)]
  ms: u64,
}

#[async_trait]
impl Component for DelayComponent {
  fn configure(&mut self, config: &Value) -> Result<(), DispatchError> {
    if !config.is_null() {
      *self = serde_json::from_value(config.clone()).map_err(|e| invalid("delay", e))?;
    }
    Ok(())
  }

  async fn run(&self, context: Context, emitter: Arc<dyn Emitter>) {
    tokio::time::sleep(Duration::from_millis(self.ms)).await;
    emitter.success(context);
  }
}
