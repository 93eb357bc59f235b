use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::JoinError;

/// When a join fires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitMode {
  /// Every awaited key must be found.
  #[default]
  All,
  /// At least `threshold` awaited keys must be found.
  Threshold,
}

/// How conflicting data keys are resolved when arrivals are merged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
  /// The earliest arrival's value wins.
  PickFirst,
  /// The latest arrival's value wins.
  #[default]
  PickLast,
}

#[derive(Debug, Default, Deserialize)]
struct RawJoinConfig {
  #[serde(default, rename = "await")]
  awaited: Option<Vec<String>>,
  #[serde(default)]
  mode: WaitMode,
  #[serde(default)]
  threshold: Option<usize>,
  #[serde(default)]
  merge: MergeStrategy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinConfig {
  /// Node keys the join waits for, in declaration order.
  #[serde(rename = "await")]
  pub awaited: Vec<String>,
  pub mode: WaitMode,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub threshold: Option<usize>,
  pub merge: MergeStrategy,
}

impl JoinConfig {
  /// Parse the join's node configuration.
  ///
  /// A missing `await` list defaults to `default_await`, normally the keys
  /// of the join's parents in the definition.
  pub fn parse(config: &serde_json::Value, default_await: &[String]) -> Result<Self, JoinError> {
    let raw: RawJoinConfig = if config.is_null() {
      RawJoinConfig::default()
    } else {
      serde_json::from_value(config.clone()).map_err(|e| JoinError::InvalidConfig(e.to_string()))?
    };

    let mut awaited = raw.awaited.unwrap_or_else(|| default_await.to_vec());
    let mut seen = BTreeSet::new();
    awaited.retain(|key| seen.insert(key.clone()));

    if awaited.is_empty() {
      return Err(JoinError::InvalidConfig(
        "join awaits no keys".to_string(),
      ));
    }

    if raw.mode == WaitMode::Threshold {
      match raw.threshold {
        None => {
          return Err(JoinError::InvalidConfig(
            "threshold mode requires a threshold".to_string(),
          ));
        }
        Some(0) => {
          return Err(JoinError::InvalidConfig(
            "threshold must be at least 1".to_string(),
          ));
        }
        Some(n) if n > awaited.len() => {
          return Err(JoinError::InvalidConfig(format!(
            "threshold {n} exceeds the {} awaited keys",
            awaited.len()
          )));
        }
        Some(_) => {}
      }
    }

    Ok(Self {
      awaited,
      mode: raw.mode,
      threshold: raw.threshold,
      merge: raw.merge,
    })
  }

  /// Awaited keys present in `found`.
  pub fn matched<'a>(&'a self, found: &BTreeSet<String>) -> impl Iterator<Item = &'a str> {
    self
      .awaited
      .iter()
      .filter(|key| found.contains(*key))
      .map(String::as_str)
  }

  /// Whether the wait mode is met by the keys in `found`.
  pub fn is_satisfied(&self, found: &BTreeSet<String>) -> bool {
    let matched = self.matched(found).count();
    match self.mode {
      WaitMode::All => matched == self.awaited.len(),
      WaitMode::Threshold => matched >= self.threshold.unwrap_or(self.awaited.len()),
    }
  }
}
