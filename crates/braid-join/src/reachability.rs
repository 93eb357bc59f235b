//! Which keys a history reaches.

use std::collections::{BTreeMap, BTreeSet};

use braid_context::WorkflowGraphNode;

/// Keys reachable in `history` without passing through `join_key`.
///
/// A key is *clear* when some path leads from it back to a root of the
/// history (an entry without parents, or a parent with no entry of its own)
/// and that path avoids `join_key`. A key met only behind an earlier
/// occurrence of the join, such as a step of a previous loop iteration, is
/// therefore not found. The join key itself is never found.
///
/// Once the join has closed (fired) in this history, only keys entered after
/// that close count towards its next iteration; parents without an entry of
/// their own count only before the first close.
pub fn found_keys(history: &[WorkflowGraphNode], join_key: &str) -> BTreeSet<String> {
  let horizon = history
    .iter()
    .find(|node| node.key == join_key)
    .and_then(|node| node.closed);

  let parents: BTreeMap<&str, &BTreeSet<String>> = history
    .iter()
    .map(|node| (node.key.as_str(), &node.parents))
    .collect();

  let mut universe: BTreeSet<&str> = parents.keys().copied().collect();
  for node in history {
    universe.extend(node.parents.iter().map(String::as_str));
  }

  let mut clear: BTreeSet<&str> = universe
    .iter()
    .copied()
    .filter(|key| *key != join_key)
    .filter(|key| parents.get(key).is_none_or(|p| p.is_empty()))
    .collect();

  loop {
    let newly_clear: Vec<&str> = parents
      .iter()
      .filter(|(key, _)| **key != join_key && !clear.contains(*key))
      .filter(|(_, p)| p.iter().any(|parent| clear.contains(parent.as_str())))
      .map(|(key, _)| *key)
      .collect();

    if newly_clear.is_empty() {
      break;
    }
    clear.extend(newly_clear);
  }

  let entries: BTreeMap<&str, &WorkflowGraphNode> = history
    .iter()
    .map(|node| (node.key.as_str(), node))
    .collect();

  clear
    .into_iter()
    .filter(|key| match horizon {
      None => true,
      Some(horizon) => entries
        .get(key)
        .is_some_and(|node| node.entered_after(horizon)),
    })
    .map(str::to_string)
    .collect()
}
