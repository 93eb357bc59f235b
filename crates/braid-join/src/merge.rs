use braid_context::Context;

use crate::config::MergeStrategy;

/// Merge branch contexts, given in arrival order, into one.
///
/// Histories and decisions are unioned: one record per key with parent sets
/// merged, one decision per key. Data keys present in several contexts are
/// resolved by `strategy`.
pub fn merge_contexts<'a, I>(contexts: I, strategy: MergeStrategy) -> Context
where
  I: IntoIterator<Item = &'a Context>,
{
  let overwrite = strategy == MergeStrategy::PickLast;
  let mut merged = Context::new();
  for context in contexts {
    merged.merge_history(context);
    merged.merge_data(context, overwrite);
  }
  merged
}
