//! Tag-based invalidation of cache entries.
//!
//! Invalidation only flips entry state; nothing is re-fetched here. The next
//! `query` for a stale key runs the executor again.

use super::storage::EntryTable;
use super::traits::{intersects, CacheKey, EntryState, TagSet};

/// Mark every entry whose tags intersect `tags` as stale.
///
/// `on_stale` is called once for each entry that goes from fresh to stale.
/// Entries that are loading remember the tags so the result being fetched
/// is stored stale if it turns out to match. Returns the number of entries
/// that went stale.
pub fn invalidate<F>(entries: &mut EntryTable, tags: &TagSet, mut on_stale: F) -> usize
where
  F: FnMut(&CacheKey),
{
  if tags.is_empty() {
    return 0;
  }

  let mut staled = 0;
  for (key, entry) in entries.iter_mut() {
    match entry.state {
      EntryState::Fresh if intersects(&entry.tags, tags) => {
        entry.state = EntryState::Stale;
        staled += 1;
        on_stale(key);
      }
      EntryState::Loading => {
        if let Some(inflight) = entry.inflight.as_mut() {
          inflight.invalidated.extend(tags.iter().cloned());
        }
      }
      _ => {}
    }
  }
  staled
}
