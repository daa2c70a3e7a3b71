//! In-memory entry table backing the cache.

use chrono::{DateTime, Utc};
use futures::future::Shared;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::traits::{intersects, CacheKey, EntryState, TagSet};
use crate::error::Result;

/// An executor run that every caller for the same key awaits.
pub(crate) type SharedFetch =
  Shared<futures::future::BoxFuture<'static, Result<Arc<Value>>>>;

pub(crate) struct InFlight {
  pub future: SharedFetch,
  /// Tags invalidated while the fetch was running
  pub invalidated: TagSet,
}

/// A cached query result.
pub struct CacheEntry {
  pub(crate) result: Option<Arc<Value>>,
  pub(crate) tags: TagSet,
  pub(crate) state: EntryState,
  pub(crate) fetched_at: Option<DateTime<Utc>>,
  pub(crate) inflight: Option<InFlight>,
}

impl CacheEntry {
  fn empty() -> Self {
    Self {
      result: None,
      tags: TagSet::new(),
      state: EntryState::Loading,
      fetched_at: None,
      inflight: None,
    }
  }

  pub fn state(&self) -> EntryState {
    self.state
  }

  pub fn tags(&self) -> &TagSet {
    &self.tags
  }

  pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
    self.fetched_at
  }
}

impl fmt::Debug for CacheEntry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheEntry")
      .field("result", &self.result)
      .field("tags", &self.tags)
      .field("state", &self.state)
      .field("fetched_at", &self.fetched_at)
      .field("inflight", &self.inflight.is_some())
      .finish()
  }
}

/// Outcome of looking up a key before a read.
pub(crate) enum Lookup {
  Fresh(Arc<Value>, Option<DateTime<Utc>>),
  InFlight(SharedFetch),
  Missing,
}

/// Entry table keyed by cache key. Entries are never evicted.
#[derive(Debug, Default)]
pub struct EntryTable {
  entries: HashMap<CacheKey, CacheEntry>,
}

impl EntryTable {
  pub fn get(&self, key: &CacheKey) -> Option<&CacheEntry> {
    self.entries.get(key)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&CacheKey, &CacheEntry)> {
    self.entries.iter()
  }

  pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (&CacheKey, &mut CacheEntry)> {
    self.entries.iter_mut()
  }

  pub(crate) fn lookup(&self, key: &CacheKey) -> Lookup {
    match self.entries.get(key) {
      Some(entry) => {
        if let Some(inflight) = &entry.inflight {
          return Lookup::InFlight(inflight.future.clone());
        }
        match (&entry.result, entry.state) {
          (Some(result), EntryState::Fresh) => Lookup::Fresh(result.clone(), entry.fetched_at),
          _ => Lookup::Missing,
        }
      }
      None => Lookup::Missing,
    }
  }

  /// Mark `key` as loading with `future` as its single in-flight fetch.
  /// Any previous result is kept until the fetch succeeds.
  pub(crate) fn begin(&mut self, key: CacheKey, future: SharedFetch) {
    let entry = self.entries.entry(key).or_insert_with(CacheEntry::empty);
    entry.state = EntryState::Loading;
    entry.inflight = Some(InFlight {
      future,
      invalidated: TagSet::new(),
    });
  }

  /// Store a successful result. Tags replace the previous set entirely.
  /// Returns the resulting state.
  pub(crate) fn complete(&mut self, key: &CacheKey, result: Arc<Value>, tags: TagSet) -> EntryState {
    let entry = self
      .entries
      .entry(key.clone())
      .or_insert_with(CacheEntry::empty);

    let invalidated = entry
      .inflight
      .take()
      .map(|inflight| intersects(&tags, &inflight.invalidated))
      .unwrap_or(false);

    entry.result = Some(result);
    entry.tags = tags;
    entry.fetched_at = Some(Utc::now());
    entry.state = if invalidated {
      EntryState::Stale
    } else {
      EntryState::Fresh
    };
    entry.state
  }

  /// Drop the in-flight fetch after a failure, leaving any earlier result
  /// in place. A key that never held a result is removed.
  pub(crate) fn fail(&mut self, key: &CacheKey) {
    let Some(entry) = self.entries.get_mut(key) else {
      return;
    };

    entry.inflight = None;
    if entry.result.is_none() {
      self.entries.remove(key);
    } else {
      entry.state = EntryState::Stale;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::traits::Tag;
  use futures::FutureExt;
  use serde_json::json;

  fn pending() -> SharedFetch {
    futures::future::pending::<Result<Arc<Value>>>().boxed().shared()
  }

  fn key() -> CacheKey {
    CacheKey::new("getProjects", &Value::Null)
  }

  #[test]
  fn test_missing_then_inflight_then_fresh() {
    let mut table = EntryTable::default();
    assert!(matches!(table.lookup(&key()), Lookup::Missing));

    table.begin(key(), pending());
    assert!(matches!(table.lookup(&key()), Lookup::InFlight(_)));
    assert_eq!(table.get(&key()).unwrap().state(), EntryState::Loading);

    let state = table.complete(&key(), Arc::new(json!([1])), TagSet::from([Tag::kind("Projects")]));
    assert_eq!(state, EntryState::Fresh);
    assert!(matches!(table.lookup(&key()), Lookup::Fresh(_, Some(_))));
  }

  #[test]
  fn test_complete_replaces_tags() {
    let mut table = EntryTable::default();
    table.begin(key(), pending());
    table.complete(&key(), Arc::new(json!([1])), TagSet::from([Tag::instance("Tasks", 1)]));

    table.begin(key(), pending());
    table.complete(&key(), Arc::new(json!([2])), TagSet::from([Tag::instance("Tasks", 2)]));

    let tags = table.get(&key()).unwrap().tags();
    assert_eq!(tags, &TagSet::from([Tag::instance("Tasks", 2)]));
  }

  #[test]
  fn test_fail_keeps_previous_result() {
    let mut table = EntryTable::default();
    table.begin(key(), pending());
    table.complete(&key(), Arc::new(json!("old")), TagSet::new());

    table.begin(key(), pending());
    table.fail(&key());

    let entry = table.get(&key()).unwrap();
    assert_eq!(entry.result.as_deref(), Some(&json!("old")));
    assert_eq!(entry.state(), EntryState::Stale);
  }

  #[test]
  fn test_fail_without_result_removes_entry() {
    let mut table = EntryTable::default();
    table.begin(key(), pending());
    table.fail(&key());
    assert!(table.get(&key()).is_none());
    assert_eq!(table.len(), 0);
  }
}
