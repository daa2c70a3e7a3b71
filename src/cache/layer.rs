//! Cache layer that serves queries from memory and invalidates on mutation.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::invalidation;
use super::registry::{OperationDef, OperationKind, OperationRegistry};
use super::storage::{EntryTable, Lookup, SharedFetch};
use super::traits::{CacheEvent, CacheKey, CacheResult, CacheSource, EntryState, TagSet};
use crate::error::{Error, Result};

const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Point-in-time view of one cache entry.
#[derive(Debug, Clone)]
pub struct EntrySnapshot {
  pub key: CacheKey,
  pub state: EntryState,
  pub tags: TagSet,
  pub fetched_at: Option<DateTime<Utc>>,
}

/// Query cache over an operation registry.
///
/// Queries are served from fresh entries without calling the executor;
/// mutations always execute and then invalidate the entries whose tags
/// intersect the tags they declare. Cloning is cheap and shares state.
#[derive(Clone)]
pub struct Cache {
  inner: Arc<Inner>,
}

struct Inner {
  registry: Arc<OperationRegistry>,
  entries: Mutex<EntryTable>,
  events: broadcast::Sender<CacheEvent>,
}

impl Cache {
  /// Create a cache over the given registry.
  pub fn new(registry: OperationRegistry) -> Self {
    Self::with_event_capacity(registry, DEFAULT_EVENT_CAPACITY)
  }

  /// Create a cache whose subscriber channel buffers `capacity` events.
  pub fn with_event_capacity(registry: OperationRegistry, capacity: usize) -> Self {
    let (events, _) = broadcast::channel(capacity.max(1));
    Self {
      inner: Arc::new(Inner {
        registry: Arc::new(registry),
        entries: Mutex::new(EntryTable::default()),
        events,
      }),
    }
  }

  pub fn registry(&self) -> &OperationRegistry {
    &self.inner.registry
  }

  /// Subscribe to entry updates and invalidations.
  pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
    self.inner.events.subscribe()
  }

  /// Run a query through the cache.
  ///
  /// 1. Fresh entry - return it without calling the executor
  /// 2. Fetch already in flight for this key - wait on it
  /// 3. Stale or missing - run the executor, store result and tags
  ///
  /// A failed fetch leaves the previous result (if any) untouched.
  pub async fn query(&self, name: &str, args: Value) -> Result<CacheResult<Arc<Value>>> {
    let op = self.resolve(name, OperationKind::Query)?;
    let key = CacheKey::new(name, &args);

    let (fetch, source) = {
      let mut entries = self.inner.entries.lock();
      match entries.lookup(&key) {
        Lookup::Fresh(result, cached_at) => {
          debug!(key = %key, "cache hit");
          return Ok(CacheResult::from_cache(result, cached_at));
        }
        Lookup::InFlight(fetch) => {
          debug!(key = %key, "joining in-flight fetch");
          (fetch, CacheSource::InFlight)
        }
        Lookup::Missing => {
          debug!(key = %key, "cache miss");
          let fetch = self.fetch(op, key.clone(), args);
          entries.begin(key, fetch.clone());
          (fetch, CacheSource::Executor)
        }
      }
    };

    let data = fetch.await?;
    Ok(CacheResult::from_executor(data, source))
  }

  /// Run a mutation and invalidate the tags it declares.
  ///
  /// Mutations are never served from cache or deduplicated. Invalidation
  /// happens before the outcome is returned, for failures as well.
  pub async fn mutate(&self, name: &str, args: Value) -> Result<Arc<Value>> {
    let op = self.resolve(name, OperationKind::Mutation)?;

    let outcome = op
      .execute(args.clone())
      .await
      .map(Arc::new)
      .map_err(|e| Error::executor(name, e));

    let tags = match &outcome {
      Ok(result) => op.invalidated_tags(Some(result.as_ref()), &args, None),
      Err(err) => {
        warn!(operation = name, error = %err, "mutation failed");
        op.invalidated_tags(None, &args, Some(err))
      }
    };

    let staled = self.invalidate(&tags);
    info!(operation = name, ok = outcome.is_ok(), staled, "mutation complete");

    outcome
  }

  /// Mark every entry providing a tag that matches `tags` as stale.
  /// Returns how many entries went stale.
  pub fn invalidate(&self, tags: &TagSet) -> usize {
    let mut entries = self.inner.entries.lock();
    let events = &self.inner.events;
    let staled = invalidation::invalidate(&mut entries, tags, |key| {
      debug!(key = %key, "invalidated");
      // No receivers is fine
      let _ = events.send(CacheEvent::Invalidated(key.clone()));
    });
    debug!(?tags, staled, entries = entries.len(), "invalidation pass");
    staled
  }

  /// State of the entry for `name(args)`, if one exists.
  pub fn state(&self, name: &str, args: &Value) -> Option<EntryState> {
    let key = CacheKey::new(name, args);
    self.inner.entries.lock().get(&key).map(|entry| entry.state())
  }

  /// Snapshot of every entry, ordered by key.
  pub fn entries(&self) -> Vec<EntrySnapshot> {
    let entries = self.inner.entries.lock();
    let mut snapshots: Vec<EntrySnapshot> = entries
      .iter()
      .map(|(key, entry)| EntrySnapshot {
        key: key.clone(),
        state: entry.state(),
        tags: entry.tags().clone(),
        fetched_at: entry.fetched_at(),
      })
      .collect();
    snapshots.sort_by(|a, b| a.key.cmp(&b.key));
    snapshots
  }

  fn resolve(&self, name: &str, kind: OperationKind) -> Result<Arc<OperationDef>> {
    let op = self.inner.registry.resolve(name)?;
    if op.kind() != kind {
      return Err(Error::NotFound(format!("{} `{}`", kind, name)));
    }
    Ok(op)
  }

  /// Build the shared fetch for `key`. The fetch writes its own outcome back
  /// into the entry table, so it happens exactly once however many callers
  /// await it.
  fn fetch(&self, op: Arc<OperationDef>, key: CacheKey, args: Value) -> SharedFetch {
    let inner: Weak<Inner> = Arc::downgrade(&self.inner);

    async move {
      let outcome = op
        .execute(args.clone())
        .await
        .map(Arc::new)
        .map_err(|e| Error::executor(op.name(), e));

      if let Some(inner) = inner.upgrade() {
        inner.finish(&op, &key, &args, &outcome);
      }
      outcome
    }
    .boxed()
    .shared()
  }
}

impl Inner {
  fn finish(&self, op: &OperationDef, key: &CacheKey, args: &Value, outcome: &Result<Arc<Value>>) {
    match outcome {
      Ok(result) => {
        let tags = op.provided_tags(result, args);
        let state = self.entries.lock().complete(key, result.clone(), tags);
        debug!(key = %key, ?state, "fetch complete");
        let _ = self.events.send(CacheEvent::Updated(key.clone()));
        // Invalidated while loading: subscribers holding this result must refetch
        if state == EntryState::Stale {
          let _ = self.events.send(CacheEvent::Invalidated(key.clone()));
        }
      }
      Err(err) => {
        warn!(key = %key, error = %err, "fetch failed");
        self.entries.lock().fail(key);
      }
    }
  }
}
