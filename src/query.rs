//! Subscriber-side query handle.
//!
//! A `QueryObserver<T>` watches one cache entry (operation name + args). It
//! tracks loading/success/error state for a consumer that renders from it,
//! and re-fetches by itself when the cache reports its entry was invalidated.
//!
//! # Example
//!
//! ```ignore
//! let mut tasks: QueryObserver<Vec<Task>> =
//!   QueryObserver::new(client.cache().clone(), "getTasks", json!({"projectId": 1}));
//!
//! // Start fetching
//! tasks.fetch();
//!
//! // In event loop tick
//! if tasks.poll() {
//!     // State changed, re-render
//! }
//!
//! match tasks.state() {
//!     QueryState::Loading => render_spinner(),
//!     QueryState::Success(data) => render_tasks(data),
//!     QueryState::Error(e) => render_error(e),
//!     QueryState::Idle => {}
//! }
//! ```

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use crate::cache::{Cache, CacheEvent, CacheKey};
use crate::error::{Error, Result};

/// The state of a query
#[derive(Debug, Clone)]
pub enum QueryState<T> {
  /// Query has not been started
  Idle,
  /// Query is currently fetching data
  Loading,
  /// Query completed successfully
  Success(T),
  /// Query failed with an error
  Error(Error),
}

impl<T> QueryState<T> {
  pub fn is_success(&self) -> bool {
    matches!(self, QueryState::Success(_))
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      QueryState::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&Error> {
    match self {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }
}

/// Watches one cached query and keeps its latest outcome.
///
/// Data from a previous success stays visible while a re-fetch runs; the
/// state only changes once the new outcome arrives.
pub struct QueryObserver<T> {
  cache: Cache,
  name: String,
  args: Value,
  key: CacheKey,
  state: QueryState<T>,
  receiver: Option<mpsc::UnboundedReceiver<Result<T>>>,
  events: broadcast::Receiver<CacheEvent>,
  stale: bool,
}

impl<T: DeserializeOwned + Send + 'static> QueryObserver<T> {
  /// Create an observer for `name(args)`. Nothing is fetched until
  /// `fetch()` is called.
  pub fn new(cache: Cache, name: &str, args: Value) -> Self {
    let events = cache.subscribe();
    Self {
      key: CacheKey::new(name, &args),
      cache,
      name: name.to_string(),
      args,
      state: QueryState::Idle,
      receiver: None,
      events,
      stale: false,
    }
  }

  /// Get the current state of the query.
  pub fn state(&self) -> &QueryState<T> {
    &self.state
  }

  /// Get the data if the query succeeded.
  pub fn data(&self) -> Option<&T> {
    self.state.data()
  }

  /// Check if a fetch is outstanding.
  pub fn is_fetching(&self) -> bool {
    self.receiver.is_some()
  }

  /// Check if the cache has invalidated the data shown.
  pub fn is_stale(&self) -> bool {
    self.stale
  }

  /// Start fetching data if not already fetching.
  pub fn fetch(&mut self) {
    if self.is_fetching() {
      return;
    }
    self.start_fetch();
  }

  /// Force a refetch, dropping any pending result.
  pub fn refetch(&mut self) {
    self.receiver = None;
    self.start_fetch();
  }

  /// Poll for invalidations and results without blocking.
  ///
  /// An invalidation of the watched entry starts a re-fetch. Returns `true`
  /// if the state changed. Call this in your event loop tick handler.
  pub fn poll(&mut self) -> bool {
    if self.drain_events() {
      self.stale = true;
      debug!(key = %self.key, "observed entry invalidated, refetching");
      self.refetch();
    }

    let receiver = match &mut self.receiver {
      Some(rx) => rx,
      None => return false,
    };

    match receiver.try_recv() {
      Ok(Ok(data)) => {
        self.state = QueryState::Success(data);
        self.stale = false;
        self.receiver = None;
        true
      }
      Ok(Err(error)) => {
        self.state = QueryState::Error(error);
        self.receiver = None;
        true
      }
      Err(mpsc::error::TryRecvError::Empty) => false,
      Err(mpsc::error::TryRecvError::Disconnected) => {
        // Sender dropped without sending - treat as error
        self.state = QueryState::Error(Error::NotFound(format!("result for {}", self.key)));
        self.receiver = None;
        true
      }
    }
  }

  /// Returns true if the watched entry was invalidated. A lagged receiver
  /// may have missed the invalidation, so it counts as one.
  fn drain_events(&mut self) -> bool {
    let mut invalidated = false;
    loop {
      match self.events.try_recv() {
        Ok(CacheEvent::Invalidated(key)) if key == self.key => invalidated = true,
        Ok(_) => {}
        Err(broadcast::error::TryRecvError::Lagged(_)) => invalidated = true,
        Err(_) => break,
      }
    }
    invalidated
  }

  fn start_fetch(&mut self) {
    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);
    if !self.state.is_success() {
      self.state = QueryState::Loading;
    }

    let cache = self.cache.clone();
    let name = self.name.clone();
    let args = self.args.clone();
    tokio::spawn(async move {
      let result = cache.query(&name, args).await.and_then(|result| {
        T::deserialize(result.data.as_ref()).map_err(|e| Error::Decode(e.to_string()))
      });
      // Ignore send errors - receiver may have been dropped
      let _ = tx.send(result);
    });
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for QueryObserver<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("QueryObserver")
      .field("key", &self.key)
      .field("state", &self.state)
      .field("stale", &self.stale)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{EntryState, OperationDef, OperationRegistry, Tag, TagSet};
  use serde_json::json;
  use std::sync::atomic::{AtomicU64, Ordering};
  use std::sync::Arc;
  use std::time::Duration;
  use tokio::sync::Notify;

  fn counter_cache() -> (Cache, Arc<AtomicU64>) {
    let counter = Arc::new(AtomicU64::new(0));
    let c = counter.clone();
    let mut registry = OperationRegistry::new();
    registry
      .register(
        OperationDef::query("count", move |_| {
          let n = c.fetch_add(1, Ordering::SeqCst);
          async move { Ok(json!(n)) }
        })
        .provides([Tag::kind("Counter")]),
      )
      .unwrap();
    registry
      .register(OperationDef::query("broken", |_| async {
        Err(Error::NotFound("thing #1".into()))
      }))
      .unwrap();
    (Cache::new(registry), counter)
  }

  #[tokio::test]
  async fn test_query_success() {
    let (cache, _) = counter_cache();
    let mut query: QueryObserver<u64> = QueryObserver::new(cache, "count", Value::Null);

    assert!(matches!(query.state(), QueryState::Idle));

    query.fetch();
    assert!(matches!(query.state(), QueryState::Loading));

    // Wait for the result
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(query.poll());
    assert!(query.state().is_success());
    assert_eq!(query.data(), Some(&0));
  }

  #[tokio::test]
  async fn test_query_error() {
    let (cache, _) = counter_cache();
    let mut query: QueryObserver<u64> = QueryObserver::new(cache, "broken", Value::Null);

    query.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(query.poll());
    assert!(matches!(query.state().error().map(Error::root), Some(Error::NotFound(_))));
  }

  #[tokio::test]
  async fn test_fetch_while_fetching_is_noop() {
    let (cache, counter) = counter_cache();
    let mut query: QueryObserver<u64> = QueryObserver::new(cache, "count", Value::Null);

    query.fetch();
    query.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;
    query.poll();

    assert_eq!(counter.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_observers_share_cached_entry() {
    let (cache, counter) = counter_cache();
    let mut a: QueryObserver<u64> = QueryObserver::new(cache.clone(), "count", Value::Null);
    let mut b: QueryObserver<u64> = QueryObserver::new(cache, "count", Value::Null);

    a.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;
    a.poll();

    b.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;
    b.poll();

    assert_eq!(a.data(), b.data());
    assert_eq!(counter.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_invalidation_triggers_refetch() {
    let (cache, counter) = counter_cache();
    let mut query: QueryObserver<u64> = QueryObserver::new(cache.clone(), "count", Value::Null);

    query.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;
    query.poll();
    assert_eq!(query.data(), Some(&0));

    cache.invalidate(&TagSet::from([Tag::kind("Counter")]));

    // First poll sees the invalidation and starts the refetch; the old data
    // stays visible meanwhile
    query.poll();
    assert!(query.is_stale());
    assert_eq!(query.data(), Some(&0));

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(query.poll());
    assert_eq!(query.data(), Some(&1));
    assert!(!query.is_stale());
    assert_eq!(counter.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_invalidation_during_own_fetch_triggers_refetch() {
    let counter = Arc::new(AtomicU64::new(0));
    let gate = Arc::new(Notify::new());
    let (c, g) = (counter.clone(), gate.clone());
    let mut registry = OperationRegistry::new();
    registry
      .register(
        OperationDef::query("count", move |_| {
          let n = c.fetch_add(1, Ordering::SeqCst);
          let g = g.clone();
          async move {
            g.notified().await;
            Ok(json!(n))
          }
        })
        .provides([Tag::kind("Counter")]),
      )
      .unwrap();
    let cache = Cache::new(registry);
    let mut query: QueryObserver<u64> = QueryObserver::new(cache.clone(), "count", Value::Null);

    query.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(cache.state("count", &Value::Null), Some(EntryState::Loading));

    // Lands while the first fetch is still held
    cache.invalidate(&TagSet::from([Tag::kind("Counter")]));
    gate.notify_one();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(cache.state("count", &Value::Null), Some(EntryState::Stale));

    query.poll();
    assert!(query.is_stale());

    gate.notify_one();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(query.poll());
    assert_eq!(query.data(), Some(&1));
    assert!(!query.is_stale());
    assert_eq!(counter.load(Ordering::SeqCst), 2);
    assert_eq!(cache.state("count", &Value::Null), Some(EntryState::Fresh));
  }

  #[tokio::test]
  async fn test_unrelated_invalidation_is_ignored() {
    let (cache, counter) = counter_cache();
    let mut query: QueryObserver<u64> = QueryObserver::new(cache.clone(), "count", Value::Null);

    query.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;
    query.poll();

    cache.invalidate(&TagSet::from([Tag::kind("Other")]));
    assert!(!query.poll());
    assert!(!query.is_stale());
    assert_eq!(counter.load(Ordering::SeqCst), 1);
  }
}
