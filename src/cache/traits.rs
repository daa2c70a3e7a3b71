//! Core types for the caching system.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;

use crate::store::Entity;

/// Invalidation key linking cached query results to the mutations that can
/// make them stale.
///
/// A tag without an id is type-level ("Tasks") and matches every tag of that
/// type; a tag with an id is instance-level ("Tasks:5") and only matches the
/// same id or a type-level tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag {
  kind: Cow<'static, str>,
  id: Option<u64>,
}

pub type TagSet = BTreeSet<Tag>;

impl Tag {
  /// Type-level tag.
  pub fn kind(kind: impl Into<Cow<'static, str>>) -> Self {
    Self {
      kind: kind.into(),
      id: None,
    }
  }

  /// Instance-level tag.
  pub fn instance(kind: impl Into<Cow<'static, str>>, id: u64) -> Self {
    Self {
      kind: kind.into(),
      id: Some(id),
    }
  }

  /// Type-level tag for an entity type.
  pub fn of<T: Entity>() -> Self {
    Self::kind(T::TAG)
  }

  pub fn matches(&self, other: &Tag) -> bool {
    if self.kind != other.kind {
      return false;
    }
    match (self.id, other.id) {
      (Some(a), Some(b)) => a == b,
      _ => true,
    }
  }

  /// Parse "Type" or "Type:id".
  pub fn parse(s: &str) -> Option<Self> {
    let s = s.trim();
    match s.split_once(':') {
      Some((kind, id)) if !kind.is_empty() => {
        let id = id.trim().parse().ok()?;
        Some(Self::instance(kind.to_string(), id))
      }
      Some(_) => None,
      None if s.is_empty() => None,
      None => Some(Self::kind(s.to_string())),
    }
  }
}

impl fmt::Display for Tag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.id {
      Some(id) => write!(f, "{}:{}", self.kind, id),
      None => f.write_str(&self.kind),
    }
  }
}

/// True when any tag in `provided` matches any tag in `invalidated`.
pub fn intersects(provided: &TagSet, invalidated: &TagSet) -> bool {
  provided
    .iter()
    .any(|p| invalidated.iter().any(|i| p.matches(i)))
}

/// Cache key: operation name plus a digest of the canonical arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
  operation: String,
  digest: String,
}

impl CacheKey {
  pub fn new(operation: &str, args: &Value) -> Self {
    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(canonicalize(args).as_bytes());
    Self {
      operation: operation.to_string(),
      digest: hex::encode(hasher.finalize()),
    }
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}#{}", self.operation, &self.digest[..12])
  }
}

/// Render `value` so that structurally equal values produce identical text.
///
/// Object keys are emitted in sorted order at every depth; arrays keep their
/// order. Numbers are rendered as serde_json prints them, so `1` and `1.0`
/// are different keys.
pub fn canonicalize(value: &Value) -> String {
  let mut out = String::new();
  write_canonical(value, &mut out);
  out
}

fn write_canonical(value: &Value, out: &mut String) {
  match value {
    Value::Object(map) => {
      // serde_json's `preserve_order` feature keeps insertion order, and any
      // crate in the graph can switch it on
      let mut keys: Vec<&String> = map.keys().collect();
      keys.sort();
      out.push('{');
      for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        out.push_str(&Value::String(key.clone()).to_string());
        out.push(':');
        write_canonical(&map[key.as_str()], out);
      }
      out.push('}');
    }
    Value::Array(items) => {
      out.push('[');
      for (i, item) in items.iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        write_canonical(item, out);
      }
      out.push(']');
    }
    scalar => out.push_str(&scalar.to_string()),
  }
}

/// Freshness of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
  /// Safe to serve without re-fetching
  Fresh,
  /// Must be re-fetched on the next read
  Stale,
  /// An executor call is in flight
  Loading,
}

/// Change notification sent to cache subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
  /// A fetch completed and the entry holds a new result
  Updated(CacheKey),
  /// An entry was marked stale, or a fetch completed after an invalidation
  /// that matched it
  Invalidated(CacheKey),
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// A result produced by running the executor.
  pub fn from_executor(data: T, source: CacheSource) -> Self {
    Self {
      data,
      source,
      cached_at: None,
    }
  }

  /// A result served from a fresh cache entry.
  pub fn from_cache(data: T, cached_at: Option<DateTime<Utc>>) -> Self {
    Self {
      data,
      source: CacheSource::CacheFresh,
      cached_at,
    }
  }

  pub fn is_cached(&self) -> bool {
    self.source == CacheSource::CacheFresh
  }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheResult<U> {
    CacheResult {
      data: f(self.data),
      source: self.source,
      cached_at: self.cached_at,
    }
  }
}

/// Indicates where a query result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// This call ran the executor
  Executor,
  /// This call joined an executor run started by another caller
  InFlight,
  /// Served from a fresh cache entry
  CacheFresh,
}
