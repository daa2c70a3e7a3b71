//! Generic query cache with tag-based invalidation.
//!
//! This module knows nothing about projects or tasks. It provides:
//! - An operation registry binding names to query/mutation executors
//! - Result caching keyed by operation name and canonical arguments
//! - At most one in-flight executor call per key
//! - Tag-based invalidation after mutations, with change notifications

mod invalidation;
mod layer;
mod registry;
mod storage;
mod traits;

pub use layer::{Cache, EntrySnapshot};
pub use registry::{typed, OperationDef, OperationKind, OperationRegistry};
pub use traits::{CacheEvent, CacheKey, CacheResult, CacheSource, EntryState, Tag, TagSet};
