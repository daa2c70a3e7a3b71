//! In-memory entity store.
//!
//! The store owns the canonical collections that query and mutation
//! executors read and write. Nothing outside an executor should touch it.

mod seed;

use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::api::types::{Attachment, Project, Task, Team, User};
use crate::error::{Error, Result};

/// Store handle shared by executors. Writes are serialized by the lock.
pub type SharedStore = Arc<RwLock<EntityStore>>;

/// An entity kept in one of the store's collections.
pub trait Entity: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  /// Tag type used for cache invalidation (e.g. "Tasks")
  const TAG: &'static str;

  fn id(&self) -> u64;

  fn set_id(&mut self, id: u64);

  fn collection(store: &EntityStore) -> &Collection<Self>;

  fn collection_mut(store: &mut EntityStore) -> &mut Collection<Self>;
}

/// An ordered sequence of entities with unique ids.
#[derive(Debug, Clone)]
pub struct Collection<T> {
  items: Vec<T>,
}

impl<T> Default for Collection<T> {
  fn default() -> Self {
    Self { items: Vec::new() }
  }
}

impl<T: Entity> Collection<T> {
  pub fn list(&self) -> &[T] {
    &self.items
  }

  pub fn get(&self, id: u64) -> Option<&T> {
    self.items.iter().find(|item| item.id() == id)
  }

  /// Append an entity, assigning it the next id (max + 1, or 1 when empty).
  pub fn insert(&mut self, mut entity: T) -> T {
    let next_id = self.items.iter().map(Entity::id).max().unwrap_or(0) + 1;
    entity.set_id(next_id);
    self.items.push(entity.clone());
    entity
  }

  /// Apply `patch` to the entity with `id`. The id itself cannot be patched.
  pub fn update<F>(&mut self, id: u64, patch: F) -> Result<T>
  where
    F: FnOnce(&mut T),
  {
    let item = self
      .items
      .iter_mut()
      .find(|item| item.id() == id)
      .ok_or_else(|| Error::not_found(T::TAG, id))?;

    patch(item);
    item.set_id(id);
    Ok(item.clone())
  }

  /// Entities matching `predicate`, in insertion order.
  pub fn find<P>(&self, predicate: P) -> Vec<T>
  where
    P: Fn(&T) -> bool,
  {
    self
      .items
      .iter()
      .filter(|item| predicate(item))
      .cloned()
      .collect()
  }
}

/// Canonical collections for every entity type.
#[derive(Debug, Clone, Default)]
pub struct EntityStore {
  pub(crate) projects: Collection<Project>,
  pub(crate) tasks: Collection<Task>,
  pub(crate) users: Collection<User>,
  pub(crate) teams: Collection<Team>,
  pub(crate) attachments: Collection<Attachment>,
}

impl EntityStore {
  /// An empty store.
  pub fn new() -> Self {
    Self::default()
  }

  /// A store populated with the mock data set.
  pub fn seeded() -> Self {
    seed::mock_data()
  }

  /// Wrap the store for sharing with executors.
  pub fn shared(self) -> SharedStore {
    Arc::new(RwLock::new(self))
  }

  pub fn list<T: Entity>(&self) -> &[T] {
    T::collection(self).list()
  }

  pub fn get<T: Entity>(&self, id: u64) -> Option<&T> {
    T::collection(self).get(id)
  }

  pub fn insert<T: Entity>(&mut self, entity: T) -> T {
    T::collection_mut(self).insert(entity)
  }

  pub fn update<T: Entity, F>(&mut self, id: u64, patch: F) -> Result<T>
  where
    F: FnOnce(&mut T),
  {
    T::collection_mut(self).update(id, patch)
  }

  pub fn find<T: Entity, P>(&self, predicate: P) -> Vec<T>
  where
    P: Fn(&T) -> bool,
  {
    T::collection(self).find(predicate)
  }
}
