//! Typed client over the query cache.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::endpoints::{self, *};
use super::types::{
  AuthSession, NewProject, NewTask, Project, ProjectTasks, SearchResults, Status, StatusChange,
  Task, Team, User,
};
use crate::cache::{Cache, CacheResult, OperationRegistry};
use crate::error::{Error, Result};
use crate::store::SharedStore;

/// Project-management client with transparent caching.
///
/// Reads go through the cache and report whether they were served from it;
/// writes always run and invalidate whatever they affect.
#[derive(Clone)]
pub struct TaskboardClient {
  cache: Cache,
}

impl TaskboardClient {
  /// Register the endpoints against `store` and build a cache over them.
  pub fn new(store: &SharedStore, session_user: u64, event_capacity: usize) -> Result<Self> {
    let mut registry = OperationRegistry::new();
    endpoints::register(&mut registry, store, session_user)?;
    let cache = Cache::with_event_capacity(registry, event_capacity);

    Ok(Self { cache })
  }

  pub fn cache(&self) -> &Cache {
    &self.cache
  }

  pub async fn get_auth_user(&self) -> Result<CacheResult<AuthSession>> {
    self.query(GET_AUTH_USER, &Value::Null).await
  }

  pub async fn get_projects(&self) -> Result<CacheResult<Vec<Project>>> {
    self.query(GET_PROJECTS, &Value::Null).await
  }

  pub async fn create_project(&self, project: &NewProject) -> Result<Project> {
    self.mutate(CREATE_PROJECT, project).await
  }

  pub async fn get_tasks(&self, project_id: u64) -> Result<CacheResult<Vec<Task>>> {
    self.query(GET_TASKS, &ProjectTasks { project_id }).await
  }

  pub async fn get_tasks_by_user(&self, user_id: u64) -> Result<CacheResult<Vec<Task>>> {
    self.query(GET_TASKS_BY_USER, &user_id).await
  }

  pub async fn create_task(&self, task: &NewTask) -> Result<Task> {
    self.mutate(CREATE_TASK, task).await
  }

  pub async fn update_task_status(&self, task_id: u64, status: Status) -> Result<Task> {
    self
      .mutate(UPDATE_TASK_STATUS, &StatusChange { task_id, status })
      .await
  }

  pub async fn get_users(&self) -> Result<CacheResult<Vec<User>>> {
    self.query(GET_USERS, &Value::Null).await
  }

  pub async fn get_teams(&self) -> Result<CacheResult<Vec<Team>>> {
    self.query(GET_TEAMS, &Value::Null).await
  }

  pub async fn search(&self, text: &str) -> Result<CacheResult<SearchResults>> {
    self.query(SEARCH, text).await
  }

  async fn query<A, R>(&self, name: &str, args: &A) -> Result<CacheResult<R>>
  where
    A: Serialize + ?Sized,
    R: DeserializeOwned,
  {
    let result = self.cache.query(name, encode(args)?).await?;
    let data = decode(&result.data)?;
    Ok(result.map(|_| data))
  }

  async fn mutate<A, R>(&self, name: &str, args: &A) -> Result<R>
  where
    A: Serialize + ?Sized,
    R: DeserializeOwned,
  {
    let result = self.cache.mutate(name, encode(args)?).await?;
    decode(&result)
  }
}

fn encode<A: Serialize + ?Sized>(args: &A) -> Result<Value> {
  serde_json::to_value(args).map_err(|e| Error::InvalidArguments(e.to_string()))
}

fn decode<R: DeserializeOwned>(value: &Arc<Value>) -> Result<R> {
  R::deserialize(value.as_ref()).map_err(|e| Error::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheSource, EntryState};
  use crate::store::EntityStore;

  fn client() -> TaskboardClient {
    TaskboardClient::new(&EntityStore::seeded().shared(), 1, 16).unwrap()
  }

  #[tokio::test]
  async fn test_second_read_is_cached() {
    let client = client();

    let first = client.get_projects().await.unwrap();
    let second = client.get_projects().await.unwrap();

    assert_eq!(first.source, CacheSource::Executor);
    assert!(second.is_cached());
    assert_eq!(second.data.len(), 2);
    assert_eq!(second.data[0].name, "Apollo");
  }

  #[tokio::test]
  async fn test_create_then_list_tasks() {
    let client = client();

    let before = client.get_tasks(1).await.unwrap();
    assert_eq!(before.data.len(), 2);

    let created = client
      .create_task(&NewTask {
        title: Some("Test landing gear".to_string()),
        project_id: Some(1),
        assigned_user_id: Some(2),
        ..NewTask::default()
      })
      .await
      .unwrap();
    assert_eq!(created.id, 3);
    assert_eq!(created.status, Some(Status::ToDo));
    assert_eq!(created.assignee.as_ref().unwrap().username, "Bob");

    let after = client.get_tasks(1).await.unwrap();
    assert!(!after.is_cached());
    assert!(after.data.iter().any(|t| t.id == created.id));
  }

  #[tokio::test]
  async fn test_update_status_round_trip() {
    let client = client();
    client.get_tasks(1).await.unwrap();

    let updated = client.update_task_status(1, Status::Completed).await.unwrap();
    assert_eq!(updated.status, Some(Status::Completed));

    let args = serde_json::json!({"projectId": 1});
    assert_eq!(client.cache().state(GET_TASKS, &args), Some(EntryState::Stale));

    let tasks = client.get_tasks(1).await.unwrap();
    assert_eq!(tasks.data[0].status, Some(Status::Completed));
  }

  #[tokio::test]
  async fn test_update_missing_task_is_not_found() {
    let client = client();
    let err = client.update_task_status(999, Status::Completed).await.unwrap_err();
    assert!(matches!(err.root(), Error::NotFound(_)));
  }

  #[tokio::test]
  async fn test_search_and_users() {
    let client = client();

    let results = client.search("bob").await.unwrap();
    assert_eq!(results.data.users.len(), 1);

    let users = client.get_users().await.unwrap();
    assert_eq!(users.data.len(), 3);
    let teams = client.get_teams().await.unwrap();
    assert_eq!(teams.data[1].team_name, "Design Team");
  }
}
