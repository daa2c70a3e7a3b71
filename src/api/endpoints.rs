//! Query and mutation definitions over the entity store.

use serde_json::Value;

use super::types::{
  Attachment, AuthSession, NewProject, NewTask, Priority, Project, ProjectTasks, SearchResults,
  Status, StatusChange, Task, Team, User,
};
use crate::cache::{typed, OperationDef, OperationRegistry, Tag, TagSet};
use crate::error::{Error, Result};
use crate::store::{Entity, EntityStore, SharedStore};

pub const GET_AUTH_USER: &str = "getAuthUser";
pub const GET_PROJECTS: &str = "getProjects";
pub const CREATE_PROJECT: &str = "createProject";
pub const GET_TASKS: &str = "getTasks";
pub const GET_TASKS_BY_USER: &str = "getTasksByUser";
pub const CREATE_TASK: &str = "createTask";
pub const UPDATE_TASK_STATUS: &str = "updateTaskStatus";
pub const GET_USERS: &str = "getUsers";
pub const GET_TEAMS: &str = "getTeams";
pub const SEARCH: &str = "search";

/// Register every endpoint against `store`. `session_user` is the user id
/// reported by `getAuthUser`.
pub fn register(registry: &mut OperationRegistry, store: &SharedStore, session_user: u64) -> Result<()> {
  let s = store.clone();
  registry.register(OperationDef::query(
    GET_AUTH_USER,
    typed(move |_: Value| {
      let store = s.clone();
      async move {
        let store = store.read().await;
        let user = store
          .get::<User>(session_user)
          .cloned()
          .ok_or_else(|| Error::not_found(User::TAG, session_user))?;
        Ok(AuthSession {
          username: "demo-user".to_string(),
          user_sub: format!("demo-{}", user.user_id),
          user_details: user,
        })
      }
    }),
  ))?;

  let s = store.clone();
  registry.register(
    OperationDef::query(
      GET_PROJECTS,
      typed(move |_: Value| {
        let store = s.clone();
        async move { Ok(store.read().await.list::<Project>().to_vec()) }
      }),
    )
    .provides([Tag::of::<Project>()]),
  )?;

  let s = store.clone();
  registry.register(
    OperationDef::mutation(
      CREATE_PROJECT,
      typed(move |input: NewProject| {
        let store = s.clone();
        async move {
          let project = Project {
            id: 0,
            name: input.name.unwrap_or_else(|| "New Project".to_string()),
            description: input.description,
            start_date: input.start_date,
            end_date: input.end_date,
          };
          Ok(store.write().await.insert(project))
        }
      }),
    )
    .invalidates([Tag::of::<Project>()]),
  )?;

  let s = store.clone();
  registry.register(
    OperationDef::query(
      GET_TASKS,
      typed(move |args: ProjectTasks| {
        let store = s.clone();
        async move {
          let store = store.read().await;
          let tasks = store.find::<Task, _>(|task| task.project_id == args.project_id);
          Ok(resolve_tasks(&store, tasks))
        }
      }),
    )
    .provides_tags(|result, _| task_list_tags(result)),
  )?;

  let s = store.clone();
  registry.register(
    OperationDef::query(
      GET_TASKS_BY_USER,
      typed(move |user_id: u64| {
        let store = s.clone();
        async move {
          let store = store.read().await;
          let tasks = store.find::<Task, _>(|task| {
            task.author_user_id == Some(user_id) || task.assigned_user_id == Some(user_id)
          });
          Ok(resolve_tasks(&store, tasks))
        }
      }),
    )
    .provides_tags(|result, _| task_list_tags(result)),
  )?;

  let s = store.clone();
  registry.register(
    OperationDef::mutation(
      CREATE_TASK,
      typed(move |input: NewTask| {
        let store = s.clone();
        async move {
          let task = Task {
            id: 0,
            title: input.title.unwrap_or_else(|| "New Task".to_string()),
            description: input.description,
            status: Some(input.status.unwrap_or(Status::ToDo)),
            priority: Some(input.priority.unwrap_or(Priority::Medium)),
            tags: input.tags,
            start_date: input.start_date,
            due_date: input.due_date,
            points: input.points,
            project_id: input.project_id.unwrap_or(1),
            author_user_id: Some(input.author_user_id.unwrap_or(1)),
            assigned_user_id: input.assigned_user_id,
            ..Task::default()
          };
          let mut store = store.write().await;
          let created = store.insert(task);
          Ok(resolve_task(&store, created))
        }
      }),
    )
    .invalidates([Tag::of::<Task>()]),
  )?;

  let s = store.clone();
  registry.register(
    OperationDef::mutation(
      UPDATE_TASK_STATUS,
      typed(move |change: StatusChange| {
        let store = s.clone();
        async move {
          let mut store = store.write().await;
          let updated = store.update::<Task, _>(change.task_id, |task| task.status = Some(change.status))?;
          Ok(resolve_task(&store, updated))
        }
      }),
    )
    // Invalidated on failure too: a missing task may still be cached somewhere
    .invalidates_tags(|_, args, _| {
      args
        .get("taskId")
        .and_then(Value::as_u64)
        .map(|id| TagSet::from([Tag::instance(Task::TAG, id)]))
        .unwrap_or_default()
    }),
  )?;

  let s = store.clone();
  registry.register(
    OperationDef::query(
      GET_USERS,
      typed(move |_: Value| {
        let store = s.clone();
        async move { Ok(store.read().await.list::<User>().to_vec()) }
      }),
    )
    .provides([Tag::of::<User>()]),
  )?;

  let s = store.clone();
  registry.register(
    OperationDef::query(
      GET_TEAMS,
      typed(move |_: Value| {
        let store = s.clone();
        async move { Ok(store.read().await.list::<Team>().to_vec()) }
      }),
    )
    .provides([Tag::of::<Team>()]),
  )?;

  let s = store.clone();
  registry.register(
    OperationDef::query(
      SEARCH,
      typed(move |text: String| {
        let store = s.clone();
        async move {
          let store = store.read().await;
          Ok(search(&store, &text))
        }
      }),
    )
    .provides([Tag::of::<Task>(), Tag::of::<Project>(), Tag::of::<User>()]),
  )?;

  Ok(())
}

/// Instance tags for every task in a list result, or the bare type tag when
/// the list is empty so that creating a task still reaches the entry.
fn task_list_tags(result: &Value) -> TagSet {
  let tags: TagSet = result
    .as_array()
    .into_iter()
    .flatten()
    .filter_map(|task| task.get("id").and_then(Value::as_u64))
    .map(|id| Tag::instance(Task::TAG, id))
    .collect();

  if tags.is_empty() {
    TagSet::from([Tag::of::<Task>()])
  } else {
    tags
  }
}

/// Fill in the author, assignee and attachment snapshots for a task.
fn resolve_task(store: &EntityStore, mut task: Task) -> Task {
  task.author = task
    .author_user_id
    .and_then(|id| store.get::<User>(id).cloned());
  task.assignee = task
    .assigned_user_id
    .and_then(|id| store.get::<User>(id).cloned());
  task.attachments = store.find::<Attachment, _>(|a| a.task_id == task.id);
  task
}

fn resolve_tasks(store: &EntityStore, tasks: Vec<Task>) -> Vec<Task> {
  tasks
    .into_iter()
    .map(|task| resolve_task(store, task))
    .collect()
}

fn search(store: &EntityStore, text: &str) -> SearchResults {
  let needle = text.to_lowercase();
  let contains = |s: &str| s.to_lowercase().contains(&needle);
  let contains_opt = |s: &Option<String>| s.as_deref().map(contains).unwrap_or(false);

  SearchResults {
    tasks: store.find::<Task, _>(|t| contains(&t.title) || contains_opt(&t.description)),
    projects: store.find::<Project, _>(|p| contains(&p.name) || contains_opt(&p.description)),
    users: store.find::<User, _>(|u| contains(&u.username)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{Cache, CacheSource, EntryState};
  use serde_json::json;

  fn cache_with(store: EntityStore) -> (Cache, SharedStore) {
    let store = store.shared();
    let mut registry = OperationRegistry::new();
    register(&mut registry, &store, 1).unwrap();
    (Cache::new(registry), store)
  }

  #[test]
  fn test_register_twice_is_duplicate() {
    let store = EntityStore::new().shared();
    let mut registry = OperationRegistry::new();
    register(&mut registry, &store, 1).unwrap();

    let err = register(&mut registry, &store, 1).unwrap_err();
    assert_eq!(err, Error::DuplicateOperation(GET_AUTH_USER.to_string()));
  }

  #[tokio::test]
  async fn test_create_task_invalidates_project_task_list() {
    let (cache, _) = cache_with(EntityStore::seeded());
    let args = json!({"projectId": 1});

    let before = cache.query(GET_TASKS, args.clone()).await.unwrap();
    assert_eq!(before.data.as_array().unwrap().len(), 2);

    cache
      .mutate(CREATE_TASK, json!({"projectId": 1, "title": "Calibrate sensors"}))
      .await
      .unwrap();
    assert_eq!(cache.state(GET_TASKS, &args), Some(EntryState::Stale));

    let after = cache.query(GET_TASKS, args).await.unwrap();
    assert_eq!(after.source, CacheSource::Executor);
    let tasks: Vec<Task> = serde_json::from_value((*after.data).clone()).unwrap();
    assert_eq!(tasks.len(), 3);
    assert_eq!(tasks[2].title, "Calibrate sensors");
    assert_eq!(tasks[2].id, 3);
  }

  #[tokio::test]
  async fn test_get_tasks_resolves_snapshots() {
    let (cache, _) = cache_with(EntityStore::seeded());

    let result = cache.query(GET_TASKS, json!({"projectId": 1})).await.unwrap();
    let tasks: Vec<Task> = serde_json::from_value((*result.data).clone()).unwrap();

    assert_eq!(tasks[0].author.as_ref().unwrap().username, "Alice");
    assert_eq!(tasks[0].assignee.as_ref().unwrap().username, "Bob");
    assert_eq!(tasks[0].attachments.len(), 1);
    assert!(tasks[1].attachments.is_empty());
  }

  #[tokio::test]
  async fn test_status_update_only_stales_lists_with_that_task() {
    let (cache, _) = cache_with(EntityStore::seeded());
    // Bob is assigned task 1, Carol task 2
    let bob = json!(2);
    let carol = json!(3);

    cache.query(GET_TASKS_BY_USER, bob.clone()).await.unwrap();
    cache.query(GET_TASKS_BY_USER, carol.clone()).await.unwrap();
    cache.query(GET_PROJECTS, Value::Null).await.unwrap();

    cache
      .mutate(UPDATE_TASK_STATUS, json!({"taskId": 2, "status": "Completed"}))
      .await
      .unwrap();

    assert_eq!(cache.state(GET_TASKS_BY_USER, &carol), Some(EntryState::Stale));
    assert_eq!(cache.state(GET_TASKS_BY_USER, &bob), Some(EntryState::Fresh));
    assert_eq!(cache.state(GET_PROJECTS, &Value::Null), Some(EntryState::Fresh));
  }

  #[tokio::test]
  async fn test_status_update_of_missing_task_fails_uniformly() {
    let (cache, store) = cache_with(EntityStore::seeded());

    let err = cache
      .mutate(UPDATE_TASK_STATUS, json!({"taskId": 999, "status": "Completed"}))
      .await
      .unwrap_err();

    assert!(matches!(err, Error::ExecutorFailure { .. }));
    assert!(matches!(err.root(), Error::NotFound(_)));
    assert_eq!(store.read().await.list::<Task>().len(), 2);
  }

  #[tokio::test]
  async fn test_create_project_defaults_name() {
    let (cache, _) = cache_with(EntityStore::new());

    cache.query(GET_PROJECTS, Value::Null).await.unwrap();
    let created = cache.mutate(CREATE_PROJECT, json!({})).await.unwrap();

    assert_eq!(created["name"], "New Project");
    assert_eq!(created["id"], 1);
    assert_eq!(cache.state(GET_PROJECTS, &Value::Null), Some(EntryState::Stale));
  }

  #[tokio::test]
  async fn test_tasks_by_user_matches_author_or_assignee() {
    let (cache, _) = cache_with(EntityStore::seeded());

    let alice = cache.query(GET_TASKS_BY_USER, json!(1)).await.unwrap();
    let carol = cache.query(GET_TASKS_BY_USER, json!(3)).await.unwrap();

    assert_eq!(alice.data.as_array().unwrap().len(), 2);
    assert_eq!(carol.data.as_array().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_empty_task_list_still_invalidated_by_create() {
    let (cache, _) = cache_with(EntityStore::seeded());
    let args = json!({"projectId": 2});

    cache.query(GET_TASKS, args.clone()).await.unwrap();
    cache.mutate(CREATE_TASK, json!({"projectId": 2})).await.unwrap();

    assert_eq!(cache.state(GET_TASKS, &args), Some(EntryState::Stale));
  }

  #[tokio::test]
  async fn test_search_is_case_insensitive_and_invalidated_by_writes() {
    let (cache, _) = cache_with(EntityStore::seeded());
    let text = json!("NAVIGATION");

    let result = cache.query(SEARCH, text.clone()).await.unwrap();
    let found: SearchResults = serde_json::from_value((*result.data).clone()).unwrap();
    assert_eq!(found.tasks.len(), 1);
    assert_eq!(found.projects.len(), 1);
    assert!(found.users.is_empty());

    cache.mutate(CREATE_PROJECT, json!({"name": "Navigation II"})).await.unwrap();
    assert_eq!(cache.state(SEARCH, &text), Some(EntryState::Stale));
  }

  #[tokio::test]
  async fn test_auth_user_uses_session_user() {
    let (cache, _) = cache_with(EntityStore::seeded());

    let result = cache.query(GET_AUTH_USER, Value::Null).await.unwrap();
    let session: AuthSession = serde_json::from_value((*result.data).clone()).unwrap();
    assert_eq!(session.user_details.username, "Alice");

    let (empty, _) = cache_with(EntityStore::new());
    let err = empty.query(GET_AUTH_USER, Value::Null).await.unwrap_err();
    assert!(matches!(err.root(), Error::NotFound(_)));
  }
}
