use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::store::{Collection, Entity, EntityStore};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
  pub id: u64,
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub start_date: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
  Urgent,
  High,
  Medium,
  Low,
  Backlog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
  #[serde(rename = "To Do")]
  ToDo,
  #[serde(rename = "Work In Progress")]
  WorkInProgress,
  #[serde(rename = "Under Review")]
  UnderReview,
  Completed,
}

impl Status {
  pub const ALL: [Status; 4] = [
    Status::ToDo,
    Status::WorkInProgress,
    Status::UnderReview,
    Status::Completed,
  ];

  pub fn label(&self) -> &'static str {
    match self {
      Status::ToDo => "To Do",
      Status::WorkInProgress => "Work In Progress",
      Status::UnderReview => "Under Review",
      Status::Completed => "Completed",
    }
  }
}

impl fmt::Display for Status {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.label())
  }
}

/// Parses labels loosely: case, spaces, dashes and underscores are ignored,
/// so "todo", "to-do" and "To Do" are all accepted.
impl FromStr for Status {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let normalize = |v: &str| {
      v.chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase()
    };
    let wanted = normalize(s);

    Status::ALL
      .into_iter()
      .find(|status| normalize(status.label()) == wanted)
      .ok_or_else(|| Error::InvalidArguments(format!("unknown status '{}'", s)))
  }
}

impl fmt::Display for Priority {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let label = match self {
      Priority::Urgent => "Urgent",
      Priority::High => "High",
      Priority::Medium => "Medium",
      Priority::Low => "Low",
      Priority::Backlog => "Backlog",
    };
    f.write_str(label)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
  pub user_id: u64,
  pub username: String,
  pub email: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub profile_picture_url: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub team_id: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
  pub id: u64,
  #[serde(rename = "fileURL")]
  pub file_url: String,
  pub file_name: String,
  pub task_id: u64,
  pub uploaded_by_id: u64,
}

/// A task. `author`, `assignee` and `attachments` are snapshots resolved
/// when the task is read, not kept in sync with the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
  pub id: u64,
  pub title: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub status: Option<Status>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub priority: Option<Priority>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tags: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub start_date: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub due_date: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub points: Option<u32>,
  pub project_id: u64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub author_user_id: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub assigned_user_id: Option<u64>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub author: Option<User>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub assignee: Option<User>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
  pub team_id: u64,
  pub team_name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub product_owner_user_id: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub project_manager_user_id: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
  pub tasks: Vec<Task>,
  pub projects: Vec<Project>,
  pub users: Vec<User>,
}

/// The signed-in user as reported by `getAuthUser`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
  pub username: String,
  pub user_sub: String,
  pub user_details: User,
}

// ============================================================================
// Operation arguments
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub start_date: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub status: Option<Status>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub priority: Option<Priority>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tags: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub start_date: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub due_date: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub points: Option<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub project_id: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub author_user_id: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub assigned_user_id: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectTasks {
  pub project_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
  pub task_id: u64,
  pub status: Status,
}

// ============================================================================
// Entity implementations
// ============================================================================

impl Entity for Project {
  const TAG: &'static str = "Projects";

  fn id(&self) -> u64 {
    self.id
  }

  fn set_id(&mut self, id: u64) {
    self.id = id;
  }

  fn collection(store: &EntityStore) -> &Collection<Self> {
    &store.projects
  }

  fn collection_mut(store: &mut EntityStore) -> &mut Collection<Self> {
    &mut store.projects
  }
}

impl Entity for Task {
  const TAG: &'static str = "Tasks";

  fn id(&self) -> u64 {
    self.id
  }

  fn set_id(&mut self, id: u64) {
    self.id = id;
  }

  fn collection(store: &EntityStore) -> &Collection<Self> {
    &store.tasks
  }

  fn collection_mut(store: &mut EntityStore) -> &mut Collection<Self> {
    &mut store.tasks
  }
}

impl Entity for User {
  const TAG: &'static str = "Users";

  fn id(&self) -> u64 {
    self.user_id
  }

  fn set_id(&mut self, id: u64) {
    self.user_id = id;
  }

  fn collection(store: &EntityStore) -> &Collection<Self> {
    &store.users
  }

  fn collection_mut(store: &mut EntityStore) -> &mut Collection<Self> {
    &mut store.users
  }
}

impl Entity for Team {
  const TAG: &'static str = "Teams";

  fn id(&self) -> u64 {
    self.team_id
  }

  fn set_id(&mut self, id: u64) {
    self.team_id = id;
  }

  fn collection(store: &EntityStore) -> &Collection<Self> {
    &store.teams
  }

  fn collection_mut(store: &mut EntityStore) -> &mut Collection<Self> {
    &mut store.teams
  }
}

impl Entity for Attachment {
  const TAG: &'static str = "Attachments";

  fn id(&self) -> u64 {
    self.id
  }

  fn set_id(&mut self, id: u64) {
    self.id = id;
  }

  fn collection(store: &EntityStore) -> &Collection<Self> {
    &store.attachments
  }

  fn collection_mut(store: &mut EntityStore) -> &mut Collection<Self> {
    &mut store.attachments
  }
}
