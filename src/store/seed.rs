//! Mock data set used when the store is seeded.

use chrono::{DateTime, TimeZone, Utc};

use super::EntityStore;
use crate::api::types::{Attachment, Priority, Project, Status, Task, Team, User};

fn date(year: i32, month: u32, day: u32) -> Option<DateTime<Utc>> {
  Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).single()
}

fn user(id: u64, name: &str, picture: &str) -> User {
  User {
    user_id: id,
    username: name.to_string(),
    email: format!("{}@example.com", name.to_lowercase()),
    profile_picture_url: Some(picture.to_string()),
    team_id: None,
  }
}

pub(super) fn mock_data() -> EntityStore {
  let mut store = EntityStore::new();

  store.insert(Project {
    id: 0,
    name: "Apollo".to_string(),
    description: Some("A space exploration project.".to_string()),
    start_date: date(2023, 1, 1),
    end_date: date(2023, 12, 31),
  });
  store.insert(Project {
    id: 0,
    name: "Beacon".to_string(),
    description: Some("Developing advanced navigation systems.".to_string()),
    start_date: date(2023, 2, 1),
    end_date: date(2023, 10, 15),
  });

  store.insert(user(1, "Alice", "p1.jpeg"));
  store.insert(user(2, "Bob", "p2.jpeg"));
  store.insert(user(3, "Carol", "p3.jpeg"));

  store.insert(Task {
    title: "Design the main module".to_string(),
    description: Some("Create the core design for the main module".to_string()),
    status: Some(Status::WorkInProgress),
    priority: Some(Priority::Urgent),
    tags: Some("Design".to_string()),
    start_date: date(2023, 1, 10),
    due_date: date(2023, 4, 10),
    points: Some(8),
    project_id: 1,
    author_user_id: Some(1),
    assigned_user_id: Some(2),
    ..Task::default()
  });
  store.insert(Task {
    title: "Implement navigation algorithm".to_string(),
    description: Some("Develop the core navigation algorithm".to_string()),
    status: Some(Status::ToDo),
    priority: Some(Priority::High),
    tags: Some("Development".to_string()),
    start_date: date(2023, 1, 15),
    due_date: date(2023, 5, 15),
    points: Some(13),
    project_id: 1,
    author_user_id: Some(1),
    assigned_user_id: Some(3),
    ..Task::default()
  });

  store.insert(Team {
    team_id: 0,
    team_name: "Development Team".to_string(),
    product_owner_user_id: Some(1),
    project_manager_user_id: Some(2),
  });
  store.insert(Team {
    team_id: 0,
    team_name: "Design Team".to_string(),
    product_owner_user_id: Some(2),
    project_manager_user_id: Some(3),
  });

  store.insert(Attachment {
    id: 0,
    file_url: "i1.jpg".to_string(),
    file_name: "module-sketch.jpg".to_string(),
    task_id: 1,
    uploaded_by_id: 1,
  });

  store
}
