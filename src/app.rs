use crate::api::types::{NewProject, NewTask, Project, Status, Task, User};
use crate::api::TaskboardClient;
use crate::cache::{CacheResult, CacheSource, Tag, TagSet};
use crate::commands::{self, Command};
use crate::error::{Error, Result};
use crate::query::QueryObserver;
use color_eyre::eyre::WrapErr;
use serde_json::json;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

/// What the shell should do after a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
  /// Print the output and read the next command
  Output(String),
  /// Stop the shell
  Quit,
}

/// Line-oriented shell over the taskboard client
pub struct App {
  client: TaskboardClient,

  /// Observer started by `watch`, with the project it follows
  watch: Option<(u64, QueryObserver<Vec<Task>>)>,
}

impl App {
  pub fn new(client: TaskboardClient) -> Self {
    Self {
      client,
      watch: None,
    }
  }

  /// Read commands from stdin until `quit` or end of input.
  pub async fn run_interactive(&mut self) -> color_eyre::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("taskboard {} - type `help` for commands", env!("CARGO_PKG_VERSION"));

    loop {
      print!("> ");
      std::io::stdout().flush().wrap_err("Failed to flush stdout")?;

      let Some(line) = lines.next_line().await.wrap_err("Failed to read stdin")? else {
        break;
      };
      if !self.handle_line(&line).await {
        break;
      }
    }

    Ok(())
  }

  /// Run `;`-separated commands, stopping early on `quit`.
  pub async fn run_script(&mut self, script: &str) -> color_eyre::Result<()> {
    for line in script.split(';') {
      if !self.handle_line(line).await {
        break;
      }
    }
    Ok(())
  }

  /// Execute and print one line. Returns false once the shell should stop.
  async fn handle_line(&mut self, line: &str) -> bool {
    match self.execute(line).await {
      Ok(Reply::Output(text)) => {
        if !text.is_empty() {
          println!("{}", text);
        }
        true
      }
      Ok(Reply::Quit) => false,
      Err(e) => {
        println!("error: {}", e);
        true
      }
    }
  }

  /// Execute one command line.
  pub async fn execute(&mut self, line: &str) -> Result<Reply> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((&word, args)) = words.split_first() else {
      return Ok(Reply::Output(String::new()));
    };

    let cmd = Self::resolve_command(word)?;
    debug!(command = cmd.name, ?args, "executing");

    let mut out = match cmd.name {
      "me" => {
        let session = self.client.get_auth_user().await?;
        vec![with_source(
          format!("{} ({})", session.data.username, session.data.user_details.email),
          &session,
        )]
      }
      "projects" => {
        let projects = self.client.get_projects().await?;
        listing(&projects, format_project)
      }
      "new-project" => {
        let name = (!args.is_empty()).then(|| args.join(" "));
        let project = self
          .client
          .create_project(&NewProject {
            name,
            ..NewProject::default()
          })
          .await?;
        vec![format!("created {}", format_project(&project))]
      }
      "tasks" => {
        let project_id = parse_id(args.first(), "projectId")?;
        let tasks = self.client.get_tasks(project_id).await?;
        listing(&tasks, format_task)
      }
      "user-tasks" => {
        let user_id = parse_id(args.first(), "userId")?;
        let tasks = self.client.get_tasks_by_user(user_id).await?;
        listing(&tasks, format_task)
      }
      "new-task" => {
        let project_id = parse_id(args.first(), "projectId")?;
        let title = args.get(1..).unwrap_or_default().join(" ");
        if title.is_empty() {
          return Err(Error::InvalidArguments("missing title".to_string()));
        }
        let task = self
          .client
          .create_task(&NewTask {
            title: Some(title),
            project_id: Some(project_id),
            ..NewTask::default()
          })
          .await?;
        vec![format!("created {}", format_task(&task))]
      }
      "status" => {
        let task_id = parse_id(args.first(), "taskId")?;
        let status: Status = args.get(1..).unwrap_or_default().join(" ").parse()?;
        let task = self.client.update_task_status(task_id, status).await?;
        vec![format!("updated {}", format_task(&task))]
      }
      "users" => {
        let users = self.client.get_users().await?;
        listing(&users, format_user)
      }
      "teams" => {
        let teams = self.client.get_teams().await?;
        listing(&teams, |t| format!("{:>3}  {}", t.team_id, t.team_name))
      }
      "search" => {
        let results = self.client.search(&args.join(" ")).await?;
        let found = &results.data;
        let mut lines = vec![with_source(
          format!(
            "{} tasks, {} projects, {} users",
            found.tasks.len(),
            found.projects.len(),
            found.users.len()
          ),
          &results,
        )];
        lines.extend(found.tasks.iter().map(format_task));
        lines.extend(found.projects.iter().map(format_project));
        lines.extend(found.users.iter().map(format_user));
        lines
      }
      "cache" => self.cache_lines(),
      "invalidate" => {
        let tags = parse_tags(args)?;
        let count = self.client.cache().invalidate(&tags);
        info!(count, "manual invalidation");
        vec![format!("invalidated {} entries", count)]
      }
      "watch" => {
        let project_id = parse_id(args.first(), "projectId")?;
        let mut observer = QueryObserver::new(
          self.client.cache().clone(),
          crate::api::endpoints::GET_TASKS,
          json!({ "projectId": project_id }),
        );
        observer.fetch();
        self.watch = Some((project_id, observer));
        // The first result is reported by the next command
        return Ok(Reply::Output(format!("watching tasks of project {}", project_id)));
      }
      "help" => {
        let mut lines: Vec<String> = commands::COMMANDS
          .iter()
          .map(|c| format!("{:<30} {}", c.usage, c.description))
          .collect();
        lines.push(String::new());
        lines.push(format!(
          "operations: {}",
          self.client.cache().registry().names().join(", ")
        ));
        lines
      }
      "quit" => return Ok(Reply::Quit),
      other => return Err(Error::NotFound(format!("command `{}`", other))),
    };

    out.extend(self.poll_watch().await);
    Ok(Reply::Output(out.join("\n")))
  }

  fn resolve_command(word: &str) -> Result<&'static Command> {
    if let Some(cmd) = commands::resolve(word) {
      return Ok(cmd);
    }

    let candidates: Vec<&str> = commands::best_matches(word)
      .iter()
      .map(|c| c.name)
      .collect();
    if candidates.is_empty() {
      Err(Error::NotFound(format!("command `{}`", word)))
    } else {
      Err(Error::InvalidArguments(format!(
        "`{}` is ambiguous: {}",
        word,
        candidates.join(", ")
      )))
    }
  }

  fn cache_lines(&self) -> Vec<String> {
    let entries = self.client.cache().entries();
    if entries.is_empty() {
      return vec!["cache is empty".to_string()];
    }

    entries
      .iter()
      .map(|entry| {
        let tags: Vec<String> = entry.tags.iter().map(Tag::to_string).collect();
        let fetched = entry
          .fetched_at
          .map(|t| t.format("%H:%M:%S").to_string())
          .unwrap_or_else(|| "-".to_string());
        format!(
          "{:<28} {:<8} {:<9} [{}]",
          entry.key.to_string(),
          format!("{:?}", entry.state),
          fetched,
          tags.join(", ")
        )
      })
      .collect()
  }

  /// Report what the watched query did since the last command.
  async fn poll_watch(&mut self) -> Vec<String> {
    let Some((project_id, observer)) = self.watch.as_mut() else {
      return Vec::new();
    };

    // Let a refetch spawned by the previous poll make progress
    tokio::task::yield_now().await;

    let was_stale = observer.is_stale();
    let changed = observer.poll();
    let mut lines = Vec::new();

    if observer.is_stale() && !was_stale {
      lines.push(format!("[watch] project {}: invalidated, refetching", project_id));
    }
    if changed {
      if let Some(e) = observer.state().error() {
        lines.push(format!("[watch] project {}: {}", project_id, e));
      } else if let Some(tasks) = observer.data() {
        lines.push(format!("[watch] project {}: {} tasks", project_id, tasks.len()));
      }
    }
    lines
  }
}

fn parse_id(arg: Option<&&str>, name: &str) -> Result<u64> {
  let arg = arg.ok_or_else(|| Error::InvalidArguments(format!("missing {}", name)))?;
  arg
    .parse()
    .map_err(|_| Error::InvalidArguments(format!("{} must be a number, got '{}'", name, arg)))
}

fn parse_tags(args: &[&str]) -> Result<TagSet> {
  if args.is_empty() {
    return Err(Error::InvalidArguments("expected at least one tag".to_string()));
  }
  args
    .iter()
    .map(|arg| {
      Tag::parse(arg).ok_or_else(|| Error::InvalidArguments(format!("invalid tag '{}'", arg)))
    })
    .collect()
}

fn source_label(source: CacheSource) -> &'static str {
  match source {
    CacheSource::Executor => "fetched",
    CacheSource::InFlight => "joined in-flight fetch",
    CacheSource::CacheFresh => "cached",
  }
}

fn with_source<T>(line: String, result: &CacheResult<T>) -> String {
  format!("{}  ({})", line, source_label(result.source))
}

fn listing<T>(result: &CacheResult<Vec<T>>, format: impl Fn(&T) -> String) -> Vec<String> {
  let mut lines = vec![with_source(format!("{} found", result.data.len()), result)];
  lines.extend(result.data.iter().map(format));
  lines
}

fn format_project(project: &Project) -> String {
  format!("{:>3}  {}", project.id, project.name)
}

fn format_user(user: &User) -> String {
  format!("{:>3}  {} <{}>", user.user_id, user.username, user.email)
}

fn format_task(task: &Task) -> String {
  let status = task.status.map(|s| s.label()).unwrap_or("-");
  let priority = task
    .priority
    .map(|p| p.to_string())
    .unwrap_or_else(|| "-".to_string());
  let assignee = task
    .assignee
    .as_ref()
    .map(|u| u.username.as_str())
    .unwrap_or("unassigned");
  format!(
    "{:>3}  [{}] {} ({}, {}, project {})",
    task.id, status, task.title, priority, assignee, task.project_id
  )
}
