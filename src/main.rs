mod api;
mod app;
mod cache;
mod commands;
mod config;
mod error;
mod logging;
mod query;
mod store;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "taskboard")]
#[command(about = "A project-management shell over a tag-invalidated query cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/taskboard/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Start with an empty store instead of the mock data
  #[arg(long)]
  empty: bool,

  /// Run `;`-separated commands and exit
  #[arg(short, long, value_name = "SCRIPT")]
  execute: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config.log)?;

  let seeded = config.seed && !args.empty;
  let store = if seeded {
    store::EntityStore::seeded()
  } else {
    store::EntityStore::new()
  };
  info!(seeded, "store ready");

  let client = api::TaskboardClient::new(
    &store.shared(),
    config.session.user_id,
    config.cache.event_capacity,
  )?;

  let mut app = app::App::new(client);
  match args.execute {
    Some(script) => app.run_script(&script).await?,
    None => app.run_interactive().await?,
  }

  Ok(())
}
