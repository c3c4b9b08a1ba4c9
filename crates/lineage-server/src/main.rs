//! lineage server binary.
//!
//! Reads `lineage.toml` (or the path given with `--config`) layered under
//! `LINEAGE_*` environment variables, opens the SQLite store, and either
//! serves the JSON API or runs one maintenance command.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use lineage_core::store::{EventStore, ProjectionEngine, SnapshotStore};
use lineage_server::ServerConfig;
use lineage_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(author, version, about = "Lineage genealogy store")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "lineage.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the JSON API (the default).
  Serve,
  /// Replay the event log into the read model.
  Rebuild {
    /// Replay events after this position; `0` clears the read model first.
    #[arg(long, default_value_t = 0)]
    from: i64,
  },
  /// Continue an interrupted rebuild from its checkpoint.
  ResumeRebuild,
  /// Manage named log positions.
  #[command(subcommand)]
  Snapshot(SnapshotCommand),
  /// Print events as JSON lines.
  Tail {
    /// Start after this position.
    #[arg(long, default_value_t = 0)]
    from:   i64,
    /// Keep polling for new events.
    #[arg(short, long)]
    follow: bool,
  },
}

#[derive(Subcommand)]
enum SnapshotCommand {
  Create {
    name:        String,
    #[arg(short, long)]
    description: Option<String>,
  },
  List,
  Delete {
    id: Uuid,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("LINEAGE"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?
    .with_rebuild_page_size(server_cfg.rebuild_page_size);

  match cli.command.unwrap_or(Command::Serve) {
    Command::Serve => serve(store, &server_cfg).await,
    Command::Rebuild { from } => {
      let report = store.rebuild(from).await.context("rebuild failed")?;
      println!("{}", serde_json::to_string_pretty(&report)?);
      Ok(())
    }
    Command::ResumeRebuild => {
      let report = store.resume_rebuild().await.context("rebuild failed")?;
      println!("{}", serde_json::to_string_pretty(&report)?);
      Ok(())
    }
    Command::Snapshot(cmd) => snapshot(&store, cmd).await,
    Command::Tail { from, follow } => tail(&store, from, follow).await,
  }
}

async fn serve(store: SqliteStore, cfg: &ServerConfig) -> anyhow::Result<()> {
  let app = lineage_server::router(Arc::new(store));
  let address = cfg.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;
  Ok(())
}

async fn snapshot(store: &SqliteStore, cmd: SnapshotCommand) -> anyhow::Result<()> {
  match cmd {
    SnapshotCommand::Create { name, description } => {
      let snapshot = store
        .create_snapshot(name, description)
        .await
        .context("failed to create snapshot")?;
      println!("{}", serde_json::to_string_pretty(&snapshot)?);
    }
    SnapshotCommand::List => {
      for s in store.list_snapshots().await.context("failed to list snapshots")? {
        println!(
          "{}  {:>8}  {}  {}",
          s.snapshot_id,
          s.position,
          s.created_at.format("%Y-%m-%d %H:%M"),
          s.name
        );
      }
    }
    SnapshotCommand::Delete { id } => {
      store
        .delete_snapshot(id)
        .await
        .with_context(|| format!("failed to delete snapshot {id}"))?;
    }
  }
  Ok(())
}

const TAIL_BATCH: usize = 500;
const TAIL_POLL: Duration = Duration::from_secs(1);

async fn tail(store: &SqliteStore, from: i64, follow: bool) -> anyhow::Result<()> {
  let mut position = from;
  loop {
    let batch = store
      .read_all(position, TAIL_BATCH)
      .await
      .context("failed to read the event log")?;
    for event in &batch {
      println!("{}", serde_json::to_string(event)?);
      position = event.position;
    }
    if batch.len() == TAIL_BATCH {
      continue;
    }
    if !follow {
      return Ok(());
    }
    tokio::time::sleep(TAIL_POLL).await;
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
