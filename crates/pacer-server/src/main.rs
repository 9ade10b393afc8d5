//! pacer-server binary.
//!
//! Settings come from defaults, then an optional TOML file (`--config`), then
//! `PACER_*` environment variables (`PACER_PORT=9000`). The SQLite database
//! is created on first start. Ctrl-C stops accepting connections and lets
//! in-flight requests finish.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::{Context as _, Result};
use clap::Parser;
use pacer_server::ServerConfig;
use pacer_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Pacer challenge server")]
struct Cli {
  /// TOML settings file; missing is fine.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let cfg = load_config(cli.config)?;
  let store = open_store(&cfg.store_path).await?;

  let app = pacer_server::router(Arc::new(store));
  let address = cfg.address();
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("binding {address}"))?;
  tracing::info!(%address, "pacer-server listening");

  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for ctrl-c");
      }
      tracing::info!("shutting down");
    })
    .await
    .context("serving HTTP")
}

fn load_config(file: PathBuf) -> Result<ServerConfig> {
  config::Config::builder()
    .set_default("host", ServerConfig::DEFAULT_HOST)?
    .set_default("port", i64::from(ServerConfig::DEFAULT_PORT))?
    .set_default("store_path", ServerConfig::DEFAULT_STORE_PATH)?
    .add_source(config::File::from(file).required(false))
    .add_source(config::Environment::with_prefix("PACER"))
    .build()
    .context("reading settings")?
    .try_deserialize()
    .context("invalid settings")
}

/// Opens (creating if needed) the database, expanding a leading `~`.
async fn open_store(configured: &Path) -> Result<SqliteStore> {
  let path = match configured.to_str().and_then(|s| s.strip_prefix("~/")) {
    Some(rest) => std::env::var_os("HOME")
      .map(|home| PathBuf::from(home).join(rest))
      .context("HOME is not set; cannot expand store_path")?,
    None => configured.to_path_buf(),
  };

  if let Some(dir) = path.parent()
    && !dir.as_os_str().is_empty()
  {
    std::fs::create_dir_all(dir)
      .with_context(|| format!("creating {}", dir.display()))?;
  }

  let store = SqliteStore::open(&path)
    .await
    .with_context(|| format!("opening store at {}", path.display()))?;
  tracing::info!(path = %path.display(), "store opened");
  Ok(store)
}
