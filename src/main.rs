mod app;
mod commands;
mod event;
mod ui;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use formation_portal::cache::{
  CacheLayer, CacheScope, DurableStorage, MemoryProvider, PersistentProvider, SqliteStorage,
};
use formation_portal::config::Config;
use formation_portal::logging;
use formation_portal::portal::{PortalClient, PortalQueries};
use formation_portal::query::QueryOptions;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "formation-portal")]
#[command(about = "Terminal client for the formation portal")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/formation-portal/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Signed-in user; overrides `user` from the config file
  #[arg(short, long)]
  user: Option<String>,

  /// Keep the cache in memory only
  #[arg(long)]
  no_persist: bool,
}

fn build_layer(config: &Config, persist: bool) -> Result<CacheLayer> {
  if !persist {
    info!("persistence disabled, cache is memory only");
    return Ok(CacheLayer::new(MemoryProvider::new()));
  }

  let storage = match &config.cache.database {
    Some(path) => SqliteStorage::open(path)?,
    None => SqliteStorage::open_default()?,
  };
  let storage: Arc<dyn DurableStorage> = Arc::new(storage);

  let scope = match &config.user {
    Some(user) => CacheScope::user(user),
    None => CacheScope::Public,
  };
  let provider = PersistentProvider::hydrate(storage, &scope, config.cache.persist_settings());
  Ok(CacheLayer::new(provider))
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let _log_guard = logging::init(&logging::log_dir())?;

  let mut config = Config::load(args.config.as_deref())?;
  if args.user.is_some() {
    config.user = args.user;
  }

  let client = PortalClient::new(&config)?;
  let title = config
    .title
    .clone()
    .unwrap_or_else(|| "formation-portal".to_string());

  let persist = config.cache.persist && !args.no_persist;
  let layer = build_layer(&config, persist)?;
  let queries = PortalQueries::new(
    client,
    layer.clone(),
    QueryOptions::from_config(&config.cache),
  );

  info!(user = config.user.as_deref().unwrap_or("-"), persist, "starting");

  let result = app::App::new(queries, title).run().await;

  // Flush pending snapshot writes before exiting
  layer.dispose();

  result.map_err(|e| eyre!("Application error: {}", e))
}
