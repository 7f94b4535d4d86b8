use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use snowbox::config::Config;
use snowbox::{
  select_collection, select_one, select_singleton, Action, Entity, Intent, Orchestrator, Store,
};

#[derive(Parser, Debug)]
#[command(name = "snowbox")]
#[command(about = "Query a REST API through the normalized entity cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/snowbox/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Ignore cached data and always hit the API
  #[arg(short, long)]
  refresh: bool,

  /// Entity key as declared in the config
  entity: String,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Fetch a collection, or the value of a singleton
  Fetch {
    /// Query filters as key=value
    filters: Vec<String>,
  },
  /// Find one record by id
  Find { id: String },
  /// Create or update a record from a JSON object
  Upsert { json: String },
  /// Remove one record by id
  Remove { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let config = Config::load(args.config.as_deref())?;
  let _guard = init_logging(config.log_file.as_deref())?;

  let api = config.api_client()?;
  let entities = config.entities(&api)?;
  let entity = entities
    .get(&args.entity)
    .ok_or_else(|| eyre!("Unknown entity '{}'", args.entity))?;

  let orchestrator = Orchestrator::new(Arc::new(Store::new()));

  let intent = match &args.command {
    Command::Fetch { filters } => {
      let filter = parse_filters(filters)?;
      if entity.is_singleton() {
        Intent::fetch(entity, filter)
      } else {
        Intent::fetch(entity.many(), filter)
      }
    }
    Command::Find { id } => Intent::find(entity, id_payload(entity, id)),
    Command::Upsert { json } => {
      let payload: Value =
        serde_json::from_str(json).map_err(|e| eyre!("Invalid JSON payload: {}", e))?;
      Intent::upsert(entity, payload)
    }
    Command::Remove { id } => Intent::remove(entity, id_payload(entity, id)),
  };
  let intent = if args.refresh { intent.refresh() } else { intent };

  info!(entity = entity.key(), command = ?args.command, "dispatching");
  let outcome = orchestrator.dispatch(intent).await;

  let success = match outcome {
    Action::Succeeded(success) => success,
    Action::Failed(failure) => {
      return Err(eyre!("{} request failed: {}", entity.key(), failure.error));
    }
    other => return Err(eyre!("Unexpected outcome: {:?}", other)),
  };

  let state = orchestrator.store().state();
  let view = match &args.command {
    Command::Fetch { .. } if entity.is_singleton() => select_singleton(entity)
      .select(&state)
      .map(|value| value.as_ref().clone())
      .unwrap_or(Value::Null),
    Command::Fetch { filters } => {
      let filter = parse_filters(filters)?;
      Value::Array(select_collection(entity).hydrate(1).select(&state, &filter).to_vec())
    }
    Command::Find { .. } | Command::Upsert { .. } => {
      let id = success.result.unwrap_or(Value::Null);
      select_one(entity)
        .hydrate(1)
        .select(&state, &id)
        .map(|value| value.as_ref().clone())
        .unwrap_or(Value::Null)
    }
    Command::Remove { id } => {
      println!("Removed {} {}", entity.key(), id);
      return Ok(());
    }
  };

  println!("{}", serde_json::to_string_pretty(&view)?);

  Ok(())
}

/// Log to the configured file, or stderr. Verbosity comes from SNOWBOX_LOG.
fn init_logging(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let filter = EnvFilter::try_from_env("SNOWBOX_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));

  let Some(path) = log_file else {
    tracing_subscriber::fmt()
      .with_env_filter(filter)
      .with_writer(std::io::stderr)
      .init();
    return Ok(None);
  };

  let file_name = path
    .file_name()
    .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;
  let dir = path
    .parent()
    .filter(|dir| !dir.as_os_str().is_empty())
    .unwrap_or(Path::new("."));

  let appender = tracing_appender::rolling::never(dir, file_name);
  let (writer, guard) = tracing_appender::non_blocking(appender);
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(Some(guard))
}

/// Turn `key=value` pairs into a filter object. Values that parse as JSON
/// (numbers, booleans) keep their type; everything else is a string.
fn parse_filters(filters: &[String]) -> Result<Value> {
  let mut map = Map::new();
  for filter in filters {
    let (key, raw) = filter
      .split_once('=')
      .ok_or_else(|| eyre!("Filter '{}' must look like key=value", filter))?;
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    map.insert(key.to_string(), value);
  }
  Ok(Value::Object(map))
}

fn id_payload(entity: &Entity, id: &str) -> Value {
  let mut map = Map::new();
  map.insert(entity.id_field().to_string(), Value::String(id.to_string()));
  Value::Object(map)
}
