use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::entity::{Entity, EntityBuilder, Schema};
use crate::error::{DescriptorError, TransportError};
use crate::http::{ApiClient, ApiOptions, ContentType, Method, TokenSource};
use crate::provider::{ProviderOptions, RestProvider};
use crate::response::ResponseOptions;

type TokenResult = Result<String, TransportError>;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  /// Write logs to this file instead of stderr
  pub log_file: Option<PathBuf>,
  #[serde(default)]
  pub entities: BTreeMap<String, EntityConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  pub base_url: String,
  /// Header carrying the token (e.g. "Authorization")
  pub token_header: Option<String>,
  /// Environment variable holding the token
  #[serde(default = "default_token_env")]
  pub token_env: String,
}

fn default_token_env() -> String {
  "SNOWBOX_API_TOKEN".to_string()
}

fn default_id_field() -> String {
  "id".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntityConfig {
  /// Resource path segment; defaults to the entity key
  pub particle: Option<String>,
  #[serde(default = "default_id_field")]
  pub id_field: String,
  #[serde(default)]
  pub singleton: bool,
  pub stale_timeout_ms: Option<u64>,
  pub update_method: Option<Method>,
  #[serde(default)]
  pub content_type: ContentType,
  #[serde(flatten)]
  pub response: ResponseOptions,
  #[serde(default)]
  pub relations: BTreeMap<String, RelationConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelationConfig {
  pub entity: String,
  /// Field holds an array of records
  #[serde(default)]
  pub many: bool,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./snowbox.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/snowbox/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/snowbox/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("snowbox.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("snowbox").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }

  /// Build the API client. The token is read from the environment on every
  /// request, so rotating it needs no restart.
  pub fn api_client(&self) -> Result<ApiClient, DescriptorError> {
    let token_source = self.api.token_header.as_ref().map(|_| {
      let var = self.api.token_env.clone();
      let source: TokenSource = Arc::new(move || -> BoxFuture<'static, TokenResult> {
        let token = std::env::var(&var).map_err(|_| {
          let message = format!("API token not found. Set {} environment variable.", var);
          TransportError::new(None, message)
        });
        Box::pin(async move { token })
      });
      source
    });

    ApiClient::new(ApiOptions {
      base_url: self.api.base_url.clone(),
      token_header: self.api.token_header.clone(),
      token_source,
    })
  }

  /// Build every configured entity. Relations are resolved by key, so
  /// entities may refer to themselves or to each other.
  pub fn entities(&self, api: &ApiClient) -> Result<BTreeMap<String, Entity>, DescriptorError> {
    let mut schema = Schema::new();
    for (key, config) in &self.entities {
      schema = schema.entity(entity_builder(key, config, api)?);
    }
    schema.build()
  }
}

fn entity_builder(
  key: &str,
  config: &EntityConfig,
  api: &ApiClient,
) -> Result<EntityBuilder, DescriptorError> {
  let mut builder = Entity::builder(key).id_field(config.id_field.clone());

  for (field, relation) in &config.relations {
    builder = if relation.many {
      builder.has_many_ref(field.clone(), relation.entity.clone())
    } else {
      builder.has_one_ref(field.clone(), relation.entity.clone())
    };
  }

  if config.singleton {
    builder = builder.singleton();
  }
  if let Some(ms) = config.stale_timeout_ms {
    builder = builder.stale_timeout(Duration::from_millis(ms));
  }

  let particle = config.particle.clone().unwrap_or_else(|| key.to_string());
  let mut options = ProviderOptions::new(particle);
  options.id_field = config.id_field.clone();
  options.response = config.response.clone();
  options.upsert_content_type = config.content_type;
  if let Some(method) = config.update_method {
    options.update_method = method;
  }
  let provider = RestProvider::new(api.clone(), options)?;

  Ok(builder.provider(Arc::new(provider)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::entity::Relation;

  const SAMPLE: &str = r#"
api:
  base_url: http://localhost:3000
  token_header: Authorization
entities:
  todo:
    particle: todos
    stale_timeout_ms: 30000
    relations:
      owner:
        entity: user
      watchers:
        entity: user
        many: true
  user:
    id_field: uuid
    entities_path: records
    meta_path: pagination
  settings:
    singleton: true
    update_method: patch
"#;

  #[test]
  fn test_parse_sample() {
    let config = Config::parse(SAMPLE).unwrap();

    assert_eq!(config.api.base_url, "http://localhost:3000");
    assert_eq!(config.api.token_env, "SNOWBOX_API_TOKEN");
    assert_eq!(config.entities["todo"].stale_timeout_ms, Some(30000));
    assert_eq!(config.entities["user"].id_field, "uuid");
    assert_eq!(config.entities["user"].response.entities_path, "records");
    assert_eq!(config.entities["user"].response.entity_path, "data");
    assert_eq!(config.entities["settings"].update_method, Some(Method::Patch));
  }

  #[test]
  fn test_build_entities() {
    let config = Config::parse(SAMPLE).unwrap();
    let api = config.api_client().unwrap();
    let entities = config.entities(&api).unwrap();

    let todo = &entities["todo"];
    assert_eq!(todo.stale_timeout(), Some(Duration::from_secs(30)));
    assert!(todo.provider().is_some());
    assert_eq!(todo.schema()["owner"], Relation::One("user".to_string()));
    assert_eq!(todo.schema()["watchers"], Relation::Many("user".to_string()));
    let owner = todo.related(&todo.schema()["owner"]).unwrap();
    assert_eq!(owner.id_field(), "uuid");
    assert!(entities["settings"].is_singleton());
  }

  #[test]
  fn test_unknown_relation() {
    let config = Config::parse(
      r#"
api:
  base_url: http://localhost:3000
entities:
  todo:
    relations:
      owner:
        entity: ghost
"#,
    )
    .unwrap();
    let api = config.api_client().unwrap();

    assert!(matches!(
      config.entities(&api),
      Err(DescriptorError::UnknownRelation { .. })
    ));
  }

  #[test]
  fn test_recursive_relations() {
    let config = Config::parse(
      r#"
api:
  base_url: http://localhost:3000
entities:
  comment:
    relations:
      replies:
        entity: comment
        many: true
      post:
        entity: post
  post:
    relations:
      comments:
        entity: comment
        many: true
"#,
    )
    .unwrap();
    let api = config.api_client().unwrap();
    let entities = config.entities(&api).unwrap();

    let comment = &entities["comment"];
    let replies = comment.related(&comment.schema()["replies"]).unwrap();
    assert_eq!(replies.key(), "comment");
    let post = comment.related(&comment.schema()["post"]).unwrap();
    assert_eq!(post.related(&post.schema()["comments"]).unwrap().key(), "comment");
  }

  #[test]
  fn test_missing_explicit_path() {
    assert!(Config::load(Some(Path::new("/nonexistent/snowbox.yaml"))).is_err());
  }
}
