//! Transport capability bound to an entity, and its REST implementation.

use futures::future::BoxFuture;
use serde_json::{Map, Value};

use crate::entity::id_key;
use crate::error::{DescriptorError, TransportError};
use crate::http::{ApiClient, ContentType, Method};
use crate::response::{Response, ResponseOptions};

/// Result of a transport call.
pub type TransportResult = Result<Response, TransportError>;

/// Data-access capability that performs the network calls for one entity.
///
/// The cache engine never talks HTTP itself; it only calls these four
/// operations and feeds the [`Response`] into its reducers.
pub trait Provider: Send + Sync {
  /// Load one record, addressed by an id or a filter carrying the id.
  fn find(&self, filter: Value) -> BoxFuture<'_, TransportResult>;

  /// Load a collection matching `filter`.
  fn fetch(&self, filter: Value) -> BoxFuture<'_, TransportResult>;

  /// Create or update a record.
  fn upsert(&self, data: Value, params: Option<Value>) -> BoxFuture<'_, TransportResult>;

  /// Delete the record addressed by `data` (an id or the record itself).
  fn remove(&self, data: Value) -> BoxFuture<'_, TransportResult>;
}

/// Settings for [`RestProvider`].
#[derive(Debug, Clone)]
pub struct ProviderOptions {
  /// Resource path segment (e.g. "todos")
  pub particle: String,
  pub id_field: String,
  pub response: ResponseOptions,
  pub create_method: Method,
  pub update_method: Method,
  pub remove_method: Method,
  pub upsert_content_type: ContentType,
}

impl ProviderOptions {
  pub fn new(particle: impl Into<String>) -> Self {
    Self {
      particle: particle.into(),
      id_field: "id".to_string(),
      response: ResponseOptions::default(),
      create_method: Method::Post,
      update_method: Method::Put,
      remove_method: Method::Delete,
      upsert_content_type: ContentType::Json,
    }
  }
}

/// Provider mapping the four operations onto conventional REST routes
/// under `/{particle}`.
#[derive(Debug, Clone)]
pub struct RestProvider {
  api: ApiClient,
  options: ProviderOptions,
}

impl RestProvider {
  pub fn new(api: ApiClient, options: ProviderOptions) -> Result<Self, DescriptorError> {
    if options.particle.is_empty() {
      return Err(DescriptorError::EmptyParticle);
    }
    if options.id_field.is_empty() {
      return Err(DescriptorError::EmptyIdField {
        entity: options.particle,
      });
    }

    Ok(Self { api, options })
  }

  /// Id carried by `value`: itself when scalar, else its id field.
  fn id_of(&self, value: &Value) -> Option<String> {
    match value {
      Value::Object(map) => map.get(&self.options.id_field).and_then(id_key),
      other => id_key(other),
    }
  }

  /// `/{particle}/{id}`, or `/{particle}` when there is no id. The id is
  /// percent-encoded; a particle may span several segments.
  fn path(&self, id: Option<&str>) -> Result<String, TransportError> {
    let mut segments: Vec<&str> = self
      .options
      .particle
      .split('/')
      .filter(|segment| !segment.is_empty())
      .collect();
    segments.extend(id);
    self.api.path(&segments)
  }

  /// Filter fields other than the id become query params.
  fn params(&self, filter: &Value) -> Option<Value> {
    match filter {
      Value::Object(map) => {
        let rest: Map<String, Value> = map
          .iter()
          .filter(|(key, _)| **key != self.options.id_field)
          .map(|(key, value)| (key.clone(), value.clone()))
          .collect();
        Some(Value::Object(rest))
      }
      _ => None,
    }
  }

  fn upsert_method(&self, data: &Value) -> Method {
    if self.id_of(data).is_some() {
      self.options.update_method
    } else {
      self.options.create_method
    }
  }
}

impl Provider for RestProvider {
  fn find(&self, filter: Value) -> BoxFuture<'_, TransportResult> {
    Box::pin(async move {
      let path = self.path(self.id_of(&filter).as_deref())?;
      let params = self.params(&filter);
      let raw = self.api.get(&path, params.as_ref()).await?;
      Ok(Response::from_raw(raw, &self.options.response, false))
    })
  }

  fn fetch(&self, filter: Value) -> BoxFuture<'_, TransportResult> {
    Box::pin(async move {
      let path = self.path(None)?;
      let params = self.params(&filter);
      let raw = self.api.get(&path, params.as_ref()).await?;
      Ok(Response::from_raw(raw, &self.options.response, true))
    })
  }

  fn upsert(&self, data: Value, params: Option<Value>) -> BoxFuture<'_, TransportResult> {
    Box::pin(async move {
      let path = self.path(self.id_of(&data).as_deref())?;
      let params = params.as_ref();
      let content_type = self.options.upsert_content_type;
      let raw = match self.upsert_method(&data) {
        Method::Post => self.api.post(&path, &data, params, content_type).await?,
        Method::Put => self.api.put(&path, &data, params, content_type).await?,
        Method::Patch => self.api.patch(&path, &data, params, content_type).await?,
        other => {
          self
            .api
            .request(other, &path, params, Some(&data), content_type)
            .await?
        }
      };
      Ok(Response::from_raw(raw, &self.options.response, false))
    })
  }

  fn remove(&self, data: Value) -> BoxFuture<'_, TransportResult> {
    Box::pin(async move {
      let path = self.path(self.id_of(&data).as_deref())?;
      let raw = match self.options.remove_method {
        Method::Delete => self.api.delete(&path).await?,
        other => {
          self
            .api
            .request(other, &path, None, None, ContentType::Json)
            .await?
        }
      };
      Ok(Response::from_raw(raw, &self.options.response, false))
    })
  }
}
