//! Thin REST client used by [`RestProvider`](crate::provider::RestProvider).

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::multipart::Form;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::{DescriptorError, TransportError};
use crate::fingerprint::display_value;

/// Produces the auth token attached to each request.
pub type TokenSource =
  Arc<dyn Fn() -> BoxFuture<'static, Result<String, TransportError>> + Send + Sync>;

/// HTTP verbs the client issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
  Get,
  Post,
  Put,
  Patch,
  Delete,
}

impl From<Method> for reqwest::Method {
  fn from(method: Method) -> Self {
    match method {
      Method::Get => reqwest::Method::GET,
      Method::Post => reqwest::Method::POST,
      Method::Put => reqwest::Method::PUT,
      Method::Patch => reqwest::Method::PATCH,
      Method::Delete => reqwest::Method::DELETE,
    }
  }
}

/// Request body encodings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
  #[default]
  Json,
  /// Multipart form, one text part per top-level field
  FormData,
}

/// Settings for [`ApiClient::new`].
#[derive(Clone, Default)]
pub struct ApiOptions {
  pub base_url: String,
  /// Header carrying the auth token (e.g. "Authorization")
  pub token_header: Option<String>,
  pub token_source: Option<TokenSource>,
}

/// REST client bound to one base URL.
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base: Url,
  base_url: String,
  token_header: Option<String>,
  token_source: Option<TokenSource>,
}

impl fmt::Debug for ApiClient {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ApiClient")
      .field("base_url", &self.base_url)
      .field("token_header", &self.token_header)
      .finish_non_exhaustive()
  }
}

impl ApiClient {
  pub fn new(options: ApiOptions) -> Result<Self, DescriptorError> {
    if options.base_url.is_empty() {
      return Err(DescriptorError::EmptyBaseUrl);
    }
    let base = Url::parse(&options.base_url).map_err(|e| DescriptorError::InvalidBaseUrl {
      url: options.base_url.clone(),
      reason: e.to_string(),
    })?;

    let has_header = options
      .token_header
      .as_deref()
      .is_some_and(|header| !header.is_empty());
    if has_header != options.token_source.is_some() {
      return Err(DescriptorError::IncompleteAuth);
    }

    Ok(Self {
      http: reqwest::Client::new(),
      base,
      base_url: options.base_url.trim_end_matches('/').to_string(),
      token_header: options.token_header,
      token_source: options.token_source,
    })
  }

  pub fn base_url(&self) -> &str {
    &self.base_url
  }

  /// Path relative to the base URL, each segment percent-encoded so ids
  /// containing `/`, `?` or `#` stay a single segment.
  pub fn path(&self, segments: &[&str]) -> Result<String, TransportError> {
    let mut url = self.base.clone();
    url.set_path("");
    url
      .path_segments_mut()
      .map_err(|_| TransportError::new(None, format!("{} cannot carry a path", self.base_url)))?
      .pop_if_empty()
      .extend(segments);
    Ok(url.path().to_string())
  }

  pub async fn get(&self, path: &str, params: Option<&Value>) -> Result<Value, TransportError> {
    self
      .request(Method::Get, path, params, None, ContentType::Json)
      .await
  }

  pub async fn post(
    &self,
    path: &str,
    data: &Value,
    params: Option<&Value>,
    content_type: ContentType,
  ) -> Result<Value, TransportError> {
    self
      .request(Method::Post, path, params, Some(data), content_type)
      .await
  }

  pub async fn put(
    &self,
    path: &str,
    data: &Value,
    params: Option<&Value>,
    content_type: ContentType,
  ) -> Result<Value, TransportError> {
    self
      .request(Method::Put, path, params, Some(data), content_type)
      .await
  }

  pub async fn patch(
    &self,
    path: &str,
    data: &Value,
    params: Option<&Value>,
    content_type: ContentType,
  ) -> Result<Value, TransportError> {
    self
      .request(Method::Patch, path, params, Some(data), content_type)
      .await
  }

  pub async fn delete(&self, path: &str) -> Result<Value, TransportError> {
    self
      .request(Method::Delete, path, None, None, ContentType::Json)
      .await
  }

  /// Issue a request and decode the JSON body. Non-2xx statuses become
  /// [`TransportError`]s carrying the status and body text.
  pub async fn request(
    &self,
    method: Method,
    path: &str,
    params: Option<&Value>,
    data: Option<&Value>,
    content_type: ContentType,
  ) -> Result<Value, TransportError> {
    let url = self.url(path);
    debug!(?method, %url, "api request");

    let mut builder = self.http.request(method.into(), &url);

    let query = query_pairs(params);
    if !query.is_empty() {
      builder = builder.query(&query);
    }

    if let (Some(header), Some(source)) = (&self.token_header, &self.token_source) {
      let token = source().await?;
      builder = builder.header(header.as_str(), token);
    }

    if let Some(data) = data {
      builder = match content_type {
        ContentType::Json => builder.json(data),
        ContentType::FormData => builder.multipart(form_body(data)?),
      };
    }

    let response = builder.send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
      return Err(TransportError::with_status(status.as_u16(), body));
    }

    if body.trim().is_empty() {
      return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&body)?)
  }

  fn url(&self, path: &str) -> String {
    if path.starts_with('/') {
      format!("{}{}", self.base_url, path)
    } else {
      format!("{}/{}", self.base_url, path)
    }
  }
}

/// Flatten a params object into query pairs, skipping nulls.
fn query_pairs(params: Option<&Value>) -> Vec<(String, String)> {
  match params {
    Some(Value::Object(map)) => map
      .iter()
      .filter(|(_, value)| !value.is_null())
      .map(|(key, value)| (key.clone(), display_value(value)))
      .collect(),
    _ => Vec::new(),
  }
}

fn form_body(data: &Value) -> Result<Form, TransportError> {
  let Value::Object(map) = data else {
    return Err(TransportError::new(None, "form data must be an object"));
  };

  Ok(map.iter().fold(Form::new(), |form, (field, value)| {
    form.text(field.clone(), display_value(value))
  }))
}
