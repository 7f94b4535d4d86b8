//! Error types shared by the cache engine and its transports.

use thiserror::Error;

/// Network or HTTP failure reported by a transport.
///
/// Carried verbatim into failure signals and stored in the collection cache
/// for collection-style queries.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{}", describe(.status, .message))]
pub struct TransportError {
  /// HTTP status code, absent for connection-level failures
  pub status: Option<u16>,
  pub message: String,
}

fn describe(status: &Option<u16>, message: &str) -> String {
  match status {
    Some(status) => format!("request failed with status {}: {}", status, message),
    None => format!("request failed: {}", message),
  }
}

impl TransportError {
  pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
    Self {
      status,
      message: message.into(),
    }
  }

  /// A failure with an HTTP status attached.
  pub fn with_status(status: u16, message: impl Into<String>) -> Self {
    Self::new(Some(status), message)
  }
}

impl From<reqwest::Error> for TransportError {
  fn from(err: reqwest::Error) -> Self {
    Self {
      status: err.status().map(|s| s.as_u16()),
      message: err.to_string(),
    }
  }
}

impl From<serde_json::Error> for TransportError {
  fn from(err: serde_json::Error) -> Self {
    Self::new(None, format!("invalid response body: {}", err))
  }
}

/// Misconfiguration caught while building descriptors, providers, or clients.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DescriptorError {
  #[error("entity key must be a nonempty string")]
  EmptyKey,

  #[error("id field of entity '{entity}' must be a nonempty string")]
  EmptyIdField { entity: String },

  #[error("provider particle must be a nonempty string")]
  EmptyParticle,

  #[error("base API url must be defined")]
  EmptyBaseUrl,

  #[error("invalid base API url '{url}': {reason}")]
  InvalidBaseUrl { url: String, reason: String },

  #[error("both token header and token source must be provided")]
  IncompleteAuth,

  #[error("relation '{field}' of entity '{entity}' refers to unknown entity '{target}'")]
  UnknownRelation {
    entity: String,
    field: String,
    target: String,
  },

  #[error("entity '{entity}' is defined more than once")]
  DuplicateEntity { entity: String },
}
