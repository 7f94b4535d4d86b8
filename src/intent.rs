//! Intents callers dispatch and the signals produced in response.

use serde_json::Value;

use crate::clock::Timestamp;
use crate::entity::{Entity, Target};
use crate::error::TransportError;
use crate::normalize::EntityTables;

/// Kind of request an intent makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
  Upsert,
  Remove,
  Find,
  Fetch,
}

impl Operation {
  /// Reads are subject to the staleness policy; writes always go out.
  pub fn is_read(self) -> bool {
    matches!(self, Operation::Find | Operation::Fetch)
  }
}

/// Per-dispatch options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
  /// Bypass the staleness cache and always hit the network
  pub refresh: bool,
  /// Extra query params passed to upserts
  pub params: Option<Value>,
}

/// A requested read or write against an entity type.
#[derive(Debug, Clone)]
pub struct Intent {
  pub operation: Operation,
  pub target: Target,
  pub payload: Value,
  pub options: RequestOptions,
}

impl Intent {
  pub fn new(operation: Operation, target: Target, payload: Value) -> Self {
    Self {
      operation,
      target,
      payload,
      options: RequestOptions::default(),
    }
  }

  /// Create or update one record.
  pub fn upsert(entity: &Entity, payload: Value) -> Self {
    Self::new(Operation::Upsert, entity.one(), payload)
  }

  /// Delete one record; `payload` is its id or the record itself.
  pub fn remove(entity: &Entity, payload: Value) -> Self {
    Self::new(Operation::Remove, entity.one(), payload)
  }

  /// Load one record by id or by a filter carrying the id.
  pub fn find(entity: &Entity, payload: Value) -> Self {
    Self::new(Operation::Find, entity.one(), payload)
  }

  /// Load a single record or, for [`Target::Collection`], a filtered list.
  pub fn fetch(target: impl Into<Target>, payload: Value) -> Self {
    Self::new(Operation::Fetch, target.into(), payload)
  }

  pub fn with_options(mut self, options: RequestOptions) -> Self {
    self.options = options;
    self
  }

  /// Force a network round trip.
  pub fn refresh(mut self) -> Self {
    self.options.refresh = true;
    self
  }

  pub fn entity(&self) -> &Entity {
    self.target.entity()
  }
}

impl From<Intent> for Action {
  fn from(intent: Intent) -> Self {
    Action::Request(intent)
  }
}

/// Successful transport round trip.
#[derive(Debug, Clone)]
pub struct Success {
  pub intent: Intent,
  /// Normalized records; absent for removals and singletons
  pub entities: Option<EntityTables>,
  /// Id skeleton, or the raw value for singletons
  pub result: Option<Value>,
  pub meta: Option<Value>,
  /// Completion time; absent for removals
  pub date: Option<Timestamp>,
}

/// Failed transport round trip.
#[derive(Debug, Clone)]
pub struct Failure {
  pub intent: Intent,
  pub error: TransportError,
  pub status_code: Option<u16>,
}

/// Anything that flows through the reducer pipeline.
#[derive(Debug, Clone)]
pub enum Action {
  /// Intent received and about to hit the network
  Request(Intent),
  /// Intent answered from fresh cached data; no network call was made
  Cached(Intent),
  Succeeded(Success),
  Failed(Failure),
  /// Reset every cache to empty
  ClearAll,
  /// Foreign action, forwarded untouched
  External(Value),
}

impl Action {
  /// The intent this action concerns, if any.
  pub fn intent(&self) -> Option<&Intent> {
    match self {
      Action::Request(intent) | Action::Cached(intent) => Some(intent),
      Action::Succeeded(success) => Some(&success.intent),
      Action::Failed(failure) => Some(&failure.intent),
      Action::ClearAll | Action::External(_) => None,
    }
  }
}

/// Intent that wipes the whole cache.
pub fn clear_all() -> Action {
  Action::ClearAll
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_constructors_pick_targets() {
    let todo = Entity::builder("todo").build().unwrap();

    let upsert = Intent::upsert(&todo, json!({ "todo": "A" }));
    assert_eq!(upsert.operation, Operation::Upsert);
    assert!(!upsert.target.is_collection());

    let fetch = Intent::fetch(todo.many(), json!({ "page": 1 }));
    assert_eq!(fetch.operation, Operation::Fetch);
    assert!(fetch.target.is_collection());

    let fetch_one = Intent::fetch(&todo, json!(1));
    assert!(!fetch_one.target.is_collection());
  }

  #[test]
  fn test_refresh_option() {
    let todo = Entity::builder("todo").build().unwrap();
    let intent = Intent::find(&todo, json!(1)).refresh();

    assert!(intent.options.refresh);
  }

  #[test]
  fn test_action_intent() {
    let todo = Entity::builder("todo").build().unwrap();
    let action: Action = Intent::remove(&todo, json!(1)).into();

    assert_eq!(action.intent().map(|i| i.operation), Some(Operation::Remove));
    assert!(clear_all().intent().is_none());
    assert!(Action::External(json!({ "type": "other" })).intent().is_none());
  }

  #[test]
  fn test_only_reads_are_cacheable() {
    assert!(Operation::Find.is_read());
    assert!(Operation::Fetch.is_read());
    assert!(!Operation::Upsert.is_read());
    assert!(!Operation::Remove.is_read());
  }
}
