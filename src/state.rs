//! Cache state: entity store, collection cache, singleton cache.
//!
//! Every level sits behind an [`Arc`] so reducers can copy-on-write with
//! [`Arc::make_mut`] and untouched slices keep their identity, which is
//! what the selector memos key on.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::clock::Timestamp;
use crate::entity::EntityId;
use crate::error::TransportError;

/// A stored record, including its `__updatedAt` attribute.
pub type Record = Arc<Map<String, Value>>;

/// Records of one entity type, by id.
pub type EntityTable = BTreeMap<EntityId, Record>;

/// All entity tables, by entity type.
pub type EntityStore = BTreeMap<String, Arc<EntityTable>>;

/// Query results of one entity type, by fingerprint.
pub type CollectionTable = BTreeMap<String, QueryResult>;

/// All collection tables, by entity type.
pub type CollectionCache = BTreeMap<String, Arc<CollectionTable>>;

/// Singleton values, by entity type.
pub type SingletonCache = BTreeMap<String, SingletonValue>;

/// Progress of a collection query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
  Pending,
  Succeeded,
  Failed,
}

/// Cached outcome of one collection query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
  pub status: Status,
  /// Ordered ids returned by the query
  pub result: Option<Vec<EntityId>>,
  /// Response fields other than the entity list
  pub meta: Option<Value>,
  /// Completion time of the last success
  pub updated_at: Option<Timestamp>,
  pub error: Option<TransportError>,
}

impl QueryResult {
  pub fn pending() -> Self {
    Self {
      status: Status::Pending,
      result: None,
      meta: None,
      updated_at: None,
      error: None,
    }
  }

  pub fn succeeded(
    result: Vec<EntityId>,
    meta: Option<Value>,
    updated_at: Option<Timestamp>,
  ) -> Self {
    Self {
      status: Status::Succeeded,
      result: Some(result),
      meta,
      updated_at,
      error: None,
    }
  }

  pub fn failed(error: TransportError) -> Self {
    Self {
      status: Status::Failed,
      result: None,
      meta: None,
      updated_at: None,
      error: Some(error),
    }
  }
}

/// The one cached value of a singleton entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct SingletonValue {
  pub value: Value,
  pub updated_at: Timestamp,
}

/// Root cache state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheState {
  pub entities: Arc<EntityStore>,
  pub collections: Arc<CollectionCache>,
  pub singletons: Arc<SingletonCache>,
}

impl CacheState {
  pub fn entity(&self, kind: &str, id: &str) -> Option<&Record> {
    self.entities.get(kind).and_then(|table| table.get(id))
  }

  pub fn collection(&self, kind: &str, key: &str) -> Option<&QueryResult> {
    self.collections.get(kind).and_then(|table| table.get(key))
  }

  pub fn singleton(&self, kind: &str) -> Option<&SingletonValue> {
    self.singletons.get(kind)
  }

  pub fn is_empty(&self) -> bool {
    self.entities.is_empty() && self.collections.is_empty() && self.singletons.is_empty()
  }
}
