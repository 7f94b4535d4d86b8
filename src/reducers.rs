//! Reducers for the three cache slices.
//!
//! Each reducer takes the current slice and an action and returns the next
//! slice. Slices an action does not touch come back as the same `Arc`.

use std::sync::Arc;

use serde_json::Value;
use tracing::trace;

use crate::entity::{id_key, UPDATED_AT};
use crate::fingerprint::fingerprint;
use crate::intent::{Action, Intent, Operation, Success};
use crate::normalize::EntityTables;
use crate::state::{
  CacheState, CollectionCache, EntityStore, QueryResult, SingletonCache, SingletonValue,
};

/// Root reducer. [`Action::ClearAll`] resets every slice to empty.
pub fn reduce(state: &CacheState, action: &Action) -> CacheState {
  if let Action::ClearAll = action {
    trace!("clearing cache");
    return CacheState::default();
  }

  CacheState {
    entities: reduce_entities(&state.entities, action),
    collections: reduce_collections(&state.collections, action),
    singletons: reduce_singletons(&state.singletons, action),
  }
}

/// Entity store transitions: merge normalized records on success, drop the
/// addressed record on removal.
pub fn reduce_entities(state: &Arc<EntityStore>, action: &Action) -> Arc<EntityStore> {
  let Action::Succeeded(success) = action else {
    return Arc::clone(state);
  };
  if success.intent.entity().is_singleton() {
    return Arc::clone(state);
  }

  if success.intent.operation == Operation::Remove {
    return remove_entity(state, &success.intent);
  }

  match &success.entities {
    Some(tables) if !tables.is_empty() => merge_entities(state, tables, success),
    _ => Arc::clone(state),
  }
}

fn merge_entities(
  state: &Arc<EntityStore>,
  tables: &EntityTables,
  success: &Success,
) -> Arc<EntityStore> {
  let mut next = Arc::clone(state);
  let store = Arc::make_mut(&mut next);

  for (kind, records) in tables {
    let table = Arc::make_mut(store.entry(kind.clone()).or_default());
    for (id, fields) in records {
      let mut record = table.get(id).map(|r| (**r).clone()).unwrap_or_default();
      record.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
      match success.date {
        Some(date) => {
          record.insert(UPDATED_AT.to_string(), Value::from(date));
        }
        None => {
          record.remove(UPDATED_AT);
        }
      }
      table.insert(id.clone(), Arc::new(record));
    }
  }

  next
}

fn remove_entity(state: &Arc<EntityStore>, intent: &Intent) -> Arc<EntityStore> {
  let entity = intent.entity();
  let Some(id) = entity.id_of(&intent.payload) else {
    return Arc::clone(state);
  };
  let present = state
    .get(entity.key())
    .is_some_and(|table| table.contains_key(&id));
  if !present {
    return Arc::clone(state);
  }

  let mut next = Arc::clone(state);
  if let Some(table) = Arc::make_mut(&mut next).get_mut(entity.key()) {
    Arc::make_mut(table).remove(&id);
  }
  next
}

/// Collection cache key for an intent, when the intent is a
/// collection-style read.
fn collection_key(intent: &Intent) -> Option<(&str, String)> {
  let entity = intent.entity();
  if !intent.target.is_collection() || entity.is_singleton() || !intent.operation.is_read() {
    return None;
  }
  Some((entity.key(), fingerprint(&intent.payload)))
}

/// Collection cache transitions, keyed by the request's fingerprint.
pub fn reduce_collections(state: &Arc<CollectionCache>, action: &Action) -> Arc<CollectionCache> {
  let (intent, entry) = match action {
    Action::Request(intent) => (intent, QueryResult::pending()),
    Action::Succeeded(success) => {
      let ids = match &success.result {
        Some(Value::Array(items)) => items.iter().filter_map(id_key).collect(),
        _ => Vec::new(),
      };
      (
        &success.intent,
        QueryResult::succeeded(ids, success.meta.clone(), success.date),
      )
    }
    Action::Failed(failure) => (&failure.intent, QueryResult::failed(failure.error.clone())),
    _ => return Arc::clone(state),
  };

  let Some((kind, key)) = collection_key(intent) else {
    return Arc::clone(state);
  };

  let mut next = Arc::clone(state);
  let table = Arc::make_mut(Arc::make_mut(&mut next).entry(kind.to_string()).or_default());
  table.insert(key, entry);
  next
}

/// Singleton cache transitions.
pub fn reduce_singletons(state: &Arc<SingletonCache>, action: &Action) -> Arc<SingletonCache> {
  let Action::Succeeded(success) = action else {
    return Arc::clone(state);
  };
  let entity = success.intent.entity();
  if !entity.is_singleton() {
    return Arc::clone(state);
  }

  let mut next = Arc::clone(state);
  if success.intent.operation == Operation::Remove {
    if !state.contains_key(entity.key()) {
      return next;
    }
    Arc::make_mut(&mut next).remove(entity.key());
    return next;
  }

  Arc::make_mut(&mut next).insert(
    entity.key().to_string(),
    SingletonValue {
      value: success.result.clone().unwrap_or(Value::Null),
      updated_at: success.date.unwrap_or_default(),
    },
  );
  next
}
