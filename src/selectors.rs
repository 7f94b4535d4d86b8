//! Memoized read functions producing denormalized views.
//!
//! Each selector instance keeps a single-slot memo keyed on the state
//! slices it reads (by `Arc` identity) plus its argument. Repeated calls
//! against unchanged slices return the same `Arc`.

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{Map, Value};

use crate::entity::{id_key, Entity, EntityId, UPDATED_AT};
use crate::fingerprint::fingerprint;
use crate::state::{CacheState, CollectionCache, EntityStore, Record, SingletonCache};

/// Inputs compared by identity to decide whether a memo is still valid.
trait Slices: Clone {
  fn same(&self, other: &Self) -> bool;
}

impl<T> Slices for Arc<T> {
  fn same(&self, other: &Self) -> bool {
    Arc::ptr_eq(self, other)
  }
}

impl<A: Slices, B: Slices> Slices for (A, B) {
  fn same(&self, other: &Self) -> bool {
    self.0.same(&other.0) && self.1.same(&other.1)
  }
}

/// Single-slot memo.
struct Memo<D, K, V> {
  slot: Mutex<Option<(D, K, V)>>,
}

impl<D: Slices, K: PartialEq, V: Clone> Memo<D, K, V> {
  fn new() -> Self {
    Self {
      slot: Mutex::new(None),
    }
  }

  fn get(&self, deps: D, key: K, compute: impl FnOnce(&D, &K) -> V) -> V {
    let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some((cached_deps, cached_key, value)) = slot.as_ref() {
      if cached_deps.same(&deps) && *cached_key == key {
        return value.clone();
      }
    }

    let value = compute(&deps, &key);
    *slot = Some((deps, key, value.clone()));
    value
  }
}

/// Domain view of a stored record, without internal attributes.
fn view(record: &Record) -> Value {
  let mut map: Map<String, Value> = (**record).clone();
  map.remove(UPDATED_AT);
  Value::Object(map)
}

/// Replace references with their records, `levels` deep. Missing single
/// references drop the field; missing ids in arrays are dropped.
fn hydrate(entity: &Entity, levels: usize, store: &EntityStore, data: Value) -> Value {
  if levels == 0 {
    return data;
  }

  let mut map = match data {
    Value::Array(items) => {
      return Value::Array(
        items
          .into_iter()
          .map(|item| hydrate(entity, levels, store, item))
          .collect(),
      )
    }
    Value::Object(map) => map,
    other => return other,
  };

  for (field, relation) in entity.schema() {
    let Some(child) = entity.related(relation) else {
      continue;
    };
    let Some(reference) = map.remove(field) else {
      continue;
    };
    let table = store.get(child.key());
    let resolve = |id: &Value| -> Option<Value> {
      let id = id_key(id)?;
      let record = table?.get(&id)?;
      Some(hydrate(&child, levels - 1, store, view(record)))
    };

    match &reference {
      Value::Array(ids) => {
        map.insert(field.clone(), Value::Array(ids.iter().filter_map(resolve).collect()));
      }
      single => {
        if let Some(record) = resolve(single) {
          map.insert(field.clone(), record);
        }
      }
    }
  }

  Value::Object(map)
}

/// Selector for one record (or the singleton value of a singleton type).
pub struct SelectOne {
  entity: Entity,
  levels: usize,
  prop: Option<String>,
  memo: Memo<(Arc<EntityStore>, Arc<SingletonCache>), Option<EntityId>, Option<Arc<Value>>>,
}

/// Build a [`SelectOne`] for `entity`.
pub fn select_one(entity: &Entity) -> SelectOne {
  SelectOne {
    entity: entity.clone(),
    levels: 0,
    prop: None,
    memo: Memo::new(),
  }
}

impl SelectOne {
  /// Resolve nested references this many levels deep.
  pub fn hydrate(mut self, levels: usize) -> Self {
    self.levels = levels;
    self
  }

  /// Read the id from this key when given a props object (defaults to the
  /// entity's id field).
  pub fn prop(mut self, key: impl Into<String>) -> Self {
    self.prop = Some(key.into());
    self
  }

  /// Record addressed by `id`: a plain identifier or a props object.
  pub fn select(&self, state: &CacheState, id: &Value) -> Option<Arc<Value>> {
    let key = if self.entity.is_singleton() {
      None
    } else {
      self.id_from(id)
    };
    let deps = (Arc::clone(&state.entities), Arc::clone(&state.singletons));

    self.memo.get(deps, key, |(entities, singletons), key| {
      if self.entity.is_singleton() {
        return singletons
          .get(self.entity.key())
          .map(|s| Arc::new(s.value.clone()));
      }

      let record = entities.get(self.entity.key())?.get(key.as_ref()?)?;
      Some(Arc::new(hydrate(
        &self.entity,
        self.levels,
        entities,
        view(record),
      )))
    })
  }

  fn id_from(&self, id: &Value) -> Option<EntityId> {
    match id {
      Value::Object(props) => {
        let field = self.prop.as_deref().unwrap_or(self.entity.id_field());
        props.get(field).and_then(id_key)
      }
      other => id_key(other),
    }
  }
}

/// Selector for the records of a collection query, in result order.
pub struct SelectCollection {
  entity: Entity,
  levels: usize,
  memo: Memo<(Arc<EntityStore>, Arc<CollectionCache>), String, Arc<Vec<Value>>>,
}

/// Build a [`SelectCollection`] for `entity`.
pub fn select_collection(entity: &Entity) -> SelectCollection {
  SelectCollection {
    entity: entity.clone(),
    levels: 0,
    memo: Memo::new(),
  }
}

impl SelectCollection {
  pub fn hydrate(mut self, levels: usize) -> Self {
    self.levels = levels;
    self
  }

  /// Records of the query cached for `filter`. Uncached queries and ids
  /// whose record is gone yield nothing rather than an error.
  pub fn select(&self, state: &CacheState, filter: &Value) -> Arc<Vec<Value>> {
    let deps = (Arc::clone(&state.entities), Arc::clone(&state.collections));

    self.memo.get(deps, fingerprint(filter), |(entities, collections), key| {
      let kind = self.entity.key();
      let ids = collections
        .get(kind)
        .and_then(|table| table.get(key))
        .and_then(|query| query.result.as_ref());
      let (Some(ids), Some(table)) = (ids, entities.get(kind)) else {
        return Arc::new(Vec::new());
      };

      Arc::new(
        ids
          .iter()
          .filter_map(|id| table.get(id))
          .map(|record| hydrate(&self.entity, self.levels, entities, view(record)))
          .collect(),
      )
    })
  }
}

/// Selector for the response metadata of a collection query.
pub struct SelectMeta {
  entity: Entity,
  memo: Memo<Arc<CollectionCache>, String, Option<Arc<Value>>>,
}

/// Build a [`SelectMeta`] for `entity`.
pub fn select_meta(entity: &Entity) -> SelectMeta {
  SelectMeta {
    entity: entity.clone(),
    memo: Memo::new(),
  }
}

impl SelectMeta {
  /// Metadata cached for `filter`, if that query is cached and has any.
  pub fn select(&self, state: &CacheState, filter: &Value) -> Option<Arc<Value>> {
    self.memo.get(
      Arc::clone(&state.collections),
      fingerprint(filter),
      |collections, key| {
        collections
          .get(self.entity.key())
          .and_then(|table| table.get(key))
          .and_then(|query| query.meta.clone())
          .map(Arc::new)
      },
    )
  }
}

/// Selector for the value of a singleton type.
pub struct SelectSingleton {
  entity: Entity,
  memo: Memo<Arc<SingletonCache>, (), Option<Arc<Value>>>,
}

/// Build a [`SelectSingleton`] for `entity`.
pub fn select_singleton(entity: &Entity) -> SelectSingleton {
  SelectSingleton {
    entity: entity.clone(),
    memo: Memo::new(),
  }
}

impl SelectSingleton {
  pub fn select(&self, state: &CacheState) -> Option<Arc<Value>> {
    self.memo.get(Arc::clone(&state.singletons), (), |singletons, _| {
      singletons
        .get(self.entity.key())
        .map(|s| Arc::new(s.value.clone()))
    })
  }
}
