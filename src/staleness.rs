//! Decides whether a read can be answered from cache.

use serde_json::Value;

use crate::clock::{Clock, Timestamp};
use crate::entity::UPDATED_AT;
use crate::fingerprint::fingerprint;
use crate::intent::Intent;
use crate::state::CacheState;

/// Whether `intent` can skip the network and be served from `state`.
///
/// Only reads on entities with a stale timeout qualify, and never when the
/// intent asks for a refresh. The relevant cached record (singleton value,
/// collection query, or single record) must carry a write time younger than
/// the timeout.
pub fn should_skip_fetch(state: &CacheState, intent: &Intent, clock: &dyn Clock) -> bool {
  let entity = intent.entity();
  let Some(timeout) = entity.stale_timeout() else {
    return false;
  };
  if intent.options.refresh || !intent.operation.is_read() {
    return false;
  }

  let timeout = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
  match last_updated(state, intent) {
    Some(updated_at) => clock.now().saturating_sub(updated_at) < timeout,
    None => false,
  }
}

fn last_updated(state: &CacheState, intent: &Intent) -> Option<Timestamp> {
  let entity = intent.entity();

  if entity.is_singleton() {
    return state.singleton(entity.key()).map(|s| s.updated_at);
  }

  if intent.target.is_collection() {
    return state
      .collection(entity.key(), &fingerprint(&intent.payload))
      .and_then(|query| query.updated_at);
  }

  let id = entity.id_of(&intent.payload)?;
  state
    .entity(entity.key(), &id)
    .and_then(|record| record.get(UPDATED_AT))
    .and_then(Value::as_i64)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clock::ManualClock;
  use crate::entity::Entity;
  use crate::intent::{Action, Success};
  use crate::normalize::EntityTables;
  use crate::reducers::reduce;
  use serde_json::json;
  use std::time::Duration;

  const T: i64 = 1_000;

  fn entity(timeout: Option<u64>) -> Entity {
    let mut builder = Entity::builder("e");
    if let Some(ms) = timeout {
      builder = builder.stale_timeout(Duration::from_millis(ms));
    }
    builder.build().unwrap()
  }

  fn written(intent: Intent, entities: Value, result: Value) -> CacheState {
    let entities: EntityTables = serde_json::from_value(entities).unwrap();
    reduce(
      &CacheState::default(),
      &Action::Succeeded(Success {
        intent,
        entities: Some(entities),
        result: Some(result),
        meta: None,
        date: Some(T),
      }),
    )
  }

  #[test]
  fn test_fresh_record_skips_until_timeout() {
    let e = entity(Some(100));
    let state = written(
      Intent::find(&e, json!({ "id": 3 })),
      json!({ "e": { "3": { "id": 3 } } }),
      json!(3),
    );
    let intent = Intent::find(&e, json!({ "id": 3 }));
    let clock = ManualClock::new(T + 50);

    assert!(should_skip_fetch(&state, &intent, &clock));

    clock.set(T + 150);
    assert!(!should_skip_fetch(&state, &intent, &clock));
  }

  #[test]
  fn test_refresh_always_fetches() {
    let e = entity(Some(100));
    let state = written(
      Intent::find(&e, json!(3)),
      json!({ "e": { "3": { "id": 3 } } }),
      json!(3),
    );
    let clock = ManualClock::new(T + 50);

    assert!(should_skip_fetch(&state, &Intent::find(&e, json!(3)), &clock));
    assert!(!should_skip_fetch(&state, &Intent::find(&e, json!(3)).refresh(), &clock));
  }

  #[test]
  fn test_no_timeout_always_fetches() {
    let e = entity(None);
    let state = written(
      Intent::find(&e, json!(3)),
      json!({ "e": { "3": { "id": 3 } } }),
      json!(3),
    );

    assert!(!should_skip_fetch(&state, &Intent::find(&e, json!(3)), &ManualClock::new(T)));
  }

  #[test]
  fn test_fresh_collection_page_skips() {
    let e = entity(Some(100));
    let state = written(
      Intent::fetch(e.many(), json!({ "id": 3 })),
      json!({ "e": { "3": { "id": 3 } } }),
      json!([3]),
    );
    let clock = ManualClock::new(T + 23);

    assert!(should_skip_fetch(&state, &Intent::fetch(e.many(), json!({ "id": 3 })), &clock));
    // Different fingerprint is a miss
    assert!(!should_skip_fetch(&state, &Intent::fetch(e.many(), json!({ "id": 4 })), &clock));

    clock.set(T + 100);
    assert!(!should_skip_fetch(&state, &Intent::fetch(e.many(), json!({ "id": 3 })), &clock));
  }

  #[test]
  fn test_huge_timeout_never_expires() {
    let e = entity(Some(u64::MAX));
    let state = written(
      Intent::find(&e, json!(3)),
      json!({ "e": { "3": { "id": 3 } } }),
      json!(3),
    );
    let clock = ManualClock::new(i64::MAX);

    assert!(should_skip_fetch(&state, &Intent::find(&e, json!(3)), &clock));
  }

  #[test]
  fn test_missing_record_fetches() {
    let e = entity(Some(100));
    let clock = ManualClock::new(T);

    assert!(!should_skip_fetch(&CacheState::default(), &Intent::find(&e, json!(1)), &clock));
  }

  #[test]
  fn test_writes_always_fetch() {
    let e = entity(Some(100));
    let state = written(
      Intent::find(&e, json!(3)),
      json!({ "e": { "3": { "id": 3 } } }),
      json!(3),
    );
    let clock = ManualClock::new(T + 1);

    assert!(!should_skip_fetch(&state, &Intent::upsert(&e, json!({ "id": 3 })), &clock));
    assert!(!should_skip_fetch(&state, &Intent::remove(&e, json!(3)), &clock));
  }

  #[test]
  fn test_fresh_singleton_skips() {
    let s = Entity::builder("s")
      .singleton()
      .stale_timeout(Duration::from_millis(100))
      .build()
      .unwrap();
    let state = reduce(
      &CacheState::default(),
      &Action::Succeeded(Success {
        intent: Intent::find(&s, Value::Null),
        entities: None,
        result: Some(json!({ "theme": "dark" })),
        meta: None,
        date: Some(T),
      }),
    );

    assert!(should_skip_fetch(&state, &Intent::find(&s, Value::Null), &ManualClock::new(T + 99)));
    assert!(!should_skip_fetch(&state, &Intent::find(&s, Value::Null), &ManualClock::new(T + 100)));
  }
}
