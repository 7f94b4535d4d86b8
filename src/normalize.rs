//! Splitting nested payloads into flat per-type entity tables.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::entity::{Entity, EntityId, Relation, Target};

/// Records grouped by entity type, then by id.
pub type EntityTables = BTreeMap<String, BTreeMap<EntityId, Map<String, Value>>>;

/// Output of [`normalize`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
  /// Every record reached through the schema, nested references replaced
  /// by ids
  pub entities: EntityTables,
  /// The payload skeleton: an id for single targets, an id array for
  /// collections
  pub result: Value,
}

/// Normalize `data` against the descriptor `target` addresses.
///
/// Collection targets accept an array (or an object whose values are the
/// records). A record sharing an id with one seen earlier in the same
/// payload is merged into it.
pub fn normalize(data: &Value, target: &Target) -> Normalized {
  let mut entities = EntityTables::new();

  let result = match target {
    Target::Single(entity) => visit(data, entity, &mut entities),
    Target::Collection(entity) => {
      let items: Vec<&Value> = match data {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => map.values().collect(),
        _ => Vec::new(),
      };
      Value::Array(
        items
          .into_iter()
          .map(|item| visit(item, entity, &mut entities))
          .collect(),
      )
    }
  };

  Normalized { entities, result }
}

fn visit(value: &Value, entity: &Entity, entities: &mut EntityTables) -> Value {
  let Value::Object(map) = value else {
    // Already a reference
    return value.clone();
  };

  let mut record = map.clone();
  for (field, relation) in entity.schema() {
    let (Some(nested), Some(child)) = (record.get(field), entity.related(relation)) else {
      continue;
    };

    let replaced = match (relation, nested) {
      (Relation::Many(_), Value::Array(items)) => Value::Array(
        items
          .iter()
          .map(|item| visit(item, &child, entities))
          .collect(),
      ),
      (_, nested) => visit(nested, &child, entities),
    };
    record.insert(field.clone(), replaced);
  }

  let Some(id) = entity.id_of(value) else {
    return Value::Object(record);
  };
  let reference = record
    .get(entity.id_field())
    .cloned()
    .unwrap_or(Value::Null);

  let table = entities.entry(entity.key().to_string()).or_default();
  match table.get_mut(&id) {
    Some(existing) => existing.extend(record),
    None => {
      table.insert(id, record);
    }
  }

  reference
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn schema() -> (Entity, Entity, Entity) {
    let user = Entity::builder("user").build().unwrap();
    let comment = Entity::builder("comment")
      .has_one("author", &user)
      .build()
      .unwrap();
    let post = Entity::builder("post")
      .has_one("author", &user)
      .has_many("comments", &comment)
      .build()
      .unwrap();
    (user, comment, post)
  }

  #[test]
  fn test_single_nested_record() {
    let (_, _, post) = schema();
    let data = json!({
      "id": 1,
      "title": "Hello",
      "author": { "id": 7, "name": "Ana" },
      "comments": [
        { "id": 10, "text": "hi", "author": { "id": 8, "name": "Bo" } },
        { "id": 11, "text": "yo", "author": 7 }
      ]
    });

    let normalized = normalize(&data, &post.one());

    assert_eq!(normalized.result, json!(1));
    assert_eq!(
      Value::Object(normalized.entities["post"]["1"].clone()),
      json!({ "id": 1, "title": "Hello", "author": 7, "comments": [10, 11] })
    );
    assert_eq!(
      Value::Object(normalized.entities["comment"]["10"].clone()),
      json!({ "id": 10, "text": "hi", "author": 8 })
    );
    assert_eq!(
      Value::Object(normalized.entities["comment"]["11"].clone()),
      json!({ "id": 11, "text": "yo", "author": 7 })
    );
    assert_eq!(normalized.entities["user"].len(), 2);
  }

  #[test]
  fn test_collection_keeps_order() {
    let (user, _, _) = schema();
    let data = json!([{ "id": 3 }, { "id": 1 }, { "id": 2 }]);

    let normalized = normalize(&data, &user.many());

    assert_eq!(normalized.result, json!([3, 1, 2]));
    assert_eq!(normalized.entities["user"].len(), 3);
  }

  #[test]
  fn test_repeated_records_merge() {
    let (user, _, _) = schema();
    let data = json!([{ "id": 1, "a": 1 }, { "id": 1, "b": 2 }]);

    let normalized = normalize(&data, &user.many());

    assert_eq!(normalized.result, json!([1, 1]));
    assert_eq!(
      Value::Object(normalized.entities["user"]["1"].clone()),
      json!({ "id": 1, "a": 1, "b": 2 })
    );
  }

  #[test]
  fn test_custom_id_field() {
    let foo = Entity::builder("foo").id_field("key").build().unwrap();
    let normalized = normalize(&json!({ "key": "k1", "v": true }), &foo.one());

    assert_eq!(normalized.result, json!("k1"));
    assert!(normalized.entities["foo"].contains_key("k1"));
  }

  #[test]
  fn test_self_referencing_schema() {
    let comment = Entity::builder("comment")
      .has_many_ref("replies", "comment")
      .build()
      .unwrap();
    let data = json!({
      "id": 1,
      "replies": [
        { "id": 2, "replies": [{ "id": 3, "replies": [] }] },
        { "id": 4 }
      ]
    });

    let normalized = normalize(&data, &comment.one());

    assert_eq!(normalized.result, json!(1));
    let comments = &normalized.entities["comment"];
    assert_eq!(comments.len(), 4);
    assert_eq!(comments["1"]["replies"], json!([2, 4]));
    assert_eq!(comments["2"]["replies"], json!([3]));
    assert_eq!(comments["3"]["replies"], json!([]));
    assert!(!comments["4"].contains_key("replies"));
  }

  #[test]
  fn test_non_collection_payload_for_collection_target() {
    let (user, _, _) = schema();
    let normalized = normalize(&Value::Null, &user.many());

    assert_eq!(normalized.result, json!([]));
    assert!(normalized.entities.is_empty());
  }
}
