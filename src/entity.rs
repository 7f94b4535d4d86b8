//! Entity descriptors: static per-type configuration for the cache.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::error::DescriptorError;
use crate::fingerprint::display_value;
use crate::provider::Provider;

/// Store key of a single entity. JSON ids (numbers or strings) are rendered
/// to their textual form so `1` and `"1"` address the same record.
pub type EntityId = String;

/// Reserved record attribute holding the last successful write time.
pub const UPDATED_AT: &str = "__updatedAt";

/// Render a plain identifier value as an [`EntityId`].
///
/// Returns `None` for anything that cannot act as an id.
pub fn id_key(value: &Value) -> Option<EntityId> {
  match value {
    Value::String(_) | Value::Number(_) => Some(display_value(value)),
    _ => None,
  }
}

/// A nested reference from one entity field to another entity type.
///
/// The target is named by key and resolved through the registry shared by
/// every [`Entity`] built together, so a schema may refer to itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
  /// Field holds one child record (normalized to its id)
  One(String),
  /// Field holds an array of child records (normalized to an id array)
  Many(String),
}

impl Relation {
  /// Key of the entity type this relation points at.
  pub fn key(&self) -> &str {
    match self {
      Relation::One(key) | Relation::Many(key) => key,
    }
  }
}

struct EntityDef {
  key: String,
  id_field: String,
  schema: BTreeMap<String, Relation>,
  singleton: bool,
  stale_timeout: Option<Duration>,
  provider: Option<Arc<dyn Provider>>,
}

/// Every descriptor reachable from an entity, by key.
type Registry = BTreeMap<String, Arc<EntityDef>>;

/// Descriptor for one domain type. Cheap to clone; validated once at build.
#[derive(Clone)]
pub struct Entity {
  def: Arc<EntityDef>,
  registry: Arc<Registry>,
}

impl Entity {
  /// Start describing an entity type stored under `key`.
  pub fn builder(key: impl Into<String>) -> EntityBuilder {
    EntityBuilder {
      key: key.into(),
      id_field: "id".to_string(),
      schema: BTreeMap::new(),
      singleton: false,
      stale_timeout: None,
      provider: None,
      known: Registry::new(),
    }
  }

  pub fn key(&self) -> &str {
    &self.def.key
  }

  pub fn id_field(&self) -> &str {
    &self.def.id_field
  }

  pub fn schema(&self) -> &BTreeMap<String, Relation> {
    &self.def.schema
  }

  pub fn is_singleton(&self) -> bool {
    self.def.singleton
  }

  /// How long written data stays fresh; `None` means always refetch.
  pub fn stale_timeout(&self) -> Option<Duration> {
    self.def.stale_timeout
  }

  pub fn provider(&self) -> Option<&Arc<dyn Provider>> {
    self.def.provider.as_ref()
  }

  /// Descriptor `relation` points at.
  pub fn related(&self, relation: &Relation) -> Option<Entity> {
    self.registry.get(relation.key()).map(|def| Entity {
      def: Arc::clone(def),
      registry: Arc::clone(&self.registry),
    })
  }

  /// Id addressed by `value`: the value itself when it is a plain
  /// identifier, otherwise its id field.
  pub fn id_of(&self, value: &Value) -> Option<EntityId> {
    match value {
      Value::Object(map) => map.get(self.id_field()).and_then(id_key),
      other => id_key(other),
    }
  }

  /// Target this descriptor as a single record.
  pub fn one(&self) -> Target {
    Target::Single(self.clone())
  }

  /// Target this descriptor as a collection query.
  pub fn many(&self) -> Target {
    Target::Collection(self.clone())
  }
}

impl fmt::Debug for Entity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Entity")
      .field("key", &self.def.key)
      .field("id_field", &self.def.id_field)
      .field("schema", &self.def.schema)
      .field("singleton", &self.def.singleton)
      .field("stale_timeout", &self.def.stale_timeout)
      .field("provider", &self.def.provider.is_some())
      .finish()
  }
}

/// Builder for [`Entity`].
pub struct EntityBuilder {
  key: String,
  id_field: String,
  schema: BTreeMap<String, Relation>,
  singleton: bool,
  stale_timeout: Option<Duration>,
  provider: Option<Arc<dyn Provider>>,
  /// Descriptors reachable through already-built children
  known: Registry,
}

impl EntityBuilder {
  pub fn id_field(mut self, field: impl Into<String>) -> Self {
    self.id_field = field.into();
    self
  }

  /// `field` holds one record of `child`.
  pub fn has_one(mut self, field: impl Into<String>, child: &Entity) -> Self {
    self.learn(child);
    self.has_one_ref(field, child.key())
  }

  /// `field` holds an array of `child` records.
  pub fn has_many(mut self, field: impl Into<String>, child: &Entity) -> Self {
    self.learn(child);
    self.has_many_ref(field, child.key())
  }

  /// `field` holds one record of the type stored under `key`: this entity
  /// itself, or one defined alongside it in a [`Schema`].
  pub fn has_one_ref(mut self, field: impl Into<String>, key: impl Into<String>) -> Self {
    self.schema.insert(field.into(), Relation::One(key.into()));
    self
  }

  /// Array counterpart of [`has_one_ref`](Self::has_one_ref).
  pub fn has_many_ref(mut self, field: impl Into<String>, key: impl Into<String>) -> Self {
    self.schema.insert(field.into(), Relation::Many(key.into()));
    self
  }

  pub fn singleton(mut self) -> Self {
    self.singleton = true;
    self
  }

  pub fn stale_timeout(mut self, timeout: Duration) -> Self {
    self.stale_timeout = Some(timeout);
    self
  }

  pub fn provider(mut self, provider: Arc<dyn Provider>) -> Self {
    self.provider = Some(provider);
    self
  }

  pub fn build(self) -> Result<Entity, DescriptorError> {
    // One builder in, one entity out
    link(vec![self]).map(|mut entities| entities.swap_remove(0))
  }

  fn learn(&mut self, child: &Entity) {
    for (key, def) in child.registry.iter() {
      self.known.insert(key.clone(), Arc::clone(def));
    }
  }
}

/// Entities defined together, free to refer to each other in any
/// direction (including cycles).
#[derive(Default)]
pub struct Schema {
  builders: Vec<EntityBuilder>,
}

impl Schema {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn entity(mut self, builder: EntityBuilder) -> Self {
    self.builders.push(builder);
    self
  }

  /// Validate every descriptor and resolve relations, keyed by entity key.
  pub fn build(self) -> Result<BTreeMap<String, Entity>, DescriptorError> {
    Ok(
      link(self.builders)?
        .into_iter()
        .map(|entity| (entity.key().to_string(), entity))
        .collect(),
    )
  }
}

/// Build one shared registry out of `builders` and whatever their
/// children already know. Returns the new entities in input order.
fn link(builders: Vec<EntityBuilder>) -> Result<Vec<Entity>, DescriptorError> {
  let mut registry = Registry::new();
  for builder in &builders {
    for (key, def) in &builder.known {
      registry.insert(key.clone(), Arc::clone(def));
    }
  }

  let mut keys: Vec<String> = Vec::with_capacity(builders.len());
  for builder in builders {
    if builder.key.is_empty() {
      return Err(DescriptorError::EmptyKey);
    }
    if builder.id_field.is_empty() {
      return Err(DescriptorError::EmptyIdField {
        entity: builder.key,
      });
    }
    if keys.contains(&builder.key) {
      return Err(DescriptorError::DuplicateEntity {
        entity: builder.key,
      });
    }

    keys.push(builder.key.clone());
    registry.insert(
      builder.key.clone(),
      Arc::new(EntityDef {
        key: builder.key,
        id_field: builder.id_field,
        schema: builder.schema,
        singleton: builder.singleton,
        stale_timeout: builder.stale_timeout,
        provider: builder.provider,
      }),
    );
  }

  for def in registry.values() {
    for (field, relation) in &def.schema {
      if !registry.contains_key(relation.key()) {
        return Err(DescriptorError::UnknownRelation {
          entity: def.key.clone(),
          field: field.clone(),
          target: relation.key().to_string(),
        });
      }
    }
  }

  let registry = Arc::new(registry);
  Ok(
    keys
      .iter()
      .map(|key| Entity {
        def: Arc::clone(&registry[key]),
        registry: Arc::clone(&registry),
      })
      .collect(),
  )
}

/// What an intent addresses: one record, or a collection query.
#[derive(Debug, Clone)]
pub enum Target {
  Single(Entity),
  Collection(Entity),
}

impl Target {
  pub fn entity(&self) -> &Entity {
    match self {
      Target::Single(entity) | Target::Collection(entity) => entity,
    }
  }

  pub fn is_collection(&self) -> bool {
    matches!(self, Target::Collection(_))
  }
}

impl From<&Entity> for Target {
  fn from(entity: &Entity) -> Self {
    entity.one()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_builder_defaults() {
    let todo = Entity::builder("todo").build().unwrap();

    assert_eq!(todo.key(), "todo");
    assert_eq!(todo.id_field(), "id");
    assert!(!todo.is_singleton());
    assert!(todo.stale_timeout().is_none());
    assert!(todo.provider().is_none());
    assert!(todo.schema().is_empty());
  }

  #[test]
  fn test_builder_rejects_empty_key() {
    assert_eq!(
      Entity::builder("").build().unwrap_err(),
      DescriptorError::EmptyKey
    );
  }

  #[test]
  fn test_builder_rejects_empty_id_field() {
    let err = Entity::builder("todo").id_field("").build().unwrap_err();
    assert_eq!(
      err,
      DescriptorError::EmptyIdField {
        entity: "todo".to_string()
      }
    );
  }

  #[test]
  fn test_relations() {
    let user = Entity::builder("user").build().unwrap();
    let post = Entity::builder("post")
      .has_one("author", &user)
      .has_many("likes", &user)
      .build()
      .unwrap();

    assert_eq!(post.schema()["author"], Relation::One("user".to_string()));
    assert_eq!(post.schema()["likes"], Relation::Many("user".to_string()));
    let likes = post.related(&post.schema()["likes"]).unwrap();
    assert_eq!(likes.key(), "user");
  }

  #[test]
  fn test_self_relation() {
    let comment = Entity::builder("comment")
      .has_many_ref("replies", "comment")
      .build()
      .unwrap();

    let replies = comment.related(&comment.schema()["replies"]).unwrap();
    assert_eq!(replies.key(), "comment");
    assert!(replies.related(&replies.schema()["replies"]).is_some());
  }

  #[test]
  fn test_unknown_relation_key() {
    let err = Entity::builder("user")
      .has_one_ref("manager", "boss")
      .build()
      .unwrap_err();

    assert_eq!(
      err,
      DescriptorError::UnknownRelation {
        entity: "user".to_string(),
        field: "manager".to_string(),
        target: "boss".to_string(),
      }
    );
  }

  #[test]
  fn test_schema_with_mutual_relations() {
    let entities = Schema::new()
      .entity(Entity::builder("author").has_many_ref("books", "book"))
      .entity(Entity::builder("book").has_one_ref("author", "author"))
      .build()
      .unwrap();

    let author = &entities["author"];
    let book = author.related(&author.schema()["books"]).unwrap();
    assert_eq!(book.key(), "book");
    assert_eq!(book.related(&book.schema()["author"]).unwrap().key(), "author");
  }

  #[test]
  fn test_schema_rejects_duplicate_keys() {
    let err = Schema::new()
      .entity(Entity::builder("a"))
      .entity(Entity::builder("a"))
      .build()
      .unwrap_err();

    assert_eq!(
      err,
      DescriptorError::DuplicateEntity {
        entity: "a".to_string()
      }
    );
  }

  #[test]
  fn test_id_of() {
    let foo = Entity::builder("foo").id_field("key").build().unwrap();

    assert_eq!(foo.id_of(&json!(2)), Some("2".to_string()));
    assert_eq!(foo.id_of(&json!("abc")), Some("abc".to_string()));
    assert_eq!(foo.id_of(&json!({ "key": 1 })), Some("1".to_string()));
    assert_eq!(foo.id_of(&json!({ "id": 1 })), None);
    assert_eq!(foo.id_of(&Value::Null), None);
  }

  #[test]
  fn test_targets() {
    let foo = Entity::builder("foo").build().unwrap();

    assert!(!foo.one().is_collection());
    assert!(foo.many().is_collection());
    assert_eq!(Target::from(&foo).entity().key(), "foo");
  }
}
