//! Transport responses and the rules for unwrapping them.

use serde::Deserialize;
use serde_json::Value;

/// Where entity data and metadata live inside a raw response body.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResponseOptions {
  /// Dot path of the record in single-entity responses
  pub entity_path: String,
  /// Dot path of the record list in collection responses
  pub entities_path: String,
  /// Whether collection responses carry metadata next to the list
  pub has_meta: bool,
  /// Dot path of the metadata inside the rest of the body; empty keeps it all
  pub meta_path: String,
}

impl Default for ResponseOptions {
  fn default() -> Self {
    Self {
      entity_path: "data".to_string(),
      entities_path: "data".to_string(),
      has_meta: true,
      meta_path: String::new(),
    }
  }
}

impl ResponseOptions {
  /// Options that keep the raw body as the entity payload.
  pub fn raw() -> Self {
    Self {
      entity_path: String::new(),
      entities_path: String::new(),
      has_meta: false,
      meta_path: String::new(),
    }
  }
}

/// A transport response, already split into entity data and metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
  /// Raw body as received
  pub original: Value,
  /// Unwrapped entity or entity list
  pub data: Value,
  /// Remaining body fields for collection responses with metadata
  pub meta: Option<Value>,
}

impl Response {
  /// Wrap a body whose data needs no unwrapping.
  pub fn new(data: Value) -> Self {
    Self {
      original: data.clone(),
      data,
      meta: None,
    }
  }

  /// Split `raw` according to `options`. `is_fetch` selects the collection
  /// paths and enables metadata extraction.
  pub fn from_raw(raw: Value, options: &ResponseOptions, is_fetch: bool) -> Self {
    let path = if is_fetch {
      &options.entities_path
    } else {
      &options.entity_path
    };
    let data = get_path(&raw, path).cloned().unwrap_or_else(|| raw.clone());

    let meta = if is_fetch && options.has_meta {
      let rest = omit_path(&raw, &options.entities_path);
      Some(get_path(&rest, &options.meta_path).cloned().unwrap_or(rest))
    } else {
      None
    };

    Self {
      original: raw,
      data,
      meta,
    }
  }
}

/// Read a dot path. An empty path addresses nothing.
pub(crate) fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
  if path.is_empty() {
    return None;
  }

  path.split('.').try_fold(value, |current, segment| match current {
    Value::Object(map) => map.get(segment),
    Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
    _ => None,
  })
}

/// Copy of `value` with the field at a dot path removed.
pub(crate) fn omit_path(value: &Value, path: &str) -> Value {
  let mut copy = value.clone();
  if !path.is_empty() {
    let segments: Vec<&str> = path.split('.').collect();
    remove_at(&mut copy, &segments);
  }
  copy
}

fn remove_at(value: &mut Value, segments: &[&str]) {
  match segments {
    [] => {}
    [last] => {
      if let Value::Object(map) = value {
        map.remove(*last);
      }
    }
    [first, rest @ ..] => {
      if let Some(next) = value.get_mut(*first) {
        remove_at(next, rest);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_fetch_unwraps_list_and_meta() {
    let raw = json!({ "data": [{ "id": 1 }], "total": 1 });
    let response = Response::from_raw(raw.clone(), &ResponseOptions::default(), true);

    assert_eq!(response.data, json!([{ "id": 1 }]));
    assert_eq!(response.meta, Some(json!({ "total": 1 })));
    assert_eq!(response.original, raw);
  }

  #[test]
  fn test_meta_path_selects_nested_meta() {
    let options = ResponseOptions {
      entities_path: "records".to_string(),
      meta_path: "pagination".to_string(),
      ..Default::default()
    };
    let raw = json!({ "records": [], "pagination": { "page": 3 }, "took": 5 });
    let response = Response::from_raw(raw, &options, true);

    assert_eq!(response.data, json!([]));
    assert_eq!(response.meta, Some(json!({ "page": 3 })));
  }

  #[test]
  fn test_single_entity_has_no_meta() {
    let raw = json!({ "data": { "id": 4 }, "total": 1 });
    let response = Response::from_raw(raw, &ResponseOptions::default(), false);

    assert_eq!(response.data, json!({ "id": 4 }));
    assert_eq!(response.meta, None);
  }

  #[test]
  fn test_missing_path_keeps_whole_body() {
    let raw = json!([{ "id": 1 }, { "id": 2 }]);
    let response = Response::from_raw(raw.clone(), &ResponseOptions::default(), true);

    assert_eq!(response.data, raw);
  }

  #[test]
  fn test_raw_options() {
    let raw = json!({ "data": 1 });
    let response = Response::from_raw(raw.clone(), &ResponseOptions::raw(), true);

    assert_eq!(response.data, raw);
    assert_eq!(response.meta, None);
  }

  #[test]
  fn test_omit_nested_path() {
    let value = json!({ "a": { "b": 1, "c": 2 } });
    assert_eq!(omit_path(&value, "a.b"), json!({ "a": { "c": 2 } }));
    assert_eq!(omit_path(&value, "x.y"), value);
  }
}
