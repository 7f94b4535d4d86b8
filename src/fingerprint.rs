//! Canonical cache keys for filter objects.

use serde_json::Value;

/// Key shared by every query without usable filters.
pub const BASE_KEY: &str = "#";

/// Build the cache key for a filter object.
///
/// Anything that is not a JSON object (null, scalars, arrays) maps to
/// [`BASE_KEY`]. Objects render each `key[value]` pair in ascending key
/// order, so insertion order never matters.
pub fn fingerprint(filter: &Value) -> String {
  let map = match filter {
    Value::Object(map) => map,
    _ => return BASE_KEY.to_string(),
  };

  let mut keys: Vec<&String> = map.keys().collect();
  keys.sort();

  keys.into_iter().fold(BASE_KEY.to_string(), |mut key, name| {
    key.push_str(name);
    key.push('[');
    key.push_str(&display_value(&map[name]));
    key.push(']');
    key
  })
}

/// Render a value the way it reads inside a key: strings unquoted,
/// integral floats without a fraction, arrays comma-joined.
pub(crate) fn display_value(value: &Value) -> String {
  match value {
    Value::Null => "null".to_string(),
    Value::Bool(b) => b.to_string(),
    Value::String(s) => s.clone(),
    Value::Number(n) => match n.as_f64() {
      Some(f) if n.is_f64() && f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 => {
        format!("{}", f as i64)
      }
      _ => n.to_string(),
    },
    Value::Array(items) => items
      .iter()
      .map(|item| match item {
        Value::Null => String::new(),
        other => display_value(other),
      })
      .collect::<Vec<_>>()
      .join(","),
    Value::Object(_) => "[object Object]".to_string(),
  }
}
