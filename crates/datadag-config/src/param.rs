//! Parameter values for operation specs.
//!
//! A parameter is either a literal (scalar, list or nested mapping) or a
//! deferred value that can only be known once an upstream task has run:
//!
//! ```json
//! {
//!   "dataset_id": "staging",
//!   "source": { "$ref": { "task": "get_dataset", "field": "datasetReference.datasetId" } },
//!   "note": { "$template": "copied from {{ get_dataset.id }}" }
//! }
//! ```
//!
//! A mapping is only read as a reference or template when `$ref` / `$template`
//! is its single key.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ParamError;

const REF_KEY: &str = "$ref";
const TEMPLATE_KEY: &str = "$template";

/// A dotted path into a task result, e.g. `tables.0.tableId`.
///
/// Numeric segments index into lists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath(Vec<String>);

impl FieldPath {
  pub fn segments(&self) -> &[String] {
    &self.0
  }

  /// Look the path up in a JSON value.
  pub fn lookup<'a>(&self, value: &'a Value) -> Option<&'a Value> {
    self.0.iter().try_fold(value, |current, segment| match current {
      Value::Object(map) => map.get(segment),
      Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
      _ => None,
    })
  }
}

impl FromStr for FieldPath {
  type Err = ParamError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    if s.is_empty() {
      return Err(ParamError::EmptyFieldPath);
    }
    let segments: Vec<String> = s.split('.').map(str::to_string).collect();
    if segments.iter().any(String::is_empty) {
      return Err(ParamError::EmptySegment(s.to_string()));
    }
    Ok(Self(segments))
  }
}

impl TryFrom<String> for FieldPath {
  type Error = ParamError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<FieldPath> for String {
  fn from(path: FieldPath) -> Self {
    path.to_string()
  }
}

impl fmt::Display for FieldPath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0.join("."))
  }
}

/// A deferred reference to a field of an upstream task's result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskRef {
  pub task: String,
  pub field: FieldPath,
}

impl TaskRef {
  pub fn new(task: impl Into<String>, field: &str) -> Result<Self, ParamError> {
    Ok(Self {
      task: task.into(),
      field: field.parse()?,
    })
  }
}

impl fmt::Display for TaskRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{}", self.task, self.field)
  }
}

/// A single operation parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum ParamValue {
  /// A string, number, bool or null.
  Literal(Value),
  List(Vec<ParamValue>),
  Map(BTreeMap<String, ParamValue>),
  /// Read a field of an upstream result.
  Reference(TaskRef),
  /// A minijinja template rendered against upstream results.
  Template(String),
}

impl ParamValue {
  pub fn reference(task: impl Into<String>, field: &str) -> Result<Self, ParamError> {
    TaskRef::new(task, field).map(ParamValue::Reference)
  }

  pub fn template(source: impl Into<String>) -> Self {
    ParamValue::Template(source.into())
  }

  /// Whether this value (or anything nested in it) is resolved at run time.
  pub fn is_deferred(&self) -> bool {
    match self {
      ParamValue::Literal(_) => false,
      ParamValue::Reference(_) | ParamValue::Template(_) => true,
      ParamValue::List(items) => items.iter().any(ParamValue::is_deferred),
      ParamValue::Map(map) => map.values().any(ParamValue::is_deferred),
    }
  }

  /// Collect every task reference nested in this value.
  pub fn references(&self) -> Vec<&TaskRef> {
    let mut out = Vec::new();
    self.collect_references(&mut out);
    out
  }

  fn collect_references<'a>(&'a self, out: &mut Vec<&'a TaskRef>) {
    match self {
      ParamValue::Reference(r) => out.push(r),
      ParamValue::List(items) => items.iter().for_each(|v| v.collect_references(out)),
      ParamValue::Map(map) => map.values().for_each(|v| v.collect_references(out)),
      ParamValue::Literal(_) | ParamValue::Template(_) => {}
    }
  }

  /// The plain JSON value, if nothing in it is deferred.
  pub fn to_literal(&self) -> Option<Value> {
    match self {
      ParamValue::Literal(v) => Some(v.clone()),
      ParamValue::List(items) => items
        .iter()
        .map(ParamValue::to_literal)
        .collect::<Option<Vec<_>>>()
        .map(Value::Array),
      ParamValue::Map(map) => map
        .iter()
        .map(|(k, v)| v.to_literal().map(|v| (k.clone(), v)))
        .collect::<Option<serde_json::Map<_, _>>>()
        .map(Value::Object),
      ParamValue::Reference(_) | ParamValue::Template(_) => None,
    }
  }
}

impl TryFrom<Value> for ParamValue {
  type Error = ParamError;

  fn try_from(value: Value) -> Result<Self, Self::Error> {
    match value {
      Value::Array(items) => items
        .into_iter()
        .map(ParamValue::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map(ParamValue::List),
      Value::Object(map) if map.len() == 1 && map.contains_key(REF_KEY) => {
        let raw = map.get(REF_KEY).cloned().unwrap_or(Value::Null);
        serde_json::from_value::<TaskRef>(raw.clone())
          .map(ParamValue::Reference)
          .map_err(|e| ParamError::MalformedReference(format!("{raw}: {e}")))
      }
      Value::Object(map) if map.len() == 1 && map.contains_key(TEMPLATE_KEY) => {
        match map.get(TEMPLATE_KEY) {
          Some(Value::String(source)) => Ok(ParamValue::Template(source.clone())),
          other => Err(ParamError::MalformedTemplate(
            other.map(Value::to_string).unwrap_or_default(),
          )),
        }
      }
      Value::Object(map) => map
        .into_iter()
        .map(|(k, v)| ParamValue::try_from(v).map(|v| (k, v)))
        .collect::<Result<BTreeMap<_, _>, _>>()
        .map(ParamValue::Map),
      scalar => Ok(ParamValue::Literal(scalar)),
    }
  }
}

impl From<ParamValue> for Value {
  fn from(value: ParamValue) -> Self {
    match value {
      ParamValue::Literal(v) => v,
      ParamValue::List(items) => Value::Array(items.into_iter().map(Value::from).collect()),
      ParamValue::Map(map) => Value::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect()),
      ParamValue::Reference(r) => serde_json::json!({ REF_KEY: r }),
      ParamValue::Template(source) => serde_json::json!({ TEMPLATE_KEY: source }),
    }
  }
}

impl From<&str> for ParamValue {
  fn from(value: &str) -> Self {
    ParamValue::Literal(Value::String(value.to_string()))
  }
}

impl From<String> for ParamValue {
  fn from(value: String) -> Self {
    ParamValue::Literal(Value::String(value))
  }
}

impl From<bool> for ParamValue {
  fn from(value: bool) -> Self {
    ParamValue::Literal(Value::Bool(value))
  }
}

impl From<i64> for ParamValue {
  fn from(value: i64) -> Self {
    ParamValue::Literal(Value::from(value))
  }
}

impl From<TaskRef> for ParamValue {
  fn from(value: TaskRef) -> Self {
    ParamValue::Reference(value)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_parse_reference() {
    let value: ParamValue =
      serde_json::from_value(json!({ "$ref": { "task": "get_dataset", "field": "id" } })).unwrap();

    assert_eq!(value, ParamValue::reference("get_dataset", "id").unwrap());
    assert!(value.is_deferred());
    assert_eq!(value.to_literal(), None);
  }

  #[test]
  fn test_parse_nested_reference_in_mapping() {
    let value: ParamValue = serde_json::from_value(json!({
      "friendlyName": "Orders",
      "description": { "$ref": { "task": "get_dataset", "field": "description" } }
    }))
    .unwrap();

    let refs = value.references();
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].task, "get_dataset");
  }

  #[test]
  fn test_mapping_with_extra_keys_is_literal() {
    let raw = json!({ "$ref": "x", "other": 1 });
    let value: ParamValue = serde_json::from_value(raw.clone()).unwrap();

    assert!(!value.is_deferred());
    assert_eq!(value.to_literal(), Some(raw));
  }

  #[test]
  fn test_malformed_reference_is_rejected() {
    let result = serde_json::from_value::<ParamValue>(json!({ "$ref": { "task": "a" } }));
    assert!(result.is_err());

    let result = serde_json::from_value::<ParamValue>(json!({ "$template": 3 }));
    assert!(result.is_err());
  }

  #[test]
  fn test_serialize_keeps_shape() {
    let raw = json!({
      "fields": [{ "name": "emp_name", "type": "STRING" }],
      "note": { "$template": "{{ a.id }}" },
      "source": { "$ref": { "task": "a", "field": "tables.0.tableId" } }
    });
    let value: ParamValue = serde_json::from_value(raw.clone()).unwrap();

    assert_eq!(serde_json::to_value(&value).unwrap(), raw);
  }

  #[test]
  fn test_field_path_lookup() {
    let result = json!({ "tables": [{ "tableId": "orders" }], "id": "p:d" });

    let path: FieldPath = "tables.0.tableId".parse().unwrap();
    assert_eq!(path.lookup(&result), Some(&json!("orders")));

    let missing: FieldPath = "tables.3.tableId".parse().unwrap();
    assert_eq!(missing.lookup(&result), None);

    let through_scalar: FieldPath = "id.value".parse().unwrap();
    assert_eq!(through_scalar.lookup(&result), None);
  }

  #[test]
  fn test_field_path_rejects_empty_segments() {
    assert_eq!("".parse::<FieldPath>(), Err(ParamError::EmptyFieldPath));
    assert!(matches!(
      "a..b".parse::<FieldPath>(),
      Err(ParamError::EmptySegment(_))
    ));
  }
}
