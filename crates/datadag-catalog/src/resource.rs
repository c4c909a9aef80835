//! Warehouse resource types.
//!
//! Resources use the warehouse's camelCase JSON shape so that patches supplied
//! in pipeline definitions (`friendlyName`, `externalDataConfiguration`, ...)
//! can be overlaid onto stored resources field by field.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::OperationError;

/// Default refresh interval for materialized views (30 minutes).
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 1_800_000;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetReference {
  pub project_id: String,
  pub dataset_id: String,
}

impl DatasetReference {
  pub fn new(project_id: impl Into<String>, dataset_id: impl Into<String>) -> Self {
    Self {
      project_id: project_id.into(),
      dataset_id: dataset_id.into(),
    }
  }

  pub fn table(&self, table_id: impl Into<String>) -> TableReference {
    TableReference {
      project_id: self.project_id.clone(),
      dataset_id: self.dataset_id.clone(),
      table_id: table_id.into(),
    }
  }

  pub fn validate(&self) -> Result<(), OperationError> {
    validate_project_id(&self.project_id)?;
    validate_identifier("dataset", &self.dataset_id, |c| {
      c.is_ascii_alphanumeric() || c == '_'
    })
  }
}

impl fmt::Display for DatasetReference {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{}", self.project_id, self.dataset_id)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableReference {
  pub project_id: String,
  pub dataset_id: String,
  pub table_id: String,
}

impl TableReference {
  /// Parse `project.dataset.table`, `project:dataset.table` or
  /// `dataset.table` (which uses `default_project`).
  pub fn parse(input: &str, default_project: &str) -> Result<Self, OperationError> {
    let (project, rest) = match input.split_once(':') {
      Some((project, rest)) => (Some(project), rest),
      None => (None, input),
    };
    let parts: Vec<&str> = rest.split('.').collect();

    let (project_id, dataset_id, table_id) = match (project, parts.as_slice()) {
      (Some(p), [d, t]) => (p, *d, *t),
      (None, [p, d, t]) => (*p, *d, *t),
      (None, [d, t]) => (default_project, *d, *t),
      _ => {
        return Err(OperationError::invalid(format!(
          "expected 'project.dataset.table' or 'dataset.table', got '{}'",
          input
        )));
      }
    };

    let reference = Self {
      project_id: project_id.to_string(),
      dataset_id: dataset_id.to_string(),
      table_id: table_id.to_string(),
    };
    reference.validate()?;
    Ok(reference)
  }

  pub fn dataset(&self) -> DatasetReference {
    DatasetReference::new(&self.project_id, &self.dataset_id)
  }

  pub fn validate(&self) -> Result<(), OperationError> {
    self.dataset().validate()?;
    validate_identifier("table", &self.table_id, |c| {
      c.is_ascii_alphanumeric() || c == '_' || c == '-'
    })
  }
}

impl fmt::Display for TableReference {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{}.{}", self.project_id, self.dataset_id, self.table_id)
  }
}

fn validate_project_id(project_id: &str) -> Result<(), OperationError> {
  validate_identifier("project", project_id, |c| {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')
  })
}

fn validate_identifier(
  what: &str,
  id: &str,
  allowed: impl Fn(char) -> bool,
) -> Result<(), OperationError> {
  if id.is_empty() || id.len() > 1024 {
    return Err(OperationError::invalid(format!(
      "{} id must be 1-1024 characters, got '{}'",
      what, id
    )));
  }
  if let Some(c) = id.chars().find(|c| !allowed(*c)) {
    return Err(OperationError::invalid(format!(
      "{} id '{}' contains invalid character '{}'",
      what, id, c
    )));
  }
  Ok(())
}

/// Column data type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
  String,
  Bytes,
  #[serde(alias = "INT64")]
  Integer,
  #[serde(alias = "FLOAT64")]
  Float,
  Numeric,
  #[serde(rename = "BIGNUMERIC")]
  BigNumeric,
  #[serde(alias = "BOOL")]
  Boolean,
  Timestamp,
  Date,
  Time,
  Datetime,
  Geography,
  Json,
  #[serde(alias = "STRUCT")]
  Record,
}

/// Column nullability mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldMode {
  Required,
  #[default]
  Nullable,
  Repeated,
}

/// A column in a table schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FieldDescriptor {
  pub name: String,
  #[serde(rename = "type")]
  pub field_type: FieldType,
  #[serde(default)]
  pub mode: FieldMode,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  /// Sub-fields of a RECORD column.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub fields: Vec<FieldDescriptor>,
}

impl FieldDescriptor {
  pub fn new(name: impl Into<String>, field_type: FieldType, mode: FieldMode) -> Self {
    Self {
      name: name.into(),
      field_type,
      mode,
      description: None,
      fields: Vec::new(),
    }
  }
}

/// Metadata changes for a single existing column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldUpdate {
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub mode: Option<FieldMode>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Schema {
  #[serde(default)]
  pub fields: Vec<FieldDescriptor>,
}

impl Schema {
  pub fn new(fields: Vec<FieldDescriptor>) -> Self {
    Self { fields }
  }

  pub fn validate(&self) -> Result<(), OperationError> {
    validate_fields(&self.fields)
  }

  /// Merge per-column metadata, keeping column order and types.
  pub fn apply_updates(&mut self, updates: &[FieldUpdate]) -> Result<(), OperationError> {
    for update in updates {
      let field = self
        .fields
        .iter_mut()
        .find(|f| f.name.eq_ignore_ascii_case(&update.name))
        .ok_or_else(|| OperationError::NotFound(format!("field '{}'", update.name)))?;

      if let Some(mode) = update.mode {
        let relaxes = field.mode == FieldMode::Required && mode == FieldMode::Nullable;
        if mode != field.mode && !relaxes {
          return Err(OperationError::invalid(format!(
            "field '{}' cannot change mode from {:?} to {:?}",
            field.name, field.mode, mode
          )));
        }
        field.mode = mode;
      }
      if let Some(description) = &update.description {
        field.description = Some(description.clone());
      }
    }
    Ok(())
  }
}

fn validate_fields(fields: &[FieldDescriptor]) -> Result<(), OperationError> {
  let mut seen = HashSet::new();
  for field in fields {
    let valid_name = field
      .name
      .chars()
      .next()
      .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
      && field
        .name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid_name {
      return Err(OperationError::invalid(format!(
        "invalid field name '{}'",
        field.name
      )));
    }
    if !seen.insert(field.name.to_ascii_lowercase()) {
      return Err(OperationError::invalid(format!(
        "duplicate field name '{}'",
        field.name
      )));
    }
    match (field.field_type, field.fields.is_empty()) {
      (FieldType::Record, true) => {
        return Err(OperationError::invalid(format!(
          "RECORD field '{}' must declare sub-fields",
          field.name
        )));
      }
      (FieldType::Record, false) => validate_fields(&field.fields)?,
      (_, false) => {
        return Err(OperationError::invalid(format!(
          "only RECORD fields may declare sub-fields, '{}' is {:?}",
          field.name, field.field_type
        )));
      }
      (_, true) => {}
    }
  }
  Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ViewDefinition {
  pub query: String,
  #[serde(default)]
  pub use_legacy_sql: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MaterializedViewDefinition {
  pub query: String,
  #[serde(default = "default_enable_refresh")]
  pub enable_refresh: bool,
  #[serde(default = "default_refresh_interval_ms")]
  pub refresh_interval_ms: u64,
}

fn default_enable_refresh() -> bool {
  true
}

fn default_refresh_interval_ms() -> u64 {
  DEFAULT_REFRESH_INTERVAL_MS
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceFormat {
  Csv,
  NewlineDelimitedJson,
  Avro,
  Parquet,
  Orc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Compression {
  #[default]
  None,
  Gzip,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CsvOptions {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub skip_leading_rows: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub field_delimiter: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub quote: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub encoding: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub allow_jagged_rows: Option<bool>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub allow_quoted_newlines: Option<bool>,
}

/// Where an external table's data lives and how to read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExternalDataConfiguration {
  pub source_format: SourceFormat,
  #[serde(default)]
  pub compression: Compression,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub csv_options: Option<CsvOptions>,
  #[serde(default)]
  pub source_uris: Vec<String>,
  #[serde(default)]
  pub autodetect: bool,
}

impl ExternalDataConfiguration {
  pub fn validate(&self) -> Result<(), OperationError> {
    if self.source_uris.is_empty() {
      return Err(OperationError::invalid("sourceUris must not be empty"));
    }
    for uri in &self.source_uris {
      let parsed = url::Url::parse(uri)
        .map_err(|e| OperationError::invalid(format!("invalid source uri '{}': {}", uri, e)))?;
      if parsed.host_str().is_none_or(str::is_empty) {
        return Err(OperationError::invalid(format!(
          "source uri '{}' has no bucket or host",
          uri
        )));
      }
    }
    if self.csv_options.is_some() && self.source_format != SourceFormat::Csv {
      return Err(OperationError::invalid(format!(
        "csvOptions given for {:?} source",
        self.source_format
      )));
    }
    Ok(())
  }
}

/// What kind of object a table entry is. Derived from its definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TableType {
  #[default]
  Table,
  View,
  MaterializedView,
  External,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Dataset {
  /// `project:dataset`
  pub id: String,
  pub dataset_reference: DatasetReference,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub location: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub friendly_name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub default_table_expiration_ms: Option<i64>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub labels: BTreeMap<String, String>,
}

impl Dataset {
  pub fn new(reference: DatasetReference) -> Self {
    Self {
      id: format!("{}:{}", reference.project_id, reference.dataset_id),
      dataset_reference: reference,
      location: None,
      friendly_name: None,
      description: None,
      default_table_expiration_ms: None,
      labels: BTreeMap::new(),
    }
  }

  /// Merge a metadata patch. Identity fields cannot be patched.
  pub fn patched(&self, patch: &Map<String, Value>) -> Result<Self, OperationError> {
    reject_keys(patch, &["id", "datasetReference"], "dataset")?;
    overlay(self, patch, "dataset")
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Table {
  pub table_reference: TableReference,
  #[serde(rename = "type", default)]
  pub table_type: TableType,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub schema: Option<Schema>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub friendly_name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  /// Milliseconds since the epoch.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub expiration_time: Option<i64>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub labels: BTreeMap<String, String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub view: Option<ViewDefinition>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub materialized_view: Option<MaterializedViewDefinition>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub external_data_configuration: Option<ExternalDataConfiguration>,
}

/// Top-level table fields that can be named in an update.
const UPDATABLE_TABLE_FIELDS: [&str; 8] = [
  "schema",
  "friendlyName",
  "description",
  "expirationTime",
  "labels",
  "view",
  "materializedView",
  "externalDataConfiguration",
];

impl Table {
  pub fn new(table_reference: TableReference) -> Self {
    Self {
      table_reference,
      table_type: TableType::Table,
      schema: None,
      friendly_name: None,
      description: None,
      expiration_time: None,
      labels: BTreeMap::new(),
      view: None,
      materialized_view: None,
      external_data_configuration: None,
    }
  }

  /// Build a table from a resource body, filling in its reference.
  ///
  /// `tableReference.tableId` is required; project and dataset default to
  /// `dataset`.
  pub fn from_resource(
    dataset: &DatasetReference,
    resource: &Map<String, Value>,
  ) -> Result<Self, OperationError> {
    reject_keys(resource, &["type"], "table")?;
    let reference = resource_reference(dataset, resource)?;

    let mut body = resource.clone();
    body.insert(
      "tableReference".to_string(),
      serde_json::to_value(&reference).map_err(|e| OperationError::invalid(e.to_string()))?,
    );
    let mut table: Table = serde_json::from_value(Value::Object(body))
      .map_err(|e| OperationError::invalid(format!("invalid table resource: {}", e)))?;
    table.finalize()?;
    Ok(table)
  }

  /// Overlay every field present in `resource` except the reference.
  pub fn upserted(&self, resource: &Map<String, Value>) -> Result<Self, OperationError> {
    reject_keys(resource, &["type"], "table")?;
    let mut patch = resource.clone();
    patch.remove("tableReference");
    let mut table = overlay(self, &patch, "table")?;
    table.finalize()?;
    Ok(table)
  }

  /// Update only the named top-level fields; a named field missing from
  /// `resource` is cleared.
  pub fn with_fields(
    &self,
    fields: &[String],
    resource: &Map<String, Value>,
  ) -> Result<Self, OperationError> {
    let mut patch = Map::new();
    for field in fields {
      if !UPDATABLE_TABLE_FIELDS.contains(&field.as_str()) {
        return Err(OperationError::invalid(format!(
          "table field '{}' cannot be updated",
          field
        )));
      }
      patch.insert(
        field.clone(),
        resource.get(field).cloned().unwrap_or(Value::Null),
      );
    }
    let mut table = overlay(self, &patch, "table")?;
    table.finalize()?;
    Ok(table)
  }

  /// Validate the definition and derive `type` from it.
  pub fn finalize(&mut self) -> Result<(), OperationError> {
    self.table_reference.validate()?;

    let definitions = [
      self.view.is_some(),
      self.materialized_view.is_some(),
      self.external_data_configuration.is_some(),
    ];
    if definitions.iter().filter(|d| **d).count() > 1 {
      return Err(OperationError::invalid(format!(
        "table '{}' may define only one of view, materializedView, externalDataConfiguration",
        self.table_reference
      )));
    }

    if let Some(schema) = &self.schema {
      schema.validate()?;
    }
    if let Some(view) = &self.view {
      require_query(&view.query, "view")?;
    }
    if let Some(mv) = &self.materialized_view {
      require_query(&mv.query, "materialized view")?;
      if mv.enable_refresh && mv.refresh_interval_ms == 0 {
        return Err(OperationError::invalid(
          "materialized view refreshIntervalMs must be positive",
        ));
      }
    }
    if let Some(external) = &self.external_data_configuration {
      external.validate()?;
      if !external.autodetect && self.schema.as_ref().is_none_or(|s| s.fields.is_empty()) {
        return Err(OperationError::invalid(format!(
          "external table '{}' needs a schema unless autodetect is set",
          self.table_reference
        )));
      }
    }

    self.table_type = if self.view.is_some() {
      TableType::View
    } else if self.materialized_view.is_some() {
      TableType::MaterializedView
    } else if self.external_data_configuration.is_some() {
      TableType::External
    } else {
      TableType::Table
    };
    Ok(())
  }
}

fn require_query(query: &str, what: &str) -> Result<(), OperationError> {
  if query.trim().is_empty() {
    return Err(OperationError::invalid(format!("{} query must not be empty", what)));
  }
  Ok(())
}

fn resource_reference(
  dataset: &DatasetReference,
  resource: &Map<String, Value>,
) -> Result<TableReference, OperationError> {
  let raw = resource
    .get("tableReference")
    .and_then(Value::as_object)
    .ok_or_else(|| OperationError::invalid("table resource needs a tableReference"))?;

  let field = |name: &str| -> Result<Option<String>, OperationError> {
    match raw.get(name) {
      None | Some(Value::Null) => Ok(None),
      Some(Value::String(s)) => Ok(Some(s.clone())),
      Some(other) => Err(OperationError::invalid(format!(
        "tableReference.{} must be a string, got {}",
        name, other
      ))),
    }
  };

  let table_id =
    field("tableId")?.ok_or_else(|| OperationError::invalid("tableReference.tableId is required"))?;
  Ok(TableReference {
    project_id: field("projectId")?.unwrap_or_else(|| dataset.project_id.clone()),
    dataset_id: field("datasetId")?.unwrap_or_else(|| dataset.dataset_id.clone()),
    table_id,
  })
}

fn reject_keys(patch: &Map<String, Value>, keys: &[&str], what: &str) -> Result<(), OperationError> {
  match keys.iter().find(|k| patch.contains_key(**k)) {
    Some(key) => Err(OperationError::invalid(format!(
      "{} field '{}' cannot be set directly",
      what, key
    ))),
    None => Ok(()),
  }
}

/// Overlay `patch` onto the JSON form of `base`; `null` removes a field.
pub(crate) fn overlay<T: Serialize + DeserializeOwned>(
  base: &T,
  patch: &Map<String, Value>,
  what: &str,
) -> Result<T, OperationError> {
  let mut value = serde_json::to_value(base).map_err(|e| OperationError::invalid(e.to_string()))?;
  let Value::Object(object) = &mut value else {
    return Err(OperationError::invalid(format!("{} is not an object", what)));
  };
  for (key, patch_value) in patch {
    if patch_value.is_null() {
      object.remove(key);
    } else {
      object.insert(key.clone(), patch_value.clone());
    }
  }
  serde_json::from_value(value).map_err(|e| OperationError::invalid(format!("invalid {}: {}", what, e)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn dataset_ref() -> DatasetReference {
    DatasetReference::new("analytics-dev", "staging")
  }

  fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
  }

  #[test]
  fn test_parse_table_reference() {
    let full = TableReference::parse("analytics-dev.staging.orders", "other").unwrap();
    assert_eq!(full, dataset_ref().table("orders"));

    let legacy = TableReference::parse("analytics-dev:staging.orders", "other").unwrap();
    assert_eq!(legacy, full);

    let short = TableReference::parse("staging.orders", "analytics-dev").unwrap();
    assert_eq!(short, full);

    assert!(TableReference::parse("orders", "p").is_err());
    assert!(TableReference::parse("p.d.t.x", "p").is_err());
    assert!(TableReference::parse("p.bad-dataset.t", "p").is_err());
  }

  #[test]
  fn test_field_descriptor_defaults_and_aliases() {
    let field: FieldDescriptor = serde_json::from_value(json!({ "name": "n", "type": "INT64" })).unwrap();
    assert_eq!(field.field_type, FieldType::Integer);
    assert_eq!(field.mode, FieldMode::Nullable);
  }

  #[test]
  fn test_schema_rejects_duplicates_and_bad_records() {
    let dup = Schema::new(vec![
      FieldDescriptor::new("a", FieldType::String, FieldMode::Required),
      FieldDescriptor::new("A", FieldType::String, FieldMode::Nullable),
    ]);
    assert!(dup.validate().is_err());

    let record = Schema::new(vec![FieldDescriptor::new(
      "address",
      FieldType::Record,
      FieldMode::Nullable,
    )]);
    assert!(record.validate().is_err());
  }

  #[test]
  fn test_apply_updates_keeps_order_and_types() {
    let mut schema = Schema::new(vec![
      FieldDescriptor::new("emp_name", FieldType::String, FieldMode::Required),
      FieldDescriptor::new("salary", FieldType::Integer, FieldMode::Nullable),
    ]);

    schema
      .apply_updates(&[
        FieldUpdate {
          name: "salary".to_string(),
          description: Some("Monthly salary in USD".to_string()),
          mode: None,
        },
        FieldUpdate {
          name: "emp_name".to_string(),
          description: Some("Name of employee".to_string()),
          mode: Some(FieldMode::Nullable),
        },
      ])
      .unwrap();

    assert_eq!(schema.fields[0].name, "emp_name");
    assert_eq!(schema.fields[0].mode, FieldMode::Nullable);
    assert_eq!(schema.fields[0].field_type, FieldType::String);
    assert_eq!(schema.fields[1].description.as_deref(), Some("Monthly salary in USD"));
  }

  #[test]
  fn test_apply_updates_rejects_tightening_and_unknown_fields() {
    let mut schema = Schema::new(vec![FieldDescriptor::new(
      "salary",
      FieldType::Integer,
      FieldMode::Nullable,
    )]);

    let tighten = schema.apply_updates(&[FieldUpdate {
      name: "salary".to_string(),
      description: None,
      mode: Some(FieldMode::Required),
    }]);
    assert!(matches!(tighten, Err(OperationError::InvalidSpec(_))));

    let unknown = schema.apply_updates(&[FieldUpdate {
      name: "bonus".to_string(),
      description: Some("x".to_string()),
      mode: None,
    }]);
    assert!(matches!(unknown, Err(OperationError::NotFound(_))));
  }

  #[test]
  fn test_table_from_resource_defaults_reference() {
    let table = Table::from_resource(
      &dataset_ref(),
      &object(json!({
        "tableReference": { "tableId": "test_table_id" },
        "expirationTime": 1_700_000_000_000_i64
      })),
    )
    .unwrap();

    assert_eq!(table.table_reference, dataset_ref().table("test_table_id"));
    assert_eq!(table.table_type, TableType::Table);
    assert_eq!(table.expiration_time, Some(1_700_000_000_000));
  }

  #[test]
  fn test_table_type_is_derived() {
    let table = Table::from_resource(
      &dataset_ref(),
      &object(json!({
        "tableReference": { "tableId": "v" },
        "view": { "query": "SELECT 1" }
      })),
    )
    .unwrap();
    assert_eq!(table.table_type, TableType::View);

    let explicit = Table::from_resource(
      &dataset_ref(),
      &object(json!({ "tableReference": { "tableId": "v" }, "type": "VIEW" })),
    );
    assert!(explicit.is_err());
  }

  #[test]
  fn test_external_configuration_validation() {
    let mut config: ExternalDataConfiguration = serde_json::from_value(json!({
      "sourceFormat": "CSV",
      "csvOptions": { "skipLeadingRows": 1 },
      "sourceUris": ["gs://bkt-data/sample.csv"]
    }))
    .unwrap();
    assert!(config.validate().is_ok());

    config.source_uris.clear();
    assert!(config.validate().is_err());

    config.source_uris.push("not a uri".to_string());
    assert!(config.validate().is_err());

    config.source_uris = vec!["gs://bkt-data/".to_string()];
    config.source_format = SourceFormat::Parquet;
    assert!(config.validate().is_err());

    let unsupported = serde_json::from_value::<ExternalDataConfiguration>(json!({
      "sourceFormat": "XML",
      "sourceUris": ["gs://b/x"]
    }));
    assert!(unsupported.is_err());
  }

  #[test]
  fn test_with_fields_updates_only_named_fields() {
    let mut table = Table::new(dataset_ref().table("t"));
    table.description = Some("old".to_string());
    table.labels.insert("team".to_string(), "data".to_string());

    let updated = table
      .with_fields(
        &["friendlyName".to_string(), "description".to_string()],
        &object(json!({
          "friendlyName": "Updated Table",
          "description": "Updated Table",
          "labels": { "ignored": "yes" }
        })),
      )
      .unwrap();

    assert_eq!(updated.friendly_name.as_deref(), Some("Updated Table"));
    assert_eq!(updated.description.as_deref(), Some("Updated Table"));
    assert_eq!(updated.labels, table.labels);

    let cleared = table
      .with_fields(&["description".to_string()], &Map::new())
      .unwrap();
    assert_eq!(cleared.description, None);

    assert!(table.with_fields(&["tableReference".to_string()], &Map::new()).is_err());
  }

  #[test]
  fn test_dataset_patch_rejects_identity() {
    let dataset = Dataset::new(dataset_ref());
    let patched = dataset.patched(&object(json!({ "description": "x" }))).unwrap();
    assert_eq!(patched.description.as_deref(), Some("x"));
    assert_eq!(patched.id, "analytics-dev:staging");

    assert!(dataset.patched(&object(json!({ "id": "other:ds" }))).is_err());
    assert!(dataset.patched(&object(json!({ "unknownField": 1 }))).is_err());
  }
}
