//! Typed operations.
//!
//! An [`Operation`] is parsed from an [`OperationKind`] and fully resolved
//! JSON parameters. Parsing checks everything that does not depend on stored
//! state (parameter names and types, identifiers, schemas, external source
//! configuration), so a malformed task fails with `InvalidSpec` before any
//! warehouse call is made.

use std::collections::BTreeMap;

use datadag_config::OperationKind;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

use crate::error::OperationError;
use crate::resource::{
  Dataset, DatasetReference, FieldDescriptor, FieldUpdate, MaterializedViewDefinition, Schema,
  Table, TableReference, ViewDefinition,
};
use crate::warehouse::Warehouse;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DatasetParams {
  dataset_id: String,
  #[serde(default)]
  project_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateDatasetParams {
  dataset_id: String,
  #[serde(default)]
  project_id: Option<String>,
  #[serde(default)]
  dataset_resource: Map<String, Value>,
  #[serde(default)]
  exists_ok: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UpdateDatasetParams {
  dataset_id: String,
  #[serde(default)]
  project_id: Option<String>,
  dataset_resource: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeleteDatasetParams {
  dataset_id: String,
  #[serde(default)]
  project_id: Option<String>,
  #[serde(default)]
  delete_contents: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateTableParams {
  dataset_id: String,
  #[serde(default)]
  project_id: Option<String>,
  table_id: String,
  #[serde(default)]
  schema_fields: Option<Vec<FieldDescriptor>>,
  #[serde(default)]
  view: Option<ViewDefinition>,
  #[serde(default)]
  materialized_view: Option<MaterializedViewDefinition>,
  #[serde(default)]
  description: Option<String>,
  #[serde(default)]
  friendly_name: Option<String>,
  #[serde(default)]
  labels: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateExternalTableParams {
  table_resource: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UpsertTableParams {
  dataset_id: String,
  #[serde(default)]
  project_id: Option<String>,
  table_resource: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UpdateTableSchemaParams {
  dataset_id: String,
  #[serde(default)]
  project_id: Option<String>,
  table_id: String,
  schema_fields_updates: Vec<FieldUpdate>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UpdateTableParams {
  dataset_id: String,
  #[serde(default)]
  project_id: Option<String>,
  table_id: String,
  #[serde(default)]
  fields: Vec<String>,
  table_resource: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeleteTableParams {
  deletion_dataset_table: String,
  #[serde(default)]
  ignore_if_missing: bool,
}

/// A validated warehouse operation, ready to dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
  CreateDataset {
    dataset: DatasetReference,
    resource: Map<String, Value>,
    exists_ok: bool,
  },
  GetDataset {
    dataset: DatasetReference,
  },
  UpdateDataset {
    dataset: DatasetReference,
    patch: Map<String, Value>,
  },
  DeleteDataset {
    dataset: DatasetReference,
    delete_contents: bool,
  },
  /// Tables, views, materialized views and external tables.
  CreateTable {
    table: Table,
  },
  UpsertTable {
    dataset: DatasetReference,
    resource: Map<String, Value>,
  },
  UpdateTableSchema {
    table: TableReference,
    updates: Vec<FieldUpdate>,
  },
  UpdateTable {
    table: TableReference,
    fields: Vec<String>,
    resource: Map<String, Value>,
  },
  DeleteTable {
    table: TableReference,
    ignore_if_missing: bool,
  },
  GetDatasetTables {
    dataset: DatasetReference,
  },
}

impl Operation {
  /// Parse and validate resolved parameters for `kind`.
  pub fn parse(
    kind: OperationKind,
    params: Map<String, Value>,
    default_project: &str,
  ) -> Result<Self, OperationError> {
    let params = Value::Object(params);
    let dataset_ref = |dataset_id: String, project_id: Option<String>| {
      let reference = DatasetReference::new(
        project_id.unwrap_or_else(|| default_project.to_string()),
        dataset_id,
      );
      reference.validate().map(|_| reference)
    };

    let operation = match kind {
      OperationKind::CreateDataset => {
        let p: CreateDatasetParams = from_params(kind, params)?;
        let dataset = dataset_ref(p.dataset_id, p.project_id)?;
        Dataset::new(dataset.clone()).patched(&p.dataset_resource)?;
        Operation::CreateDataset {
          dataset,
          resource: p.dataset_resource,
          exists_ok: p.exists_ok,
        }
      }
      OperationKind::GetDataset => {
        let p: DatasetParams = from_params(kind, params)?;
        Operation::GetDataset {
          dataset: dataset_ref(p.dataset_id, p.project_id)?,
        }
      }
      OperationKind::UpdateDataset => {
        let p: UpdateDatasetParams = from_params(kind, params)?;
        let dataset = dataset_ref(p.dataset_id, p.project_id)?;
        Dataset::new(dataset.clone()).patched(&p.dataset_resource)?;
        Operation::UpdateDataset {
          dataset,
          patch: p.dataset_resource,
        }
      }
      OperationKind::DeleteDataset => {
        let p: DeleteDatasetParams = from_params(kind, params)?;
        Operation::DeleteDataset {
          dataset: dataset_ref(p.dataset_id, p.project_id)?,
          delete_contents: p.delete_contents,
        }
      }
      OperationKind::CreateTable
      | OperationKind::CreateView
      | OperationKind::CreateMaterializedView => {
        let p: CreateTableParams = from_params(kind, params)?;
        let dataset = dataset_ref(p.dataset_id.clone(), p.project_id.clone())?;
        Operation::CreateTable {
          table: table_definition(kind, p, &dataset)?,
        }
      }
      OperationKind::CreateExternalTable => {
        let p: CreateExternalTableParams = from_params(kind, params)?;
        Operation::CreateTable {
          table: external_table(p.table_resource, default_project)?,
        }
      }
      OperationKind::UpsertTable => {
        let p: UpsertTableParams = from_params(kind, params)?;
        let dataset = dataset_ref(p.dataset_id, p.project_id)?;
        Table::from_resource(&dataset, &p.table_resource)?;
        Operation::UpsertTable {
          dataset,
          resource: p.table_resource,
        }
      }
      OperationKind::UpdateTableSchema => {
        let p: UpdateTableSchemaParams = from_params(kind, params)?;
        let table = dataset_ref(p.dataset_id, p.project_id)?.table(p.table_id);
        table.validate()?;
        Operation::UpdateTableSchema {
          table,
          updates: p.schema_fields_updates,
        }
      }
      OperationKind::UpdateTable => {
        let p: UpdateTableParams = from_params(kind, params)?;
        let table = dataset_ref(p.dataset_id, p.project_id)?.table(p.table_id);
        table.validate()?;
        let fields = if p.fields.is_empty() {
          p.table_resource.keys().cloned().collect()
        } else {
          p.fields
        };
        Table::new(table.clone()).with_fields(&fields, &p.table_resource)?;
        Operation::UpdateTable {
          table,
          fields,
          resource: p.table_resource,
        }
      }
      OperationKind::DeleteTable => {
        let p: DeleteTableParams = from_params(kind, params)?;
        Operation::DeleteTable {
          table: TableReference::parse(&p.deletion_dataset_table, default_project)?,
          ignore_if_missing: p.ignore_if_missing,
        }
      }
      OperationKind::GetDatasetTables => {
        let p: DatasetParams = from_params(kind, params)?;
        Operation::GetDatasetTables {
          dataset: dataset_ref(p.dataset_id, p.project_id)?,
        }
      }
    };

    Ok(operation)
  }

  /// The resource this operation acts on, for logging.
  pub fn target(&self) -> String {
    match self {
      Operation::CreateDataset { dataset, .. }
      | Operation::GetDataset { dataset }
      | Operation::UpdateDataset { dataset, .. }
      | Operation::DeleteDataset { dataset, .. }
      | Operation::UpsertTable { dataset, .. }
      | Operation::GetDatasetTables { dataset } => dataset.to_string(),
      Operation::CreateTable { table } => table.table_reference.to_string(),
      Operation::UpdateTableSchema { table, .. }
      | Operation::UpdateTable { table, .. }
      | Operation::DeleteTable { table, .. } => table.to_string(),
    }
  }

  /// Run the operation and return its result object.
  pub async fn dispatch(&self, warehouse: &dyn Warehouse) -> Result<Value, OperationError> {
    match self {
      Operation::CreateDataset {
        dataset,
        resource,
        exists_ok,
      } => to_result(&warehouse.create_dataset(dataset, resource, *exists_ok).await?),
      Operation::GetDataset { dataset } => to_result(&warehouse.get_dataset(dataset).await?),
      Operation::UpdateDataset { dataset, patch } => {
        to_result(&warehouse.update_dataset(dataset, patch).await?)
      }
      Operation::DeleteDataset {
        dataset,
        delete_contents,
      } => {
        warehouse.delete_dataset(dataset, *delete_contents).await?;
        Ok(json!({ "datasetReference": dataset, "deleted": true }))
      }
      Operation::CreateTable { table } => to_result(&warehouse.create_table(table.clone()).await?),
      Operation::UpsertTable { dataset, resource } => {
        to_result(&warehouse.upsert_table(dataset, resource).await?)
      }
      Operation::UpdateTableSchema { table, updates } => {
        to_result(&warehouse.update_table_schema(table, updates).await?)
      }
      Operation::UpdateTable {
        table,
        fields,
        resource,
      } => to_result(&warehouse.update_table(table, fields, resource).await?),
      Operation::DeleteTable {
        table,
        ignore_if_missing,
      } => {
        let deleted = warehouse.delete_table(table, *ignore_if_missing).await?;
        Ok(json!({ "tableReference": table, "deleted": deleted }))
      }
      Operation::GetDatasetTables { dataset } => {
        let tables = warehouse.list_tables(dataset).await?;
        Ok(json!({ "tables": tables }))
      }
    }
  }
}

fn from_params<T: DeserializeOwned>(kind: OperationKind, params: Value) -> Result<T, OperationError> {
  serde_json::from_value(params)
    .map_err(|e| OperationError::invalid(format!("{} parameters: {}", kind, e)))
}

fn to_result<T: serde::Serialize>(value: &T) -> Result<Value, OperationError> {
  serde_json::to_value(value).map_err(|e| OperationError::invalid(e.to_string()))
}

fn table_definition(
  kind: OperationKind,
  p: CreateTableParams,
  dataset: &DatasetReference,
) -> Result<Table, OperationError> {
  let supplied = [
    p.schema_fields.is_some(),
    p.view.is_some(),
    p.materialized_view.is_some(),
  ]
  .iter()
  .filter(|s| **s)
  .count();
  if supplied != 1 {
    return Err(OperationError::invalid(format!(
      "{} needs exactly one of schema_fields, view, materialized_view (got {})",
      kind, supplied
    )));
  }
  match kind {
    OperationKind::CreateView if p.view.is_none() => {
      return Err(OperationError::invalid("create_view needs a view definition"));
    }
    OperationKind::CreateMaterializedView if p.materialized_view.is_none() => {
      return Err(OperationError::invalid(
        "create_materialized_view needs a materialized_view definition",
      ));
    }
    _ => {}
  }

  let mut table = Table::new(dataset.table(p.table_id));
  table.schema = p.schema_fields.map(Schema::new);
  table.view = p.view;
  table.materialized_view = p.materialized_view;
  table.description = p.description;
  table.friendly_name = p.friendly_name;
  table.labels = p.labels;
  table.finalize()?;
  Ok(table)
}

fn external_table(
  resource: Map<String, Value>,
  default_project: &str,
) -> Result<Table, OperationError> {
  let has_dataset = resource
    .get("tableReference")
    .and_then(|r| r.get("datasetId"))
    .is_some_and(Value::is_string);
  if !has_dataset {
    return Err(OperationError::invalid(
      "external table resource needs tableReference.datasetId",
    ));
  }
  if !resource.contains_key("externalDataConfiguration") {
    return Err(OperationError::invalid(
      "external table resource needs externalDataConfiguration",
    ));
  }
  // datasetId is present, so only the project default applies.
  Table::from_resource(&DatasetReference::new(default_project, ""), &resource)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::resource::{FieldMode, FieldType, TableType};

  const PROJECT: &str = "analytics-dev";

  fn parse(kind: OperationKind, params: Value) -> Result<Operation, OperationError> {
    Operation::parse(kind, params.as_object().cloned().unwrap(), PROJECT)
  }

  #[test]
  fn test_create_table_with_schema() {
    let op = parse(
      OperationKind::CreateTable,
      json!({
        "dataset_id": "staging",
        "table_id": "test_table",
        "schema_fields": [
          { "name": "emp_name", "type": "STRING", "mode": "REQUIRED" },
          { "name": "salary", "type": "INTEGER", "mode": "NULLABLE" }
        ]
      }),
    )
    .unwrap();

    let Operation::CreateTable { table } = op else {
      panic!("expected create table");
    };
    assert_eq!(table.table_type, TableType::Table);
    let fields = &table.schema.unwrap().fields;
    assert_eq!(fields[0].field_type, FieldType::String);
    assert_eq!(fields[0].mode, FieldMode::Required);
    assert_eq!(fields[1].field_type, FieldType::Integer);
  }

  #[test]
  fn test_create_table_needs_exactly_one_definition() {
    let none = parse(
      OperationKind::CreateTable,
      json!({ "dataset_id": "staging", "table_id": "t" }),
    );
    assert!(matches!(none, Err(OperationError::InvalidSpec(_))));

    let both = parse(
      OperationKind::CreateTable,
      json!({
        "dataset_id": "staging",
        "table_id": "t",
        "schema_fields": [{ "name": "a", "type": "STRING" }],
        "view": { "query": "SELECT 1", "useLegacySql": false }
      }),
    );
    assert!(matches!(both, Err(OperationError::InvalidSpec(_))));
  }

  #[test]
  fn test_create_view_kind_requires_view() {
    let op = parse(
      OperationKind::CreateView,
      json!({
        "dataset_id": "staging",
        "table_id": "test_view",
        "view": { "query": "SELECT * FROM `analytics-dev.staging.test_table`", "useLegacySql": false }
      }),
    )
    .unwrap();
    assert!(matches!(op, Operation::CreateTable { ref table } if table.table_type == TableType::View));

    let wrong = parse(
      OperationKind::CreateView,
      json!({
        "dataset_id": "staging",
        "table_id": "v",
        "schema_fields": [{ "name": "a", "type": "STRING" }]
      }),
    );
    assert!(wrong.is_err());
  }

  #[test]
  fn test_materialized_view_defaults() {
    let op = parse(
      OperationKind::CreateTable,
      json!({
        "dataset_id": "staging",
        "table_id": "mv",
        "materialized_view": { "query": "SELECT SUM(salary) AS sum_salary FROM t" }
      }),
    )
    .unwrap();

    let Operation::CreateTable { table } = op else {
      panic!("expected create table");
    };
    let mv = table.materialized_view.unwrap();
    assert!(mv.enable_refresh);
    assert_eq!(mv.refresh_interval_ms, crate::resource::DEFAULT_REFRESH_INTERVAL_MS);
  }

  #[test]
  fn test_external_table_validation() {
    let resource = |uris: Value, format: &str| {
      json!({
        "table_resource": {
          "tableReference": { "projectId": PROJECT, "datasetId": "staging", "tableId": "external_table" },
          "schema": { "fields": [
            { "name": "name", "type": "STRING" },
            { "name": "post_abbr", "type": "STRING" }
          ] },
          "externalDataConfiguration": {
            "sourceFormat": format,
            "compression": "NONE",
            "sourceUris": uris
          }
        }
      })
    };

    let ok = parse(
      OperationKind::CreateExternalTable,
      resource(json!(["gs://bkt-data-dev/"]), "CSV"),
    )
    .unwrap();
    assert!(matches!(ok, Operation::CreateTable { ref table } if table.table_type == TableType::External));

    let empty = parse(OperationKind::CreateExternalTable, resource(json!([]), "CSV"));
    assert!(matches!(empty, Err(OperationError::InvalidSpec(_))));

    let unsupported = parse(
      OperationKind::CreateExternalTable,
      resource(json!(["gs://bkt/"]), "XML"),
    );
    assert!(matches!(unsupported, Err(OperationError::InvalidSpec(_))));
  }

  #[test]
  fn test_unknown_parameter_is_invalid() {
    let result = parse(
      OperationKind::GetDataset,
      json!({ "dataset_id": "staging", "location": "us-central1" }),
    );
    assert!(matches!(result, Err(OperationError::InvalidSpec(_))));
  }

  #[test]
  fn test_delete_table_parses_reference() {
    let op = parse(
      OperationKind::DeleteTable,
      json!({ "deletion_dataset_table": "analytics-dev.staging.test_table" }),
    )
    .unwrap();
    assert_eq!(op.target(), "analytics-dev.staging.test_table");
  }

  #[test]
  fn test_update_table_defaults_fields_to_resource_keys() {
    let op = parse(
      OperationKind::UpdateTable,
      json!({
        "dataset_id": "staging",
        "table_id": "t",
        "table_resource": { "description": "d" }
      }),
    )
    .unwrap();
    let Operation::UpdateTable { fields, .. } = op else {
      panic!("expected update table");
    };
    assert_eq!(fields, vec!["description".to_string()]);
  }
}
