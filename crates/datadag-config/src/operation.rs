use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::param::{ParamValue, TaskRef};

/// The closed set of warehouse operations a task can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
  CreateDataset,
  GetDataset,
  UpdateDataset,
  DeleteDataset,
  CreateTable,
  CreateView,
  CreateMaterializedView,
  CreateExternalTable,
  UpsertTable,
  UpdateTableSchema,
  UpdateTable,
  DeleteTable,
  GetDatasetTables,
}

impl OperationKind {
  pub const ALL: [OperationKind; 13] = [
    OperationKind::CreateDataset,
    OperationKind::GetDataset,
    OperationKind::UpdateDataset,
    OperationKind::DeleteDataset,
    OperationKind::CreateTable,
    OperationKind::CreateView,
    OperationKind::CreateMaterializedView,
    OperationKind::CreateExternalTable,
    OperationKind::UpsertTable,
    OperationKind::UpdateTableSchema,
    OperationKind::UpdateTable,
    OperationKind::DeleteTable,
    OperationKind::GetDatasetTables,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      OperationKind::CreateDataset => "create_dataset",
      OperationKind::GetDataset => "get_dataset",
      OperationKind::UpdateDataset => "update_dataset",
      OperationKind::DeleteDataset => "delete_dataset",
      OperationKind::CreateTable => "create_table",
      OperationKind::CreateView => "create_view",
      OperationKind::CreateMaterializedView => "create_materialized_view",
      OperationKind::CreateExternalTable => "create_external_table",
      OperationKind::UpsertTable => "upsert_table",
      OperationKind::UpdateTableSchema => "update_table_schema",
      OperationKind::UpdateTable => "update_table",
      OperationKind::DeleteTable => "delete_table",
      OperationKind::GetDatasetTables => "get_dataset_tables",
    }
  }
}

impl fmt::Display for OperationKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// An operation kind with its bound parameters.
///
/// Specs are immutable once built; the `with_param` builder consumes `self`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSpec {
  operation: OperationKind,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  params: BTreeMap<String, ParamValue>,
}

impl OperationSpec {
  pub fn new(operation: OperationKind) -> Self {
    Self {
      operation,
      params: BTreeMap::new(),
    }
  }

  pub fn with_param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
    self.params.insert(name.into(), value.into());
    self
  }

  pub fn kind(&self) -> OperationKind {
    self.operation
  }

  pub fn params(&self) -> &BTreeMap<String, ParamValue> {
    &self.params
  }

  pub fn param(&self, name: &str) -> Option<&ParamValue> {
    self.params.get(name)
  }

  /// Every task reference used anywhere in the parameters.
  pub fn references(&self) -> Vec<&TaskRef> {
    self.params.values().flat_map(ParamValue::references).collect()
  }

  pub fn is_deferred(&self) -> bool {
    self.params.values().any(ParamValue::is_deferred)
  }

  /// The parameters as plain JSON, if none of them are deferred.
  pub fn literal_params(&self) -> Option<serde_json::Map<String, serde_json::Value>> {
    self
      .params
      .iter()
      .map(|(k, v)| v.to_literal().map(|v| (k.clone(), v)))
      .collect()
  }
}
