use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::OperationError;
use crate::resource::{Dataset, DatasetReference, FieldUpdate, Table, TableReference};

/// The tabular-dataset store that operations run against.
///
/// Each method is one warehouse call; implementations must apply it
/// atomically. Parameter validation that does not need stored state happens
/// in [`crate::Operation`] before these are called.
#[async_trait]
pub trait Warehouse: Send + Sync {
  /// Project used for identifiers that do not name one.
  fn default_project(&self) -> &str;

  /// Create an empty dataset. With `exists_ok`, an existing dataset is
  /// returned unchanged instead of failing.
  async fn create_dataset(
    &self,
    dataset: &DatasetReference,
    resource: &Map<String, Value>,
    exists_ok: bool,
  ) -> Result<Dataset, OperationError>;

  async fn get_dataset(&self, dataset: &DatasetReference) -> Result<Dataset, OperationError>;

  async fn update_dataset(
    &self,
    dataset: &DatasetReference,
    patch: &Map<String, Value>,
  ) -> Result<Dataset, OperationError>;

  async fn delete_dataset(
    &self,
    dataset: &DatasetReference,
    delete_contents: bool,
  ) -> Result<(), OperationError>;

  /// Insert a fully validated table, view or external table.
  async fn create_table(&self, table: Table) -> Result<Table, OperationError>;

  async fn upsert_table(
    &self,
    dataset: &DatasetReference,
    resource: &Map<String, Value>,
  ) -> Result<Table, OperationError>;

  async fn update_table_schema(
    &self,
    table: &TableReference,
    updates: &[FieldUpdate],
  ) -> Result<Table, OperationError>;

  async fn update_table(
    &self,
    table: &TableReference,
    fields: &[String],
    resource: &Map<String, Value>,
  ) -> Result<Table, OperationError>;

  /// Delete a table, view, materialized view or external table. Returns
  /// whether anything was removed.
  async fn delete_table(
    &self,
    table: &TableReference,
    ignore_if_missing: bool,
  ) -> Result<bool, OperationError>;

  /// Tables of a dataset, ordered by table id.
  async fn list_tables(
    &self,
    dataset: &DatasetReference,
  ) -> Result<Vec<TableReference>, OperationError>;
}
