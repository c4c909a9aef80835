//! In-memory warehouse.
//!
//! Datasets are keyed by `(project, dataset)`; tables are kept per dataset in
//! table-id order. Every call takes the state lock once, so each operation is
//! applied atomically.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{OperationError, SnapshotError};
use crate::resource::{Dataset, DatasetReference, FieldUpdate, Table, TableReference};
use crate::warehouse::Warehouse;

#[derive(Debug, Clone, PartialEq)]
struct DatasetEntry {
  dataset: Dataset,
  tables: BTreeMap<String, Table>,
}

/// Serializable copy of a [`MemoryWarehouse`]'s contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WarehouseSnapshot {
  #[serde(default)]
  pub datasets: Vec<DatasetSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSnapshot {
  pub dataset: Dataset,
  #[serde(default)]
  pub tables: Vec<Table>,
}

/// A [`Warehouse`] held entirely in memory.
pub struct MemoryWarehouse {
  default_project: String,
  default_location: Option<String>,
  datasets: RwLock<BTreeMap<DatasetReference, DatasetEntry>>,
}

impl MemoryWarehouse {
  pub fn new(default_project: impl Into<String>) -> Self {
    Self {
      default_project: default_project.into(),
      default_location: None,
      datasets: RwLock::new(BTreeMap::new()),
    }
  }

  /// Location assigned to datasets created without one.
  pub fn with_location(mut self, location: impl Into<String>) -> Self {
    self.default_location = Some(location.into());
    self
  }

  pub fn from_snapshot(default_project: impl Into<String>, snapshot: WarehouseSnapshot) -> Self {
    let datasets = snapshot
      .datasets
      .into_iter()
      .map(|entry| {
        let tables = entry
          .tables
          .into_iter()
          .map(|t| (t.table_reference.table_id.clone(), t))
          .collect();
        (
          entry.dataset.dataset_reference.clone(),
          DatasetEntry {
            dataset: entry.dataset,
            tables,
          },
        )
      })
      .collect();

    Self {
      default_project: default_project.into(),
      default_location: None,
      datasets: RwLock::new(datasets),
    }
  }

  pub async fn snapshot(&self) -> WarehouseSnapshot {
    let datasets = self.datasets.read().await;
    WarehouseSnapshot {
      datasets: datasets
        .values()
        .map(|entry| DatasetSnapshot {
          dataset: entry.dataset.clone(),
          tables: entry.tables.values().cloned().collect(),
        })
        .collect(),
    }
  }

  /// Load a snapshot file, or start empty if it does not exist.
  pub async fn load(
    default_project: impl Into<String>,
    path: impl AsRef<Path>,
  ) -> Result<Self, SnapshotError> {
    let path = path.as_ref();
    let snapshot = match tokio::fs::read_to_string(path).await {
      Ok(content) => serde_json::from_str(&content)?,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => WarehouseSnapshot::default(),
      Err(e) => return Err(e.into()),
    };
    debug!(path = %path.display(), datasets = snapshot.datasets.len(), "snapshot_loaded");
    Ok(Self::from_snapshot(default_project, snapshot))
  }

  pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }
    let snapshot = self.snapshot().await;
    tokio::fs::write(path, serde_json::to_vec_pretty(&snapshot)?).await?;
    debug!(path = %path.display(), "snapshot_saved");
    Ok(())
  }
}

fn missing_dataset(dataset: &DatasetReference) -> OperationError {
  OperationError::NotFound(format!("dataset {}", dataset))
}

fn missing_table(table: &TableReference) -> OperationError {
  OperationError::NotFound(format!("table {}", table))
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
  fn default_project(&self) -> &str {
    &self.default_project
  }

  async fn create_dataset(
    &self,
    dataset: &DatasetReference,
    resource: &Map<String, Value>,
    exists_ok: bool,
  ) -> Result<Dataset, OperationError> {
    let mut datasets = self.datasets.write().await;
    if let Some(existing) = datasets.get(dataset) {
      if exists_ok {
        return Ok(existing.dataset.clone());
      }
      return Err(OperationError::AlreadyExists(format!("dataset {}", dataset)));
    }

    let mut created = Dataset::new(dataset.clone()).patched(resource)?;
    if created.location.is_none() {
      created.location = self.default_location.clone();
    }
    datasets.insert(
      dataset.clone(),
      DatasetEntry {
        dataset: created.clone(),
        tables: BTreeMap::new(),
      },
    );
    Ok(created)
  }

  async fn get_dataset(&self, dataset: &DatasetReference) -> Result<Dataset, OperationError> {
    let datasets = self.datasets.read().await;
    datasets
      .get(dataset)
      .map(|entry| entry.dataset.clone())
      .ok_or_else(|| missing_dataset(dataset))
  }

  async fn update_dataset(
    &self,
    dataset: &DatasetReference,
    patch: &Map<String, Value>,
  ) -> Result<Dataset, OperationError> {
    let mut datasets = self.datasets.write().await;
    let entry = datasets
      .get_mut(dataset)
      .ok_or_else(|| missing_dataset(dataset))?;
    entry.dataset = entry.dataset.patched(patch)?;
    Ok(entry.dataset.clone())
  }

  async fn delete_dataset(
    &self,
    dataset: &DatasetReference,
    delete_contents: bool,
  ) -> Result<(), OperationError> {
    let mut datasets = self.datasets.write().await;
    let entry = datasets.get(dataset).ok_or_else(|| missing_dataset(dataset))?;
    if !delete_contents && !entry.tables.is_empty() {
      return Err(OperationError::NotEmpty(format!(
        "dataset {} still contains {} table(s)",
        dataset,
        entry.tables.len()
      )));
    }
    datasets.remove(dataset);
    Ok(())
  }

  async fn create_table(&self, table: Table) -> Result<Table, OperationError> {
    let reference = table.table_reference.clone();
    let mut datasets = self.datasets.write().await;
    let entry = datasets
      .get_mut(&reference.dataset())
      .ok_or_else(|| missing_dataset(&reference.dataset()))?;
    if entry.tables.contains_key(&reference.table_id) {
      return Err(OperationError::AlreadyExists(format!("table {}", reference)));
    }
    entry.tables.insert(reference.table_id, table.clone());
    Ok(table)
  }

  async fn upsert_table(
    &self,
    dataset: &DatasetReference,
    resource: &Map<String, Value>,
  ) -> Result<Table, OperationError> {
    let candidate = Table::from_resource(dataset, resource)?;
    let reference = candidate.table_reference.clone();

    let mut datasets = self.datasets.write().await;
    let entry = datasets
      .get_mut(&reference.dataset())
      .ok_or_else(|| missing_dataset(&reference.dataset()))?;
    let table = match entry.tables.get(&reference.table_id) {
      Some(existing) => existing.upserted(resource)?,
      None => candidate,
    };
    entry.tables.insert(reference.table_id, table.clone());
    Ok(table)
  }

  async fn update_table_schema(
    &self,
    table: &TableReference,
    updates: &[FieldUpdate],
  ) -> Result<Table, OperationError> {
    let mut datasets = self.datasets.write().await;
    let stored = datasets
      .get_mut(&table.dataset())
      .and_then(|entry| entry.tables.get_mut(&table.table_id))
      .ok_or_else(|| missing_table(table))?;

    // Views and schema-less tables have no columns to update.
    let Some(mut schema) = stored.schema.clone() else {
      return match updates.first() {
        Some(update) => Err(OperationError::NotFound(format!(
          "field '{}' in table {} without a schema",
          update.name, table
        ))),
        None => Ok(stored.clone()),
      };
    };
    schema.apply_updates(updates)?;
    stored.schema = Some(schema);
    Ok(stored.clone())
  }

  async fn update_table(
    &self,
    table: &TableReference,
    fields: &[String],
    resource: &Map<String, Value>,
  ) -> Result<Table, OperationError> {
    let mut datasets = self.datasets.write().await;
    let stored = datasets
      .get_mut(&table.dataset())
      .and_then(|entry| entry.tables.get_mut(&table.table_id))
      .ok_or_else(|| missing_table(table))?;
    *stored = stored.with_fields(fields, resource)?;
    Ok(stored.clone())
  }

  async fn delete_table(
    &self,
    table: &TableReference,
    ignore_if_missing: bool,
  ) -> Result<bool, OperationError> {
    let mut datasets = self.datasets.write().await;
    let removed = datasets
      .get_mut(&table.dataset())
      .and_then(|entry| entry.tables.remove(&table.table_id))
      .is_some();
    if !removed && !ignore_if_missing {
      return Err(missing_table(table));
    }
    Ok(removed)
  }

  async fn list_tables(
    &self,
    dataset: &DatasetReference,
  ) -> Result<Vec<TableReference>, OperationError> {
    let datasets = self.datasets.read().await;
    let entry = datasets.get(dataset).ok_or_else(|| missing_dataset(dataset))?;
    Ok(
      entry
        .tables
        .values()
        .map(|t| t.table_reference.clone())
        .collect(),
    )
  }
}
