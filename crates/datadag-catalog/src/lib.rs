//! Datadag Catalog
//!
//! The closed set of dataset, table and view operations datadag can run,
//! the [`Warehouse`] trait they run against, and [`MemoryWarehouse`], an
//! in-memory implementation that can persist itself to a JSON snapshot.
//!
//! Operations are parsed from an [`datadag_config::OperationKind`] plus
//! resolved JSON parameters into an [`Operation`], which validates everything
//! that does not need stored state, then dispatched:
//!
//! ```ignore
//! let op = Operation::parse(OperationKind::GetDataset, params, warehouse.default_project())?;
//! let result = op.dispatch(&warehouse).await?;
//! assert!(result.get("id").is_some());
//! ```

mod error;
mod memory;
mod operation;
mod resource;
mod warehouse;

pub use error::{ErrorKind, OperationError, SnapshotError};
pub use memory::{DatasetSnapshot, MemoryWarehouse, WarehouseSnapshot};
pub use operation::Operation;
pub use resource::{
  Compression, CsvOptions, DEFAULT_REFRESH_INTERVAL_MS, Dataset, DatasetReference,
  ExternalDataConfiguration, FieldDescriptor, FieldMode, FieldType, FieldUpdate,
  MaterializedViewDefinition, Schema, SourceFormat, Table, TableReference, TableType,
  ViewDefinition,
};
pub use warehouse::Warehouse;
