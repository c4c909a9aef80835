//! Datadag Config
//!
//! This crate contains the serializable pipeline definition types for datadag.
//! These types describe a pipeline before it is built into a validated task
//! graph and executed against a warehouse.
//!
//! Definitions can be loaded from JSON files (via the CLI) or constructed in
//! code through the [`OperationSpec`] builder methods.
//!
//! # Example
//!
//! ```json
//! {
//!   "name": "dataset_lifecycle",
//!   "project_id": "analytics-dev",
//!   "tasks": [
//!     { "name": "create_dataset", "operation": "create_dataset",
//!       "params": { "dataset_id": "staging" } },
//!     { "name": "get_dataset", "operation": "get_dataset",
//!       "params": { "dataset_id": "staging" }, "depends_on": ["create_dataset"] },
//!     { "name": "describe", "operation": "update_dataset",
//!       "params": {
//!         "dataset_id": "staging",
//!         "dataset_resource": { "description": { "$template": "copy of {{ get_dataset.id }}" } }
//!       },
//!       "depends_on": ["get_dataset"] }
//!   ]
//! }
//! ```

mod error;
mod operation;
mod param;
mod pipeline;

pub use error::ParamError;
pub use operation::{OperationKind, OperationSpec};
pub use param::{FieldPath, ParamValue, TaskRef};
pub use pipeline::{PipelineDef, TaskDef};
