use std::collections::BTreeSet;

use datadag_config::{OperationSpec, TaskRef};
use serde::Serialize;

/// A named operation instance inside a built [`TaskGraph`](crate::TaskGraph).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
  pub name: String,
  pub operation: OperationSpec,
  /// Direct upstream tasks, explicit and implied by references.
  pub upstream: BTreeSet<String>,
}

impl Task {
  /// Deferred references this task resolves before dispatch.
  pub fn references(&self) -> Vec<&TaskRef> {
    self.operation.references()
  }

  pub fn is_entry_point(&self) -> bool {
    self.upstream.is_empty()
  }
}
