//! Execution result types.

use std::collections::BTreeMap;

use datadag_catalog::{ErrorKind, OperationError};
use datadag_config::FieldPath;
use serde::{Deserialize, Serialize};

/// The output of one successfully executed task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
  pub task: String,
  pub output: serde_json::Value,
}

impl ExecutionResult {
  pub fn new(task: impl Into<String>, output: serde_json::Value) -> Self {
    Self {
      task: task.into(),
      output,
    }
  }

  /// Read a field of the output.
  pub fn field(&self, path: &FieldPath) -> Option<&serde_json::Value> {
    path.lookup(&self.output)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
  Pending,
  Running,
  Succeeded,
  Failed,
  /// An upstream task failed, was skipped, or was cancelled.
  UpstreamFailed,
  Cancelled,
}

/// Why a task failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
  pub task: String,
  pub kind: ErrorKind,
  pub message: String,
}

impl TaskFailure {
  pub fn new(task: impl Into<String>, error: &OperationError) -> Self {
    Self {
      task: task.into(),
      kind: error.kind(),
      message: error.to_string(),
    }
  }
}

/// Outcome of a single task run in isolation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
  Succeeded(ExecutionResult),
  Failed(TaskFailure),
}

/// Result of a complete graph invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
  /// Unique execution ID.
  pub execution_id: String,
  pub pipeline: String,
  /// Final status of every task.
  pub statuses: BTreeMap<String, TaskStatus>,
  /// Results of all succeeded tasks, keyed by task name.
  pub results: BTreeMap<String, ExecutionResult>,
  /// The first task that failed, if any.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub first_failure: Option<TaskFailure>,
  /// Tasks not executed because an upstream failed, in topological order.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub skipped: Vec<String>,
  /// Whether the run was cancelled before every task started.
  #[serde(default)]
  pub cancelled: bool,
}

impl RunReport {
  pub fn is_success(&self) -> bool {
    self
      .statuses
      .values()
      .all(|status| *status == TaskStatus::Succeeded)
  }

  pub fn status(&self, task: &str) -> Option<TaskStatus> {
    self.statuses.get(task).copied()
  }

  pub fn result(&self, task: &str) -> Option<&ExecutionResult> {
    self.results.get(task)
  }
}
