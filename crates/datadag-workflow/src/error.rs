use thiserror::Error;

/// Structural errors found while building a task graph.
///
/// Any of these aborts construction; no partially built graph is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
  #[error("duplicate task name: {0}")]
  DuplicateTaskName(String),

  #[error("unknown task: {0}")]
  UnknownTask(String),

  #[error("cycle detected: {}", .path.join(" -> "))]
  CycleDetected { path: Vec<String> },

  #[error("task '{task}' references unknown task '{reference}'")]
  DanglingReference { task: String, reference: String },
}
