//! Runtime error types.
//!
//! Operation failures are not errors at this level: they mark the task failed
//! in the [`RunReport`](crate::RunReport). These variants abort a run.

/// Errors that abort an execution.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
  /// A reference names a field the upstream result does not have.
  #[error("task '{task}' references missing field '{reference}'")]
  MissingField { task: String, reference: String },

  /// A reference was resolved before its upstream produced a result.
  #[error("task '{task}' references '{reference}' before '{upstream}' executed")]
  NotYetExecuted {
    task: String,
    upstream: String,
    reference: String,
  },

  /// Template rendering failed.
  #[error("input resolution failed for task '{task}': cannot render '{template}'")]
  InputResolution {
    task: String,
    template: String,
    #[source]
    source: minijinja::Error,
  },

  #[error("task '{0}' not found in graph")]
  UnknownTask(String),

  /// A spawned task panicked or was aborted.
  #[error("task join error: {0}")]
  Join(#[from] tokio::task::JoinError),
}
