//! Execution events and notifiers.
//!
//! Events are emitted while a graph runs so consumers can follow progress
//! without parsing logs.

use datadag_catalog::ErrorKind;
use datadag_config::OperationKind;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::result::TaskStatus;

/// Events emitted during graph execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
  RunStarted {
    execution_id: String,
    pipeline: String,
  },

  TaskStarted {
    execution_id: String,
    task: String,
    operation: OperationKind,
  },

  TaskSucceeded {
    execution_id: String,
    task: String,
    output: serde_json::Value,
  },

  TaskFailed {
    execution_id: String,
    task: String,
    kind: ErrorKind,
    error: String,
  },

  /// A task will not run; `status` is `upstream_failed` or `cancelled`.
  TaskSkipped {
    execution_id: String,
    task: String,
    status: TaskStatus,
  },

  RunCompleted {
    execution_id: String,
    success: bool,
  },

  /// The run stopped on an invariant violation.
  RunAborted { execution_id: String, error: String },
}

/// Receives execution events.
///
/// The runtime calls `notify` for each event; implementations decide what to
/// do with them.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// Sends events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded so a slow consumer never stalls the run; volume is a handful of
  // events per task.
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // Receiver may have been dropped.
    let _ = self.sender.send(event);
  }
}
