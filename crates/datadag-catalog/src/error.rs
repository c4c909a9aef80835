use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by warehouse operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
  #[error("already exists: {0}")]
  AlreadyExists(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("not empty: {0}")]
  NotEmpty(String),

  #[error("invalid operation spec: {0}")]
  InvalidSpec(String),
}

impl OperationError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      OperationError::AlreadyExists(_) => ErrorKind::AlreadyExists,
      OperationError::NotFound(_) => ErrorKind::NotFound,
      OperationError::NotEmpty(_) => ErrorKind::NotEmpty,
      OperationError::InvalidSpec(_) => ErrorKind::InvalidSpec,
    }
  }

  pub(crate) fn invalid(message: impl Into<String>) -> Self {
    OperationError::InvalidSpec(message.into())
  }
}

/// Classification of an [`OperationError`], as reported in run summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  AlreadyExists,
  NotFound,
  NotEmpty,
  InvalidSpec,
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      ErrorKind::AlreadyExists => "AlreadyExists",
      ErrorKind::NotFound => "NotFound",
      ErrorKind::NotEmpty => "NotEmpty",
      ErrorKind::InvalidSpec => "InvalidSpec",
    };
    f.write_str(name)
  }
}

/// Errors reading or writing a warehouse snapshot file.
#[derive(Debug, Error)]
pub enum SnapshotError {
  #[error("snapshot io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("malformed snapshot: {0}")]
  Json(#[from] serde_json::Error),
}
