use thiserror::Error;

/// Errors raised while parsing parameter values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamError {
  #[error("field path is empty")]
  EmptyFieldPath,

  #[error("field path '{0}' contains an empty segment")]
  EmptySegment(String),

  #[error("malformed reference: {0}")]
  MalformedReference(String),

  #[error("malformed template: expected a string, got {0}")]
  MalformedTemplate(String),
}
