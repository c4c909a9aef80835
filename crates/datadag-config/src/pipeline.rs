use serde::{Deserialize, Serialize};

use crate::operation::OperationSpec;

/// A task as written in a pipeline definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDef {
  pub name: String,
  #[serde(flatten)]
  pub operation: OperationSpec,
  /// Tasks that must succeed before this one runs.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub depends_on: Vec<String>,
}

/// A complete pipeline definition, as loaded from a JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDef {
  pub name: String,
  /// Default project for identifiers that omit one.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub project_id: Option<String>,
  /// Default location for datasets created without one.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub location: Option<String>,
  pub tasks: Vec<TaskDef>,
  /// Linear wiring, `["a", "b", "c"]` meaning `a -> b -> c`.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub chains: Vec<Vec<String>>,
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::OperationKind;
  use serde_json::json;

  #[test]
  fn test_parse_pipeline() {
    let def: PipelineDef = serde_json::from_value(json!({
      "name": "lifecycle",
      "project_id": "analytics-dev",
      "tasks": [
        { "name": "create", "operation": "create_dataset", "params": { "dataset_id": "d" } },
        { "name": "get", "operation": "get_dataset", "params": { "dataset_id": "d" } },
        { "name": "drop", "operation": "delete_dataset",
          "params": { "dataset_id": "d", "delete_contents": true },
          "depends_on": ["get"] }
      ],
      "chains": [["create", "get"]]
    }))
    .unwrap();

    assert_eq!(def.tasks.len(), 3);
    assert_eq!(def.tasks[2].operation.kind(), OperationKind::DeleteDataset);
    assert_eq!(def.tasks[2].depends_on, vec!["get".to_string()]);
    assert_eq!(def.chains, vec![vec!["create".to_string(), "get".to_string()]]);
    assert_eq!(def.location, None);
  }

  #[test]
  fn test_unknown_operation_is_rejected() {
    let result = serde_json::from_value::<PipelineDef>(json!({
      "name": "bad",
      "tasks": [{ "name": "x", "operation": "truncate_table" }]
    }));
    assert!(result.is_err());
  }
}
