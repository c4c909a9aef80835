//! Parameter resolution against upstream results.
//!
//! Deferred parameters are resolved immediately before a task is dispatched:
//!
//! - `{"$ref": {"task": "create", "field": "datasetReference.datasetId"}}`
//!   reads a field of an upstream result, keeping its JSON type.
//! - `{"$template": "{{ create.tableReference.tableId }}_copy"}` renders a
//!   minijinja template whose context is the task's direct upstream results,
//!   keyed by task name. The same results are also reachable as
//!   `upstream["task-name"]`, for names that are not identifiers. Undefined
//!   variables are errors.
//!
//! Literals pass through unchanged.

use std::collections::HashMap;

use datadag_config::{ParamValue, TaskRef};
use datadag_workflow::Task;
use minijinja::{Environment, UndefinedBehavior};
use serde_json::{Map, Value};

use crate::error::RuntimeError;
use crate::result::ExecutionResult;

/// Template variable holding every upstream result by name.
const UPSTREAM_KEY: &str = "upstream";

/// Resolve every parameter of `task` to plain JSON.
pub fn resolve_params(
  task: &Task,
  results: &HashMap<String, ExecutionResult>,
) -> Result<Map<String, Value>, RuntimeError> {
  let resolver = Resolver::new(task, results);
  task
    .operation
    .params()
    .iter()
    .map(|(name, value)| resolver.resolve(value).map(|v| (name.clone(), v)))
    .collect()
}

struct Resolver<'a> {
  task: &'a Task,
  results: &'a HashMap<String, ExecutionResult>,
  env: Environment<'static>,
  context: minijinja::Value,
}

impl<'a> Resolver<'a> {
  fn new(task: &'a Task, results: &'a HashMap<String, ExecutionResult>) -> Self {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);

    let upstream: Map<String, Value> = task
      .upstream
      .iter()
      .filter_map(|name| results.get(name).map(|r| (name.clone(), r.output.clone())))
      .collect();
    let mut context = upstream.clone();
    // A task literally named `upstream` keeps its own key.
    context
      .entry(UPSTREAM_KEY)
      .or_insert(Value::Object(upstream));

    Self {
      task,
      results,
      env,
      context: minijinja::Value::from_serialize(&context),
    }
  }

  fn resolve(&self, value: &ParamValue) -> Result<Value, RuntimeError> {
    match value {
      ParamValue::Literal(v) => Ok(v.clone()),
      ParamValue::List(items) => items
        .iter()
        .map(|item| self.resolve(item))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array),
      ParamValue::Map(map) => map
        .iter()
        .map(|(k, v)| self.resolve(v).map(|v| (k.clone(), v)))
        .collect::<Result<Map<_, _>, _>>()
        .map(Value::Object),
      ParamValue::Reference(reference) => self.lookup(reference),
      ParamValue::Template(source) => self.render(source),
    }
  }

  fn lookup(&self, reference: &TaskRef) -> Result<Value, RuntimeError> {
    let result =
      self
        .results
        .get(&reference.task)
        .ok_or_else(|| RuntimeError::NotYetExecuted {
          task: self.task.name.clone(),
          upstream: reference.task.clone(),
          reference: reference.to_string(),
        })?;

    result
      .field(&reference.field)
      .cloned()
      .ok_or_else(|| RuntimeError::MissingField {
        task: self.task.name.clone(),
        reference: reference.to_string(),
      })
  }

  fn render(&self, source: &str) -> Result<Value, RuntimeError> {
    self
      .env
      .render_str(source, self.context.clone())
      .map(Value::String)
      .map_err(|e| RuntimeError::InputResolution {
        task: self.task.name.clone(),
        template: source.to_string(),
        source: e,
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use datadag_config::{OperationKind, OperationSpec};
  use serde_json::json;

  fn task(spec: OperationSpec, upstream: &[&str]) -> Task {
    Task {
      name: "consumer".to_string(),
      operation: spec,
      upstream: upstream.iter().map(|s| s.to_string()).collect(),
    }
  }

  fn results(entries: &[(&str, Value)]) -> HashMap<String, ExecutionResult> {
    entries
      .iter()
      .map(|(name, output)| (name.to_string(), ExecutionResult::new(*name, output.clone())))
      .collect()
  }

  #[test]
  fn test_literals_pass_through() {
    let spec = OperationSpec::new(OperationKind::DeleteDataset)
      .with_param("dataset_id", "d")
      .with_param("delete_contents", true);

    let resolved = resolve_params(&task(spec, &[]), &HashMap::new()).unwrap();

    assert_eq!(Value::Object(resolved), json!({ "dataset_id": "d", "delete_contents": true }));
  }

  #[test]
  fn test_reference_keeps_json_type() {
    let spec = OperationSpec::new(OperationKind::UpdateDataset)
      .with_param("dataset_id", ParamValue::reference("create", "datasetReference.datasetId").unwrap())
      .with_param(
        "dataset_resource",
        ParamValue::Map(
          [(
            "labels".to_string(),
            ParamValue::reference("create", "labels").unwrap(),
          )]
          .into(),
        ),
      );
    let upstream = results(&[(
      "create",
      json!({
        "datasetReference": { "projectId": "p", "datasetId": "sales" },
        "labels": { "team": "data" }
      }),
    )]);

    let resolved = resolve_params(&task(spec, &["create"]), &upstream).unwrap();

    assert_eq!(resolved["dataset_id"], "sales");
    assert_eq!(resolved["dataset_resource"], json!({ "labels": { "team": "data" } }));
  }

  #[test]
  fn test_template_indexes_lists() {
    let spec = OperationSpec::new(OperationKind::DeleteTable).with_param(
      "deletion_dataset_table",
      ParamValue::template(
        "{{ list.tables[0].datasetId }}.{{ list.tables[0].tableId }}",
      ),
    );
    let upstream = results(&[(
      "list",
      json!({ "tables": [{ "projectId": "p", "datasetId": "d", "tableId": "t" }] }),
    )]);

    let resolved = resolve_params(&task(spec, &["list"]), &upstream).unwrap();

    assert_eq!(resolved["deletion_dataset_table"], "d.t");
  }

  #[test]
  fn test_missing_field() {
    let spec = OperationSpec::new(OperationKind::GetDataset)
      .with_param("dataset_id", ParamValue::reference("create", "nope").unwrap());
    let upstream = results(&[("create", json!({ "id": "p:d" }))]);

    let err = resolve_params(&task(spec, &["create"]), &upstream).unwrap_err();

    assert!(matches!(
      err,
      RuntimeError::MissingField { ref task, ref reference }
        if task == "consumer" && reference == "create.nope"
    ));
  }

  #[test]
  fn test_not_yet_executed() {
    let spec = OperationSpec::new(OperationKind::GetDataset)
      .with_param("dataset_id", ParamValue::reference("create", "id").unwrap());

    let err = resolve_params(&task(spec, &["create"]), &HashMap::new()).unwrap_err();

    assert!(matches!(err, RuntimeError::NotYetExecuted { ref upstream, .. } if upstream == "create"));
  }

  #[test]
  fn test_template_with_filter() {
    let spec = OperationSpec::new(OperationKind::CreateDataset).with_param(
      "dataset_id",
      ParamValue::template("{{ source.datasetReference.datasetId | lower }}_archive"),
    );
    let upstream = results(&[(
      "source",
      json!({ "datasetReference": { "projectId": "p", "datasetId": "Sales" } }),
    )]);

    let resolved = resolve_params(&task(spec, &["source"]), &upstream).unwrap();

    assert_eq!(resolved["dataset_id"], "sales_archive");
  }

  #[test]
  fn test_template_undefined_is_an_error() {
    let spec = OperationSpec::new(OperationKind::CreateDataset)
      .with_param("dataset_id", ParamValue::template("{{ source.missing }}"));
    let upstream = results(&[("source", json!({ "id": "p:d" }))]);

    let err = resolve_params(&task(spec, &["source"]), &upstream).unwrap_err();

    assert!(matches!(err, RuntimeError::InputResolution { .. }));
  }

  #[test]
  fn test_template_reaches_hyphenated_task_names() {
    let spec = OperationSpec::new(OperationKind::CreateDataset).with_param(
      "dataset_id",
      ParamValue::template("{{ upstream[\"get-dataset\"].datasetReference.datasetId }}_copy"),
    );
    let upstream = results(&[(
      "get-dataset",
      json!({ "datasetReference": { "projectId": "p", "datasetId": "staging" } }),
    )]);

    let resolved = resolve_params(&task(spec, &["get-dataset"]), &upstream).unwrap();

    assert_eq!(resolved["dataset_id"], "staging_copy");
  }

  #[test]
  fn test_render_error_is_chained() {
    use std::error::Error;

    let spec = OperationSpec::new(OperationKind::CreateDataset)
      .with_param("dataset_id", ParamValue::template("{{ nothing.here }}"));

    let err = resolve_params(&task(spec, &[]), &HashMap::new()).unwrap_err();

    let RuntimeError::InputResolution { ref template, .. } = err else {
      panic!("expected an input resolution error, got {err:?}");
    };
    assert_eq!(template, "{{ nothing.here }}");
    assert!(err.source().is_some());
  }

  #[test]
  fn test_template_only_sees_direct_upstream() {
    let spec = OperationSpec::new(OperationKind::CreateDataset)
      .with_param("dataset_id", ParamValue::template("{{ other.id }}"));
    let upstream = results(&[("other", json!({ "id": "p:d" }))]);

    let err = resolve_params(&task(spec, &[]), &upstream).unwrap_err();

    assert!(matches!(err, RuntimeError::InputResolution { .. }));
  }
}
