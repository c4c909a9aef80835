//! Graph runtime.
//!
//! The [`Runtime`] owns a built [`TaskGraph`] and a [`Warehouse`] handle and
//! provides `invoke(cancel)` to execute the whole graph.

use std::collections::HashMap;
use std::sync::Arc;

use datadag_catalog::{Operation, OperationError, Warehouse};
use datadag_config::OperationKind;
use datadag_workflow::TaskGraph;
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::RuntimeError;
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::input::resolve_params;
use crate::result::{ExecutionResult, RunReport, TaskFailure, TaskOutcome, TaskStatus};

/// Handle for a spawned operation.
type TaskHandle = tokio::task::JoinHandle<(String, Result<Value, OperationError>)>;

/// Configuration for the runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
  /// Upper bound on operations in flight at once. `1` runs tasks one at a
  /// time in topological order.
  pub max_concurrency: usize,
}

impl Default for RuntimeConfig {
  fn default() -> Self {
    Self { max_concurrency: 4 }
  }
}

/// Mutable bookkeeping for one run.
struct RunState {
  statuses: HashMap<String, TaskStatus>,
  results: HashMap<String, ExecutionResult>,
  first_failure: Option<TaskFailure>,
  cancelled: bool,
}

impl RunState {
  fn new(graph: &TaskGraph) -> Self {
    Self {
      statuses: graph
        .topological_order()
        .iter()
        .map(|name| (name.clone(), TaskStatus::Pending))
        .collect(),
      results: HashMap::new(),
      first_failure: None,
      cancelled: false,
    }
  }

  fn is_pending(&self, task: &str) -> bool {
    self.statuses.get(task) == Some(&TaskStatus::Pending)
  }

  fn into_report(self, execution_id: String, graph: &TaskGraph) -> RunReport {
    let skipped = graph
      .topological_order()
      .iter()
      .filter(|name| self.statuses.get(*name) == Some(&TaskStatus::UpstreamFailed))
      .cloned()
      .collect();

    RunReport {
      execution_id,
      pipeline: graph.name().to_string(),
      statuses: self.statuses.into_iter().collect(),
      results: self.results.into_iter().collect(),
      first_failure: self.first_failure,
      skipped,
      cancelled: self.cancelled,
    }
  }
}

/// The graph runtime.
///
/// Handles scheduling, result propagation and dispatch of operations to the
/// warehouse. Generic over `N: ExecutionNotifier`; use `Runtime::new` for
/// no-op notifications or `Runtime::with_notifier` to observe events.
pub struct Runtime<N: ExecutionNotifier = NoopNotifier> {
  graph: TaskGraph,
  warehouse: Arc<dyn Warehouse>,
  config: RuntimeConfig,
  notifier: N,
}

impl Runtime<NoopNotifier> {
  pub fn new(graph: TaskGraph, warehouse: Arc<dyn Warehouse>, config: RuntimeConfig) -> Self {
    Self::with_notifier(graph, warehouse, config, NoopNotifier)
  }
}

impl<N: ExecutionNotifier> Runtime<N> {
  pub fn with_notifier(
    graph: TaskGraph,
    warehouse: Arc<dyn Warehouse>,
    config: RuntimeConfig,
    notifier: N,
  ) -> Self {
    Self {
      graph,
      warehouse,
      config,
      notifier,
    }
  }

  pub fn graph(&self) -> &TaskGraph {
    &self.graph
  }

  /// Execute the whole graph.
  ///
  /// Operation failures do not abort the run: the task is marked failed, its
  /// descendants `upstream_failed`, and unrelated branches keep going.
  /// Cancellation is observed between dispatch rounds; operations already in
  /// flight finish and are recorded. Unresolvable references abort the run
  /// with an error.
  #[instrument(
    name = "runtime_invoke",
    skip(self, cancel),
    fields(pipeline = %self.graph.name())
  )]
  pub async fn invoke(&self, cancel: CancellationToken) -> Result<RunReport, RuntimeError> {
    let execution_id = uuid::Uuid::new_v4().to_string();

    info!(
      execution_id = %execution_id,
      pipeline = %self.graph.name(),
      tasks = self.graph.len(),
      "run_started"
    );
    self.notifier.notify(ExecutionEvent::RunStarted {
      execution_id: execution_id.clone(),
      pipeline: self.graph.name().to_string(),
    });

    let mut run = RunState::new(&self.graph);
    if let Err(e) = self
      .run_execution_loop(&mut run, &execution_id, &cancel)
      .await
    {
      error!(execution_id = %execution_id, error = %e, "run_aborted");
      self.notifier.notify(ExecutionEvent::RunAborted {
        execution_id,
        error: e.to_string(),
      });
      return Err(e);
    }

    let report = run.into_report(execution_id, &self.graph);
    let success = report.is_success();

    info!(
      execution_id = %report.execution_id,
      success,
      succeeded = report.results.len(),
      skipped = report.skipped.len(),
      cancelled = report.cancelled,
      "run_completed"
    );
    self.notifier.notify(ExecutionEvent::RunCompleted {
      execution_id: report.execution_id.clone(),
      success,
    });

    Ok(report)
  }

  /// Execute a single task in isolation.
  ///
  /// For debugging: `upstream` stands in for the results of the task's
  /// upstream tasks, keyed by task name.
  #[instrument(
    name = "runtime_invoke_task",
    skip(self, upstream),
    fields(pipeline = %self.graph.name(), task = %task_name)
  )]
  pub async fn invoke_task(
    &self,
    task_name: &str,
    upstream: HashMap<String, Value>,
  ) -> Result<TaskOutcome, RuntimeError> {
    let task = self
      .graph
      .get(task_name)
      .ok_or_else(|| RuntimeError::UnknownTask(task_name.to_string()))?;

    let results: HashMap<String, ExecutionResult> = upstream
      .into_iter()
      .map(|(name, output)| (name.clone(), ExecutionResult::new(name, output)))
      .collect();
    let params = resolve_params(task, &results)?;
    let kind = task.operation.kind();

    info!(task = %task_name, operation = %kind, "invoke_task_started");

    let outcome = match execute_operation(kind, params, self.warehouse.as_ref()).await {
      Ok(output) => {
        info!(task = %task_name, "invoke_task_completed");
        TaskOutcome::Succeeded(ExecutionResult::new(task_name, output))
      }
      Err(e) => {
        error!(task = %task_name, kind = %e.kind(), error = %e, "invoke_task_failed");
        TaskOutcome::Failed(TaskFailure::new(task_name, &e))
      }
    };

    Ok(outcome)
  }

  /// Run dispatch rounds until no task is ready.
  async fn run_execution_loop(
    &self,
    run: &mut RunState,
    execution_id: &str,
    cancel: &CancellationToken,
  ) -> Result<(), RuntimeError> {
    let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));

    loop {
      if cancel.is_cancelled() {
        self.cancel_pending(run, execution_id);
        return Ok(());
      }

      let ready = self.find_ready_tasks(run);
      if ready.is_empty() {
        break;
      }

      info!(
        execution_id = %execution_id,
        ready_tasks = ?ready,
        "executing batch of ready tasks"
      );

      let handles = self
        .execute_ready_tasks(&ready, run, execution_id, &semaphore)
        .await?;

      for result in futures::future::join_all(handles).await {
        let (task, outcome) = result?;
        self.record_outcome(run, execution_id, task, outcome);
      }
    }

    Ok(())
  }

  /// Pending tasks whose upstream tasks all succeeded, in topological order.
  fn find_ready_tasks(&self, run: &RunState) -> Vec<String> {
    self
      .graph
      .topological_order()
      .iter()
      .filter(|name| run.is_pending(name))
      .filter(|name| {
        self
          .graph
          .upstream(name)
          .iter()
          .all(|up| run.statuses.get(up) == Some(&TaskStatus::Succeeded))
      })
      .cloned()
      .collect()
  }

  /// Resolve parameters for every ready task, then spawn them.
  ///
  /// All inputs are resolved before anything is spawned, so an aborting
  /// resolution error never leaves operations running.
  async fn execute_ready_tasks(
    &self,
    ready: &[String],
    run: &mut RunState,
    execution_id: &str,
    semaphore: &Arc<Semaphore>,
  ) -> Result<Vec<TaskHandle>, RuntimeError> {
    let mut prepared = Vec::with_capacity(ready.len());
    for name in ready {
      let task = self
        .graph
        .get(name)
        .ok_or_else(|| RuntimeError::UnknownTask(name.clone()))?;
      let params = resolve_params(task, &run.results)?;
      prepared.push((task, params));
    }

    let mut handles = Vec::with_capacity(prepared.len());
    for (task, params) in prepared {
      // Taking the permit here keeps start order equal to topological order.
      let permit = semaphore.clone().acquire_owned().await.ok();
      let kind = task.operation.kind();

      run.statuses.insert(task.name.clone(), TaskStatus::Running);
      info!(
        execution_id = %execution_id,
        task = %task.name,
        operation = %kind,
        "task_started"
      );
      debug!(task = %task.name, params = ?params, "resolved parameters");
      self.notifier.notify(ExecutionEvent::TaskStarted {
        execution_id: execution_id.to_string(),
        task: task.name.clone(),
        operation: kind,
      });

      let name = task.name.clone();
      let warehouse = self.warehouse.clone();
      handles.push(tokio::spawn(async move {
        let _permit = permit;
        let outcome = execute_operation(kind, params, warehouse.as_ref()).await;
        (name, outcome)
      }));
    }

    Ok(handles)
  }

  fn record_outcome(
    &self,
    run: &mut RunState,
    execution_id: &str,
    task: String,
    outcome: Result<Value, OperationError>,
  ) {
    match outcome {
      Ok(output) => {
        info!(execution_id = %execution_id, task = %task, "task_succeeded");
        self.notifier.notify(ExecutionEvent::TaskSucceeded {
          execution_id: execution_id.to_string(),
          task: task.clone(),
          output: output.clone(),
        });
        run.statuses.insert(task.clone(), TaskStatus::Succeeded);
        run
          .results
          .insert(task.clone(), ExecutionResult::new(task, output));
      }
      Err(e) => {
        error!(
          execution_id = %execution_id,
          task = %task,
          kind = %e.kind(),
          error = %e,
          "task_failed"
        );
        self.notifier.notify(ExecutionEvent::TaskFailed {
          execution_id: execution_id.to_string(),
          task: task.clone(),
          kind: e.kind(),
          error: e.to_string(),
        });
        run.statuses.insert(task.clone(), TaskStatus::Failed);
        if run.first_failure.is_none() {
          run.first_failure = Some(TaskFailure::new(&task, &e));
        }

        let descendants = self.graph.descendants(&task);
        for name in self.graph.topological_order() {
          if descendants.contains(name) && run.is_pending(name) {
            self.skip(run, execution_id, name, TaskStatus::UpstreamFailed);
          }
        }
      }
    }
  }

  fn cancel_pending(&self, run: &mut RunState, execution_id: &str) {
    warn!(execution_id = %execution_id, "run cancelled");
    for name in self.graph.topological_order() {
      if run.is_pending(name) {
        run.cancelled = true;
        self.skip(run, execution_id, name, TaskStatus::Cancelled);
      }
    }
  }

  fn skip(&self, run: &mut RunState, execution_id: &str, task: &str, status: TaskStatus) {
    warn!(
      execution_id = %execution_id,
      task = %task,
      status = ?status,
      "task_skipped"
    );
    run.statuses.insert(task.to_string(), status);
    self.notifier.notify(ExecutionEvent::TaskSkipped {
      execution_id: execution_id.to_string(),
      task: task.to_string(),
      status,
    });
  }
}

/// Parse resolved parameters and dispatch the operation.
async fn execute_operation(
  kind: OperationKind,
  params: Map<String, Value>,
  warehouse: &dyn Warehouse,
) -> Result<Value, OperationError> {
  let operation = Operation::parse(kind, params, warehouse.default_project())?;
  debug!(operation = %kind, target = %operation.target(), "dispatching operation");
  operation.dispatch(warehouse).await
}
