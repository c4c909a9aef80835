use std::collections::HashMap;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use datadag_catalog::MemoryWarehouse;
use datadag_config::PipelineDef;
use datadag_runtime::{Runtime, RuntimeConfig, TaskOutcome};
use datadag_workflow::TaskGraph;

const DEFAULT_PROJECT: &str = "default";
const WAREHOUSE_FILE: &str = "warehouse.json";

/// datadag - declarative, dependency-ordered dataset pipelines
#[derive(Parser)]
#[command(name = "datadag")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.datadag)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Default project, overriding the pipeline's `project_id`
  #[arg(long, global = true)]
  project: Option<String>,

  /// Maximum number of operations in flight at once
  #[arg(long, global = true, default_value_t = RuntimeConfig::default().max_concurrency)]
  max_concurrency: usize,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Check a pipeline file and print its execution order
  Validate {
    /// Path to the pipeline file (JSON)
    pipeline_file: PathBuf,
  },

  /// Run an entire pipeline
  Run {
    /// Path to the pipeline file (JSON)
    pipeline_file: PathBuf,
  },

  /// Run a single task; upstream results are read as JSON from stdin
  Task {
    /// Path to the pipeline file (JSON)
    pipeline_file: PathBuf,

    /// The task to execute
    #[arg(long)]
    task: String,
  },

  /// Print the persisted warehouse
  Inspect,
}

fn main() -> Result<()> {
  init_tracing();
  let cli = Cli::parse();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".datadag"),
  };
  let options = Options {
    warehouse_path: data_dir.join(WAREHOUSE_FILE),
    project: cli.project,
    config: RuntimeConfig {
      max_concurrency: cli.max_concurrency,
    },
  };

  let Some(command) = cli.command else {
    println!("datadag - use --help to see available commands");
    return Ok(());
  };

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async {
    match command {
      Commands::Validate { pipeline_file } => validate(&pipeline_file).await,
      Commands::Run { pipeline_file } => run_pipeline(&pipeline_file, &options).await,
      Commands::Task {
        pipeline_file,
        task,
      } => run_task(&pipeline_file, &task, &options).await,
      Commands::Inspect => inspect(&options).await,
    }
  })
}

struct Options {
  warehouse_path: PathBuf,
  project: Option<String>,
  config: RuntimeConfig,
}

impl Options {
  fn project_for(&self, def: &PipelineDef) -> String {
    self
      .project
      .clone()
      .or_else(|| def.project_id.clone())
      .unwrap_or_else(|| DEFAULT_PROJECT.to_string())
  }

  async fn load_warehouse(&self, def: &PipelineDef) -> Result<Arc<MemoryWarehouse>> {
    let mut warehouse = MemoryWarehouse::load(self.project_for(def), &self.warehouse_path)
      .await
      .with_context(|| {
        format!(
          "failed to load warehouse: {}",
          self.warehouse_path.display()
        )
      })?;
    if let Some(location) = &def.location {
      warehouse = warehouse.with_location(location);
    }
    Ok(Arc::new(warehouse))
  }

  async fn save_warehouse(&self, warehouse: &MemoryWarehouse) -> Result<()> {
    warehouse
      .save(&self.warehouse_path)
      .await
      .with_context(|| {
        format!(
          "failed to save warehouse: {}",
          self.warehouse_path.display()
        )
      })
  }
}

/// Log to stderr, filtered by `DATADAG_LOG` (default `info`).
fn init_tracing() {
  let filter = EnvFilter::try_from_env("DATADAG_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(io::stderr)
    .init();
}

async fn load_pipeline(pipeline_file: &Path) -> Result<(PipelineDef, TaskGraph)> {
  let content = tokio::fs::read_to_string(pipeline_file)
    .await
    .with_context(|| format!("failed to read pipeline file: {}", pipeline_file.display()))?;

  let def: PipelineDef = serde_json::from_str(&content)
    .with_context(|| format!("failed to parse pipeline file: {}", pipeline_file.display()))?;

  let graph = TaskGraph::from_def(&def)
    .with_context(|| format!("invalid pipeline: {}", def.name))?;

  Ok((def, graph))
}

async fn validate(pipeline_file: &Path) -> Result<()> {
  let (_, graph) = load_pipeline(pipeline_file).await?;

  eprintln!("Pipeline '{}' is valid ({} tasks)", graph.name(), graph.len());

  let order: Vec<serde_json::Value> = graph
    .tasks()
    .map(|task| {
      serde_json::json!({
        "task": task.name,
        "operation": task.operation.kind(),
        "upstream": task.upstream,
      })
    })
    .collect();
  println!("{}", serde_json::to_string_pretty(&order)?);

  Ok(())
}

async fn run_pipeline(pipeline_file: &Path, options: &Options) -> Result<()> {
  let (def, graph) = load_pipeline(pipeline_file).await?;
  let warehouse = options.load_warehouse(&def).await?;

  eprintln!("Loaded pipeline: {} ({} tasks)", def.name, graph.len());

  let cancel = CancellationToken::new();
  let on_interrupt = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      eprintln!("Interrupted, finishing running tasks");
      on_interrupt.cancel();
    }
  });

  let runtime = Runtime::new(graph, warehouse.clone(), options.config.clone());
  let result = runtime.invoke(cancel).await;

  // Tasks that finished before an abort have already changed the warehouse.
  options.save_warehouse(&warehouse).await?;
  let report = result.context("pipeline execution aborted")?;

  eprintln!("Execution completed: {}", report.execution_id);
  eprintln!("Tasks succeeded: {}", report.results.len());

  println!("{}", serde_json::to_string_pretty(&report)?);

  if let Some(failure) = &report.first_failure {
    bail!(
      "task '{}' failed ({}): {}; skipped: [{}]",
      failure.task,
      failure.kind,
      failure.message,
      report.skipped.join(", ")
    );
  }
  if report.cancelled {
    bail!("pipeline run was cancelled");
  }

  Ok(())
}

async fn run_task(pipeline_file: &Path, task: &str, options: &Options) -> Result<()> {
  let (def, graph) = load_pipeline(pipeline_file).await?;
  let warehouse = options.load_warehouse(&def).await?;

  let upstream = read_upstream_from_stdin()?;
  eprintln!("Running task: {} (upstream: {:?})", task, upstream.keys());

  let runtime = Runtime::new(graph, warehouse.clone(), options.config.clone());
  let outcome = runtime
    .invoke_task(task, upstream)
    .await
    .context("task execution aborted")?;

  options.save_warehouse(&warehouse).await?;

  println!("{}", serde_json::to_string_pretty(&outcome)?);

  if let TaskOutcome::Failed(failure) = outcome {
    bail!("task '{}' failed ({})", failure.task, failure.kind);
  }

  Ok(())
}

async fn inspect(options: &Options) -> Result<()> {
  let warehouse = MemoryWarehouse::load(DEFAULT_PROJECT, &options.warehouse_path)
    .await
    .with_context(|| {
      format!(
        "failed to load warehouse: {}",
        options.warehouse_path.display()
      )
    })?;

  println!(
    "{}",
    serde_json::to_string_pretty(&warehouse.snapshot().await)?
  );

  Ok(())
}

/// Upstream results as `{"task_name": {...result...}}`.
fn read_upstream_from_stdin() -> Result<HashMap<String, serde_json::Value>> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    return Ok(HashMap::new());
  }

  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read upstream results from stdin")?;

  if input.trim().is_empty() {
    Ok(HashMap::new())
  } else {
    serde_json::from_str(&input).context("failed to parse upstream results JSON from stdin")
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use datadag_catalog::{DatasetReference, Warehouse};

  const PROJECT: &str = "analytics-dev";

  fn options(dir: &Path) -> Options {
    Options {
      warehouse_path: dir.join(WAREHOUSE_FILE),
      project: Some(PROJECT.to_string()),
      config: RuntimeConfig::default(),
    }
  }

  #[tokio::test]
  async fn test_aborted_run_persists_completed_tasks() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline_file = dir.path().join("pipeline.json");
    let pipeline = serde_json::json!({
      "name": "aborts_after_create",
      "tasks": [
        { "name": "create", "operation": "create_dataset", "params": { "dataset_id": "kept" } },
        { "name": "get", "operation": "get_dataset",
          "params": { "dataset_id": { "$ref": { "task": "create", "field": "no.such.field" } } } }
      ]
    });
    tokio::fs::write(&pipeline_file, pipeline.to_string())
      .await
      .unwrap();
    let options = options(dir.path());

    let err = run_pipeline(&pipeline_file, &options).await.unwrap_err();
    assert!(err.to_string().contains("aborted"));

    let warehouse = MemoryWarehouse::load(PROJECT, &options.warehouse_path)
      .await
      .unwrap();
    assert!(
      warehouse
        .get_dataset(&DatasetReference::new(PROJECT, "kept"))
        .await
        .is_ok()
    );
  }
}
