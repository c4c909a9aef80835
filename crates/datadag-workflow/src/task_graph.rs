use std::collections::{HashMap, HashSet};

use datadag_config::PipelineDef;

use crate::builder::TaskGraphBuilder;
use crate::error::GraphError;
use crate::graph::Graph;
use crate::task::Task;

/// A validated, immutable task graph ready for execution.
///
/// Acyclic, and every dependency and reference names a task in the graph.
#[derive(Debug, Clone)]
pub struct TaskGraph {
  name: String,
  tasks: HashMap<String, Task>,
  order: Vec<String>,
  graph: Graph,
}

impl TaskGraph {
  pub(crate) fn new(
    name: String,
    tasks: HashMap<String, Task>,
    order: Vec<String>,
    graph: Graph,
  ) -> Self {
    Self {
      name,
      tasks,
      order,
      graph,
    }
  }

  /// Build a graph from a pipeline definition.
  ///
  /// All tasks are registered first, so `depends_on` may name a task defined
  /// later in the file.
  pub fn from_def(def: &PipelineDef) -> Result<Self, GraphError> {
    let mut builder = TaskGraphBuilder::new(&def.name);
    for task in &def.tasks {
      builder.add_task(&task.name, task.operation.clone())?;
    }
    for task in &def.tasks {
      for upstream in &task.depends_on {
        builder.add_dependency(upstream, &task.name)?;
      }
    }
    for chain in &def.chains {
      let names: Vec<&str> = chain.iter().map(String::as_str).collect();
      builder.chain(&names)?;
    }
    builder.build()
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn get(&self, task: &str) -> Option<&Task> {
    self.tasks.get(task)
  }

  pub fn contains(&self, task: &str) -> bool {
    self.tasks.contains_key(task)
  }

  /// Tasks in topological order.
  pub fn tasks(&self) -> impl Iterator<Item = &Task> {
    self.order.iter().filter_map(|name| self.tasks.get(name))
  }

  pub fn topological_order(&self) -> &[String] {
    &self.order
  }

  pub fn entry_points(&self) -> &[String] {
    self.graph.entry_points()
  }

  pub fn upstream(&self, task: &str) -> &[String] {
    self.graph.upstream(task)
  }

  pub fn downstream(&self, task: &str) -> &[String] {
    self.graph.downstream(task)
  }

  pub fn descendants(&self, task: &str) -> HashSet<String> {
    self.graph.descendants(task)
  }

  pub fn len(&self) -> usize {
    self.order.len()
  }

  pub fn is_empty(&self) -> bool {
    self.order.is_empty()
  }
}
