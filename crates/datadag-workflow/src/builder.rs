use std::collections::{HashMap, HashSet};

use datadag_config::OperationSpec;

use crate::error::GraphError;
use crate::graph::Graph;
use crate::task::Task;
use crate::task_graph::TaskGraph;

/// Registers tasks and ordering edges, then validates them into a [`TaskGraph`].
///
/// Edges read `from -> to`: `to` runs only after `from` succeeded. Every
/// cross-task reference in a task's parameters also becomes an edge when the
/// graph is built.
#[derive(Debug, Clone)]
pub struct TaskGraphBuilder {
  name: String,
  /// Task names in registration order.
  order: Vec<String>,
  specs: HashMap<String, OperationSpec>,
  edges: Vec<(String, String)>,
}

impl TaskGraphBuilder {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      order: Vec::new(),
      specs: HashMap::new(),
      edges: Vec::new(),
    }
  }

  pub fn add_task(
    &mut self,
    name: impl Into<String>,
    spec: OperationSpec,
  ) -> Result<&mut Self, GraphError> {
    let name = name.into();
    if self.specs.contains_key(&name) {
      return Err(GraphError::DuplicateTaskName(name));
    }
    self.order.push(name.clone());
    self.specs.insert(name, spec);
    Ok(self)
  }

  /// Declare that `to` depends on `from`.
  ///
  /// An edge that closes a cycle is still recorded, so the builder can no
  /// longer produce a graph.
  pub fn add_dependency(&mut self, from: &str, to: &str) -> Result<&mut Self, GraphError> {
    for name in [from, to] {
      if !self.specs.contains_key(name) {
        return Err(GraphError::UnknownTask(name.to_string()));
      }
    }
    if self.has_edge(from, to) {
      return Ok(self);
    }

    let closing = if from == to {
      Some(vec![from.to_string(), to.to_string()])
    } else {
      Graph::new(&self.order, &self.edges)
        .path(to, from)
        .map(|mut path| {
          path.push(to.to_string());
          path
        })
    };

    self.edges.push((from.to_string(), to.to_string()));

    match closing {
      Some(path) => Err(GraphError::CycleDetected { path }),
      None => Ok(self),
    }
  }

  /// Wire `names[0] -> names[1] -> ...`.
  pub fn chain(&mut self, names: &[&str]) -> Result<&mut Self, GraphError> {
    for pair in names.windows(2) {
      self.add_dependency(pair[0], pair[1])?;
    }
    Ok(self)
  }

  pub fn build(self) -> Result<TaskGraph, GraphError> {
    let Self {
      name,
      order,
      mut specs,
      mut edges,
    } = self;

    let mut seen: HashSet<(String, String)> = edges.iter().cloned().collect();
    for task in &order {
      let Some(spec) = specs.get(task) else {
        continue;
      };
      for reference in spec.references() {
        if !specs.contains_key(&reference.task) {
          return Err(GraphError::DanglingReference {
            task: task.clone(),
            reference: reference.to_string(),
          });
        }
        if reference.task == *task {
          return Err(GraphError::CycleDetected {
            path: vec![task.clone(), task.clone()],
          });
        }
        let edge = (reference.task.clone(), task.clone());
        if seen.insert(edge.clone()) {
          edges.push(edge);
        }
      }
    }

    let graph = Graph::new(&order, &edges);
    let topological = graph.topological_order(&order)?;

    let tasks = order
      .iter()
      .filter_map(|task| {
        let operation = specs.remove(task)?;
        let upstream = graph.upstream(task).iter().cloned().collect();
        Some((
          task.clone(),
          Task {
            name: task.clone(),
            operation,
            upstream,
          },
        ))
      })
      .collect();

    Ok(TaskGraph::new(name, tasks, topological, graph))
  }

  fn has_edge(&self, from: &str, to: &str) -> bool {
    self.edges.iter().any(|(f, t)| f == from && t == to)
  }
}
