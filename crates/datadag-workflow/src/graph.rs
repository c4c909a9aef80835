use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::GraphError;

/// Graph structure for traversal and analysis.
#[derive(Debug, Clone)]
pub struct Graph {
  /// Adjacency list: task -> list of downstream tasks.
  adjacency: HashMap<String, Vec<String>>,
  /// Reverse adjacency: task -> list of upstream tasks.
  reverse_adjacency: HashMap<String, Vec<String>>,
  /// Tasks with no incoming edges, in registration order.
  entry_points: Vec<String>,
}

impl Graph {
  /// Build a graph from task names (in registration order) and edges.
  pub fn new(tasks: &[String], edges: &[(String, String)]) -> Self {
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    let mut reverse_adjacency: HashMap<String, Vec<String>> = HashMap::new();

    for task in tasks {
      adjacency.entry(task.clone()).or_default();
      reverse_adjacency.entry(task.clone()).or_default();
    }

    for (from, to) in edges {
      adjacency.entry(from.clone()).or_default().push(to.clone());
      reverse_adjacency
        .entry(to.clone())
        .or_default()
        .push(from.clone());
    }

    let entry_points = tasks
      .iter()
      .filter(|id| reverse_adjacency.get(*id).is_none_or(|v| v.is_empty()))
      .cloned()
      .collect();

    Self {
      adjacency,
      reverse_adjacency,
      entry_points,
    }
  }

  pub fn entry_points(&self) -> &[String] {
    &self.entry_points
  }

  pub fn downstream(&self, task: &str) -> &[String] {
    self
      .adjacency
      .get(task)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  pub fn upstream(&self, task: &str) -> &[String] {
    self
      .reverse_adjacency
      .get(task)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Whether `to` can be reached from `from` by following edges.
  ///
  /// Returns the path (`from` .. `to`) if so.
  pub fn path(&self, from: &str, to: &str) -> Option<Vec<String>> {
    let mut parents: HashMap<&str, &str> = HashMap::new();
    let mut queue = VecDeque::from([from]);
    let mut seen = HashSet::from([from]);

    while let Some(current) = queue.pop_front() {
      if current == to {
        let mut path = vec![to.to_string()];
        let mut node = to;
        while let Some(&parent) = parents.get(node) {
          path.push(parent.to_string());
          node = parent;
        }
        path.reverse();
        return Some(path);
      }
      for next in self.downstream(current) {
        if seen.insert(next.as_str()) {
          parents.insert(next.as_str(), current);
          queue.push_back(next.as_str());
        }
      }
    }
    None
  }

  /// Every task reachable downstream of `task`, excluding itself.
  pub fn descendants(&self, task: &str) -> HashSet<String> {
    let mut found = HashSet::new();
    let mut stack: Vec<&str> = vec![task];
    while let Some(current) = stack.pop() {
      for next in self.downstream(current) {
        if found.insert(next.clone()) {
          stack.push(next.as_str());
        }
      }
    }
    found
  }

  /// Kahn's algorithm; ties are broken by registration order.
  pub fn topological_order(&self, tasks: &[String]) -> Result<Vec<String>, GraphError> {
    let mut in_degree: HashMap<&str, usize> = tasks
      .iter()
      .map(|t| (t.as_str(), self.upstream(t).len()))
      .collect();
    let position: HashMap<&str, usize> = tasks
      .iter()
      .enumerate()
      .map(|(i, t)| (t.as_str(), i))
      .collect();

    let mut ready: Vec<&str> = tasks
      .iter()
      .map(String::as_str)
      .filter(|t| in_degree.get(t) == Some(&0))
      .collect();
    let mut order = Vec::with_capacity(tasks.len());

    while !ready.is_empty() {
      // Take the earliest registered ready task.
      ready.sort_by_key(|t| std::cmp::Reverse(position.get(t).copied().unwrap_or(usize::MAX)));
      let Some(current) = ready.pop() else { break };
      order.push(current.to_string());

      for next in self.downstream(current) {
        if let Some(degree) = in_degree.get_mut(next.as_str()) {
          *degree -= 1;
          if *degree == 0 {
            ready.push(next.as_str());
          }
        }
      }
    }

    if order.len() < tasks.len() {
      let done: HashSet<&str> = order.iter().map(String::as_str).collect();
      let remaining: HashSet<&str> = tasks
        .iter()
        .map(String::as_str)
        .filter(|t| !done.contains(t))
        .collect();
      return Err(GraphError::CycleDetected {
        path: self.find_cycle(tasks, &remaining),
      });
    }

    Ok(order)
  }

  /// Walk upstream inside the unsorted remainder until a task repeats.
  ///
  /// Every remaining task has a remaining upstream, so the walk always closes.
  fn find_cycle(&self, tasks: &[String], remaining: &HashSet<&str>) -> Vec<String> {
    let Some(start) = tasks.iter().find(|t| remaining.contains(t.as_str())) else {
      return Vec::new();
    };

    let mut walked: Vec<&str> = Vec::new();
    let mut current = start.as_str();
    loop {
      if let Some(pos) = walked.iter().position(|t| *t == current) {
        let mut cycle = vec![current.to_string()];
        cycle.extend(walked[pos..].iter().rev().map(|t| t.to_string()));
        return cycle;
      }
      walked.push(current);
      match self
        .upstream(current)
        .iter()
        .find(|u| remaining.contains(u.as_str()))
      {
        Some(next) => current = next.as_str(),
        None => return walked.iter().rev().map(|t| t.to_string()).collect(),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
  }

  fn edges(list: &[(&str, &str)]) -> Vec<(String, String)> {
    list
      .iter()
      .map(|(a, b)| (a.to_string(), b.to_string()))
      .collect()
  }

  #[test]
  fn test_topological_order_respects_edges_and_registration() {
    let tasks = names(&["load", "create", "audit", "describe"]);
    let graph = Graph::new(
      &tasks,
      &edges(&[("create", "load"), ("create", "describe"), ("load", "audit")]),
    );

    let order = graph.topological_order(&tasks).unwrap();

    assert_eq!(order, names(&["create", "load", "audit", "describe"]));
    assert_eq!(graph.entry_points(), names(&["create"]).as_slice());
  }

  #[test]
  fn test_cycle_is_reported_with_path() {
    let tasks = names(&["a", "b", "c", "d"]);
    let graph = Graph::new(&tasks, &edges(&[("a", "b"), ("b", "c"), ("c", "b"), ("c", "d")]));

    let Err(GraphError::CycleDetected { path }) = graph.topological_order(&tasks) else {
      panic!("expected a cycle");
    };

    assert_eq!(path.first(), path.last());
    assert!(path.contains(&"b".to_string()));
    assert!(path.contains(&"c".to_string()));
    assert!(!path.contains(&"a".to_string()));
  }

  #[test]
  fn test_path_and_descendants() {
    let tasks = names(&["a", "b", "c", "d"]);
    let graph = Graph::new(&tasks, &edges(&[("a", "b"), ("b", "c")]));

    assert_eq!(graph.path("a", "c"), Some(names(&["a", "b", "c"])));
    assert_eq!(graph.path("c", "a"), None);

    let below_a = graph.descendants("a");
    assert_eq!(below_a.len(), 2);
    assert!(below_a.contains("c"));
    assert!(graph.descendants("d").is_empty());
  }
}
