//! Property-based tests for graph validation and ordering.

use std::collections::HashMap;

use datadag_config::{OperationKind, OperationSpec};
use datadag_workflow::{GraphError, TaskGraphBuilder};
use proptest::prelude::*;

fn task_name(index: usize) -> String {
  format!("task_{index}")
}

fn builder_with_tasks(count: usize) -> TaskGraphBuilder {
  let mut builder = TaskGraphBuilder::new("generated");
  for index in 0..count {
    builder
      .add_task(task_name(index), OperationSpec::new(OperationKind::GetDataset))
      .unwrap();
  }
  builder
}

/// Task count plus forward edges `i -> j` with `i < j`, so the graph is acyclic.
fn acyclic_edges() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
  (2usize..12).prop_flat_map(|count| {
    let edge = (0..count, 0..count)
      .prop_filter("forward edge", |(from, to)| from < to);
    (Just(count), prop::collection::vec(edge, 0..30))
  })
}

proptest! {
  #[test]
  fn forward_edges_always_build((count, edges) in acyclic_edges()) {
    let mut builder = builder_with_tasks(count);
    for (from, to) in &edges {
      prop_assert!(builder.add_dependency(&task_name(*from), &task_name(*to)).is_ok());
    }

    let graph = builder.build().unwrap();
    let position: HashMap<&str, usize> = graph
      .topological_order()
      .iter()
      .enumerate()
      .map(|(index, name)| (name.as_str(), index))
      .collect();

    prop_assert_eq!(position.len(), count);
    for (from, to) in &edges {
      let (from, to) = (task_name(*from), task_name(*to));
      prop_assert!(position[from.as_str()] < position[to.as_str()]);
      prop_assert!(graph.descendants(&from).contains(&to));
    }
  }

  #[test]
  fn back_edge_on_a_chain_is_a_cycle(
    (length, ancestor, descendant) in (2usize..10).prop_flat_map(|length| {
      (Just(length), 0..length, 0..length)
    }).prop_filter("ancestor before descendant", |(_, a, d)| a < d)
  ) {
    let names: Vec<String> = (0..length).map(task_name).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let mut builder = builder_with_tasks(length);
    builder.chain(&refs).unwrap();

    let err = builder
      .add_dependency(&names[descendant], &names[ancestor])
      .err();
    let Some(GraphError::CycleDetected { path }) = err else {
      return Err(TestCaseError::fail(format!("expected a cycle, got {err:?}")));
    };
    prop_assert_eq!(path.first(), path.last());
    prop_assert!(path.contains(&names[ancestor]));
    prop_assert!(path.contains(&names[descendant]));

    let built = builder.build();
    prop_assert!(
      matches!(built, Err(GraphError::CycleDetected { .. })),
      "expected build to fail with CycleDetected"
    );
  }
}
