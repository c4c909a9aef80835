//! Datadag Workflow
//!
//! A validated task graph. Tasks are registered with a [`TaskGraphBuilder`],
//! wired with ordering edges, and checked once in [`TaskGraphBuilder::build`]:
//!
//! - task names are unique
//! - every edge and every parameter reference names a registered task
//! - the graph is acyclic
//!
//! A parameter reference to another task's result implies an edge from that
//! task, so a consumer never runs before its producer. The resulting
//! [`TaskGraph`] is immutable and carries its topological order.

mod builder;
mod error;
mod graph;
mod task;
mod task_graph;

pub use builder::TaskGraphBuilder;
pub use error::GraphError;
pub use graph::Graph;
pub use task::Task;
pub use task_graph::TaskGraph;
