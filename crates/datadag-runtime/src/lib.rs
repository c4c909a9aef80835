//! Datadag Runtime
//!
//! Executes a built [`datadag_workflow::TaskGraph`] against a
//! [`datadag_catalog::Warehouse`].
//!
//! [`Runtime::invoke`] walks the graph in dispatch rounds: every pending task
//! whose upstream tasks all succeeded has its deferred parameters resolved
//! (see [`resolve_params`]) and is spawned on tokio. The run ends with a
//! [`RunReport`] carrying each task's [`TaskStatus`] and [`ExecutionResult`].

mod error;
mod events;
mod input;
mod result;
mod runtime;

pub use error::RuntimeError;
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use input::resolve_params;
pub use result::{ExecutionResult, RunReport, TaskFailure, TaskOutcome, TaskStatus};
pub use runtime::{Runtime, RuntimeConfig};
