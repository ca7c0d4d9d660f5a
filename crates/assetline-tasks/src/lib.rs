//! Task graph and scheduler for assetline builds.
//!
//! Tasks are registered against a [`TaskGraphBuilder`] under typed
//! identifiers. Building the graph validates every prerequisite reference and
//! rejects cycles, so a [`TaskGraph`] is always runnable. Running a set of
//! tasks executes their dependency closure, starting each task only after all
//! of its prerequisites have finished successfully.

pub mod graph;
pub mod scheduler;

pub use graph::{GraphError, TaskAction, TaskError, TaskGraph, TaskGraphBuilder, TaskKey};
pub use scheduler::{RunError, RunReport, TaskRun};
