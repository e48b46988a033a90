use cairn_task::TaskKey;
use thiserror::Error;

/// Errors that can occur while building the dependency graph.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
  /// A reference field was never bound.
  #[error("{task}: reference '{field}' to '{target}' is unresolved")]
  Unresolved {
    task: TaskKey,
    field: &'static str,
    target: String,
  },

  /// A task depends on a key that is not in the task map.
  #[error("{task} depends on unknown task {dependency}")]
  UnknownDependency { task: TaskKey, dependency: TaskKey },

  /// A task lists itself as a dependency.
  #[error("{task} depends on itself")]
  SelfDependency { task: TaskKey },

  /// The dependency relation is not acyclic. The path starts and ends with
  /// the same task.
  #[error("dependency cycle: {}", render_path(.path))]
  Cycle { path: Vec<TaskKey> },
}

fn render_path(path: &[TaskKey]) -> String {
  path
    .iter()
    .map(ToString::to_string)
    .collect::<Vec<_>>()
    .join(" -> ")
}
