use cairn_graph::GraphError;
use cairn_resolver::ResolveError;

/// Errors returned by [`Engine::run`](crate::Engine::run).
///
/// Everything except `Failed` is a construction error: it is raised before
/// any provider call is made.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
  #[error("invalid engine config: {message}")]
  InvalidConfig { message: String },

  #[error(transparent)]
  Resolve(#[from] ResolveError),

  #[error(transparent)]
  Graph(#[from] GraphError),

  /// The run finished but not every task converged.
  #[error("run {run_id} did not converge\n{summary}")]
  Failed { run_id: String, summary: String },
}
