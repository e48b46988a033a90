use thiserror::Error;

use crate::{BoxError, TaskMap, TaskMapError};

/// Errors raised while populating a task map.
#[derive(Debug, Error)]
pub enum BuildError {
  #[error(transparent)]
  TaskMap(#[from] TaskMapError),

  #[error("{builder}: {message}")]
  Invalid {
    builder: &'static str,
    message: String,
  },

  #[error("{builder}: {source}")]
  Failed {
    builder: &'static str,
    #[source]
    source: BoxError,
  },
}

/// Contributes tasks for one part of the model (network, nodes, a control
/// plane component) to a shared task map.
pub trait ModelBuilder<C>: Send + Sync
where
  C: Send + Sync + 'static,
{
  fn build(&self, tasks: &mut TaskMap<C>) -> Result<(), BuildError>;
}
