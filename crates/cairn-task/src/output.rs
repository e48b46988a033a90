use std::fmt;
use std::sync::{PoisonError, RwLock};

use crate::TaskError;

/// A value the provider assigns to a task (an id, an address) and which
/// dependents read once the task has converged.
///
/// Outputs sit behind `#[serde(skip)]` in task structs, so they never take
/// part in desired state or in diffs.
pub struct Output<T> {
  value: RwLock<Option<T>>,
}

impl<T: Clone> Output<T> {
  pub fn get(&self) -> Option<T> {
    self
      .value
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  pub fn set(&self, value: T) {
    *self.value.write().unwrap_or_else(PoisonError::into_inner) = Some(value);
  }

  pub fn clear(&self) {
    *self.value.write().unwrap_or_else(PoisonError::into_inner) = None;
  }

  pub fn is_known(&self) -> bool {
    self
      .value
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .is_some()
  }

  /// The value, or [`TaskError::OutputUnknown`] naming the owning task.
  pub fn require(&self, task: &dyn fmt::Display, output: &'static str) -> Result<T, TaskError> {
    self.get().ok_or_else(|| TaskError::OutputUnknown {
      task: task.to_string(),
      output,
    })
  }
}

impl<T> Default for Output<T> {
  fn default() -> Self {
    Self {
      value: RwLock::new(None),
    }
  }
}

impl<T: Clone> Clone for Output<T> {
  fn clone(&self) -> Self {
    Self {
      value: RwLock::new(self.get()),
    }
  }
}

impl<T: fmt::Debug> fmt::Debug for Output<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &*self.value.read().unwrap_or_else(PoisonError::into_inner) {
      Some(value) => write!(f, "Output({value:?})"),
      None => f.write_str("Output(<unknown>)"),
    }
  }
}
