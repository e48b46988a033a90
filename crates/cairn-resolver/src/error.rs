use std::fmt;

use cairn_task::{BindError, TaskKey};
use thiserror::Error;

/// Why a single reference could not be bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
  /// No task of an acceptable kind carries the target name.
  Missing,
  /// More than one task of an acceptable kind carries the target name.
  Ambiguous { candidates: Vec<TaskKey> },
  /// The reference is already bound to a different task.
  Conflict(BindError),
}

/// One reference field that failed to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unresolved {
  pub owner: TaskKey,
  pub field: &'static str,
  pub target: String,
  pub expected: Vec<&'static str>,
  pub reason: Reason,
}

impl fmt::Display for Unresolved {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{}.{} -> '{}' ({}): ",
      self.owner,
      self.field,
      self.target,
      self.expected.join("|")
    )?;
    match &self.reason {
      Reason::Missing => f.write_str("no such task"),
      Reason::Ambiguous { candidates } => {
        let keys: Vec<String> = candidates.iter().map(ToString::to_string).collect();
        write!(f, "ambiguous between {}", keys.join(", "))
      }
      Reason::Conflict(err) => write!(f, "{err}"),
    }
  }
}

/// Errors that can occur during reference resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
  /// One or more references did not resolve. Every failure in the map is
  /// listed, not just the first.
  #[error("{} unresolved reference(s): {}", .failures.len(), list(.failures))]
  Unresolved { failures: Vec<Unresolved> },
}

impl ResolveError {
  pub fn failures(&self) -> &[Unresolved] {
    match self {
      ResolveError::Unresolved { failures } => failures,
    }
  }
}

fn list(failures: &[Unresolved]) -> String {
  failures
    .iter()
    .map(ToString::to_string)
    .collect::<Vec<_>>()
    .join("; ")
}
