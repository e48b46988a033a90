use std::collections::BTreeMap;
use std::fmt::Write as _;

use cairn_task::{Delta, Lifecycle, TaskError, TaskKey};

use crate::error::EngineError;

/// Terminal state of one task.
#[derive(Debug)]
pub enum TaskOutcome {
  Done(Delta),
  Failed(TaskError),
  /// Not attempted: `by` is the failed task upstream that caused it.
  Blocked { by: TaskKey },
  /// Not attempted because the run was cancelled first.
  Cancelled,
}

impl TaskOutcome {
  pub fn is_done(&self) -> bool {
    matches!(self, TaskOutcome::Done(_))
  }

  pub fn delta(&self) -> Option<&Delta> {
    match self {
      TaskOutcome::Done(delta) => Some(delta),
      _ => None,
    }
  }
}

/// Result of one convergence run.
#[derive(Debug)]
pub struct RunReport {
  pub run_id: String,
  pub lifecycle: Lifecycle,
  pub outcomes: BTreeMap<TaskKey, TaskOutcome>,
}

impl RunReport {
  /// True only if every task reached `Done`.
  pub fn is_success(&self) -> bool {
    self.outcomes.values().all(TaskOutcome::is_done)
  }

  pub fn outcome(&self, key: &TaskKey) -> Option<&TaskOutcome> {
    self.outcomes.get(key)
  }

  /// Deltas that created, updated or deleted something (or would have, in a
  /// dry run).
  pub fn changes(&self) -> impl Iterator<Item = &Delta> {
    self
      .outcomes
      .values()
      .filter_map(TaskOutcome::delta)
      .filter(|delta| !delta.is_noop())
  }

  pub fn failures(&self) -> impl Iterator<Item = (&TaskKey, &TaskError)> {
    self.outcomes.iter().filter_map(|(key, outcome)| match outcome {
      TaskOutcome::Failed(err) => Some((key, err)),
      _ => None,
    })
  }

  pub fn blocked(&self) -> impl Iterator<Item = (&TaskKey, &TaskKey)> {
    self.outcomes.iter().filter_map(|(key, outcome)| match outcome {
      TaskOutcome::Blocked { by } => Some((key, by)),
      _ => None,
    })
  }

  pub fn cancelled(&self) -> impl Iterator<Item = &TaskKey> {
    self
      .outcomes
      .iter()
      .filter(|(_, outcome)| matches!(outcome, TaskOutcome::Cancelled))
      .map(|(key, _)| key)
  }

  /// One line per task that did not converge: failures with their error,
  /// blocked tasks with their failed ancestor, cancelled tasks.
  pub fn summary(&self) -> String {
    let mut out = String::new();
    for (key, err) in self.failures() {
      let _ = writeln!(out, "  failed   {key}: {err}");
    }
    for (key, by) in self.blocked() {
      let _ = writeln!(out, "  blocked  {key}: blocked by {by}");
    }
    for key in self.cancelled() {
      let _ = writeln!(out, "  skipped  {key}: run cancelled");
    }
    out
  }

  /// The report on success, otherwise [`EngineError::Failed`] carrying the
  /// summary.
  pub fn into_result(self) -> Result<Self, EngineError> {
    if self.is_success() {
      Ok(self)
    } else {
      Err(EngineError::Failed {
        run_id: self.run_id.clone(),
        summary: self.summary(),
      })
    }
  }
}
