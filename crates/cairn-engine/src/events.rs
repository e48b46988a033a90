//! Execution events and notifiers.
//!
//! Events let consumers follow a run as it happens: print progress, stream
//! to a UI, persist an audit trail.

use cairn_task::{Delta, Lifecycle, TaskKey};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Which half of convergence a task is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
  Find,
  Render,
}

/// Events emitted during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExecutionEvent {
  RunStarted {
    run_id: String,
    lifecycle: Lifecycle,
    tasks: usize,
  },

  TaskStarted {
    run_id: String,
    task: TaskKey,
    phase: Phase,
  },

  TaskCompleted {
    run_id: String,
    task: TaskKey,
    delta: Delta,
  },

  TaskFailed {
    run_id: String,
    task: TaskKey,
    error: String,
  },

  /// The task was not attempted because `by` failed.
  TaskBlocked {
    run_id: String,
    task: TaskKey,
    by: TaskKey,
  },

  RunCompleted { run_id: String, success: bool },
}

/// Receives execution events. Called inline by the engine, so
/// implementations should hand off rather than block.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// Forwards events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded so a slow consumer never stalls scheduling; volume is a few
  // events per task.
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // The receiver may be gone; the run does not depend on it.
    let _ = self.sender.send(event);
  }
}
