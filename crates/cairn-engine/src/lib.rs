//! Convergence engine for cairn.
//!
//! The engine takes a populated [`TaskMap`](cairn_task::TaskMap), resolves
//! its references, derives the dependency graph and converges every task in
//! dependency order with bounded concurrency. Failures are attached to the
//! task that raised them; dependents of a failed task are reported as
//! blocked and unrelated branches keep running.

mod config;
mod engine;
mod error;
mod events;
mod report;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::EngineError;
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier, Phase};
pub use report::{RunReport, TaskOutcome};
