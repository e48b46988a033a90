//! Task model for cairn.
//!
//! A task is one unit of desired state: a network, a firewall rule, a file
//! on disk. Tasks name each other through typed references, live together
//! in a [`TaskMap`], and converge through the shared diff policy of
//! [`Resource`]: find what exists, compare it with what should exist, and
//! make only the calls needed to close the gap.

mod builder;
mod delta;
mod error;
mod key;
mod macros;
mod map;
mod output;
mod reference;
mod resource;
mod shorthand;
mod task;

pub use builder::{BuildError, ModelBuilder};
pub use delta::{Action, Change, Delta};
pub use error::{BoxError, TaskError};
pub use key::{ParseKeyError, TaskKey};
pub use map::{TaskMap, TaskMapError};
pub use output::Output;
pub use reference::{AnyTaskRef, BindError, Field, KindSet, Reference, TaskRef};
pub use resource::Resource;
pub use shorthand::from_shorthand;
pub use task::{Context, HasName, Lifecycle, Observation, Task, TaskKind, display_task};
