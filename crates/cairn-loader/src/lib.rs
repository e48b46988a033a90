//! Producer side of cairn: turn a layered directory of task templates into
//! a resolved [`TaskMap`](cairn_task::TaskMap).
//!
//! A model layer is a directory of YAML or JSON documents. Each document is
//! rendered with minijinja first, then parsed as a mapping from
//! `<kind>/<name>` to the task's fields:
//!
//! ```yaml
//! vpc/main:
//!   cidr: 10.0.0.0/16
//! subnet/main-a:
//!   vpc: main
//!   cidr: {{ subnet_cidr("a") }}
//! ```

mod error;
mod loader;
mod registry;
mod store;

pub use error::{DecodeError, LoadError};
pub use loader::{Loader, TemplateFunction};
pub use registry::{TaskType, TypeRegistry};
pub use store::{FsModelStore, ModelStore};
