//! Host-level tasks for cairn: files and directories on a node, and the
//! model builders that produce them.

mod apiserver;
mod file;
pub mod flags;
mod host;
pub mod pod;

pub use apiserver::{
  CLOUD_CONFIG_PATH, KubeApiServerBuilder, KubeApiServerConfig, MANIFEST_PATH, NodeConfig,
};
pub use file::{File, FileState};
pub use host::{FileInfo, FileType, HostApi, HostError, LocalHost};

use cairn_loader::TaskType;

/// Node task kinds keyed by the alias model documents use for them.
pub fn node_types<H: HostApi>() -> Vec<(&'static str, TaskType<H>)> {
  vec![("file", TaskType::of::<File>())]
}
