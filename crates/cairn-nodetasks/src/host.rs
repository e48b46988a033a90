use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;

/// Error type for host operations.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
  #[error("{path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("{path} is not a file")]
  NotAFile { path: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
  #[default]
  File,
  Directory,
}

/// What a host reports about a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
  pub file_type: FileType,
  /// Permission bits, where the host has them.
  pub mode: Option<u32>,
}

/// The machine node tasks converge. Paths are absolute paths on that host.
#[async_trait]
pub trait HostApi: Send + Sync + 'static {
  /// `Ok(None)` when nothing exists at `path`.
  async fn stat(&self, path: &str) -> Result<Option<FileInfo>, HostError>;

  async fn read(&self, path: &str) -> Result<Vec<u8>, HostError>;

  /// Write a file, creating parent directories.
  async fn write_file(&self, path: &str, contents: &[u8], mode: Option<u32>) -> Result<(), HostError>;

  async fn create_dir(&self, path: &str, mode: Option<u32>) -> Result<(), HostError>;

  async fn remove(&self, path: &str) -> Result<(), HostError>;
}

/// The local filesystem, with every host path placed under `root`.
///
/// A root of `/` converges the machine itself; tests use a temporary
/// directory.
#[derive(Debug, Clone)]
pub struct LocalHost {
  root: PathBuf,
}

impl LocalHost {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn host_path(&self, path: &str) -> PathBuf {
    self.root.join(path.trim_start_matches('/'))
  }
}

fn io_error(path: &str) -> impl FnOnce(std::io::Error) -> HostError + '_ {
  move |source| HostError::Io {
    path: path.to_string(),
    source,
  }
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
  use std::os::unix::fs::PermissionsExt;
  fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
  Ok(())
}

#[cfg(unix)]
fn mode_of(metadata: &std::fs::Metadata) -> Option<u32> {
  use std::os::unix::fs::PermissionsExt;
  Some(metadata.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn mode_of(_metadata: &std::fs::Metadata) -> Option<u32> {
  None
}

#[async_trait]
impl HostApi for LocalHost {
  async fn stat(&self, path: &str) -> Result<Option<FileInfo>, HostError> {
    let metadata = match fs::metadata(self.host_path(path)).await {
      Ok(metadata) => metadata,
      Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(io_error(path)(e)),
    };
    let file_type = if metadata.is_dir() {
      FileType::Directory
    } else {
      FileType::File
    };
    Ok(Some(FileInfo {
      file_type,
      mode: mode_of(&metadata),
    }))
  }

  async fn read(&self, path: &str) -> Result<Vec<u8>, HostError> {
    fs::read(self.host_path(path)).await.map_err(io_error(path))
  }

  async fn write_file(&self, path: &str, contents: &[u8], mode: Option<u32>) -> Result<(), HostError> {
    let target = self.host_path(path);
    if let Some(parent) = target.parent() {
      fs::create_dir_all(parent).await.map_err(io_error(path))?;
    }
    fs::write(&target, contents).await.map_err(io_error(path))?;
    if let Some(mode) = mode {
      set_mode(&target, mode).await.map_err(io_error(path))?;
    }
    Ok(())
  }

  async fn create_dir(&self, path: &str, mode: Option<u32>) -> Result<(), HostError> {
    let target = self.host_path(path);
    fs::create_dir_all(&target).await.map_err(io_error(path))?;
    if let Some(mode) = mode {
      set_mode(&target, mode).await.map_err(io_error(path))?;
    }
    Ok(())
  }

  async fn remove(&self, path: &str) -> Result<(), HostError> {
    let target = self.host_path(path);
    let result = match self.stat(path).await? {
      Some(FileInfo {
        file_type: FileType::Directory,
        ..
      }) => fs::remove_dir_all(&target).await,
      Some(_) => fs::remove_file(&target).await,
      None => return Ok(()),
    };
    result.map_err(io_error(path))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_paths_are_placed_under_the_root() {
    let dir = tempfile::tempdir().unwrap();
    let host = LocalHost::new(dir.path());

    host
      .write_file("/etc/app/config", b"x=1", Some(0o600))
      .await
      .unwrap();
    assert_eq!(
      std::fs::read_to_string(dir.path().join("etc/app/config")).unwrap(),
      "x=1"
    );

    let info = host.stat("/etc/app/config").await.unwrap().unwrap();
    assert_eq!(info.file_type, FileType::File);
    #[cfg(unix)]
    assert_eq!(info.mode, Some(0o600));
    assert_eq!(
      host.stat("/etc/app").await.unwrap().unwrap().file_type,
      FileType::Directory
    );
  }

  #[tokio::test]
  async fn test_missing_paths_stat_as_none_and_remove_is_quiet() {
    let dir = tempfile::tempdir().unwrap();
    let host = LocalHost::new(dir.path());
    assert_eq!(host.stat("/nope").await.unwrap(), None);
    host.remove("/nope").await.unwrap();
  }
}
