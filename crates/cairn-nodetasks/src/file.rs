use async_trait::async_trait;
use cairn_task::{Change, Resource, TaskError, TaskKind, define_task};
use serde::{Deserialize, Serialize};

use crate::host::{FileType, HostApi};

/// A file or directory on the host. The task name is the path.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct File {
  pub name: Option<String>,
  /// Defaults to the task name.
  pub path: Option<String>,
  pub contents: Option<String>,
  #[serde(default, rename = "type")]
  pub file_type: FileType,
  /// Octal permission bits, such as `0644`.
  pub mode: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileState {
  pub file_type: FileType,
  pub contents: Option<String>,
  pub mode: Option<String>,
}

impl File {
  pub fn new(path: impl Into<String>, contents: impl Into<String>) -> Self {
    let path = path.into();
    Self {
      name: Some(path.clone()),
      path: Some(path),
      contents: Some(contents.into()),
      ..Default::default()
    }
  }

  pub fn directory(path: impl Into<String>) -> Self {
    let path = path.into();
    Self {
      name: Some(path.clone()),
      path: Some(path),
      file_type: FileType::Directory,
      ..Default::default()
    }
  }

  pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
    self.mode = Some(mode.into());
    self
  }

  fn target(&self) -> Result<&str, TaskError> {
    self
      .path
      .as_deref()
      .or(self.name.as_deref())
      .ok_or(TaskError::Unnamed { kind: Self::KIND })
  }

  fn mode_bits(&self) -> Result<Option<u32>, TaskError> {
    self
      .mode
      .as_deref()
      .map(|mode| {
        u32::from_str_radix(mode, 8)
          .map_err(|_| TaskError::invalid_change("mode", format!("'{mode}' is not an octal mode")))
      })
      .transpose()
  }

  /// The mode in the form `find` reports it, so `644` and `0644` agree.
  fn normalized_mode(&self) -> Result<Option<String>, TaskError> {
    Ok(self.mode_bits()?.map(|bits| format!("{bits:04o}")))
  }

  async fn write<H: HostApi>(&self, host: &H, desired: &FileState) -> Result<(), TaskError> {
    let path = self.target()?;
    let mode = self.mode_bits()?;
    let written = match desired.file_type {
      FileType::Directory => host.create_dir(path, mode).await,
      FileType::File => {
        let contents = desired.contents.as_deref().unwrap_or_default();
        host.write_file(path, contents.as_bytes(), mode).await
      }
    };
    written.map_err(TaskError::provider)
  }
}

impl TaskKind for File {
  const KIND: &'static str = "file";
}

define_task!(File);

#[async_trait]
impl<H: HostApi> Resource<H> for File {
  type State = FileState;

  fn desired(&self) -> Result<FileState, TaskError> {
    let mode = self.normalized_mode()?;
    Ok(FileState {
      file_type: self.file_type,
      contents: match self.file_type {
        FileType::File => Some(self.contents.clone().unwrap_or_default()),
        FileType::Directory => None,
      },
      mode,
    })
  }

  async fn find(&self, host: &H) -> Result<Option<FileState>, TaskError> {
    let path = self.target()?;
    let Some(info) = host.stat(path).await.map_err(TaskError::discovery)? else {
      return Ok(None);
    };
    let contents = match info.file_type {
      FileType::File => {
        let bytes = host.read(path).await.map_err(TaskError::discovery)?;
        Some(String::from_utf8_lossy(&bytes).into_owned())
      }
      FileType::Directory => None,
    };
    // Permissions are only compared when the task sets them.
    let mode = match (self.normalized_mode()?, info.mode) {
      (Some(_), Some(bits)) => Some(format!("{bits:04o}")),
      (managed, _) => managed,
    };
    Ok(Some(FileState {
      file_type: info.file_type,
      contents,
      mode,
    }))
  }

  fn check_changes(
    &self,
    actual: Option<&FileState>,
    desired: &FileState,
    _changes: &[Change],
  ) -> Result<(), TaskError> {
    match actual {
      Some(actual) if actual.file_type != desired.file_type => Err(TaskError::invalid_change(
        "fileType",
        format!("{} exists with a different type", self.target()?),
      )),
      _ => Ok(()),
    }
  }

  async fn create(&self, host: &H, desired: &FileState) -> Result<(), TaskError> {
    self.write(host, desired).await
  }

  async fn update(
    &self,
    host: &H,
    _actual: &FileState,
    desired: &FileState,
    _changes: &[Change],
  ) -> Result<(), TaskError> {
    self.write(host, desired).await
  }

  async fn delete(&self, host: &H, _actual: &FileState) -> Result<(), TaskError> {
    host
      .remove(self.target()?)
      .await
      .map_err(TaskError::provider)
  }
}
