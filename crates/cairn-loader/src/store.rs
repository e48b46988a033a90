use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::error::LoadError;

/// Source of model templates, organised in named layers.
#[async_trait]
pub trait ModelStore: Send + Sync {
  /// Template paths in `layer`, sorted.
  async fn list(&self, layer: &str) -> Result<Vec<String>, LoadError>;

  /// Raw template text at `path` (as returned by `list`).
  async fn read(&self, path: &str) -> Result<String, LoadError>;
}

const EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Filesystem-backed model store.
///
/// ```text
/// {root}/
/// ├── cloudup/
/// │   ├── network.yaml
/// │   └── iam/
/// │       └── master.yaml
/// └── nodeup/
///     └── files.yaml
/// ```
pub struct FsModelStore {
  root: PathBuf,
}

impl FsModelStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn io_error(path: &Path, source: std::io::Error) -> LoadError {
    LoadError::Io {
      path: path.display().to_string(),
      source,
    }
  }
}

#[async_trait]
impl ModelStore for FsModelStore {
  async fn list(&self, layer: &str) -> Result<Vec<String>, LoadError> {
    let layer_dir = self.root.join(layer);
    if !fs::try_exists(&layer_dir)
      .await
      .map_err(|e| Self::io_error(&layer_dir, e))?
    {
      return Err(LoadError::MissingLayer {
        layer: layer.to_string(),
      });
    }

    let mut found = Vec::new();
    let mut dirs = vec![layer_dir];
    while let Some(dir) = dirs.pop() {
      let mut entries = fs::read_dir(&dir)
        .await
        .map_err(|e| Self::io_error(&dir, e))?;
      while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Self::io_error(&dir, e))?
      {
        let path = entry.path();
        let file_type = entry
          .file_type()
          .await
          .map_err(|e| Self::io_error(&path, e))?;
        if file_type.is_dir() {
          dirs.push(path);
          continue;
        }
        let wanted = path
          .extension()
          .and_then(|ext| ext.to_str())
          .is_some_and(|ext| EXTENSIONS.contains(&ext));
        if !wanted {
          continue;
        }
        if let Ok(relative) = path.strip_prefix(&self.root) {
          let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
          found.push(parts.join("/"));
        }
      }
    }

    found.sort();
    Ok(found)
  }

  async fn read(&self, path: &str) -> Result<String, LoadError> {
    let full = self.root.join(path);
    fs::read_to_string(&full)
      .await
      .map_err(|e| Self::io_error(&full, e))
  }
}
