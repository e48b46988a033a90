use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KubeconfigError {
  #[error("error reading kubeconfig {}", .path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("error writing kubeconfig {}", .path.display())]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid kubeconfig {}", .path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_yaml::Error,
  },

  #[error("a context name is required")]
  MissingContext,

  #[error("no kubeconfig path: KUBECONFIG is unset and there is no home directory")]
  NoDefaultPath,
}

#[derive(Debug, Error)]
pub enum KubectlError {
  #[error("a node name is required")]
  NodeNameRequired,

  #[error("error running {command}")]
  Spawn {
    command: String,
    #[source]
    source: std::io::Error,
  },

  #[error("error running {command}: {status}: {stderr}")]
  Failed {
    command: String,
    status: std::process::ExitStatus,
    stderr: String,
  },

  #[error("{command} reported an error: {stderr}")]
  Stderr { command: String, stderr: String },

  #[error("error writing manifest to a temp file")]
  TempFile(#[source] std::io::Error),

  #[error("cannot parse current config from kubectl")]
  InvalidConfig(#[source] serde_json::Error),
}
