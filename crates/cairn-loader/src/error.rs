use cairn_resolver::ResolveError;
use cairn_task::TaskMapError;
use thiserror::Error;

/// A document entry that could not be turned into a task.
#[derive(Debug, Error)]
pub enum DecodeError {
  #[error(transparent)]
  Json(#[from] serde_json::Error),

  #[error("name '{found}' does not match '{expected}'")]
  NameMismatch { expected: String, found: String },
}

/// Errors that can occur while loading a model.
#[derive(Debug, Error)]
pub enum LoadError {
  #[error("model layer '{layer}' not found")]
  MissingLayer { layer: String },

  #[error("failed to read {path}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("{path}: template error: {source}")]
  Template {
    path: String,
    #[source]
    source: minijinja::Error,
  },

  #[error("{path}: invalid document: {message}")]
  Document { path: String, message: String },

  #[error("{path}: '{key}' is defined more than once")]
  DuplicateKey { path: String, key: String },

  #[error("{path}: invalid key '{key}': expected <kind>/<name>")]
  InvalidKey { path: String, key: String },

  #[error("{path}: unknown task kind '{alias}'")]
  UnknownKind { path: String, alias: String },

  #[error("{path}: {key}: {source}")]
  Decode {
    path: String,
    key: String,
    #[source]
    source: DecodeError,
  },

  #[error("{path}: {source}")]
  TaskMap {
    path: String,
    #[source]
    source: TaskMapError,
  },

  #[error("alias '{alias}' is already registered for {existing}, cannot register {kind}")]
  AliasConflict {
    alias: String,
    existing: &'static str,
    kind: &'static str,
  },

  #[error("invalid template context value '{key}': {source}")]
  Context {
    key: String,
    #[source]
    source: serde_json::Error,
  },

  #[error(transparent)]
  Resolve(#[from] ResolveError),
}
