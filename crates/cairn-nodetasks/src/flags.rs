//! Render a config struct as command-line flags.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlagError {
  #[error("flag config must serialize to a map")]
  NotAMap,

  #[error("flag '{key}' has a nested value")]
  Nested { key: String },

  #[error(transparent)]
  Serialize(#[from] serde_json::Error),
}

fn scalar(key: &str, value: &Value) -> Result<Option<String>, FlagError> {
  match value {
    Value::Null => Ok(None),
    Value::String(s) if s.is_empty() => Ok(None),
    Value::String(s) => Ok(Some(s.clone())),
    Value::Bool(b) => Ok(Some(b.to_string())),
    Value::Number(n) => Ok(Some(n.to_string())),
    Value::Array(items) if items.is_empty() => Ok(None),
    Value::Array(items) => {
      let mut parts = Vec::with_capacity(items.len());
      for item in items {
        match item {
          Value::Array(_) | Value::Object(_) => {
            return Err(FlagError::Nested {
              key: key.to_string(),
            });
          }
          other => parts.extend(scalar(key, other)?),
        }
      }
      Ok(Some(parts.join(",")))
    }
    Value::Object(_) => Err(FlagError::Nested {
      key: key.to_string(),
    }),
  }
}

/// Every set field of `config` as `--key=value`, sorted by key.
///
/// Field names are used as they serialize, so configs rename them with
/// serde (`kebab-case` for most binaries). Unset options, empty strings and
/// empty lists produce no flag; lists are joined with commas.
pub fn build_flags<T: Serialize>(config: &T) -> Result<Vec<String>, FlagError> {
  let Value::Object(fields) = serde_json::to_value(config)? else {
    return Err(FlagError::NotAMap);
  };
  let mut keys: Vec<&String> = fields.keys().collect();
  keys.sort();

  let mut flags = Vec::new();
  for key in keys {
    if let Some(value) = scalar(key, &fields[key])? {
      flags.push(format!("--{key}={value}"));
    }
  }
  Ok(flags)
}
