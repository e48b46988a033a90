use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use cairn_engine::EngineConfig;
use serde::{Deserialize, Serialize};

/// `<data-dir>/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CairnConfig {
  pub engine: EngineConfig,
}

impl CairnConfig {
  /// Read and validate the config file; a missing file means defaults.
  pub async fn load(path: &Path) -> Result<Self> {
    let text = match tokio::fs::read_to_string(path).await {
      Ok(text) => text,
      Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
      Err(e) => {
        return Err(e).with_context(|| format!("failed to read config file: {}", path.display()));
      }
    };
    Self::parse(&text).with_context(|| format!("invalid config file: {}", path.display()))
  }

  pub fn parse(text: &str) -> Result<Self> {
    let config: Self = toml::from_str(text)?;
    config.engine.validate()?;
    Ok(config)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parses_engine_table() {
    let config = CairnConfig::parse("[engine]\nconcurrency = 2\nfail_fast = true\n").unwrap();
    assert_eq!(config.engine.concurrency, 2);
    assert!(config.engine.fail_fast);
  }

  #[test]
  fn test_rejects_unknown_keys_and_zero_concurrency() {
    assert!(CairnConfig::parse("[engine]\nparallelism = 2\n").is_err());
    assert!(CairnConfig::parse("[engine]\nconcurrency = 0\n").is_err());
  }

  #[tokio::test]
  async fn test_missing_file_means_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = CairnConfig::load(&dir.path().join("config.toml")).await.unwrap();
    assert_eq!(config, CairnConfig::default());
  }
}
