use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Engine tuning, usually read from the `[engine]` table of the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
  /// Upper bound on tasks running find/render at the same time.
  pub concurrency: usize,
  /// Stop scheduling new tasks after the first failure.
  pub fail_fast: bool,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      concurrency: 8,
      fail_fast: false,
    }
  }
}

impl EngineConfig {
  pub fn validate(&self) -> Result<(), EngineError> {
    if self.concurrency == 0 {
      return Err(EngineError::InvalidConfig {
        message: "concurrency must be at least 1".to_string(),
      });
    }
    Ok(())
  }
}
