use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identity of a task within one [`TaskMap`](crate::TaskMap).
///
/// A key is the pair of the task's kind tag and its name, rendered as
/// `<kind>:<name>`. Keys order by kind first and then by name, which gives
/// every map, graph and report in cairn a stable iteration order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskKey {
  kind: String,
  name: String,
}

impl TaskKey {
  pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      kind: kind.into(),
      name: name.into(),
    }
  }

  pub fn kind(&self) -> &str {
    &self.kind
  }

  pub fn name(&self) -> &str {
    &self.name
  }
}

impl fmt::Display for TaskKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.kind, self.name)
  }
}

/// A string that is not of the form `<kind>:<name>`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid task key '{0}': expected <kind>:<name>")]
pub struct ParseKeyError(String);

impl FromStr for TaskKey {
  type Err = ParseKeyError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    // Names may contain ':' (file paths, urls), kinds never do.
    match s.split_once(':') {
      Some((kind, name)) if !kind.is_empty() && !name.is_empty() => Ok(Self::new(kind, name)),
      _ => Err(ParseKeyError(s.to_string())),
    }
  }
}

impl TryFrom<String> for TaskKey {
  type Error = ParseKeyError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<TaskKey> for String {
  fn from(key: TaskKey) -> Self {
    key.to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_display_and_parse() {
    let key = TaskKey::new("subnet", "s1");
    assert_eq!(key.to_string(), "subnet:s1");
    assert_eq!("subnet:s1".parse::<TaskKey>().unwrap(), key);
  }

  #[test]
  fn test_name_may_contain_colons() {
    let key: TaskKey = "file:/etc/kubernetes/a:b".parse().unwrap();
    assert_eq!(key.kind(), "file");
    assert_eq!(key.name(), "/etc/kubernetes/a:b");
  }

  #[test]
  fn test_rejects_malformed() {
    assert!("vpc".parse::<TaskKey>().is_err());
    assert!(":v1".parse::<TaskKey>().is_err());
    assert!("vpc:".parse::<TaskKey>().is_err());
  }

  #[test]
  fn test_orders_by_kind_then_name() {
    let mut keys = vec![
      TaskKey::new("vpc", "b"),
      TaskKey::new("subnet", "z"),
      TaskKey::new("vpc", "a"),
    ];
    keys.sort();
    let rendered: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
    assert_eq!(rendered, vec!["subnet:z", "vpc:a", "vpc:b"]);
  }

  #[test]
  fn test_serde_as_string() {
    let key = TaskKey::new("route", "r1");
    let json = serde_json::to_string(&key).unwrap();
    assert_eq!(json, "\"route:r1\"");
    let back: TaskKey = serde_json::from_str(&json).unwrap();
    assert_eq!(back, key);
    assert!(serde_json::from_str::<TaskKey>("\"route\"").is_err());
  }
}
