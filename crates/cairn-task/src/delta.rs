use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::TaskKey;

/// What render decided to do with the provider object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
  None,
  Create,
  Update,
  Delete,
}

impl Action {
  fn marker(self) -> char {
    match self {
      Action::None => '=',
      Action::Create => '+',
      Action::Update => '~',
      Action::Delete => '-',
    }
  }
}

/// One differing top-level field. `None` means the field is absent on that
/// side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
  pub field: String,
  pub actual: Option<Value>,
  pub desired: Option<Value>,
}

/// The outcome of rendering one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
  pub task: TaskKey,
  pub action: Action,
  pub changes: Vec<Change>,
  /// False for dry runs and no-ops.
  pub applied: bool,
}

impl Delta {
  pub fn none(task: TaskKey) -> Self {
    Self {
      task,
      action: Action::None,
      changes: Vec::new(),
      applied: false,
    }
  }

  /// Compare observed against desired state.
  ///
  /// Both sides are compared in their serialized form, so anything skipped
  /// by serde (outputs, resolved references) never shows up as a change.
  pub fn compute<S: Serialize>(
    task: TaskKey,
    actual: Option<&S>,
    desired: &S,
  ) -> Result<Self, serde_json::Error> {
    let desired = serde_json::to_value(desired)?;
    let (action, changes) = match actual {
      None => (Action::Create, diff(&Value::Null, &desired)),
      Some(actual) => {
        let changes = diff(&serde_json::to_value(actual)?, &desired);
        let action = if changes.is_empty() {
          Action::None
        } else {
          Action::Update
        };
        (action, changes)
      }
    };
    Ok(Self {
      task,
      action,
      changes,
      applied: false,
    })
  }

  /// A deletion of the observed object.
  pub fn delete<S: Serialize>(task: TaskKey, actual: &S) -> Result<Self, serde_json::Error> {
    let actual = serde_json::to_value(actual)?;
    Ok(Self {
      task,
      action: Action::Delete,
      changes: diff(&actual, &Value::Null),
      applied: false,
    })
  }

  pub fn is_noop(&self) -> bool {
    self.action == Action::None
  }

  pub fn change(&self, field: &str) -> Option<&Change> {
    self.changes.iter().find(|c| c.field == field)
  }

  /// Human-readable rendering, one line per changed field.
  pub fn describe(&self) -> String {
    let mut out = format!("{} {}", self.action.marker(), self.task);
    if !self.applied && self.action != Action::None {
      out.push_str(" (planned)");
    }
    for change in &self.changes {
      let _ = match (&change.actual, &change.desired) {
        (Some(a), Some(d)) => write!(out, "\n    {}: {} -> {}", change.field, short(a), short(d)),
        (None, Some(d)) => write!(out, "\n    {}: {}", change.field, short(d)),
        (Some(a), None) => write!(out, "\n    {}: {} -> <none>", change.field, short(a)),
        (None, None) => Ok(()),
      };
    }
    out
  }
}

const MAX_VALUE_WIDTH: usize = 60;

fn short(value: &Value) -> String {
  let text = value.to_string();
  if text.chars().count() <= MAX_VALUE_WIDTH {
    return text;
  }
  let cut: String = text.chars().take(MAX_VALUE_WIDTH).collect();
  format!("{cut}...")
}

fn present(value: Option<&Value>) -> Option<Value> {
  value.filter(|v| !v.is_null()).cloned()
}

/// Field-level difference between two serialized states. Missing fields and
/// `null` fields are treated alike.
fn diff(actual: &Value, desired: &Value) -> Vec<Change> {
  let empty = serde_json::Map::new();
  let as_object = |v: &Value| match v {
    Value::Object(map) => Some(map.clone()),
    Value::Null => Some(empty.clone()),
    _ => None,
  };

  match (as_object(actual), as_object(desired)) {
    (Some(a), Some(d)) => {
      let mut fields: Vec<&String> = a.keys().chain(d.keys()).collect();
      fields.sort();
      fields.dedup();
      fields
        .into_iter()
        .filter_map(|field| {
          let av = present(a.get(field));
          let dv = present(d.get(field));
          (av != dv).then(|| Change {
            field: field.clone(),
            actual: av,
            desired: dv,
          })
        })
        .collect()
    }
    _ if actual == desired => Vec::new(),
    _ => vec![Change {
      field: ".".into(),
      actual: present(Some(actual)),
      desired: present(Some(desired)),
    }],
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn key() -> TaskKey {
    TaskKey::new("subnet", "s1")
  }

  #[test]
  fn test_missing_is_create_with_all_fields() {
    let delta = Delta::compute(key(), None, &json!({"cidr": "10.0.1.0/24", "zone": "a"})).unwrap();
    assert_eq!(delta.action, Action::Create);
    assert_eq!(delta.changes.len(), 2);
    assert_eq!(delta.change("cidr").unwrap().actual, None);
  }

  #[test]
  fn test_equal_is_noop() {
    let state = json!({"cidr": "10.0.1.0/24", "tags": {"a": "b"}});
    let delta = Delta::compute(key(), Some(&state), &state).unwrap();
    assert!(delta.is_noop());
    assert!(delta.changes.is_empty());
  }

  #[test]
  fn test_null_and_missing_are_equal() {
    let actual = json!({"cidr": "10.0.1.0/24"});
    let desired = json!({"cidr": "10.0.1.0/24", "zone": null});
    assert!(Delta::compute(key(), Some(&actual), &desired).unwrap().is_noop());
  }

  #[test]
  fn test_update_lists_only_changed_fields() {
    let actual = json!({"cidr": "10.0.1.0/24", "zone": "a"});
    let desired = json!({"cidr": "10.0.2.0/24", "zone": "a"});
    let delta = Delta::compute(key(), Some(&actual), &desired).unwrap();
    assert_eq!(delta.action, Action::Update);
    assert_eq!(delta.changes.len(), 1);
    let change = &delta.changes[0];
    assert_eq!(change.field, "cidr");
    assert_eq!(change.actual, Some(json!("10.0.1.0/24")));
    assert_eq!(change.desired, Some(json!("10.0.2.0/24")));
  }

  #[test]
  fn test_describe() {
    let actual = json!({"cidr": "10.0.1.0/24"});
    let desired = json!({"cidr": "10.0.2.0/24"});
    let mut delta = Delta::compute(key(), Some(&actual), &desired).unwrap();
    assert_eq!(
      delta.describe(),
      "~ subnet:s1 (planned)\n    cidr: \"10.0.1.0/24\" -> \"10.0.2.0/24\""
    );
    delta.applied = true;
    assert!(delta.describe().starts_with("~ subnet:s1\n"));
  }

  #[test]
  fn test_describe_truncates_long_values() {
    let desired = json!({"contents": "x".repeat(500)});
    let delta = Delta::compute(TaskKey::new("file", "/etc/a"), None, &desired).unwrap();
    let text = delta.describe();
    assert!(text.ends_with("..."));
    assert!(text.len() < 200);
  }
}
