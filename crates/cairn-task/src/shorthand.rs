use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::TaskKind;

/// A task written either as a bare name or as a full object.
#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum Shorthand<T> {
  Name(String),
  Full(T),
}

/// Decode a task definition that may be written as a bare name.
///
/// A string becomes a default task carrying that name; `null` becomes a
/// default task; anything else is decoded as the full object.
pub fn from_shorthand<T>(value: Value) -> Result<T, serde_json::Error>
where
  T: TaskKind + Default + DeserializeOwned,
{
  match value {
    Value::Null => Ok(T::default()),
    Value::String(name) => {
      let mut task = T::default();
      task.set_name(name);
      Ok(task)
    }
    full => serde_json::from_value(full),
  }
}
