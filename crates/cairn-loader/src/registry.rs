use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use cairn_task::{HasName, Resource, Task, from_shorthand};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{DecodeError, LoadError};

type ParseFn<C> = fn(&str, Value) -> Result<Arc<dyn Task<C>>, DecodeError>;

/// Exemplar for one task kind: knows the kind tag and how to build a task
/// of that kind from a document entry.
pub struct TaskType<C> {
  kind: &'static str,
  parse: ParseFn<C>,
}

impl<C> TaskType<C>
where
  C: Send + Sync + 'static,
{
  pub fn of<T>() -> Self
  where
    T: Resource<C> + Default + DeserializeOwned,
  {
    Self {
      kind: T::KIND,
      parse: parse_as::<C, T>,
    }
  }

  pub fn kind(&self) -> &'static str {
    self.kind
  }

  /// Build a task named `name` from `value` (a full object, a bare name or
  /// null).
  pub fn parse(&self, name: &str, value: Value) -> Result<Arc<dyn Task<C>>, DecodeError> {
    (self.parse)(name, value)
  }
}

fn parse_as<C, T>(name: &str, value: Value) -> Result<Arc<dyn Task<C>>, DecodeError>
where
  C: Send + Sync + 'static,
  T: Resource<C> + Default + DeserializeOwned,
{
  let mut task: T = from_shorthand(value)?;
  match task.name() {
    Some(found) if found != name => {
      return Err(DecodeError::NameMismatch {
        expected: name.to_string(),
        found: found.to_string(),
      });
    }
    Some(_) => {}
    None => task.set_name(name.to_string()),
  }
  Ok(Arc::new(task))
}

impl<C> Clone for TaskType<C> {
  fn clone(&self) -> Self {
    Self {
      kind: self.kind,
      parse: self.parse,
    }
  }
}

impl<C> fmt::Debug for TaskType<C> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("TaskType").field(&self.kind).finish()
  }
}

/// The kinds a template may instantiate, keyed by the alias used in
/// documents. One registry belongs to one loader; nothing is global.
pub struct TypeRegistry<C> {
  types: BTreeMap<String, TaskType<C>>,
}

impl<C> TypeRegistry<C>
where
  C: Send + Sync + 'static,
{
  pub fn new() -> Self {
    Self {
      types: BTreeMap::new(),
    }
  }

  /// Register kinds under the given aliases. Re-registering an alias for the
  /// same kind is allowed; for a different kind it is an error and nothing
  /// from this call is registered.
  pub fn add_types<'a>(
    &mut self,
    types: impl IntoIterator<Item = (&'a str, TaskType<C>)>,
  ) -> Result<(), LoadError> {
    let mut staged: BTreeMap<String, TaskType<C>> = BTreeMap::new();
    for (alias, task_type) in types {
      let existing = staged.get(alias).or_else(|| self.types.get(alias));
      if let Some(existing) = existing
        && existing.kind != task_type.kind
      {
        return Err(LoadError::AliasConflict {
          alias: alias.to_string(),
          existing: existing.kind,
          kind: task_type.kind,
        });
      }
      staged.insert(alias.to_string(), task_type);
    }
    self.types.extend(staged);
    Ok(())
  }

  pub fn get(&self, alias: &str) -> Option<&TaskType<C>> {
    self.types.get(alias)
  }

  pub fn aliases(&self) -> impl Iterator<Item = &str> {
    self.types.keys().map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.types.len()
  }

  pub fn is_empty(&self) -> bool {
    self.types.is_empty()
  }
}

impl<C> Default for TypeRegistry<C>
where
  C: Send + Sync + 'static,
{
  fn default() -> Self {
    Self::new()
  }
}
