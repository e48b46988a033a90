use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::{Resource, Task, TaskKey};

#[derive(Debug, Error)]
pub enum TaskMapError {
  #[error("{kind} task has no name")]
  Unnamed { kind: &'static str },

  #[error("duplicate task {key}")]
  Duplicate { key: TaskKey },
}

/// All tasks of one run, keyed by [`TaskKey`].
///
/// Insertion is the only mutation; a name collision within a kind is an
/// error and leaves the map unchanged.
pub struct TaskMap<C> {
  tasks: BTreeMap<TaskKey, Arc<dyn Task<C>>>,
}

impl<C> TaskMap<C>
where
  C: Send + Sync + 'static,
{
  pub fn new() -> Self {
    Self {
      tasks: BTreeMap::new(),
    }
  }

  /// Add a task and hand back the shared handle other tasks can reference.
  pub fn add_task<T: Resource<C>>(&mut self, task: T) -> Result<Arc<T>, TaskMapError> {
    let task = Arc::new(task);
    let erased: Arc<dyn Task<C>> = task.clone();
    self.insert(erased)?;
    Ok(task)
  }

  /// Add an already type-erased task.
  pub fn insert(&mut self, task: Arc<dyn Task<C>>) -> Result<TaskKey, TaskMapError> {
    let key = task
      .key()
      .ok_or(TaskMapError::Unnamed { kind: task.kind() })?;
    match self.tasks.entry(key.clone()) {
      Entry::Occupied(_) => Err(TaskMapError::Duplicate { key }),
      Entry::Vacant(slot) => {
        slot.insert(task);
        Ok(key)
      }
    }
  }

  pub fn get(&self, key: &TaskKey) -> Option<&Arc<dyn Task<C>>> {
    self.tasks.get(key)
  }

  /// The task of kind `T` called `name`.
  pub fn get_as<T: Resource<C>>(&self, name: &str) -> Option<Arc<T>> {
    let task = self.tasks.get(&TaskKey::new(T::KIND, name))?;
    task.clone().into_any().downcast::<T>().ok()
  }

  /// Every task of kind `T`, in name order.
  pub fn of_kind<T: Resource<C>>(&self) -> Vec<Arc<T>> {
    self
      .tasks
      .iter()
      .filter(|(key, _)| key.kind() == T::KIND)
      .filter_map(|(_, task)| task.clone().into_any().downcast::<T>().ok())
      .collect()
  }

  /// Tasks called `name` whose kind is one of `kinds`.
  pub fn candidates<'a>(
    &'a self,
    kinds: &[&str],
    name: &str,
  ) -> Vec<(&'a TaskKey, &'a Arc<dyn Task<C>>)> {
    kinds
      .iter()
      .filter_map(|kind| self.tasks.get_key_value(&TaskKey::new(*kind, name)))
      .collect()
  }

  pub fn contains(&self, key: &TaskKey) -> bool {
    self.tasks.contains_key(key)
  }

  pub fn keys(&self) -> impl Iterator<Item = &TaskKey> {
    self.tasks.keys()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&TaskKey, &Arc<dyn Task<C>>)> {
    self.tasks.iter()
  }

  pub fn len(&self) -> usize {
    self.tasks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tasks.is_empty()
  }
}

impl<C> Default for TaskMap<C>
where
  C: Send + Sync + 'static,
{
  fn default() -> Self {
    Self::new()
  }
}

impl<C> fmt::Debug for TaskMap<C> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_list().entries(self.tasks.keys()).finish()
  }
}
