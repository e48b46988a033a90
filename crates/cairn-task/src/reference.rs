//! Typed references between tasks.
//!
//! A reference is written as the target's name (or as the full target object,
//! from which only the name is taken) and is bound to the live target task by
//! the resolver. Binding is idempotent for the same target and refuses to
//! rebind to a different one.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::shorthand::Shorthand;
use crate::{TaskError, TaskKey, TaskKind};

/// Why a reference refused a binding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
  #[error("{key} is not one of [{expected}]")]
  WrongKind { key: TaskKey, expected: String },

  #[error("already bound to {existing}")]
  AlreadyBound { existing: TaskKey },
}

/// Object-safe view of a reference field, used by the resolver and the
/// dependency scan without knowing the target type.
pub trait Reference: Send + Sync {
  /// Name of the task this reference points at.
  fn target(&self) -> &str;

  /// Kind tags an acceptable target may carry.
  fn kinds(&self) -> Vec<&'static str>;

  /// Key of the bound target, once resolved.
  fn resolved_key(&self) -> Option<TaskKey>;

  /// Bind to `task`, registered in the task map under `key`.
  fn bind(&self, key: TaskKey, task: Arc<dyn Any + Send + Sync>) -> Result<(), BindError>;
}

/// A named reference field of a task, as reported by
/// [`TaskKind::reference_fields`].
#[derive(Clone, Copy)]
pub struct Field<'a> {
  pub name: &'static str,
  pub reference: &'a dyn Reference,
}

impl<'a> Field<'a> {
  pub fn new(name: &'static str, reference: &'a dyn Reference) -> Self {
    Self { name, reference }
  }
}

impl fmt::Debug for Field<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Field")
      .field("name", &self.name)
      .field("target", &self.reference.target())
      .field("resolved", &self.reference.resolved_key())
      .finish()
  }
}

struct Bound<T: ?Sized> {
  key: TaskKey,
  task: Arc<T>,
}

impl<T: ?Sized> Clone for Bound<T> {
  fn clone(&self) -> Self {
    Self {
      key: self.key.clone(),
      task: self.task.clone(),
    }
  }
}

fn bind_once<T: ?Sized>(
  slot: &OnceLock<Bound<T>>,
  key: TaskKey,
  task: Arc<T>,
) -> Result<(), BindError> {
  let bound = slot.get_or_init(|| Bound {
    key,
    task: task.clone(),
  });
  if Arc::ptr_eq(&bound.task, &task) {
    Ok(())
  } else {
    Err(BindError::AlreadyBound {
      existing: bound.key.clone(),
    })
  }
}

/// Reference to a task of one concrete kind `T`.
pub struct TaskRef<T> {
  name: String,
  slot: OnceLock<Bound<T>>,
}

impl<T: TaskKind> TaskRef<T> {
  /// An unresolved reference to the task called `name`.
  pub fn named(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      slot: OnceLock::new(),
    }
  }

  /// A reference already bound to `task`, for models built in code.
  pub fn resolved(task: Arc<T>) -> Result<Self, TaskError> {
    let name = task
      .name()
      .ok_or(TaskError::Unnamed { kind: T::KIND })?
      .to_string();
    let key = TaskKey::new(T::KIND, name.clone());
    let slot = OnceLock::new();
    let _ = slot.set(Bound { key, task });
    Ok(Self { name, slot })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn is_resolved(&self) -> bool {
    self.slot.get().is_some()
  }

  /// The bound target, if resolved.
  pub fn get(&self) -> Option<&Arc<T>> {
    self.slot.get().map(|bound| &bound.task)
  }

  /// The bound target, or [`TaskError::Unresolved`] naming `field`.
  pub fn require(&self, field: &'static str) -> Result<&Arc<T>, TaskError> {
    self.get().ok_or_else(|| TaskError::Unresolved {
      field,
      target: self.name.clone(),
    })
  }
}

impl<T: TaskKind> Reference for TaskRef<T> {
  fn target(&self) -> &str {
    &self.name
  }

  fn kinds(&self) -> Vec<&'static str> {
    vec![T::KIND]
  }

  fn resolved_key(&self) -> Option<TaskKey> {
    self.slot.get().map(|bound| bound.key.clone())
  }

  fn bind(&self, key: TaskKey, task: Arc<dyn Any + Send + Sync>) -> Result<(), BindError> {
    let task = task.downcast::<T>().map_err(|_| BindError::WrongKind {
      key: key.clone(),
      expected: T::KIND.to_string(),
    })?;
    bind_once(&self.slot, key, task)
  }
}

impl<T> Clone for TaskRef<T> {
  fn clone(&self) -> Self {
    Self {
      name: self.name.clone(),
      slot: self.slot.clone(),
    }
  }
}

impl<T> fmt::Debug for TaskRef<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TaskRef")
      .field("name", &self.name)
      .field("resolved", &self.slot.get().is_some())
      .finish()
  }
}

impl<T> Serialize for TaskRef<T> {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&self.name)
  }
}

impl<'de, T> Deserialize<'de> for TaskRef<T>
where
  T: TaskKind + Deserialize<'de>,
{
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    match Shorthand::<T>::deserialize(deserializer)? {
      Shorthand::Name(name) => Ok(Self::named(name)),
      Shorthand::Full(task) => match task.name() {
        Some(name) => Ok(Self::named(name)),
        None => Err(D::Error::custom(format!(
          "{} reference must be a name or an object with a name",
          T::KIND
        ))),
      },
    }
  }
}

/// The set of kinds an [`AnyTaskRef`] may point at.
pub trait KindSet: Send + Sync + 'static {
  const KINDS: &'static [&'static str];
}

/// Reference that may point at a task of any kind in `K`.
///
/// Used where a field accepts several target kinds, such as a route whose
/// target is either an internet gateway or a NAT gateway.
pub struct AnyTaskRef<K> {
  name: String,
  slot: OnceLock<Bound<dyn Any + Send + Sync>>,
  kinds: PhantomData<K>,
}

impl<K: KindSet> AnyTaskRef<K> {
  pub fn named(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      slot: OnceLock::new(),
      kinds: PhantomData,
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Key of the bound target, if resolved.
  pub fn key(&self) -> Option<&TaskKey> {
    self.slot.get().map(|bound| &bound.key)
  }

  /// The bound target as `T`, if resolved and of that kind.
  pub fn get<T: TaskKind>(&self) -> Option<Arc<T>> {
    let bound = self.slot.get()?;
    bound.task.clone().downcast::<T>().ok()
  }

  pub fn require_key(&self, field: &'static str) -> Result<&TaskKey, TaskError> {
    self.key().ok_or_else(|| TaskError::Unresolved {
      field,
      target: self.name.clone(),
    })
  }
}

impl<K: KindSet> Reference for AnyTaskRef<K> {
  fn target(&self) -> &str {
    &self.name
  }

  fn kinds(&self) -> Vec<&'static str> {
    K::KINDS.to_vec()
  }

  fn resolved_key(&self) -> Option<TaskKey> {
    self.key().cloned()
  }

  fn bind(&self, key: TaskKey, task: Arc<dyn Any + Send + Sync>) -> Result<(), BindError> {
    if !K::KINDS.contains(&key.kind()) {
      return Err(BindError::WrongKind {
        key,
        expected: K::KINDS.join(", "),
      });
    }
    bind_once(&self.slot, key, task)
  }
}

impl<K> Clone for AnyTaskRef<K> {
  fn clone(&self) -> Self {
    Self {
      name: self.name.clone(),
      slot: self.slot.clone(),
      kinds: PhantomData,
    }
  }
}

impl<K> fmt::Debug for AnyTaskRef<K> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("AnyTaskRef")
      .field("name", &self.name)
      .field("resolved", &self.slot.get().map(|bound| &bound.key))
      .finish()
  }
}

impl<K> Serialize for AnyTaskRef<K> {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&self.name)
  }
}

/// The target kind is not known while decoding, so a full object is read
/// only for its `name`.
#[derive(Deserialize)]
#[serde(untagged)]
enum AnyShorthand {
  Name(String),
  Object { name: Option<String> },
}

impl<'de, K: KindSet> Deserialize<'de> for AnyTaskRef<K> {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    match AnyShorthand::deserialize(deserializer)? {
      AnyShorthand::Name(name) | AnyShorthand::Object { name: Some(name) } => Ok(Self::named(name)),
      AnyShorthand::Object { name: None } => Err(D::Error::custom(format!(
        "reference to one of [{}] must be a name or an object with a name",
        K::KINDS.join(", ")
      ))),
    }
  }
}
