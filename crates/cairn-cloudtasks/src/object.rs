//! Shared convergence logic for provider objects.

use std::fmt;

use cairn_task::{
  Change, Output, TaskError, TaskKey, TaskKind, TaskMap, TaskRef, HasName,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::api::{CloudApi, CloudObject, ObjectType, Spec};

/// A task kind backed by one provider object, found by its Name tag.
///
/// The kind's `State` is both what it sends to the provider and what it
/// reads back, so attributes the provider adds on its own are ignored when
/// diffing.
pub trait CloudKind: TaskKind {
  const OBJECT: ObjectType;

  /// Spec fields that cannot change once the object exists.
  const IMMUTABLE: &'static [&'static str] = &[];

  type State: Serialize + DeserializeOwned + fmt::Debug + Send + Sync + 'static;

  /// Provider id, written by find and create.
  fn id(&self) -> &Output<String>;

  /// Desired state. Ids of referenced objects that are not known yet are
  /// left empty.
  fn state(&self) -> Result<Self::State, TaskError>;

  /// Fail if an id this object must carry is not known yet.
  fn check_ready(&self) -> Result<(), TaskError> {
    Ok(())
  }

  /// Record outputs other than the id.
  fn observed(&self, _object: &CloudObject) {}

  fn scan<C: CloudApi>(&self, _tasks: &TaskMap<C>) -> Vec<TaskKey> {
    Vec::new()
  }
}

/// Implement `Resource<C>` for every `C: CloudApi` on top of [`CloudKind`].
macro_rules! cloud_resource {
  ($ty:ty) => {
    #[async_trait::async_trait]
    impl<C: $crate::api::CloudApi> cairn_task::Resource<C> for $ty {
      type State = <$ty as $crate::object::CloudKind>::State;

      fn desired(&self) -> Result<Self::State, cairn_task::TaskError> {
        $crate::object::CloudKind::state(self)
      }

      fn dependencies_in(&self, tasks: &cairn_task::TaskMap<C>) -> Vec<cairn_task::TaskKey> {
        $crate::object::CloudKind::scan(self, tasks)
      }

      async fn find(&self, cloud: &C) -> Result<Option<Self::State>, cairn_task::TaskError> {
        $crate::object::find(self, cloud).await
      }

      fn check_changes(
        &self,
        actual: Option<&Self::State>,
        _desired: &Self::State,
        changes: &[cairn_task::Change],
      ) -> Result<(), cairn_task::TaskError> {
        $crate::object::check_immutable::<$ty>(actual.is_some(), changes)
      }

      async fn create(&self, cloud: &C, desired: &Self::State) -> Result<(), cairn_task::TaskError> {
        $crate::object::create(self, cloud, desired).await
      }

      async fn update(
        &self,
        cloud: &C,
        _actual: &Self::State,
        desired: &Self::State,
        _changes: &[cairn_task::Change],
      ) -> Result<(), cairn_task::TaskError> {
        $crate::object::modify(self, cloud, desired).await
      }

      async fn delete(&self, cloud: &C, _actual: &Self::State) -> Result<(), cairn_task::TaskError> {
        $crate::object::delete(self, cloud).await
      }
    }
  };
}

pub(crate) use cloud_resource;

fn object_name<K: CloudKind>(kind: &K) -> Result<&str, TaskError> {
  kind.name().ok_or(TaskError::Unnamed { kind: K::KIND })
}

/// Serialize a state into a spec, dropping empty attributes.
fn to_spec<S: Serialize>(state: &S) -> Result<Spec, TaskError> {
  match serde_json::to_value(state)? {
    Value::Object(map) => Ok(map.into_iter().filter(|(_, v)| !v.is_null()).collect()),
    _ => Ok(Spec::new()),
  }
}

pub(crate) async fn find<K: CloudKind, C: CloudApi>(
  kind: &K,
  cloud: &C,
) -> Result<Option<K::State>, TaskError> {
  let name = object_name(kind)?;
  let mut found = cloud
    .describe(K::OBJECT, name)
    .await
    .map_err(TaskError::discovery)?;
  if found.len() > 1 {
    return Err(TaskError::Ambiguous { count: found.len() });
  }
  let Some(object) = found.pop() else {
    kind.id().clear();
    return Ok(None);
  };
  kind.id().set(object.id.clone());
  kind.observed(&object);
  let state = serde_json::from_value(Value::Object(object.spec))?;
  Ok(Some(state))
}

pub(crate) fn check_immutable<K: CloudKind>(exists: bool, changes: &[Change]) -> Result<(), TaskError> {
  if !exists {
    return Ok(());
  }
  match changes.iter().find(|c| K::IMMUTABLE.contains(&c.field.as_str())) {
    Some(change) => Err(TaskError::invalid_change(
      change.field.clone(),
      format!("{} {} cannot be changed in place", K::KIND, change.field),
    )),
    None => Ok(()),
  }
}

pub(crate) async fn create<K: CloudKind, C: CloudApi>(
  kind: &K,
  cloud: &C,
  desired: &K::State,
) -> Result<(), TaskError> {
  kind.check_ready()?;
  let object = cloud
    .create(K::OBJECT, object_name(kind)?, to_spec(desired)?)
    .await
    .map_err(TaskError::provider)?;
  kind.id().set(object.id.clone());
  kind.observed(&object);
  Ok(())
}

pub(crate) async fn modify<K: CloudKind, C: CloudApi>(
  kind: &K,
  cloud: &C,
  desired: &K::State,
) -> Result<(), TaskError> {
  kind.check_ready()?;
  let id = kind.id().require(kind, "id")?;
  let object = cloud
    .modify(K::OBJECT, &id, to_spec(desired)?)
    .await
    .map_err(TaskError::provider)?;
  kind.observed(&object);
  Ok(())
}

pub(crate) async fn delete<K: CloudKind, C: CloudApi>(kind: &K, cloud: &C) -> Result<(), TaskError> {
  let id = kind.id().require(kind, "id")?;
  cloud
    .delete(K::OBJECT, &id)
    .await
    .map_err(TaskError::provider)?;
  kind.id().clear();
  Ok(())
}

/// Provider id of a referenced object, if the reference is bound and the
/// object has been found or created.
pub(crate) fn id_of<T: CloudKind>(reference: Option<&TaskRef<T>>) -> Option<String> {
  reference?.get()?.id().get()
}

/// Like [`id_of`] for a reference that is set, but an error when the id is
/// not known.
pub(crate) fn require_id<T: CloudKind>(
  reference: Option<&TaskRef<T>>,
  field: &'static str,
) -> Result<(), TaskError> {
  if let Some(reference) = reference {
    let target = reference.require(field)?;
    target.id().require(&**target, "id")?;
  }
  Ok(())
}
