use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::{
  Change, Context, Delta, Field, Lifecycle, Observation, Task, TaskError, TaskKey, TaskKind,
  TaskMap,
};

/// A task backed by a provider object.
///
/// Kinds describe how to compute desired state, how to look the object up
/// and how to create, update and delete it. The shared diff policy in the
/// blanket [`Task`] impl decides which of those calls to make:
///
/// | observed | lifecycle | call |
/// |---|---|---|
/// | missing | apply | `create` |
/// | found, equal | apply | none |
/// | found, different | apply | `update` with the changed fields |
/// | any | dry-run | none, delta reported |
/// | found | destroy | `delete` |
/// | missing | destroy | none |
#[async_trait]
pub trait Resource<C>: TaskKind
where
  C: Send + Sync + 'static,
{
  /// Comparable projection of the object. Fields skipped by serde are not
  /// diffed.
  type State: Serialize + fmt::Debug + Send + Sync + 'static;

  fn desired(&self) -> Result<Self::State, TaskError>;

  /// Dependencies discovered by scanning the other tasks in the map.
  fn dependencies_in(&self, _tasks: &TaskMap<C>) -> Vec<TaskKey> {
    Vec::new()
  }

  /// `Ok(None)` only for a definite "does not exist". Failed lookups
  /// return an error and more than one match returns
  /// [`TaskError::Ambiguous`].
  async fn find(&self, cloud: &C) -> Result<Option<Self::State>, TaskError>;

  /// Reject changes that cannot be applied in place.
  fn check_changes(
    &self,
    _actual: Option<&Self::State>,
    _desired: &Self::State,
    _changes: &[Change],
  ) -> Result<(), TaskError> {
    Ok(())
  }

  async fn create(&self, cloud: &C, desired: &Self::State) -> Result<(), TaskError>;

  async fn update(
    &self,
    cloud: &C,
    actual: &Self::State,
    desired: &Self::State,
    changes: &[Change],
  ) -> Result<(), TaskError>;

  async fn delete(&self, cloud: &C, actual: &Self::State) -> Result<(), TaskError>;
}

#[async_trait]
impl<C, R> Task<C> for R
where
  C: Send + Sync + 'static,
  R: Resource<C>,
{
  fn kind(&self) -> &'static str {
    R::KIND
  }

  fn references(&self) -> Vec<Field<'_>> {
    TaskKind::reference_fields(self)
  }

  fn extra_dependencies(&self, tasks: &TaskMap<C>) -> Vec<TaskKey> {
    let mut deps = TaskKind::depends_on(self);
    deps.extend(<R as Resource<C>>::dependencies_in(self, tasks));
    deps
  }

  async fn find(&self, cloud: &C) -> Result<Observation, TaskError> {
    match <R as Resource<C>>::find(self, cloud).await {
      Ok(Some(state)) => Ok(Observation::found(state)),
      Ok(None) => Ok(Observation::Missing),
      Err(TaskError::Provider { source }) => Err(TaskError::Discovery { source }),
      Err(err) => Err(err),
    }
  }

  async fn render(&self, ctx: &Context<C>, observed: Observation) -> Result<Delta, TaskError> {
    let key = self.key().ok_or(TaskError::Unnamed { kind: R::KIND })?;
    let actual = match observed {
      Observation::Missing => None,
      Observation::Found(state) => Some(
        *state
          .downcast::<<R as Resource<C>>::State>()
          .map_err(|_| TaskError::StateMismatch { expected: R::KIND })?,
      ),
    };

    if ctx.lifecycle() == Lifecycle::Destroy {
      let Some(actual) = actual else {
        return Ok(Delta::none(key));
      };
      let mut delta = Delta::delete(key, &actual)?;
      <R as Resource<C>>::delete(self, ctx.cloud(), &actual).await?;
      delta.applied = true;
      return Ok(delta);
    }

    let desired = <R as Resource<C>>::desired(self)?;
    let mut delta = Delta::compute(key, actual.as_ref(), &desired)?;
    if delta.is_noop() {
      return Ok(delta);
    }
    <R as Resource<C>>::check_changes(self, actual.as_ref(), &desired, &delta.changes)?;

    if ctx.lifecycle() == Lifecycle::DryRun {
      debug!(task = %delta.task, action = ?delta.action, "planned");
      return Ok(delta);
    }

    match &actual {
      None => <R as Resource<C>>::create(self, ctx.cloud(), &desired).await?,
      Some(actual) => {
        <R as Resource<C>>::update(self, ctx.cloud(), actual, &desired, &delta.changes).await?
      }
    }
    delta.applied = true;
    Ok(delta)
  }

  fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
    self
  }
}
