use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Delta, Field, TaskError, TaskKey, TaskMap};

/// Name accessors shared by every task kind.
pub trait HasName {
  fn name(&self) -> Option<&str>;
  fn set_name(&mut self, name: String);
}

/// Static description of a task kind: its tag, its reference fields and its
/// explicit dependencies. Implemented by every task struct.
pub trait TaskKind: HasName + fmt::Debug + fmt::Display + Send + Sync + 'static {
  /// Kind tag, unique across the registry (`vpc`, `subnet`, `file`, ...).
  const KIND: &'static str;

  /// Every field holding a reference to another task.
  fn reference_fields(&self) -> Vec<Field<'_>> {
    Vec::new()
  }

  /// Dependencies declared by key rather than through a reference field.
  fn depends_on(&self) -> Vec<TaskKey> {
    Vec::new()
  }
}

/// How render should treat the difference between observed and desired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Lifecycle {
  /// Converge: create what is missing, update what differs.
  #[default]
  Apply,
  /// Compute deltas without calling the provider's mutating API.
  DryRun,
  /// Delete what exists, dependents first.
  Destroy,
}

impl fmt::Display for Lifecycle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Lifecycle::Apply => "apply",
      Lifecycle::DryRun => "dry-run",
      Lifecycle::Destroy => "destroy",
    })
  }
}

/// Per-run context handed to every render call.
pub struct Context<C> {
  cloud: Arc<C>,
  lifecycle: Lifecycle,
  run_id: String,
}

impl<C> Context<C> {
  pub fn new(cloud: Arc<C>, lifecycle: Lifecycle, run_id: impl Into<String>) -> Self {
    Self {
      cloud,
      lifecycle,
      run_id: run_id.into(),
    }
  }

  pub fn cloud(&self) -> &C {
    &self.cloud
  }

  pub fn lifecycle(&self) -> Lifecycle {
    self.lifecycle
  }

  pub fn run_id(&self) -> &str {
    &self.run_id
  }
}

impl<C> Clone for Context<C> {
  fn clone(&self) -> Self {
    Self {
      cloud: self.cloud.clone(),
      lifecycle: self.lifecycle,
      run_id: self.run_id.clone(),
    }
  }
}

/// Result of a successful find: the object is absent, or present with the
/// kind's observed state inside.
pub enum Observation {
  Missing,
  Found(Box<dyn Any + Send + Sync>),
}

impl Observation {
  pub fn found<S: Any + Send + Sync>(state: S) -> Self {
    Observation::Found(Box::new(state))
  }

  pub fn is_found(&self) -> bool {
    matches!(self, Observation::Found(_))
  }
}

impl fmt::Debug for Observation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Observation::Missing => f.write_str("Missing"),
      Observation::Found(_) => f.write_str("Found(..)"),
    }
  }
}

/// A unit of desired state the engine can discover and converge.
///
/// Every [`Resource`](crate::Resource) is a `Task` through a blanket impl; the
/// engine, resolver and graph only ever see `Arc<dyn Task<C>>`.
#[async_trait]
pub trait Task<C>: HasName + fmt::Debug + fmt::Display + Send + Sync
where
  C: Send + Sync + 'static,
{
  fn kind(&self) -> &'static str;

  fn key(&self) -> Option<TaskKey> {
    self.name().map(|name| TaskKey::new(self.kind(), name))
  }

  fn references(&self) -> Vec<Field<'_>>;

  /// Dependencies that do not come from reference fields: explicit keys
  /// and anything found by scanning the task map.
  fn extra_dependencies(&self, _tasks: &TaskMap<C>) -> Vec<TaskKey> {
    Vec::new()
  }

  /// All tasks that must finish before this one starts, sorted and
  /// deduplicated. Unresolved references contribute nothing.
  fn dependencies(&self, tasks: &TaskMap<C>) -> Vec<TaskKey> {
    let mut deps: Vec<TaskKey> = self
      .references()
      .iter()
      .filter_map(|field| field.reference.resolved_key())
      .collect();
    deps.extend(self.extra_dependencies(tasks));
    deps.sort();
    deps.dedup();
    deps
  }

  /// Look the task's object up in the provider.
  async fn find(&self, cloud: &C) -> Result<Observation, TaskError>;

  /// Converge towards desired state given what find observed.
  async fn render(&self, ctx: &Context<C>, observed: Observation) -> Result<Delta, TaskError>;

  fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

#[doc(hidden)]
pub fn display_task(f: &mut fmt::Formatter<'_>, kind: &str, name: Option<&str>) -> fmt::Result {
  match name {
    Some(name) => write!(f, "{kind}:{name}"),
    None => write!(f, "{kind}:<unnamed>"),
  }
}
