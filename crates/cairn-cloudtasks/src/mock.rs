//! In-memory [`CloudApi`] with referential checks, call recording, failure
//! injection and an optional JSON state file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::api::{CloudApi, CloudError, CloudObject, ObjectType, Spec};

/// Attributes the provider sets itself; preserved across modify.
const PROVIDER_ATTRIBUTES: &[&str] = &["publicIp", "privateIp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
  Describe,
  Create,
  Modify,
  Delete,
}

/// One recorded API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
  pub operation: Operation,
  pub object_type: ObjectType,
  /// Name for describe and create, id for modify and delete.
  pub target: String,
}

#[derive(Debug, Error)]
pub enum StateFileError {
  #[error("failed to access state file {}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid state file {}", .path.display())]
  Json {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredObject {
  object_type: ObjectType,
  #[serde(flatten)]
  object: CloudObject,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MockState {
  next_id: u64,
  objects: BTreeMap<String, StoredObject>,
}

#[derive(Debug, Clone)]
struct Failure {
  operation: Operation,
  name: String,
  message: String,
}

#[derive(Debug, Default)]
pub struct MockCloud {
  state: Mutex<MockState>,
  calls: Mutex<Vec<Call>>,
  failures: Mutex<Vec<Failure>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Every id referenced from a spec, with the field it came from.
fn referenced_ids(spec: &Spec) -> Vec<(&str, &str)> {
  let mut ids = Vec::new();
  for (field, value) in spec {
    if field.ends_with("Ids") {
      if let Value::Array(items) = value {
        ids.extend(items.iter().filter_map(Value::as_str).map(|id| (field.as_str(), id)));
      }
    } else if field.ends_with("Id")
      && let Some(id) = value.as_str()
    {
      ids.push((field.as_str(), id));
    }
  }
  ids
}

impl MockCloud {
  pub fn new() -> Self {
    Self::default()
  }

  /// Load state from `path`; a missing file is an empty cloud.
  pub async fn load(path: &Path) -> Result<Self, StateFileError> {
    let bytes = match tokio::fs::read(path).await {
      Ok(bytes) => bytes,
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
      Err(source) => {
        return Err(StateFileError::Io {
          path: path.to_path_buf(),
          source,
        });
      }
    };
    let state: MockState = serde_json::from_slice(&bytes).map_err(|source| StateFileError::Json {
      path: path.to_path_buf(),
      source,
    })?;
    Ok(Self {
      state: Mutex::new(state),
      ..Self::default()
    })
  }

  pub async fn save(&self, path: &Path) -> Result<(), StateFileError> {
    let bytes = {
      let state = lock(&self.state);
      serde_json::to_vec_pretty(&*state).map_err(|source| StateFileError::Json {
        path: path.to_path_buf(),
        source,
      })?
    };
    tokio::fs::write(path, bytes)
      .await
      .map_err(|source| StateFileError::Io {
        path: path.to_path_buf(),
        source,
      })
  }

  /// Make every `operation` on the object named `name` fail with `message`.
  pub fn fail_on(&self, operation: Operation, name: impl Into<String>, message: impl Into<String>) {
    lock(&self.failures).push(Failure {
      operation,
      name: name.into(),
      message: message.into(),
    });
  }

  pub fn clear_failures(&self) {
    lock(&self.failures).clear();
  }

  /// Add an object directly, bypassing reference checks.
  pub fn insert(&self, object_type: ObjectType, name: &str, spec: Spec) -> CloudObject {
    let mut state = lock(&self.state);
    let object = CloudObject {
      id: Self::next_id(&mut state, object_type),
      name: name.to_string(),
      spec,
    };
    state.objects.insert(
      object.id.clone(),
      StoredObject {
        object_type,
        object: object.clone(),
      },
    );
    object
  }

  pub fn objects(&self, object_type: ObjectType) -> Vec<CloudObject> {
    lock(&self.state)
      .objects
      .values()
      .filter(|stored| stored.object_type == object_type)
      .map(|stored| stored.object.clone())
      .collect()
  }

  pub fn object_count(&self) -> usize {
    lock(&self.state).objects.len()
  }

  pub fn calls(&self) -> Vec<Call> {
    lock(&self.calls).clone()
  }

  pub fn clear_calls(&self) {
    lock(&self.calls).clear();
  }

  /// Number of recorded create, modify and delete calls.
  pub fn mutation_count(&self) -> usize {
    lock(&self.calls)
      .iter()
      .filter(|call| call.operation != Operation::Describe)
      .count()
  }

  fn record(&self, operation: Operation, object_type: ObjectType, target: &str) {
    lock(&self.calls).push(Call {
      operation,
      object_type,
      target: target.to_string(),
    });
  }

  fn injected(&self, operation: Operation, name: &str) -> Result<(), CloudError> {
    let failures = lock(&self.failures);
    match failures
      .iter()
      .find(|f| f.operation == operation && f.name == name)
    {
      Some(failure) => Err(CloudError::Rejected {
        message: failure.message.clone(),
      }),
      None => Ok(()),
    }
  }

  fn next_id(state: &mut MockState, object_type: ObjectType) -> String {
    state.next_id += 1;
    format!("{}-{:06}", object_type.id_prefix(), state.next_id)
  }

  fn check_references(state: &MockState, spec: &Spec) -> Result<(), CloudError> {
    for (field, id) in referenced_ids(spec) {
      if !state.objects.contains_key(id) {
        return Err(CloudError::InvalidReference {
          field: field.to_string(),
          id: id.to_string(),
        });
      }
    }
    Ok(())
  }

  fn name_of(&self, id: &str) -> Option<String> {
    lock(&self.state)
      .objects
      .get(id)
      .map(|stored| stored.object.name.clone())
  }
}

#[async_trait]
impl CloudApi for MockCloud {
  async fn describe(
    &self,
    object_type: ObjectType,
    name: &str,
  ) -> Result<Vec<CloudObject>, CloudError> {
    self.record(Operation::Describe, object_type, name);
    self.injected(Operation::Describe, name)?;
    Ok(
      lock(&self.state)
        .objects
        .values()
        .filter(|stored| stored.object_type == object_type && stored.object.name == name)
        .map(|stored| stored.object.clone())
        .collect(),
    )
  }

  async fn create(
    &self,
    object_type: ObjectType,
    name: &str,
    mut spec: Spec,
  ) -> Result<CloudObject, CloudError> {
    self.record(Operation::Create, object_type, name);
    self.injected(Operation::Create, name)?;

    let mut state = lock(&self.state);
    Self::check_references(&state, &spec)?;
    let id = Self::next_id(&mut state, object_type);
    match object_type {
      ObjectType::ElasticIp => {
        let address = format!("203.0.113.{}", state.next_id % 250 + 1);
        spec.insert("publicIp".into(), Value::String(address));
      }
      ObjectType::Instance => {
        let address = format!("10.0.0.{}", state.next_id % 250 + 1);
        spec.insert("privateIp".into(), Value::String(address));
      }
      _ => {}
    }
    let object = CloudObject {
      id: id.clone(),
      name: name.to_string(),
      spec,
    };
    debug!(%object_type, %id, name, "created");
    state.objects.insert(
      id,
      StoredObject {
        object_type,
        object: object.clone(),
      },
    );
    Ok(object)
  }

  async fn modify(
    &self,
    object_type: ObjectType,
    id: &str,
    mut spec: Spec,
  ) -> Result<CloudObject, CloudError> {
    self.record(Operation::Modify, object_type, id);
    if let Some(name) = self.name_of(id) {
      self.injected(Operation::Modify, &name)?;
    }

    let mut state = lock(&self.state);
    Self::check_references(&state, &spec)?;
    let stored = state
      .objects
      .get_mut(id)
      .filter(|stored| stored.object_type == object_type)
      .ok_or_else(|| CloudError::NotFound {
        object_type,
        id: id.to_string(),
      })?;
    for attribute in PROVIDER_ATTRIBUTES {
      if let Some(value) = stored.object.spec.get(*attribute) {
        spec.insert(attribute.to_string(), value.clone());
      }
    }
    stored.object.spec = spec;
    debug!(%object_type, id, "modified");
    Ok(stored.object.clone())
  }

  async fn delete(&self, object_type: ObjectType, id: &str) -> Result<(), CloudError> {
    self.record(Operation::Delete, object_type, id);
    if let Some(name) = self.name_of(id) {
      self.injected(Operation::Delete, &name)?;
    }

    let mut state = lock(&self.state);
    if !state
      .objects
      .get(id)
      .is_some_and(|stored| stored.object_type == object_type)
    {
      return Err(CloudError::NotFound {
        object_type,
        id: id.to_string(),
      });
    }
    let dependents: Vec<String> = state
      .objects
      .values()
      .filter(|stored| {
        referenced_ids(&stored.object.spec)
          .iter()
          .any(|(_, referenced)| *referenced == id)
      })
      .map(|stored| stored.object.id.clone())
      .collect();
    if !dependents.is_empty() {
      return Err(CloudError::DependencyViolation {
        object_type,
        id: id.to_string(),
        dependents,
      });
    }
    state.objects.remove(id);
    debug!(%object_type, id, "deleted");
    Ok(())
  }
}
