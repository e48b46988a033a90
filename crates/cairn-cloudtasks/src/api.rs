use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Attributes of a provider object. Fields holding the id of another object
/// end in `Id` (or `Ids` for lists).
pub type Spec = serde_json::Map<String, serde_json::Value>;

/// Provider object types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ObjectType {
  Vpc,
  Subnet,
  InternetGateway,
  RouteTable,
  Route,
  SecurityGroup,
  IamRole,
  IamRolePolicy,
  IamInstanceProfile,
  ElasticIp,
  NatGateway,
  Instance,
  DnsZone,
  DnsRecord,
}

impl ObjectType {
  /// Prefix of ids assigned to objects of this type.
  pub fn id_prefix(self) -> &'static str {
    match self {
      ObjectType::Vpc => "vpc",
      ObjectType::Subnet => "subnet",
      ObjectType::InternetGateway => "igw",
      ObjectType::RouteTable => "rtb",
      ObjectType::Route => "r",
      ObjectType::SecurityGroup => "sg",
      ObjectType::IamRole => "role",
      ObjectType::IamRolePolicy => "policy",
      ObjectType::IamInstanceProfile => "profile",
      ObjectType::ElasticIp => "eipalloc",
      ObjectType::NatGateway => "nat",
      ObjectType::Instance => "i",
      ObjectType::DnsZone => "zone",
      ObjectType::DnsRecord => "record",
    }
  }
}

impl fmt::Display for ObjectType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let text = serde_json::to_value(self)
      .ok()
      .and_then(|v| v.as_str().map(str::to_string))
      .unwrap_or_default();
    f.write_str(&text)
  }
}

/// A provider object as described by the cloud.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudObject {
  pub id: String,
  /// Value of the object's Name tag; the identity tasks look objects up by.
  pub name: String,
  pub spec: Spec,
}

/// Errors returned by a [`CloudApi`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CloudError {
  #[error("{object_type} {id} does not exist")]
  NotFound { object_type: ObjectType, id: String },

  #[error("{object_type} {id} is still used by {}", .dependents.join(", "))]
  DependencyViolation {
    object_type: ObjectType,
    id: String,
    dependents: Vec<String>,
  },

  #[error("invalid reference {field}={id}")]
  InvalidReference { field: String, id: String },

  #[error("{message}")]
  Rejected { message: String },
}

/// Resource-oriented provider API the cloud task kinds are written against.
#[async_trait]
pub trait CloudApi: Send + Sync + 'static {
  /// Every object of `object_type` whose Name tag is `name`.
  async fn describe(
    &self,
    object_type: ObjectType,
    name: &str,
  ) -> Result<Vec<CloudObject>, CloudError>;

  async fn create(
    &self,
    object_type: ObjectType,
    name: &str,
    spec: Spec,
  ) -> Result<CloudObject, CloudError>;

  /// Replace the attributes of an existing object.
  async fn modify(
    &self,
    object_type: ObjectType,
    id: &str,
    spec: Spec,
  ) -> Result<CloudObject, CloudError>;

  async fn delete(&self, object_type: ObjectType, id: &str) -> Result<(), CloudError>;
}
