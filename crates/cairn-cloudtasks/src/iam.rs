use cairn_task::{Field, Output, TaskError, TaskKind, TaskRef, define_task};
use serde::{Deserialize, Serialize};

use crate::api::ObjectType;
use crate::object::{CloudKind, cloud_resource, id_of, require_id};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IamRole {
  pub name: Option<String>,
  /// Trust policy, as a JSON document.
  pub role_policy_document: Option<String>,
  #[serde(skip)]
  pub id: Output<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IamRoleState {
  pub role_policy_document: Option<String>,
}

impl TaskKind for IamRole {
  const KIND: &'static str = "iamRole";
}

define_task!(IamRole);

impl CloudKind for IamRole {
  const OBJECT: ObjectType = ObjectType::IamRole;
  type State = IamRoleState;

  fn id(&self) -> &Output<String> {
    &self.id
  }

  fn state(&self) -> Result<IamRoleState, TaskError> {
    Ok(IamRoleState {
      role_policy_document: self.role_policy_document.clone(),
    })
  }
}

cloud_resource!(IamRole);

/// Inline permissions policy attached to a role.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IamRolePolicy {
  pub name: Option<String>,
  pub role: Option<TaskRef<IamRole>>,
  pub policy_document: Option<String>,
  #[serde(skip)]
  pub id: Output<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IamRolePolicyState {
  pub role_id: Option<String>,
  pub policy_document: Option<String>,
}

impl TaskKind for IamRolePolicy {
  const KIND: &'static str = "iamRolePolicy";

  fn reference_fields(&self) -> Vec<Field<'_>> {
    self.role.iter().map(|r| Field::new("role", r)).collect()
  }
}

define_task!(IamRolePolicy);

impl CloudKind for IamRolePolicy {
  const OBJECT: ObjectType = ObjectType::IamRolePolicy;
  const IMMUTABLE: &'static [&'static str] = &["roleId"];
  type State = IamRolePolicyState;

  fn id(&self) -> &Output<String> {
    &self.id
  }

  fn state(&self) -> Result<IamRolePolicyState, TaskError> {
    Ok(IamRolePolicyState {
      role_id: id_of(self.role.as_ref()),
      policy_document: self.policy_document.clone(),
    })
  }

  fn check_ready(&self) -> Result<(), TaskError> {
    require_id(self.role.as_ref(), "role")
  }
}

cloud_resource!(IamRolePolicy);

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IamInstanceProfile {
  pub name: Option<String>,
  pub role: Option<TaskRef<IamRole>>,
  #[serde(skip)]
  pub id: Output<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IamInstanceProfileState {
  pub role_id: Option<String>,
}

impl TaskKind for IamInstanceProfile {
  const KIND: &'static str = "iamInstanceProfile";

  fn reference_fields(&self) -> Vec<Field<'_>> {
    self.role.iter().map(|r| Field::new("role", r)).collect()
  }
}

define_task!(IamInstanceProfile);

impl CloudKind for IamInstanceProfile {
  const OBJECT: ObjectType = ObjectType::IamInstanceProfile;
  type State = IamInstanceProfileState;

  fn id(&self) -> &Output<String> {
    &self.id
  }

  fn state(&self) -> Result<IamInstanceProfileState, TaskError> {
    Ok(IamInstanceProfileState {
      role_id: id_of(self.role.as_ref()),
    })
  }

  fn check_ready(&self) -> Result<(), TaskError> {
    require_id(self.role.as_ref(), "role")
  }
}

cloud_resource!(IamInstanceProfile);
