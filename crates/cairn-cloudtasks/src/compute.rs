use cairn_task::{Field, Output, TaskError, TaskKey, TaskKind, TaskMap, TaskRef, define_task};
use serde::{Deserialize, Serialize};

use crate::api::{CloudApi, CloudObject, ObjectType};
use crate::iam::{IamInstanceProfile, IamRolePolicy};
use crate::network::{SecurityGroup, Subnet, Tags};
use crate::object::{CloudKind, cloud_resource, id_of, require_id};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Instance {
  pub name: Option<String>,
  pub subnet: Option<TaskRef<Subnet>>,
  pub image_id: Option<String>,
  pub instance_type: Option<String>,
  #[serde(default)]
  pub security_groups: Vec<TaskRef<SecurityGroup>>,
  pub iam_instance_profile: Option<TaskRef<IamInstanceProfile>>,
  pub user_data: Option<String>,
  #[serde(default)]
  pub associate_public_ip: bool,
  #[serde(default)]
  pub tags: Tags,
  #[serde(default)]
  pub depends_on: Vec<TaskKey>,
  #[serde(skip)]
  pub id: Output<String>,
  #[serde(skip)]
  pub private_ip: Output<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstanceState {
  pub subnet_id: Option<String>,
  pub image_id: Option<String>,
  pub instance_type: Option<String>,
  pub security_group_ids: Vec<String>,
  pub instance_profile_id: Option<String>,
  pub user_data: Option<String>,
  pub associate_public_ip: bool,
  pub tags: Tags,
}

impl TaskKind for Instance {
  const KIND: &'static str = "instance";

  fn reference_fields(&self) -> Vec<Field<'_>> {
    let mut fields: Vec<Field<'_>> = Vec::new();
    if let Some(subnet) = &self.subnet {
      fields.push(Field::new("subnet", subnet));
    }
    for group in &self.security_groups {
      fields.push(Field::new("securityGroups", group));
    }
    if let Some(profile) = &self.iam_instance_profile {
      fields.push(Field::new("iamInstanceProfile", profile));
    }
    fields
  }

  fn depends_on(&self) -> Vec<TaskKey> {
    self.depends_on.clone()
  }
}

define_task!(Instance);

impl CloudKind for Instance {
  const OBJECT: ObjectType = ObjectType::Instance;
  const IMMUTABLE: &'static [&'static str] = &["subnetId", "imageId", "userData"];
  type State = InstanceState;

  fn id(&self) -> &Output<String> {
    &self.id
  }

  fn state(&self) -> Result<InstanceState, TaskError> {
    Ok(InstanceState {
      subnet_id: id_of(self.subnet.as_ref()),
      image_id: self.image_id.clone(),
      instance_type: self.instance_type.clone(),
      security_group_ids: self
        .security_groups
        .iter()
        .filter_map(|group| id_of(Some(group)))
        .collect(),
      instance_profile_id: id_of(self.iam_instance_profile.as_ref()),
      user_data: self.user_data.clone(),
      associate_public_ip: self.associate_public_ip,
      tags: self.tags.clone(),
    })
  }

  fn check_ready(&self) -> Result<(), TaskError> {
    require_id(self.subnet.as_ref(), "subnet")?;
    for group in &self.security_groups {
      require_id(Some(group), "securityGroups")?;
    }
    require_id(self.iam_instance_profile.as_ref(), "iamInstanceProfile")
  }

  fn observed(&self, object: &CloudObject) {
    if let Some(ip) = object.spec.get("privateIp").and_then(|v| v.as_str()) {
      self.private_ip.set(ip.to_string());
    }
  }

  /// An instance must not boot before the policies of its profile's role
  /// exist, although nothing in the instance refers to them.
  fn scan<C: CloudApi>(&self, tasks: &TaskMap<C>) -> Vec<TaskKey> {
    let Some(role) = self
      .iam_instance_profile
      .as_ref()
      .and_then(|profile| profile.get())
      .and_then(|profile| profile.role.as_ref())
    else {
      return Vec::new();
    };
    tasks
      .of_kind::<IamRolePolicy>()
      .iter()
      .filter(|policy| policy.role.as_ref().is_some_and(|r| r.name() == role.name()))
      .filter_map(|policy| policy.name.as_deref())
      .map(|name| TaskKey::new(IamRolePolicy::KIND, name))
      .collect()
  }
}

cloud_resource!(Instance);
