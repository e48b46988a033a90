use cairn_task::{Field, Output, TaskError, TaskKind, TaskRef, define_task};
use serde::{Deserialize, Serialize};

use crate::api::ObjectType;
use crate::network::{ElasticIp, Vpc};
use crate::object::{CloudKind, cloud_resource, id_of, require_id};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DnsZone {
  pub name: Option<String>,
  pub dns_name: Option<String>,
  #[serde(default)]
  pub private: bool,
  /// VPC a private zone is attached to.
  pub vpc: Option<TaskRef<Vpc>>,
  #[serde(skip)]
  pub id: Output<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DnsZoneState {
  pub dns_name: Option<String>,
  pub private: bool,
  pub vpc_id: Option<String>,
}

impl TaskKind for DnsZone {
  const KIND: &'static str = "dnsZone";

  fn reference_fields(&self) -> Vec<Field<'_>> {
    self.vpc.iter().map(|r| Field::new("vpc", r)).collect()
  }
}

define_task!(DnsZone);

impl CloudKind for DnsZone {
  const OBJECT: ObjectType = ObjectType::DnsZone;
  const IMMUTABLE: &'static [&'static str] = &["dnsName", "private"];
  type State = DnsZoneState;

  fn id(&self) -> &Output<String> {
    &self.id
  }

  fn state(&self) -> Result<DnsZoneState, TaskError> {
    Ok(DnsZoneState {
      dns_name: self.dns_name.clone(),
      private: self.private,
      vpc_id: id_of(self.vpc.as_ref()),
    })
  }

  fn check_ready(&self) -> Result<(), TaskError> {
    require_id(self.vpc.as_ref(), "vpc")
  }
}

cloud_resource!(DnsZone);

/// A record set in a zone. The task name is the record name.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DnsName {
  pub name: Option<String>,
  pub zone: Option<TaskRef<DnsZone>>,
  #[serde(default = "DnsName::default_record_type")]
  pub record_type: String,
  #[serde(default)]
  pub values: Vec<String>,
  /// Adds the address of an elastic IP to the record's values.
  pub elastic_ip: Option<TaskRef<ElasticIp>>,
  pub ttl: Option<u32>,
  #[serde(skip)]
  pub id: Output<String>,
}

impl DnsName {
  fn default_record_type() -> String {
    "A".to_string()
  }

  fn elastic_ip_address(&self) -> Option<String> {
    self.elastic_ip.as_ref()?.get()?.public_ip.get()
  }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DnsNameState {
  pub zone_id: Option<String>,
  pub record_type: String,
  pub values: Vec<String>,
  pub ttl: Option<u32>,
}

impl TaskKind for DnsName {
  const KIND: &'static str = "dnsName";

  fn reference_fields(&self) -> Vec<Field<'_>> {
    let mut fields: Vec<Field<'_>> = Vec::new();
    if let Some(zone) = &self.zone {
      fields.push(Field::new("zone", zone));
    }
    if let Some(eip) = &self.elastic_ip {
      fields.push(Field::new("elasticIp", eip));
    }
    fields
  }
}

define_task!(DnsName);

impl CloudKind for DnsName {
  const OBJECT: ObjectType = ObjectType::DnsRecord;
  const IMMUTABLE: &'static [&'static str] = &["zoneId", "recordType"];
  type State = DnsNameState;

  fn id(&self) -> &Output<String> {
    &self.id
  }

  fn state(&self) -> Result<DnsNameState, TaskError> {
    let mut values = self.values.clone();
    values.extend(self.elastic_ip_address());
    values.sort();
    values.dedup();
    Ok(DnsNameState {
      zone_id: id_of(self.zone.as_ref()),
      record_type: self.record_type.clone(),
      values,
      ttl: self.ttl,
    })
  }

  fn check_ready(&self) -> Result<(), TaskError> {
    require_id(self.zone.as_ref(), "zone")?;
    if let Some(eip) = &self.elastic_ip {
      let target = eip.require("elasticIp")?;
      target.public_ip.require(&**target, "publicIp")?;
    }
    Ok(())
  }
}

cloud_resource!(DnsName);
