use std::collections::BTreeMap;

use cairn_task::{AnyTaskRef, Field, KindSet, Output, TaskError, TaskKey, TaskKind, TaskRef, define_task};
use serde::{Deserialize, Serialize};

use crate::api::{CloudObject, ObjectType};
use crate::object::{CloudKind, cloud_resource, id_of, require_id};

pub type Tags = BTreeMap<String, String>;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Vpc {
  pub name: Option<String>,
  pub cidr: Option<String>,
  #[serde(default)]
  pub enable_dns_hostnames: bool,
  #[serde(default)]
  pub enable_dns_support: bool,
  #[serde(default)]
  pub tags: Tags,
  #[serde(skip)]
  pub id: Output<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VpcState {
  pub cidr: Option<String>,
  pub enable_dns_hostnames: bool,
  pub enable_dns_support: bool,
  pub tags: Tags,
}

impl TaskKind for Vpc {
  const KIND: &'static str = "vpc";
}

define_task!(Vpc);

impl CloudKind for Vpc {
  const OBJECT: ObjectType = ObjectType::Vpc;
  const IMMUTABLE: &'static [&'static str] = &["cidr"];
  type State = VpcState;

  fn id(&self) -> &Output<String> {
    &self.id
  }

  fn state(&self) -> Result<VpcState, TaskError> {
    Ok(VpcState {
      cidr: self.cidr.clone(),
      enable_dns_hostnames: self.enable_dns_hostnames,
      enable_dns_support: self.enable_dns_support,
      tags: self.tags.clone(),
    })
  }
}

cloud_resource!(Vpc);

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Subnet {
  pub name: Option<String>,
  pub vpc: Option<TaskRef<Vpc>>,
  pub zone: Option<String>,
  pub cidr: Option<String>,
  #[serde(default)]
  pub tags: Tags,
  #[serde(skip)]
  pub id: Output<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubnetState {
  pub vpc_id: Option<String>,
  pub zone: Option<String>,
  pub cidr: Option<String>,
  pub tags: Tags,
}

impl TaskKind for Subnet {
  const KIND: &'static str = "subnet";

  fn reference_fields(&self) -> Vec<Field<'_>> {
    self.vpc.iter().map(|r| Field::new("vpc", r)).collect()
  }
}

define_task!(Subnet);

impl CloudKind for Subnet {
  const OBJECT: ObjectType = ObjectType::Subnet;
  const IMMUTABLE: &'static [&'static str] = &["vpcId", "zone", "cidr"];
  type State = SubnetState;

  fn id(&self) -> &Output<String> {
    &self.id
  }

  fn state(&self) -> Result<SubnetState, TaskError> {
    Ok(SubnetState {
      vpc_id: id_of(self.vpc.as_ref()),
      zone: self.zone.clone(),
      cidr: self.cidr.clone(),
      tags: self.tags.clone(),
    })
  }

  fn check_ready(&self) -> Result<(), TaskError> {
    require_id(self.vpc.as_ref(), "vpc")
  }
}

cloud_resource!(Subnet);

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InternetGateway {
  pub name: Option<String>,
  pub vpc: Option<TaskRef<Vpc>>,
  #[serde(default)]
  pub tags: Tags,
  #[serde(skip)]
  pub id: Output<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InternetGatewayState {
  pub vpc_id: Option<String>,
  pub tags: Tags,
}

impl TaskKind for InternetGateway {
  const KIND: &'static str = "internetGateway";

  fn reference_fields(&self) -> Vec<Field<'_>> {
    self.vpc.iter().map(|r| Field::new("vpc", r)).collect()
  }
}

define_task!(InternetGateway);

impl CloudKind for InternetGateway {
  const OBJECT: ObjectType = ObjectType::InternetGateway;
  type State = InternetGatewayState;

  fn id(&self) -> &Output<String> {
    &self.id
  }

  fn state(&self) -> Result<InternetGatewayState, TaskError> {
    Ok(InternetGatewayState {
      vpc_id: id_of(self.vpc.as_ref()),
      tags: self.tags.clone(),
    })
  }

  fn check_ready(&self) -> Result<(), TaskError> {
    require_id(self.vpc.as_ref(), "vpc")
  }
}

cloud_resource!(InternetGateway);

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RouteTable {
  pub name: Option<String>,
  pub vpc: Option<TaskRef<Vpc>>,
  #[serde(default)]
  pub tags: Tags,
  #[serde(skip)]
  pub id: Output<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RouteTableState {
  pub vpc_id: Option<String>,
  pub tags: Tags,
}

impl TaskKind for RouteTable {
  const KIND: &'static str = "routeTable";

  fn reference_fields(&self) -> Vec<Field<'_>> {
    self.vpc.iter().map(|r| Field::new("vpc", r)).collect()
  }
}

define_task!(RouteTable);

impl CloudKind for RouteTable {
  const OBJECT: ObjectType = ObjectType::RouteTable;
  const IMMUTABLE: &'static [&'static str] = &["vpcId"];
  type State = RouteTableState;

  fn id(&self) -> &Output<String> {
    &self.id
  }

  fn state(&self) -> Result<RouteTableState, TaskError> {
    Ok(RouteTableState {
      vpc_id: id_of(self.vpc.as_ref()),
      tags: self.tags.clone(),
    })
  }

  fn check_ready(&self) -> Result<(), TaskError> {
    require_id(self.vpc.as_ref(), "vpc")
  }
}

cloud_resource!(RouteTable);

/// Kinds a route may send traffic to.
#[derive(Debug)]
pub struct RouteTarget;

impl KindSet for RouteTarget {
  const KINDS: &'static [&'static str] = &[InternetGateway::KIND, NatGateway::KIND];
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Route {
  pub name: Option<String>,
  pub route_table: Option<TaskRef<RouteTable>>,
  pub cidr: Option<String>,
  /// An internet gateway or a NAT gateway.
  pub gateway: Option<AnyTaskRef<RouteTarget>>,
  #[serde(default)]
  pub depends_on: Vec<TaskKey>,
  #[serde(skip)]
  pub id: Output<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RouteState {
  pub route_table_id: Option<String>,
  pub cidr: Option<String>,
  pub gateway_id: Option<String>,
}

impl Route {
  fn gateway_id(&self) -> Option<String> {
    let gateway = self.gateway.as_ref()?;
    let kind = gateway.key()?.kind();
    if kind == InternetGateway::KIND {
      gateway.get::<InternetGateway>()?.id.get()
    } else if kind == NatGateway::KIND {
      gateway.get::<NatGateway>()?.id.get()
    } else {
      None
    }
  }
}

impl TaskKind for Route {
  const KIND: &'static str = "route";

  fn reference_fields(&self) -> Vec<Field<'_>> {
    let mut fields: Vec<Field<'_>> = Vec::new();
    if let Some(table) = &self.route_table {
      fields.push(Field::new("routeTable", table));
    }
    if let Some(gateway) = &self.gateway {
      fields.push(Field::new("gateway", gateway));
    }
    fields
  }

  fn depends_on(&self) -> Vec<TaskKey> {
    self.depends_on.clone()
  }
}

define_task!(Route);

impl CloudKind for Route {
  const OBJECT: ObjectType = ObjectType::Route;
  const IMMUTABLE: &'static [&'static str] = &["routeTableId", "cidr"];
  type State = RouteState;

  fn id(&self) -> &Output<String> {
    &self.id
  }

  fn state(&self) -> Result<RouteState, TaskError> {
    Ok(RouteState {
      route_table_id: id_of(self.route_table.as_ref()),
      cidr: self.cidr.clone(),
      gateway_id: self.gateway_id(),
    })
  }

  fn check_ready(&self) -> Result<(), TaskError> {
    require_id(self.route_table.as_ref(), "routeTable")?;
    if let Some(gateway) = &self.gateway {
      let key = gateway.require_key("gateway")?;
      if self.gateway_id().is_none() {
        return Err(TaskError::OutputUnknown {
          task: key.to_string(),
          output: "id",
        });
      }
    }
    Ok(())
  }
}

cloud_resource!(Route);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IngressRule {
  #[serde(default = "IngressRule::default_protocol")]
  pub protocol: String,
  pub from_port: u16,
  pub to_port: u16,
  pub cidr: String,
}

impl IngressRule {
  fn default_protocol() -> String {
    "tcp".to_string()
  }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SecurityGroup {
  pub name: Option<String>,
  pub vpc: Option<TaskRef<Vpc>>,
  pub description: Option<String>,
  #[serde(default)]
  pub ingress: Vec<IngressRule>,
  #[serde(default)]
  pub tags: Tags,
  #[serde(skip)]
  pub id: Output<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecurityGroupState {
  pub vpc_id: Option<String>,
  pub description: Option<String>,
  pub ingress: Vec<IngressRule>,
  pub tags: Tags,
}

impl TaskKind for SecurityGroup {
  const KIND: &'static str = "securityGroup";

  fn reference_fields(&self) -> Vec<Field<'_>> {
    self.vpc.iter().map(|r| Field::new("vpc", r)).collect()
  }
}

define_task!(SecurityGroup);

impl CloudKind for SecurityGroup {
  const OBJECT: ObjectType = ObjectType::SecurityGroup;
  const IMMUTABLE: &'static [&'static str] = &["vpcId", "description"];
  type State = SecurityGroupState;

  fn id(&self) -> &Output<String> {
    &self.id
  }

  fn state(&self) -> Result<SecurityGroupState, TaskError> {
    Ok(SecurityGroupState {
      vpc_id: id_of(self.vpc.as_ref()),
      description: self.description.clone(),
      ingress: self.ingress.clone(),
      tags: self.tags.clone(),
    })
  }

  fn check_ready(&self) -> Result<(), TaskError> {
    require_id(self.vpc.as_ref(), "vpc")
  }
}

cloud_resource!(SecurityGroup);

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ElasticIp {
  pub name: Option<String>,
  #[serde(default)]
  pub tags: Tags,
  #[serde(skip)]
  pub id: Output<String>,
  /// Address assigned by the provider.
  #[serde(skip)]
  pub public_ip: Output<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElasticIpState {
  pub tags: Tags,
}

impl TaskKind for ElasticIp {
  const KIND: &'static str = "elasticIP";
}

define_task!(ElasticIp);

impl CloudKind for ElasticIp {
  const OBJECT: ObjectType = ObjectType::ElasticIp;
  type State = ElasticIpState;

  fn id(&self) -> &Output<String> {
    &self.id
  }

  fn state(&self) -> Result<ElasticIpState, TaskError> {
    Ok(ElasticIpState {
      tags: self.tags.clone(),
    })
  }

  fn observed(&self, object: &CloudObject) {
    if let Some(ip) = object.spec.get("publicIp").and_then(|v| v.as_str()) {
      self.public_ip.set(ip.to_string());
    }
  }
}

cloud_resource!(ElasticIp);

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NatGateway {
  pub name: Option<String>,
  pub subnet: Option<TaskRef<Subnet>>,
  pub elastic_ip: Option<TaskRef<ElasticIp>>,
  #[serde(default)]
  pub tags: Tags,
  #[serde(skip)]
  pub id: Output<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NatGatewayState {
  pub subnet_id: Option<String>,
  pub allocation_id: Option<String>,
  pub tags: Tags,
}

impl TaskKind for NatGateway {
  const KIND: &'static str = "natGateway";

  fn reference_fields(&self) -> Vec<Field<'_>> {
    let mut fields: Vec<Field<'_>> = Vec::new();
    if let Some(subnet) = &self.subnet {
      fields.push(Field::new("subnet", subnet));
    }
    if let Some(eip) = &self.elastic_ip {
      fields.push(Field::new("elasticIp", eip));
    }
    fields
  }
}

define_task!(NatGateway);

impl CloudKind for NatGateway {
  const OBJECT: ObjectType = ObjectType::NatGateway;
  const IMMUTABLE: &'static [&'static str] = &["subnetId", "allocationId"];
  type State = NatGatewayState;

  fn id(&self) -> &Output<String> {
    &self.id
  }

  fn state(&self) -> Result<NatGatewayState, TaskError> {
    Ok(NatGatewayState {
      subnet_id: id_of(self.subnet.as_ref()),
      allocation_id: id_of(self.elastic_ip.as_ref()),
      tags: self.tags.clone(),
    })
  }

  fn check_ready(&self) -> Result<(), TaskError> {
    require_id(self.subnet.as_ref(), "subnet")?;
    require_id(self.elastic_ip.as_ref(), "elasticIp")
  }
}

cloud_resource!(NatGateway);

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_route_gateway_accepts_both_gateway_kinds() {
    assert_eq!(RouteTarget::KINDS, &["internetGateway", "natGateway"]);
  }

  #[test]
  fn test_route_decodes_explicit_dependencies() {
    let route: Route = serde_json::from_value(serde_json::json!({
      "name": "default",
      "routeTable": "main",
      "cidr": "0.0.0.0/0",
      "gateway": "main",
      "dependsOn": ["internetGateway:main"],
    }))
    .unwrap();
    assert_eq!(route.depends_on(), vec![TaskKey::new("internetGateway", "main")]);
    assert_eq!(route.reference_fields().len(), 2);
  }

  #[test]
  fn test_route_gateway_decodes_name_or_object() {
    let by_name: AnyTaskRef<RouteTarget> = serde_json::from_value(serde_json::json!("main")).unwrap();
    assert_eq!(by_name.name(), "main");

    let by_object: AnyTaskRef<RouteTarget> =
      serde_json::from_value(serde_json::json!({"name": "nat-a", "subnet": "a"})).unwrap();
    assert_eq!(by_object.name(), "nat-a");

    let err = serde_json::from_value::<AnyTaskRef<RouteTarget>>(serde_json::json!({"subnet": "a"}))
      .unwrap_err();
    assert!(err.to_string().contains("internetGateway, natGateway"), "{err}");
  }

  #[test]
  fn test_unknown_vpc_id_is_left_empty() {
    let subnet = Subnet {
      name: Some("a".into()),
      vpc: Some(TaskRef::named("main")),
      cidr: Some("10.0.1.0/24".into()),
      ..Default::default()
    };
    let state = subnet.state().unwrap();
    assert_eq!(state.vpc_id, None);
    assert!(matches!(
      subnet.check_ready(),
      Err(TaskError::Unresolved { field: "vpc", .. })
    ));
  }

  #[test]
  fn test_ingress_protocol_defaults_to_tcp() {
    let rule: IngressRule =
      serde_json::from_str(r#"{"fromPort": 443, "toPort": 443, "cidr": "0.0.0.0/0"}"#).unwrap();
    assert_eq!(rule.protocol, "tcp");
  }
}
