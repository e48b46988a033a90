use cairn_loader::TaskType;

use crate::api::CloudApi;
use crate::compute::Instance;
use crate::dns::{DnsName, DnsZone};
use crate::iam::{IamInstanceProfile, IamRole, IamRolePolicy};
use crate::network::{
  ElasticIp, InternetGateway, NatGateway, Route, RouteTable, SecurityGroup, Subnet, Vpc,
};

/// Every cloud task kind, keyed by the alias model documents use for it.
pub fn cloud_types<C: CloudApi>() -> Vec<(&'static str, TaskType<C>)> {
  vec![
    ("vpc", TaskType::of::<Vpc>()),
    ("subnet", TaskType::of::<Subnet>()),
    ("internetGateway", TaskType::of::<InternetGateway>()),
    ("routeTable", TaskType::of::<RouteTable>()),
    ("route", TaskType::of::<Route>()),
    ("securityGroup", TaskType::of::<SecurityGroup>()),
    ("elasticIP", TaskType::of::<ElasticIp>()),
    ("natGateway", TaskType::of::<NatGateway>()),
    ("ngw", TaskType::of::<NatGateway>()),
    ("iamRole", TaskType::of::<IamRole>()),
    ("iamRolePolicy", TaskType::of::<IamRolePolicy>()),
    ("iamInstanceProfile", TaskType::of::<IamInstanceProfile>()),
    ("instance", TaskType::of::<Instance>()),
    ("dnsZone", TaskType::of::<DnsZone>()),
    ("dnsName", TaskType::of::<DnsName>()),
  ]
}
