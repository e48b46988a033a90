//! Cloud task kinds: network, IAM, compute and DNS objects converged through
//! a [`CloudApi`], plus [`MockCloud`], an in-memory implementation of it.
//!
//! Every kind finds its object by Name tag and carries the provider id as an
//! output that dependent tasks read when they render.

mod api;
mod compute;
mod dns;
mod iam;
mod mock;
mod network;
mod object;
mod types;

pub use api::{CloudApi, CloudError, CloudObject, ObjectType, Spec};
pub use compute::{Instance, InstanceState};
pub use dns::{DnsName, DnsNameState, DnsZone, DnsZoneState};
pub use iam::{
  IamInstanceProfile, IamInstanceProfileState, IamRole, IamRolePolicy, IamRolePolicyState,
  IamRoleState,
};
pub use mock::{Call, MockCloud, Operation, StateFileError};
pub use network::{
  ElasticIp, ElasticIpState, IngressRule, InternetGateway, InternetGatewayState, NatGateway,
  NatGatewayState, Route, RouteState, RouteTable, RouteTableState, RouteTarget, SecurityGroup,
  SecurityGroupState, Subnet, SubnetState, Tags, Vpc, VpcState,
};
pub use types::cloud_types;
