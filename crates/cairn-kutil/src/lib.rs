//! Client-side Kubernetes helpers: maintain kubeconfig entries for a cluster
//! and drive `kubectl`.

mod error;
mod kubeconfig;
mod kubectl;

pub use error::{KubeconfigError, KubectlError};
pub use kubeconfig::{
  Cluster, Context, Kubeconfig, KubeconfigBuilder, NamedCluster, NamedContext, NamedUser, User,
  default_kubeconfig_path,
};
pub use kubectl::{
  Kubectl, KubectlCluster, KubectlClusterWithName, KubectlConfig, KubectlContext,
  KubectlContextWithName, KubectlUser, KubectlUserWithName,
};
