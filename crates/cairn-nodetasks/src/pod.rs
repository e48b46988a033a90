//! The subset of the Kubernetes pod schema static manifests use.

use std::collections::BTreeMap;

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pod {
  pub api_version: &'static str,
  pub kind: &'static str,
  pub metadata: ObjectMeta,
  pub spec: PodSpec,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
  pub name: String,
  pub namespace: String,
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub annotations: BTreeMap<String, String>,
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
  pub host_network: bool,
  pub containers: Vec<Container>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub volumes: Vec<Volume>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
  pub name: String,
  pub image: String,
  pub command: Vec<String>,
  pub resources: Resources,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub liveness_probe: Option<Probe>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub ports: Vec<ContainerPort>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub volume_mounts: Vec<VolumeMount>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Resources {
  pub requests: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Probe {
  pub http_get: HttpGet,
  pub initial_delay_seconds: u32,
  pub timeout_seconds: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct HttpGet {
  pub host: String,
  pub path: String,
  pub port: u16,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPort {
  pub name: String,
  pub container_port: u16,
  pub host_port: u16,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
  pub name: String,
  pub host_path: HostPath,
}

#[derive(Debug, Clone, Serialize)]
pub struct HostPath {
  pub path: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
  pub name: String,
  pub mount_path: String,
  #[serde(skip_serializing_if = "std::ops::Not::not")]
  pub read_only: bool,
}

impl Pod {
  pub fn new(name: &str, namespace: &str) -> Self {
    Self {
      api_version: "v1",
      kind: "Pod",
      metadata: ObjectMeta {
        name: name.to_string(),
        namespace: namespace.to_string(),
        ..Default::default()
      },
      spec: PodSpec::default(),
    }
  }

  /// Mount the host path `path` into `container` as volume `name`.
  pub fn add_host_path(&mut self, container: &mut Container, name: &str, path: &str, read_only: bool) {
    self.spec.volumes.push(Volume {
      name: name.to_string(),
      host_path: HostPath {
        path: path.to_string(),
      },
    });
    container.volume_mounts.push(VolumeMount {
      name: name.to_string(),
      mount_path: path.to_string(),
      read_only,
    });
  }
}
