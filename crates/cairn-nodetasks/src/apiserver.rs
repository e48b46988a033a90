use std::collections::BTreeMap;

use cairn_task::{BuildError, ModelBuilder, TaskMap};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::file::File;
use crate::flags::build_flags;
use crate::host::HostApi;
use crate::pod::{Container, ContainerPort, HttpGet, Pod, Probe};

pub const MANIFEST_PATH: &str = "/etc/kubernetes/manifests/kube-apiserver.manifest";
pub const CLOUD_CONFIG_PATH: &str = "/etc/kubernetes/cloud.config";
const LOG_FILE: &str = "/var/log/kube-apiserver.log";
const LOCAL_PORT: u16 = 8080;

const BUILDER: &str = "kube-apiserver";

/// kube-apiserver settings. Every serialized field becomes a flag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct KubeApiServerConfig {
  #[serde(skip_serializing)]
  pub image: String,
  #[serde(skip_serializing)]
  pub path_srv_kubernetes: Option<String>,
  #[serde(skip_serializing)]
  pub path_srv_sshproxy: Option<String>,

  pub secure_port: u16,
  pub address: Option<String>,
  pub etcd_servers: Vec<String>,
  pub etcd_servers_overrides: Vec<String>,
  pub admission_control: Vec<String>,
  pub service_cluster_ip_range: Option<String>,
  pub client_ca_file: Option<String>,
  pub basic_auth_file: Option<String>,
  pub tls_cert_file: Option<String>,
  pub tls_private_key_file: Option<String>,
  pub token_auth_file: Option<String>,
  pub allow_privileged: Option<bool>,
  pub cloud_provider: Option<String>,
  pub storage_backend: Option<String>,
  pub v: Option<u32>,
}

/// What a node knows about the cluster it belongs to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeConfig {
  pub is_master: bool,
  pub kube_api_server: KubeApiServerConfig,
  /// Whether a cloud config file is installed at [`CLOUD_CONFIG_PATH`].
  pub cloud_config: bool,
  /// Host directories holding CA bundles, mounted read-only.
  pub ssl_host_paths: Vec<String>,
  pub master_internal_name: String,
  /// Set when the API is published in public DNS.
  pub master_public_name: Option<String>,
}

/// Installs kube-apiserver on masters as a static pod manifest.
#[derive(Debug, Clone)]
pub struct KubeApiServerBuilder {
  node: NodeConfig,
}

impl KubeApiServerBuilder {
  pub fn new(node: NodeConfig) -> Self {
    Self { node }
  }

  pub fn build_pod(&self) -> Result<Pod, BuildError> {
    let config = &self.node.kube_api_server;
    let mut flags = build_flags(config).map_err(|e| BuildError::Failed {
      builder: BUILDER,
      source: Box::new(e),
    })?;
    if self.node.cloud_config {
      flags.push(format!("--cloud-config={CLOUD_CONFIG_PATH}"));
    }

    let mut pod = Pod::new("kube-apiserver", "kube-system");
    pod.metadata.annotations = self.annotations();
    pod
      .metadata
      .labels
      .insert("k8s-app".to_string(), "kube-apiserver".to_string());
    pod.spec.host_network = true;

    let mut container = Container {
      name: "kube-apiserver".to_string(),
      image: config.image.clone(),
      command: vec![
        "/bin/sh".to_string(),
        "-c".to_string(),
        format!(
          "/usr/local/bin/kube-apiserver {} 1>>{LOG_FILE} 2>&1",
          flags.join(" ")
        ),
      ],
      liveness_probe: Some(Probe {
        http_get: HttpGet {
          host: "127.0.0.1".to_string(),
          path: "/healthz".to_string(),
          port: LOCAL_PORT,
        },
        initial_delay_seconds: 15,
        timeout_seconds: 15,
      }),
      ports: vec![
        ContainerPort {
          name: "https".to_string(),
          container_port: config.secure_port,
          host_port: config.secure_port,
        },
        ContainerPort {
          name: "local".to_string(),
          container_port: LOCAL_PORT,
          host_port: LOCAL_PORT,
        },
      ],
      ..Default::default()
    };
    container
      .resources
      .requests
      .insert("cpu".to_string(), "150m".to_string());

    for path in &self.node.ssl_host_paths {
      let name = path.replace('/', "");
      pod.add_host_path(&mut container, &name, path, true);
    }
    if self.node.cloud_config {
      pod.add_host_path(&mut container, "cloudconfig", CLOUD_CONFIG_PATH, true);
    }
    if let Some(path) = &config.path_srv_kubernetes {
      pod.add_host_path(&mut container, "srvkube", path, true);
    }
    if let Some(path) = &config.path_srv_sshproxy {
      pod.add_host_path(&mut container, "srvsshproxy", path, false);
    }
    pod.add_host_path(&mut container, "logfile", LOG_FILE, false);

    pod.spec.containers.push(container);
    Ok(pod)
  }

  fn annotations(&self) -> BTreeMap<String, String> {
    let mut annotations = BTreeMap::new();
    annotations.insert(
      "dns.alpha.kubernetes.io/internal".to_string(),
      self.node.master_internal_name.clone(),
    );
    if let Some(public) = &self.node.master_public_name {
      annotations.insert("dns.alpha.kubernetes.io/external".to_string(), public.clone());
    }
    annotations
  }
}

impl<H: HostApi> ModelBuilder<H> for KubeApiServerBuilder {
  fn build(&self, tasks: &mut TaskMap<H>) -> Result<(), BuildError> {
    if !self.node.is_master {
      return Ok(());
    }
    let pod = self.build_pod()?;
    let manifest = serde_yaml::to_string(&pod).map_err(|e| BuildError::Failed {
      builder: BUILDER,
      source: Box::new(e),
    })?;
    debug!(path = MANIFEST_PATH, bytes = manifest.len(), "kube_apiserver_manifest");
    tasks.add_task(File::new(MANIFEST_PATH, manifest))?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use serde_yaml::Value;

  use super::*;
  use crate::host::LocalHost;

  fn master() -> NodeConfig {
    NodeConfig {
      is_master: true,
      kube_api_server: KubeApiServerConfig {
        image: "k8s.gcr.io/kube-apiserver:v1.5.2".into(),
        secure_port: 443,
        etcd_servers: vec!["http://127.0.0.1:4001".into()],
        allow_privileged: Some(true),
        path_srv_kubernetes: Some("/srv/kubernetes".into()),
        ..Default::default()
      },
      cloud_config: true,
      ssl_host_paths: vec!["/etc/ssl".into(), "/usr/share/ca-certificates".into()],
      master_internal_name: "api.internal.example.com".into(),
      master_public_name: None,
    }
  }

  fn manifest(builder: &KubeApiServerBuilder) -> Value {
    serde_yaml::to_value(builder.build_pod().unwrap()).unwrap()
  }

  #[test]
  fn test_command_carries_sorted_flags_and_cloud_config() {
    let pod = manifest(&KubeApiServerBuilder::new(master()));
    let command = &pod["spec"]["containers"][0]["command"];
    assert_eq!(command[0], Value::from("/bin/sh"));
    assert_eq!(
      command[2],
      Value::from(
        "/usr/local/bin/kube-apiserver --allow-privileged=true \
         --etcd-servers=http://127.0.0.1:4001 --secure-port=443 \
         --cloud-config=/etc/kubernetes/cloud.config \
         1>>/var/log/kube-apiserver.log 2>&1"
      )
    );
  }

  #[test]
  fn test_mounts_host_paths_in_order() {
    let pod = manifest(&KubeApiServerBuilder::new(master()));
    let names: Vec<&str> = pod["spec"]["volumes"]
      .as_sequence()
      .unwrap()
      .iter()
      .map(|v| v["name"].as_str().unwrap())
      .collect();
    assert_eq!(
      names,
      ["etcssl", "usrshareca-certificates", "cloudconfig", "srvkube", "logfile"]
    );
    let mounts = &pod["spec"]["containers"][0]["volumeMounts"];
    assert_eq!(mounts[0]["readOnly"], Value::from(true));
    assert!(mounts[4].get("readOnly").is_none());
  }

  #[test]
  fn test_external_annotation_only_with_public_name() {
    let pod = manifest(&KubeApiServerBuilder::new(master()));
    let annotations = pod["metadata"]["annotations"].as_mapping().unwrap();
    assert_eq!(annotations.len(), 1);

    let mut node = master();
    node.master_public_name = Some("api.example.com".into());
    let pod = manifest(&KubeApiServerBuilder::new(node));
    assert_eq!(
      pod["metadata"]["annotations"]["dns.alpha.kubernetes.io/external"],
      Value::from("api.example.com")
    );
  }

  #[test]
  fn test_non_masters_get_nothing() {
    let mut node = master();
    node.is_master = false;
    let mut tasks = TaskMap::<LocalHost>::new();
    KubeApiServerBuilder::new(node).build(&mut tasks).unwrap();
    assert!(tasks.is_empty());
  }

  #[test]
  fn test_masters_get_the_manifest_file() {
    let mut tasks = TaskMap::<LocalHost>::new();
    KubeApiServerBuilder::new(master()).build(&mut tasks).unwrap();
    let file = tasks.get_as::<File>(MANIFEST_PATH).unwrap();
    assert!(file.contents.as_deref().unwrap().contains("kind: Pod"));
  }
}
