use std::io::Write;
use std::path::PathBuf;

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::KubectlError;

/// `kubectl config view` output.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KubectlConfig {
  pub kind: String,
  pub api_version: String,
  #[serde(rename = "current-context")]
  pub current_context: String,
  pub clusters: Vec<KubectlClusterWithName>,
  pub contexts: Vec<KubectlContextWithName>,
  pub users: Vec<KubectlUserWithName>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct KubectlClusterWithName {
  pub name: String,
  pub cluster: KubectlCluster,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct KubectlCluster {
  pub server: String,
  pub certificate_authority_data: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct KubectlContextWithName {
  pub name: String,
  pub context: KubectlContext,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct KubectlContext {
  pub cluster: String,
  pub user: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct KubectlUserWithName {
  pub name: String,
  pub user: KubectlUser,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct KubectlUser {
  pub client_certificate_data: Option<String>,
  pub client_key_data: Option<String>,
  pub password: Option<String>,
  pub username: Option<String>,
  pub token: Option<String>,
}

/// Runs the kubectl binary.
#[derive(Debug, Clone, Default)]
pub struct Kubectl {
  /// Defaults to `kubectl` on the `PATH`.
  pub path: Option<PathBuf>,
}

struct Output {
  stdout: String,
  stderr: String,
}

impl Kubectl {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: Some(path.into()),
    }
  }

  async fn exec(&self, args: &[&str]) -> Result<Output, KubectlError> {
    let program = self
      .path
      .clone()
      .unwrap_or_else(|| PathBuf::from("kubectl"));
    let command = format!("{} {}", program.display(), args.join(" "));
    debug!(%command, "running kubectl");

    let output = Command::new(&program)
      .args(args)
      .output()
      .await
      .map_err(|source| KubectlError::Spawn {
        command: command.clone(),
        source,
      })?;
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    if !output.status.success() {
      warn!(%command, %stderr, "kubectl failed");
      return Err(KubectlError::Failed {
        command,
        status: output.status,
        stderr,
      });
    }
    Ok(Output { stdout, stderr })
  }

  pub async fn get_config(&self, minify: bool) -> Result<KubectlConfig, KubectlError> {
    let mut args = vec!["config", "view"];
    if minify {
      args.push("--minify");
    }
    args.extend(["--output", "json"]);
    let output = self.exec(&args).await?;
    serde_json::from_str(output.stdout.trim()).map_err(KubectlError::InvalidConfig)
  }

  /// `kubectl apply` a manifest in `context`.
  pub async fn apply(&self, context: &str, manifest: &[u8]) -> Result<(), KubectlError> {
    let mut file = tempfile::Builder::new()
      .prefix("manifest")
      .tempfile()
      .map_err(KubectlError::TempFile)?;
    file.write_all(manifest).map_err(KubectlError::TempFile)?;
    file.flush().map_err(KubectlError::TempFile)?;

    let path = file.path().to_string_lossy().into_owned();
    self
      .exec(&["apply", "--context", context, "-f", &path])
      .await?;
    Ok(())
  }

  /// Mark a node unschedulable.
  pub async fn cordon(&self, node: &str) -> Result<String, KubectlError> {
    if node.is_empty() {
      return Err(KubectlError::NodeNameRequired);
    }
    let output = self.exec(&["cordon", node]).await?;
    if !output.stderr.trim().is_empty() {
      return Err(KubectlError::Stderr {
        command: format!("cordon {node}"),
        stderr: output.stderr,
      });
    }
    Ok(output.stdout)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_cordon_requires_a_node_name() {
    let kubectl = Kubectl::default();
    assert!(matches!(
      kubectl.cordon("").await,
      Err(KubectlError::NodeNameRequired)
    ));
  }

  /// One test spawns processes so no other test forks while the fake
  /// kubectl is being written.
  #[cfg(unix)]
  #[tokio::test]
  async fn test_drives_a_kubectl_binary() {
    use std::os::unix::fs::PermissionsExt;

    let missing = Kubectl::new("/nonexistent/kubectl");
    assert!(matches!(
      missing.get_config(true).await,
      Err(KubectlError::Spawn { .. })
    ));

    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("kubectl");
    let applied = dir.path().join("applied");
    std::fs::write(
      &script,
      format!(
        r#"#!/bin/sh
case "$1" in
  config) echo '{{"kind":"Config","apiVersion":"v1","current-context":"alpha","clusters":[{{"name":"alpha","cluster":{{"server":"https://1.2.3.4"}}}}]}}' ;;
  apply) cat "$5" > "{applied}" ;;
  cordon) echo "node/$2 cordoned" ;;
  *) echo "unknown command $1" >&2; exit 1 ;;
esac
"#,
        applied = applied.display()
      ),
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    let kubectl = Kubectl::new(&script);

    let config = kubectl.get_config(true).await.unwrap();
    assert_eq!(config.current_context, "alpha");
    assert_eq!(config.clusters[0].cluster.server, "https://1.2.3.4");

    kubectl.apply("alpha", b"kind: Namespace\n").await.unwrap();
    assert_eq!(std::fs::read_to_string(&applied).unwrap(), "kind: Namespace\n");

    assert_eq!(kubectl.cordon("node-1").await.unwrap().trim(), "node/node-1 cordoned");

    assert!(matches!(
      kubectl.exec(&["drain"]).await,
      Err(KubectlError::Failed { ref stderr, .. }) if stderr.contains("unknown command drain")
    ));
  }
}
