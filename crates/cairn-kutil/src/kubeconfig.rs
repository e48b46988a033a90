use std::collections::BTreeMap;
use std::env;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::KubeconfigError;

/// A kubeconfig file. Keys this type does not model are kept as they are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Kubeconfig {
  #[serde(default = "Kubeconfig::api_version")]
  pub api_version: String,
  #[serde(default = "Kubeconfig::kind")]
  pub kind: String,
  #[serde(default)]
  pub clusters: Vec<NamedCluster>,
  #[serde(default)]
  pub users: Vec<NamedUser>,
  #[serde(default)]
  pub contexts: Vec<NamedContext>,
  #[serde(default)]
  pub current_context: String,
  #[serde(flatten)]
  pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// A list entry: a name plus the value under a kind-specific key.
trait NamedEntry {
  type Value: Default;

  fn new(name: &str) -> Self;
  fn name(&self) -> &str;
  fn value(&self) -> &Self::Value;
  fn value_mut(&mut self) -> &mut Self::Value;
}

macro_rules! named_entry {
  ($ty:ident, $field:ident, $value:ty) => {
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct $ty {
      pub name: String,
      pub $field: $value,
    }

    impl NamedEntry for $ty {
      type Value = $value;

      fn new(name: &str) -> Self {
        Self {
          name: name.to_string(),
          $field: <$value>::default(),
        }
      }

      fn name(&self) -> &str {
        &self.name
      }

      fn value(&self) -> &$value {
        &self.$field
      }

      fn value_mut(&mut self) -> &mut $value {
        &mut self.$field
      }
    }
  };
}

named_entry!(NamedCluster, cluster, Cluster);
named_entry!(NamedUser, user, User);
named_entry!(NamedContext, context, Context);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Cluster {
  pub server: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub certificate_authority: Option<String>,
  #[serde(default, with = "base64_bytes", skip_serializing_if = "Option::is_none")]
  pub certificate_authority_data: Option<Vec<u8>>,
  #[serde(default, skip_serializing_if = "std::ops::Not::not")]
  pub insecure_skip_tls_verify: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct User {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub token: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub username: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub password: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub client_certificate: Option<String>,
  #[serde(default, with = "base64_bytes", skip_serializing_if = "Option::is_none")]
  pub client_certificate_data: Option<Vec<u8>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub client_key: Option<String>,
  #[serde(default, with = "base64_bytes", skip_serializing_if = "Option::is_none")]
  pub client_key_data: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
  pub cluster: String,
  pub user: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub namespace: Option<String>,
}

/// Serde helper for optional base64-encoded byte fields.
mod base64_bytes {
  use base64::Engine;
  use serde::{Deserialize, Deserializer, Serialize, Serializer};

  const ENGINE: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

  pub fn serialize<S>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    bytes.as_ref().map(|b| ENGINE.encode(b)).serialize(serializer)
  }

  pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
  where
    D: Deserializer<'de>,
  {
    match Option::<String>::deserialize(deserializer)? {
      Some(s) => ENGINE
        .decode(s.trim())
        .map(Some)
        .map_err(serde::de::Error::custom),
      None => Ok(None),
    }
  }
}

fn entry<'a, E: NamedEntry>(entries: &'a mut Vec<E>, name: &str) -> &'a mut E::Value {
  let index = match entries.iter().position(|e| e.name() == name) {
    Some(index) => index,
    None => {
      entries.push(E::new(name));
      entries.len() - 1
    }
  };
  entries[index].value_mut()
}

fn lookup<'a, E: NamedEntry>(entries: &'a [E], name: &str) -> Option<&'a E::Value> {
  entries.iter().find(|e| e.name() == name).map(NamedEntry::value)
}

impl Default for Kubeconfig {
  fn default() -> Self {
    Self {
      api_version: Self::api_version(),
      kind: Self::kind(),
      clusters: Vec::new(),
      users: Vec::new(),
      contexts: Vec::new(),
      current_context: String::new(),
      extra: BTreeMap::new(),
    }
  }
}

impl Kubeconfig {
  fn api_version() -> String {
    "v1".to_string()
  }

  fn kind() -> String {
    "Config".to_string()
  }

  pub fn is_empty(&self) -> bool {
    self.clusters.is_empty()
      && self.users.is_empty()
      && self.contexts.is_empty()
      && self.current_context.is_empty()
  }

  pub fn cluster(&self, name: &str) -> Option<&Cluster> {
    lookup(&self.clusters, name)
  }

  pub fn user(&self, name: &str) -> Option<&User> {
    lookup(&self.users, name)
  }

  pub fn context(&self, name: &str) -> Option<&Context> {
    lookup(&self.contexts, name)
  }

  /// Read `path`; a missing file is an empty config.
  pub async fn load(path: &Path) -> Result<Self, KubeconfigError> {
    let text = match tokio::fs::read_to_string(path).await {
      Ok(text) => text,
      Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
      Err(source) => {
        return Err(KubeconfigError::Read {
          path: path.to_path_buf(),
          source,
        });
      }
    };
    if text.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(&text).map_err(|source| KubeconfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  pub async fn save(&self, path: &Path) -> Result<(), KubeconfigError> {
    let write_error = |source| KubeconfigError::Write {
      path: path.to_path_buf(),
      source,
    };
    let text = serde_yaml::to_string(self).map_err(|source| KubeconfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      tokio::fs::create_dir_all(parent).await.map_err(write_error)?;
    }
    tokio::fs::write(path, text).await.map_err(write_error)
  }
}

/// The kubeconfig kubectl would use: the first entry of `KUBECONFIG`, or
/// `~/.kube/config`.
pub fn default_kubeconfig_path() -> Result<PathBuf, KubeconfigError> {
  if let Some(paths) = env::var_os("KUBECONFIG")
    && let Some(first) = env::split_paths(&paths).find(|p| !p.as_os_str().is_empty())
  {
    return Ok(first);
  }
  dirs::home_dir()
    .map(|home| home.join(".kube").join("config"))
    .ok_or(KubeconfigError::NoDefaultPath)
}

/// Credentials and endpoint for one cluster, merged into a kubeconfig
/// under a single context name.
#[derive(Debug, Clone, Default)]
pub struct KubeconfigBuilder {
  /// Master address; the server URL is `https://<master>`.
  pub master: String,
  pub context: String,
  pub namespace: Option<String>,
  pub bearer_token: Option<String>,
  pub user: Option<String>,
  pub password: Option<String>,
  pub ca_cert: Option<Vec<u8>>,
  pub client_cert: Option<Vec<u8>>,
  pub client_key: Option<Vec<u8>>,
}

impl KubeconfigBuilder {
  fn basic_auth_name(&self) -> String {
    format!("{}-basic-auth", self.context)
  }

  fn basic_auth(&self) -> Option<(&str, &str)> {
    match (self.user.as_deref(), self.password.as_deref()) {
      (Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => {
        Some((user, password))
      }
      _ => None,
    }
  }

  /// Add or update this cluster's entries and make its context current.
  pub fn merge_into(&self, config: &mut Kubeconfig) -> Result<(), KubeconfigError> {
    if self.context.is_empty() {
      return Err(KubeconfigError::MissingContext);
    }

    let cluster = entry(&mut config.clusters, &self.context);
    cluster.server = format!("https://{}", self.master);
    cluster.certificate_authority = None;
    cluster.insecure_skip_tls_verify = self.ca_cert.is_none();
    cluster.certificate_authority_data = self.ca_cert.clone();

    let user = entry(&mut config.users, &self.context);
    if let Some(token) = &self.bearer_token {
      user.token = Some(token.clone());
    } else if let Some((name, password)) = self.basic_auth() {
      user.username = Some(name.to_string());
      user.password = Some(password.to_string());
    }
    if let (Some(cert), Some(key)) = (&self.client_cert, &self.client_key) {
      user.client_certificate = None;
      user.client_certificate_data = Some(cert.clone());
      user.client_key = None;
      user.client_key_data = Some(key.clone());
    }

    if let Some((name, password)) = self.basic_auth() {
      let basic = entry(&mut config.users, &self.basic_auth_name());
      basic.username = Some(name.to_string());
      basic.password = Some(password.to_string());
    }

    let context = entry(&mut config.contexts, &self.context);
    context.cluster = self.context.clone();
    context.user = self.context.clone();
    if self.namespace.is_some() {
      context.namespace = self.namespace.clone();
    }

    config.current_context = self.context.clone();
    Ok(())
  }

  /// Remove this cluster's entries. Returns false if there was nothing to
  /// remove.
  pub fn remove_from(&self, config: &mut Kubeconfig) -> bool {
    let before = config.clusters.len() + config.users.len() + config.contexts.len();
    let basic = self.basic_auth_name();
    config.clusters.retain(|e| e.name != self.context);
    config
      .users
      .retain(|e| e.name != self.context && e.name != basic);
    config.contexts.retain(|e| e.name != self.context);
    let after = config.clusters.len() + config.users.len() + config.contexts.len();

    let mut changed = before != after;
    if config.current_context == self.context {
      config.current_context.clear();
      changed = true;
    }
    changed
  }

  pub async fn write_kubecfg(&self, path: &Path) -> Result<(), KubeconfigError> {
    let mut config = Kubeconfig::load(path).await?;
    self.merge_into(&mut config)?;
    config.save(path).await?;
    info!(context = %self.context, path = %path.display(), "kubectl context set");
    Ok(())
  }

  pub async fn delete_kubecfg(&self, path: &Path) -> Result<(), KubeconfigError> {
    let mut config = Kubeconfig::load(path).await?;
    if config.is_empty() {
      debug!(path = %path.display(), "kubeconfig is empty");
      return Ok(());
    }
    if self.remove_from(&mut config) {
      config.save(path).await?;
      info!(context = %self.context, "deleted kubectl config");
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn builder() -> KubeconfigBuilder {
    KubeconfigBuilder {
      master: "api.example.com".into(),
      context: "alpha.example.com".into(),
      user: Some("admin".into()),
      password: Some("secret".into()),
      ca_cert: Some(b"CA".to_vec()),
      ..Default::default()
    }
  }

  #[test]
  fn test_merge_adds_cluster_users_and_context() {
    let mut config = Kubeconfig::default();
    builder().merge_into(&mut config).unwrap();

    let cluster = config.cluster("alpha.example.com").unwrap();
    assert_eq!(cluster.server, "https://api.example.com");
    assert!(!cluster.insecure_skip_tls_verify);
    assert_eq!(cluster.certificate_authority_data.as_deref(), Some(&b"CA"[..]));

    assert_eq!(
      config.user("alpha.example.com").unwrap().username.as_deref(),
      Some("admin")
    );
    assert_eq!(
      config
        .user("alpha.example.com-basic-auth")
        .unwrap()
        .password
        .as_deref(),
      Some("secret")
    );
    assert_eq!(config.context("alpha.example.com").unwrap().user, "alpha.example.com");
    assert_eq!(config.current_context, "alpha.example.com");
  }

  #[test]
  fn test_merge_without_ca_skips_verification_and_token_wins() {
    let mut config = Kubeconfig::default();
    let builder = KubeconfigBuilder {
      ca_cert: None,
      bearer_token: Some("t0ken".into()),
      ..builder()
    };
    builder.merge_into(&mut config).unwrap();
    assert!(config.cluster("alpha.example.com").unwrap().insecure_skip_tls_verify);
    let user = config.user("alpha.example.com").unwrap();
    assert_eq!(user.token.as_deref(), Some("t0ken"));
    assert_eq!(user.username, None);
  }

  #[test]
  fn test_merge_requires_a_context() {
    let builder = KubeconfigBuilder::default();
    assert!(matches!(
      builder.merge_into(&mut Kubeconfig::default()),
      Err(KubeconfigError::MissingContext)
    ));
  }

  #[test]
  fn test_remove_clears_current_context_only_when_it_matches() {
    let mut config = Kubeconfig::default();
    builder().merge_into(&mut config).unwrap();
    let other = KubeconfigBuilder {
      context: "beta".into(),
      ..builder()
    };
    other.merge_into(&mut config).unwrap();

    assert!(builder().remove_from(&mut config));
    assert_eq!(config.current_context, "beta");
    assert!(config.cluster("alpha.example.com").is_none());
    assert!(config.user("alpha.example.com-basic-auth").is_none());
    assert!(config.cluster("beta").is_some());
    assert!(!builder().remove_from(&mut config));
  }

  #[tokio::test]
  async fn test_write_then_delete_keeps_foreign_entries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kube").join("config");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(
      &path,
      "apiVersion: v1\nkind: Config\npreferences: {}\nclusters:\n- name: other\n  cluster:\n    server: https://10.0.0.1\n",
    )
    .unwrap();

    builder().write_kubecfg(&path).await.unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("certificate-authority-data: Q0E="));
    assert!(text.contains("current-context: alpha.example.com"));

    builder().delete_kubecfg(&path).await.unwrap();
    let config = Kubeconfig::load(&path).await.unwrap();
    assert_eq!(config.current_context, "");
    assert_eq!(config.clusters.len(), 1);
    assert_eq!(config.clusters[0].name, "other");
    assert!(config.extra.contains_key("preferences"));
  }

  #[tokio::test]
  async fn test_delete_on_missing_file_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config");
    builder().delete_kubecfg(&path).await.unwrap();
    assert!(!path.exists());
  }
}
