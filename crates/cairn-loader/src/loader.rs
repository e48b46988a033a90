use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use cairn_task::{TaskMap, TaskMapError};
use minijinja::value::Rest;
use minijinja::{Environment, ErrorKind};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::error::LoadError;
use crate::registry::TypeRegistry;
use crate::store::ModelStore;

/// A named callable available inside templates. Receives its arguments as
/// JSON values; an `Err` message aborts rendering of that template.
pub type TemplateFunction = Arc<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

/// Renders and parses model templates into tasks.
pub struct Loader<C> {
  registry: TypeRegistry<C>,
  functions: BTreeMap<String, TemplateFunction>,
  context: serde_json::Map<String, Value>,
}

impl<C> Loader<C>
where
  C: Send + Sync + 'static,
{
  pub fn new(registry: TypeRegistry<C>) -> Self {
    Self {
      registry,
      functions: BTreeMap::new(),
      context: serde_json::Map::new(),
    }
  }

  pub fn registry(&self) -> &TypeRegistry<C> {
    &self.registry
  }

  pub fn registry_mut(&mut self) -> &mut TypeRegistry<C> {
    &mut self.registry
  }

  /// Make `f` callable as `name(...)` from templates.
  pub fn add_function<F>(&mut self, name: impl Into<String>, f: F)
  where
    F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
  {
    self.functions.insert(name.into(), Arc::new(f));
  }

  /// Expose `value` to templates as the variable `key`.
  pub fn set_context(&mut self, key: impl Into<String>, value: impl Serialize) -> Result<(), LoadError> {
    let key = key.into();
    let value = serde_json::to_value(value).map_err(|source| LoadError::Context {
      key: key.clone(),
      source,
    })?;
    self.context.insert(key, value);
    Ok(())
  }

  /// Load every template of `layers` (in order) into a fresh task map and
  /// resolve its references.
  #[instrument(name = "load_model", skip(self, store))]
  pub async fn build_tasks(
    &self,
    store: &dyn ModelStore,
    layers: &[&str],
  ) -> Result<TaskMap<C>, LoadError> {
    let mut tasks = TaskMap::new();
    self.load_into(store, layers, &mut tasks).await?;
    cairn_resolver::resolve(&tasks)?;
    info!(tasks = tasks.len(), "model_loaded");
    Ok(tasks)
  }

  /// Load templates into an existing map (one already populated by model
  /// builders, for example). References are not resolved.
  pub async fn load_into(
    &self,
    store: &dyn ModelStore,
    layers: &[&str],
    tasks: &mut TaskMap<C>,
  ) -> Result<(), LoadError> {
    let env = self.environment();
    for layer in layers {
      for path in store.list(layer).await? {
        let source = store.read(&path).await?;
        let added = self.parse_document(&env, &path, &source, tasks)?;
        debug!(path = %path, tasks = added, "template_loaded");
      }
    }
    Ok(())
  }

  /// Render a single template with the loader's functions and context.
  pub fn render(&self, path: &str, source: &str) -> Result<String, LoadError> {
    self.render_with(&self.environment(), path, source)
  }

  fn environment(&self) -> Environment<'static> {
    let mut env = Environment::new();
    for (name, function) in &self.functions {
      let function = function.clone();
      let fn_name = name.clone();
      env.add_function(name.clone(), move |args: Rest<minijinja::Value>| {
        let args = args
          .iter()
          .map(serde_json::to_value)
          .collect::<Result<Vec<_>, _>>()
          .map_err(|e| minijinja::Error::new(ErrorKind::InvalidOperation, e.to_string()))?;
        function(&args)
          .map(|value| minijinja::Value::from_serialize(&value))
          .map_err(|message| {
            minijinja::Error::new(ErrorKind::InvalidOperation, format!("{fn_name}: {message}"))
          })
      });
    }
    env
  }

  fn render_with(
    &self,
    env: &Environment<'static>,
    path: &str,
    source: &str,
  ) -> Result<String, LoadError> {
    env
      .render_str(source, &self.context)
      .map_err(|source| LoadError::Template {
        path: path.to_string(),
        source,
      })
  }

  /// Render, parse and add the tasks of one document. Returns how many
  /// tasks it contributed.
  fn parse_document(
    &self,
    env: &Environment<'static>,
    path: &str,
    source: &str,
    tasks: &mut TaskMap<C>,
  ) -> Result<usize, LoadError> {
    let rendered = self.render_with(env, path, source)?;
    let entries = parse_entries(path, &rendered)?;
    let count = entries.len();

    for (key, value) in entries {
      let Some((alias, name)) = key.split_once('/').filter(|(a, n)| !a.is_empty() && !n.is_empty())
      else {
        return Err(LoadError::InvalidKey {
          path: path.to_string(),
          key: key.clone(),
        });
      };
      let task_type = self
        .registry
        .get(alias)
        .ok_or_else(|| LoadError::UnknownKind {
          path: path.to_string(),
          alias: alias.to_string(),
        })?;
      let task = task_type
        .parse(name, value)
        .map_err(|source| LoadError::Decode {
          path: path.to_string(),
          key: key.clone(),
          source,
        })?;
      tasks
        .insert(task)
        .map_err(|source: TaskMapError| LoadError::TaskMap {
          path: path.to_string(),
          source,
        })?;
    }
    Ok(count)
  }
}

/// Top-level entries of a document in the order they were written. Unlike a
/// map, repeated keys are kept so they can be reported.
struct Entries(Vec<(String, Value)>);

impl<'de> Deserialize<'de> for Entries {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    struct EntriesVisitor;

    impl<'de> Visitor<'de> for EntriesVisitor {
      type Value = Entries;

      fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a mapping of <kind>/<name> keys")
      }

      fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Entries, A::Error> {
        let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some(entry) = map.next_entry::<String, Value>()? {
          entries.push(entry);
        }
        Ok(Entries(entries))
      }
    }

    deserializer.deserialize_map(EntriesVisitor)
  }
}

/// Parse a rendered document into `(key, fields)` pairs, in document order.
/// JSON files are parsed as JSON, everything else as YAML. An empty document
/// has no entries; a key written twice is an error.
fn parse_entries(path: &str, text: &str) -> Result<Vec<(String, Value)>, LoadError> {
  let invalid = |message: String| LoadError::Document {
    path: path.to_string(),
    message,
  };
  let is_json = Path::new(path)
    .extension()
    .is_some_and(|ext| ext == "json");

  let document: Option<Entries> = if is_json {
    serde_json::from_str(text).map_err(|e| invalid(e.to_string()))?
  } else {
    serde_yaml::from_str(text).map_err(|e| invalid(e.to_string()))?
  };
  let entries = document.map(|Entries(entries)| entries).unwrap_or_default();

  let mut seen = BTreeSet::new();
  for (key, _) in &entries {
    if !seen.insert(key.as_str()) {
      return Err(LoadError::DuplicateKey {
        path: path.to_string(),
        key: key.clone(),
      });
    }
  }
  Ok(entries)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_entries_yaml_and_json() {
    let yaml = parse_entries("a.yaml", "vpc/main:\n  cidr: 10.0.0.0/16\nsubnet/a: a\n").unwrap();
    assert_eq!(yaml.len(), 2);
    assert_eq!(yaml[0].0, "vpc/main");
    assert_eq!(yaml[1].0, "subnet/a");
    assert_eq!(yaml[1].1, Value::String("a".into()));

    let json = parse_entries("a.json", r#"{"vpc/main": {"cidr": "10.0.0.0/16"}}"#).unwrap();
    assert_eq!(json[0].1["cidr"], "10.0.0.0/16");
  }

  #[test]
  fn test_empty_document_has_no_entries() {
    assert!(parse_entries("empty.yaml", "").unwrap().is_empty());
    assert!(parse_entries("comment.yaml", "# nothing here\n").unwrap().is_empty());
  }

  #[test]
  fn test_repeated_key_is_rejected() {
    for (path, text) in [
      ("a.json", r#"{"vpc/a": {"cidr": "1"}, "vpc/a": {"cidr": "2"}}"#),
      ("a.yaml", "vpc/a:\n  cidr: '1'\nvpc/a:\n  cidr: '2'\n"),
    ] {
      match parse_entries(path, text) {
        Err(LoadError::DuplicateKey { key, .. }) => assert_eq!(key, "vpc/a"),
        other => panic!("{path}: expected duplicate key, got {other:?}"),
      }
    }
  }

  #[test]
  fn test_non_mapping_document_is_rejected() {
    assert!(matches!(
      parse_entries("list.yaml", "- a\n- b\n"),
      Err(LoadError::Document { .. })
    ));
  }
}
