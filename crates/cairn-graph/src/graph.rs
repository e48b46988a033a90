use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use cairn_task::{Task, TaskKey, TaskMap};

use crate::error::GraphError;

/// Dependency graph over the tasks of one map.
///
/// An edge `a -> b` means `b` depends on `a`: `a` is upstream of `b` and
/// must finish first. All lists are sorted by key so traversal order is
/// deterministic.
#[derive(Debug, Clone, Default)]
pub struct Graph {
  /// key -> tasks that depend on it.
  adjacency: BTreeMap<TaskKey, Vec<TaskKey>>,
  /// key -> tasks it depends on.
  reverse_adjacency: BTreeMap<TaskKey, Vec<TaskKey>>,
  /// Tasks with no dependencies.
  entry_points: Vec<TaskKey>,
}

impl Graph {
  /// Build the graph for a resolved task map.
  ///
  /// Each task contributes the union of its resolved references, its
  /// explicit dependencies and whatever it finds by scanning the map.
  pub fn build<C>(tasks: &TaskMap<C>) -> Result<Self, GraphError>
  where
    C: Send + Sync + 'static,
  {
    let mut edges = Vec::new();
    for (key, task) in tasks.iter() {
      for field in task.references() {
        if field.reference.resolved_key().is_none() {
          return Err(GraphError::Unresolved {
            task: key.clone(),
            field: field.name,
            target: field.reference.target().to_string(),
          });
        }
      }
      for dependency in task.dependencies(tasks) {
        edges.push((dependency, key.clone()));
      }
    }
    Self::from_edges(tasks.keys().cloned(), edges)
  }

  /// Build a graph from explicit `(upstream, downstream)` pairs.
  pub fn from_edges(
    nodes: impl IntoIterator<Item = TaskKey>,
    edges: impl IntoIterator<Item = (TaskKey, TaskKey)>,
  ) -> Result<Self, GraphError> {
    let mut adjacency: BTreeMap<TaskKey, Vec<TaskKey>> = BTreeMap::new();
    let mut reverse_adjacency: BTreeMap<TaskKey, Vec<TaskKey>> = BTreeMap::new();

    for node in nodes {
      adjacency.entry(node.clone()).or_default();
      reverse_adjacency.entry(node).or_default();
    }

    for (from, to) in edges {
      if from == to {
        return Err(GraphError::SelfDependency { task: to });
      }
      if !adjacency.contains_key(&from) {
        return Err(GraphError::UnknownDependency {
          task: to,
          dependency: from,
        });
      }
      if !adjacency.contains_key(&to) {
        return Err(GraphError::UnknownDependency {
          task: from,
          dependency: to,
        });
      }
      reverse_adjacency.entry(to.clone()).or_default().push(from.clone());
      adjacency.entry(from).or_default().push(to);
    }

    for list in adjacency.values_mut().chain(reverse_adjacency.values_mut()) {
      list.sort();
      list.dedup();
    }

    let entry_points = reverse_adjacency
      .iter()
      .filter(|(_, upstream)| upstream.is_empty())
      .map(|(key, _)| key.clone())
      .collect();

    let graph = Self {
      adjacency,
      reverse_adjacency,
      entry_points,
    };
    if let Some(path) = graph.find_cycle() {
      return Err(GraphError::Cycle { path });
    }
    Ok(graph)
  }

  /// Tasks with no dependencies.
  pub fn entry_points(&self) -> &[TaskKey] {
    &self.entry_points
  }

  /// Tasks that depend on `key`.
  pub fn downstream(&self, key: &TaskKey) -> &[TaskKey] {
    self.adjacency.get(key).map(|v| v.as_slice()).unwrap_or(&[])
  }

  /// Tasks `key` depends on.
  pub fn upstream(&self, key: &TaskKey) -> &[TaskKey] {
    self
      .reverse_adjacency
      .get(key)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  pub fn nodes(&self) -> impl Iterator<Item = &TaskKey> {
    self.adjacency.keys()
  }

  pub fn contains(&self, key: &TaskKey) -> bool {
    self.adjacency.contains_key(key)
  }

  pub fn len(&self) -> usize {
    self.adjacency.len()
  }

  pub fn is_empty(&self) -> bool {
    self.adjacency.is_empty()
  }

  pub fn edge_count(&self) -> usize {
    self.adjacency.values().map(Vec::len).sum()
  }

  /// The same graph with every edge flipped, for teardown: dependents are
  /// removed before what they depend on.
  pub fn reversed(&self) -> Self {
    let entry_points = self
      .adjacency
      .iter()
      .filter(|(_, downstream)| downstream.is_empty())
      .map(|(key, _)| key.clone())
      .collect();
    Self {
      adjacency: self.reverse_adjacency.clone(),
      reverse_adjacency: self.adjacency.clone(),
      entry_points,
    }
  }

  /// A topological order, ties broken by key.
  pub fn topological_order(&self) -> Vec<TaskKey> {
    let mut pending: BTreeMap<&TaskKey, usize> = self
      .reverse_adjacency
      .iter()
      .map(|(key, upstream)| (key, upstream.len()))
      .collect();
    let mut ready: BTreeSet<&TaskKey> = self.entry_points.iter().collect();
    let mut order = Vec::with_capacity(self.len());

    while let Some(key) = ready.pop_first() {
      order.push(key.clone());
      for next in self.downstream(key) {
        if let Some(count) = pending.get_mut(next) {
          *count -= 1;
          if *count == 0 {
            ready.insert(next);
          }
        }
      }
    }
    order
  }

  /// Graphviz rendering, edges pointing from dependency to dependent.
  pub fn to_dot(&self) -> String {
    let mut out = String::from("digraph tasks {\n  rankdir=LR;\n");
    for key in self.adjacency.keys() {
      let _ = writeln!(out, "  \"{key}\";");
    }
    for (from, downstream) in &self.adjacency {
      for to in downstream {
        let _ = writeln!(out, "  \"{from}\" -> \"{to}\";");
      }
    }
    out.push('}');
    out.push('\n');
    out
  }

  /// Depth-first search with coloring. Returns the first cycle found as a
  /// path that starts and ends on the same key.
  fn find_cycle(&self) -> Option<Vec<TaskKey>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
      Active,
      Done,
    }

    fn visit<'a>(
      node: &'a TaskKey,
      adjacency: &'a BTreeMap<TaskKey, Vec<TaskKey>>,
      marks: &mut BTreeMap<&'a TaskKey, Mark>,
      stack: &mut Vec<&'a TaskKey>,
    ) -> Option<Vec<TaskKey>> {
      marks.insert(node, Mark::Active);
      stack.push(node);

      for next in adjacency.get(node).into_iter().flatten() {
        match marks.get(next) {
          Some(Mark::Active) => {
            let start = stack.iter().position(|k| *k == next).unwrap_or(0);
            let mut path: Vec<TaskKey> = stack[start..].iter().map(|k| (*k).clone()).collect();
            path.push(next.clone());
            return Some(path);
          }
          Some(Mark::Done) => {}
          None => {
            if let Some(path) = visit(next, adjacency, marks, stack) {
              return Some(path);
            }
          }
        }
      }

      stack.pop();
      marks.insert(node, Mark::Done);
      None
    }

    let mut marks = BTreeMap::new();
    let mut stack = Vec::new();
    for node in self.adjacency.keys() {
      if !marks.contains_key(node) {
        if let Some(path) = visit(node, &self.adjacency, &mut marks, &mut stack) {
          return Some(path);
        }
      }
    }
    None
  }
}

#[cfg(test)]
mod tests {
  use async_trait::async_trait;
  use cairn_task::{Change, Resource, TaskError, TaskKind, define_task};

  use super::*;

  fn key(s: &str) -> TaskKey {
    s.parse().unwrap()
  }

  fn graph(nodes: &[&str], edges: &[(&str, &str)]) -> Result<Graph, GraphError> {
    Graph::from_edges(
      nodes.iter().map(|n| key(n)),
      edges.iter().map(|(a, b)| (key(a), key(b))),
    )
  }

  #[test]
  fn test_upstream_downstream_and_entry_points() {
    let g = graph(
      &["vpc:v", "subnet:a", "subnet:b", "instance:i"],
      &[
        ("vpc:v", "subnet:a"),
        ("vpc:v", "subnet:b"),
        ("subnet:a", "instance:i"),
      ],
    )
    .unwrap();

    assert_eq!(g.entry_points(), &[key("vpc:v")]);
    assert_eq!(g.downstream(&key("vpc:v")), &[key("subnet:a"), key("subnet:b")]);
    assert_eq!(g.upstream(&key("instance:i")), &[key("subnet:a")]);
    assert_eq!(g.edge_count(), 3);
  }

  #[test]
  fn test_topological_order_is_deterministic() {
    let g = graph(
      &["vpc:v", "subnet:b", "subnet:a", "dnsZone:z"],
      &[("vpc:v", "subnet:a"), ("vpc:v", "subnet:b")],
    )
    .unwrap();
    let order: Vec<String> = g.topological_order().iter().map(|k| k.to_string()).collect();
    assert_eq!(order, vec!["dnsZone:z", "vpc:v", "subnet:a", "subnet:b"]);
  }

  #[test]
  fn test_reversed_flips_edges() {
    let g = graph(&["vpc:v", "subnet:a"], &[("vpc:v", "subnet:a")]).unwrap();
    let r = g.reversed();
    assert_eq!(r.entry_points(), &[key("subnet:a")]);
    assert_eq!(r.downstream(&key("subnet:a")), &[key("vpc:v")]);
    assert_eq!(
      r.topological_order(),
      vec![key("subnet:a"), key("vpc:v")]
    );
  }

  #[test]
  fn test_cycle_reports_path() {
    let err = graph(
      &["a:x", "b:y", "c:z"],
      &[("a:x", "b:y"), ("b:y", "c:z"), ("c:z", "a:x")],
    )
    .unwrap_err();
    match err {
      GraphError::Cycle { path } => {
        assert_eq!(path.first(), path.last());
        assert_eq!(path.len(), 4);
      }
      other => panic!("expected cycle, got {other:?}"),
    }
  }

  #[test]
  fn test_rejects_self_and_unknown_dependencies() {
    assert_eq!(
      graph(&["a:x"], &[("a:x", "a:x")]).unwrap_err(),
      GraphError::SelfDependency { task: key("a:x") }
    );
    assert_eq!(
      graph(&["a:x"], &[("b:y", "a:x")]).unwrap_err(),
      GraphError::UnknownDependency {
        task: key("a:x"),
        dependency: key("b:y"),
      }
    );
  }

  #[test]
  fn test_to_dot() {
    let g = graph(&["vpc:v", "subnet:a"], &[("vpc:v", "subnet:a")]).unwrap();
    let dot = g.to_dot();
    assert!(dot.starts_with("digraph tasks {"));
    assert!(dot.contains("\"vpc:v\" -> \"subnet:a\";"));
  }

  #[derive(Debug, Default)]
  struct Step {
    name: Option<String>,
    after: Vec<TaskKey>,
  }

  define_task!(Step);

  impl TaskKind for Step {
    const KIND: &'static str = "step";

    fn depends_on(&self) -> Vec<TaskKey> {
      self.after.clone()
    }
  }

  #[async_trait]
  impl Resource<()> for Step {
    type State = ();

    fn desired(&self) -> Result<(), TaskError> {
      Ok(())
    }

    async fn find(&self, _: &()) -> Result<Option<()>, TaskError> {
      Ok(None)
    }

    async fn create(&self, _: &(), _: &()) -> Result<(), TaskError> {
      Ok(())
    }

    async fn update(&self, _: &(), _: &(), _: &(), _: &[Change]) -> Result<(), TaskError> {
      Ok(())
    }

    async fn delete(&self, _: &(), _: &()) -> Result<(), TaskError> {
      Ok(())
    }
  }

  fn step(name: &str, after: &[&str]) -> Step {
    Step {
      name: Some(name.into()),
      after: after.iter().map(|a| key(a)).collect(),
    }
  }

  #[test]
  fn test_build_from_task_map() {
    let mut tasks = TaskMap::<()>::new();
    tasks.add_task(step("a", &[])).unwrap();
    tasks.add_task(step("b", &["step:a"])).unwrap();
    tasks.add_task(step("c", &["step:a", "step:b"])).unwrap();

    let g = Graph::build(&tasks).unwrap();
    assert_eq!(g.upstream(&key("step:c")), &[key("step:a"), key("step:b")]);
    assert_eq!(
      g.topological_order(),
      vec![key("step:a"), key("step:b"), key("step:c")]
    );
  }

  #[test]
  fn test_build_detects_cycle_across_tasks() {
    let mut tasks = TaskMap::<()>::new();
    tasks.add_task(step("a", &["step:b"])).unwrap();
    tasks.add_task(step("b", &["step:a"])).unwrap();
    assert!(matches!(
      Graph::build(&tasks),
      Err(GraphError::Cycle { .. })
    ));
  }

  #[test]
  fn test_build_rejects_dependency_outside_map() {
    let mut tasks = TaskMap::<()>::new();
    tasks.add_task(step("a", &["step:ghost"])).unwrap();
    assert!(matches!(
      Graph::build(&tasks),
      Err(GraphError::UnknownDependency { .. })
    ));
  }
}
