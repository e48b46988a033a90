use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cairn_engine::{
  ChannelNotifier, Engine, EngineConfig, EngineError, ExecutionEvent, Phase, TaskOutcome,
};
use cairn_graph::GraphError;
use cairn_task::{
  Change, Field, Lifecycle, Resource, TaskError, TaskKey, TaskKind, TaskMap, TaskRef, define_task,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Provider double that records every call in order.
#[derive(Default)]
struct Ledger {
  objects: Mutex<BTreeMap<String, String>>,
  log: Mutex<Vec<String>>,
  failing: Mutex<BTreeSet<String>>,
  broken_lookups: Mutex<BTreeSet<String>>,
  delay: Option<Duration>,
  in_flight: AtomicUsize,
  peak: AtomicUsize,
}

impl Ledger {
  fn with_delay(delay: Duration) -> Self {
    Self {
      delay: Some(delay),
      ..Default::default()
    }
  }

  fn record(&self, entry: String) {
    self.log.lock().unwrap().push(entry);
  }

  fn log(&self) -> Vec<String> {
    self.log.lock().unwrap().clone()
  }

  fn mutations(&self) -> Vec<String> {
    self
      .log()
      .into_iter()
      .filter(|e| !e.starts_with("find "))
      .collect()
  }

  fn position(&self, entry: &str) -> usize {
    self
      .log()
      .iter()
      .position(|e| e == entry)
      .unwrap_or_else(|| panic!("{entry} not in log {:?}", self.log()))
  }

  fn fail(&self, name: &str) {
    self.failing.lock().unwrap().insert(name.to_string());
  }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct Rejected(String);

#[derive(Debug, Default)]
struct Unit {
  name: Option<String>,
  value: String,
  needs: Vec<TaskRef<Unit>>,
  panics: bool,
}

define_task!(Unit);

impl TaskKind for Unit {
  const KIND: &'static str = "unit";

  fn reference_fields(&self) -> Vec<Field<'_>> {
    self.needs.iter().map(|r| Field::new("needs", r)).collect()
  }
}

#[derive(Debug, Serialize)]
struct UnitState {
  value: String,
}

impl Unit {
  fn label(&self) -> String {
    self.name.clone().unwrap_or_default()
  }

  fn check(&self, ledger: &Ledger) -> Result<(), TaskError> {
    if ledger.failing.lock().unwrap().contains(&self.label()) {
      return Err(TaskError::provider(Rejected(format!("{} rejected", self.label()))));
    }
    Ok(())
  }
}

#[async_trait]
impl Resource<Ledger> for Unit {
  type State = UnitState;

  fn desired(&self) -> Result<UnitState, TaskError> {
    Ok(UnitState {
      value: self.value.clone(),
    })
  }

  async fn find(&self, ledger: &Ledger) -> Result<Option<UnitState>, TaskError> {
    ledger.record(format!("find {}", self.label()));
    let now = ledger.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    ledger.peak.fetch_max(now, Ordering::SeqCst);
    if let Some(delay) = ledger.delay {
      tokio::time::sleep(delay).await;
    }
    ledger.in_flight.fetch_sub(1, Ordering::SeqCst);

    if self.panics {
      panic!("unit {} exploded", self.label());
    }
    if ledger.broken_lookups.lock().unwrap().contains(&self.label()) {
      return Err(TaskError::provider(Rejected("lookup timed out".into())));
    }
    let value = ledger.objects.lock().unwrap().get(&self.label()).cloned();
    Ok(value.map(|value| UnitState { value }))
  }

  async fn create(&self, ledger: &Ledger, desired: &UnitState) -> Result<(), TaskError> {
    ledger.record(format!("create {}", self.label()));
    self.check(ledger)?;
    ledger
      .objects
      .lock()
      .unwrap()
      .insert(self.label(), desired.value.clone());
    Ok(())
  }

  async fn update(
    &self,
    ledger: &Ledger,
    _actual: &UnitState,
    desired: &UnitState,
    _changes: &[Change],
  ) -> Result<(), TaskError> {
    ledger.record(format!("update {}", self.label()));
    self.check(ledger)?;
    ledger
      .objects
      .lock()
      .unwrap()
      .insert(self.label(), desired.value.clone());
    Ok(())
  }

  async fn delete(&self, ledger: &Ledger, _actual: &UnitState) -> Result<(), TaskError> {
    ledger.record(format!("delete {}", self.label()));
    self.check(ledger)?;
    ledger.objects.lock().unwrap().remove(&self.label());
    Ok(())
  }
}

fn unit(name: &str, needs: &[&str]) -> Unit {
  Unit {
    name: Some(name.into()),
    value: format!("{name}-value"),
    needs: needs.iter().map(|n| TaskRef::named(*n)).collect(),
    panics: false,
  }
}

fn key(name: &str) -> TaskKey {
  TaskKey::new("unit", name)
}

fn map(units: Vec<Unit>) -> TaskMap<Ledger> {
  let mut tasks = TaskMap::new();
  for u in units {
    tasks.add_task(u).unwrap();
  }
  tasks
}

fn engine(ledger: &Arc<Ledger>) -> Engine<Ledger> {
  Engine::new(ledger.clone(), EngineConfig::default())
}

#[tokio::test]
async fn test_dependency_converges_first() {
  let ledger = Arc::new(Ledger::default());
  let mut tasks = TaskMap::<Ledger>::new();
  let v1 = tasks.add_task(unit("v1", &[])).unwrap();
  let s1 = tasks.add_task(unit("s1", &["v1"])).unwrap();

  let report = engine(&ledger)
    .run(&tasks, Lifecycle::Apply, CancellationToken::new())
    .await
    .unwrap();

  assert!(report.is_success());
  assert!(Arc::ptr_eq(s1.needs[0].get().unwrap(), &v1));
  assert!(ledger.position("create v1") < ledger.position("find s1"));
  assert_eq!(report.changes().count(), 2);
}

#[tokio::test]
async fn test_failure_blocks_dependents_only() {
  let ledger = Arc::new(Ledger::default());
  ledger.fail("x");
  let tasks = map(vec![
    unit("x", &[]),
    unit("y", &["x"]),
    unit("w", &["y"]),
    unit("z", &[]),
  ]);

  let report = engine(&ledger)
    .run(&tasks, Lifecycle::Apply, CancellationToken::new())
    .await
    .unwrap();

  assert!(!report.is_success());
  assert!(matches!(
    report.outcome(&key("x")),
    Some(TaskOutcome::Failed(TaskError::Provider { .. }))
  ));
  for blocked in ["y", "w"] {
    match report.outcome(&key(blocked)) {
      Some(TaskOutcome::Blocked { by }) => assert_eq!(by, &key("x")),
      other => panic!("{blocked}: expected blocked, got {other:?}"),
    }
  }
  assert!(report.outcome(&key("z")).unwrap().is_done());
  assert!(!ledger.log().iter().any(|e| e.ends_with(" y") || e.ends_with(" w")));

  let err = report.into_result().unwrap_err();
  let text = err.to_string();
  assert!(text.contains("failed   unit:x: provider call failed: x rejected"));
  assert!(text.contains("blocked  unit:y: blocked by unit:x"));
  assert!(text.contains("blocked  unit:w: blocked by unit:x"));
}

#[tokio::test]
async fn test_cycle_fails_before_any_provider_call() {
  let ledger = Arc::new(Ledger::default());
  let tasks = map(vec![unit("a", &["b"]), unit("b", &["a"]), unit("c", &[])]);

  let err = engine(&ledger)
    .run(&tasks, Lifecycle::Apply, CancellationToken::new())
    .await
    .unwrap_err();

  match err {
    EngineError::Graph(GraphError::Cycle { path }) => {
      assert!(path.contains(&key("a")) && path.contains(&key("b")));
    }
    other => panic!("expected cycle, got {other:?}"),
  }
  assert!(ledger.log().is_empty());
}

#[tokio::test]
async fn test_unresolved_reference_fails_before_any_provider_call() {
  let ledger = Arc::new(Ledger::default());
  let tasks = map(vec![unit("s1", &["missing"]), unit("v1", &[])]);

  let err = engine(&ledger)
    .run(&tasks, Lifecycle::Apply, CancellationToken::new())
    .await
    .unwrap_err();

  assert!(matches!(err, EngineError::Resolve(_)));
  assert!(ledger.log().is_empty());
}

#[tokio::test]
async fn test_second_run_is_a_fixed_point() {
  let ledger = Arc::new(Ledger::default());
  let tasks = map(vec![unit("v1", &[]), unit("s1", &["v1"]), unit("s2", &["v1"])]);
  let engine = engine(&ledger);

  let first = engine
    .run(&tasks, Lifecycle::Apply, CancellationToken::new())
    .await
    .unwrap();
  assert_eq!(first.changes().count(), 3);
  let mutations = ledger.mutations().len();

  let second = engine
    .run(&tasks, Lifecycle::Apply, CancellationToken::new())
    .await
    .unwrap();
  assert!(second.is_success());
  assert_eq!(second.changes().count(), 0);
  assert_eq!(ledger.mutations().len(), mutations);
  assert_ne!(first.run_id, second.run_id);
}

#[tokio::test]
async fn test_changed_value_is_updated() {
  let ledger = Arc::new(Ledger::default());
  ledger
    .objects
    .lock()
    .unwrap()
    .insert("v1".into(), "old".into());
  let tasks = map(vec![unit("v1", &[])]);

  let report = engine(&ledger)
    .run(&tasks, Lifecycle::Apply, CancellationToken::new())
    .await
    .unwrap();

  let delta = report.outcome(&key("v1")).unwrap().delta().unwrap();
  assert_eq!(delta.changes.len(), 1);
  assert_eq!(delta.changes[0].field, "value");
  assert_eq!(ledger.mutations(), vec!["update v1"]);
}

#[tokio::test]
async fn test_destroy_runs_dependents_first() {
  let ledger = Arc::new(Ledger::default());
  let tasks = map(vec![unit("v1", &[]), unit("s1", &["v1"]), unit("i1", &["s1"])]);
  let engine = engine(&ledger);
  engine
    .run(&tasks, Lifecycle::Apply, CancellationToken::new())
    .await
    .unwrap();

  let report = engine
    .run(&tasks, Lifecycle::Destroy, CancellationToken::new())
    .await
    .unwrap();

  assert!(report.is_success());
  assert!(ledger.position("delete i1") < ledger.position("delete s1"));
  assert!(ledger.position("delete s1") < ledger.position("delete v1"));
  assert!(ledger.objects.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_delete_keeps_what_it_depends_on() {
  let ledger = Arc::new(Ledger::default());
  let tasks = map(vec![unit("v1", &[]), unit("s1", &["v1"])]);
  let engine = engine(&ledger);
  engine
    .run(&tasks, Lifecycle::Apply, CancellationToken::new())
    .await
    .unwrap();
  ledger.fail("s1");

  let report = engine
    .run(&tasks, Lifecycle::Destroy, CancellationToken::new())
    .await
    .unwrap();

  assert!(matches!(
    report.outcome(&key("v1")),
    Some(TaskOutcome::Blocked { by }) if by == &key("s1")
  ));
  assert!(ledger.objects.lock().unwrap().contains_key("v1"));
}

#[tokio::test]
async fn test_dry_run_reports_without_mutating() {
  let ledger = Arc::new(Ledger::default());
  let tasks = map(vec![unit("v1", &[]), unit("s1", &["v1"])]);

  let report = engine(&ledger)
    .run(&tasks, Lifecycle::DryRun, CancellationToken::new())
    .await
    .unwrap();

  assert!(report.is_success());
  let changes: Vec<_> = report.changes().collect();
  assert_eq!(changes.len(), 2);
  assert!(changes.iter().all(|d| !d.applied));
  assert!(ledger.mutations().is_empty());
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
  let ledger = Arc::new(Ledger::with_delay(Duration::from_millis(20)));
  let names = ["a", "b", "c", "d", "e", "f"];
  let tasks = map(names.iter().map(|n| unit(n, &[])).collect());
  let engine = Engine::new(
    ledger.clone(),
    EngineConfig {
      concurrency: 2,
      fail_fast: false,
    },
  );

  let report = engine
    .run(&tasks, Lifecycle::Apply, CancellationToken::new())
    .await
    .unwrap();

  assert!(report.is_success());
  let peak = ledger.peak.load(Ordering::SeqCst);
  assert!(peak >= 1 && peak <= 2, "peak was {peak}");
}

#[tokio::test]
async fn test_independent_tasks_overlap() {
  let ledger = Arc::new(Ledger::with_delay(Duration::from_millis(50)));
  let tasks = map(vec![unit("a", &[]), unit("b", &[]), unit("c", &[])]);

  engine(&ledger)
    .run(&tasks, Lifecycle::Apply, CancellationToken::new())
    .await
    .unwrap();

  assert!(ledger.peak.load(Ordering::SeqCst) > 1);
}

#[tokio::test]
async fn test_cancelled_before_start_runs_nothing() {
  let ledger = Arc::new(Ledger::default());
  let tasks = map(vec![unit("a", &[]), unit("b", &["a"])]);
  let cancel = CancellationToken::new();
  cancel.cancel();

  let report = engine(&ledger)
    .run(&tasks, Lifecycle::Apply, cancel)
    .await
    .unwrap();

  assert_eq!(report.cancelled().count(), 2);
  assert!(ledger.log().is_empty());
  assert!(report.into_result().is_err());
}

#[tokio::test]
async fn test_fail_fast_stops_scheduling() {
  let ledger = Arc::new(Ledger::default());
  for name in ["a", "b", "c"] {
    ledger.fail(name);
  }
  let tasks = map(vec![unit("a", &[]), unit("b", &[]), unit("c", &[])]);
  let engine = Engine::new(
    ledger.clone(),
    EngineConfig {
      concurrency: 1,
      fail_fast: true,
    },
  );

  let report = engine
    .run(&tasks, Lifecycle::Apply, CancellationToken::new())
    .await
    .unwrap();

  // Whichever sibling starts first fails; the rest never start.
  let failed: Vec<_> = report.failures().map(|(key, _)| key.clone()).collect();
  assert_eq!(failed.len(), 1);
  assert_eq!(report.cancelled().count(), 2);
  assert!(report.cancelled().all(|key| *key != failed[0]));
  assert_eq!(
    ledger.log(),
    vec![format!("find {}", failed[0].name()), format!("create {}", failed[0].name())]
  );
}

#[tokio::test]
async fn test_lookup_failure_never_creates() {
  let ledger = Arc::new(Ledger::default());
  ledger.broken_lookups.lock().unwrap().insert("a".into());
  let tasks = map(vec![unit("a", &[])]);

  let report = engine(&ledger)
    .run(&tasks, Lifecycle::Apply, CancellationToken::new())
    .await
    .unwrap();

  assert!(matches!(
    report.outcome(&key("a")),
    Some(TaskOutcome::Failed(TaskError::Discovery { .. }))
  ));
  assert!(ledger.mutations().is_empty());
}

#[tokio::test]
async fn test_panicking_task_fails_and_blocks() {
  let ledger = Arc::new(Ledger::default());
  let mut boom = unit("boom", &[]);
  boom.panics = true;
  let tasks = map(vec![boom, unit("after", &["boom"]), unit("other", &[])]);

  let report = engine(&ledger)
    .run(&tasks, Lifecycle::Apply, CancellationToken::new())
    .await
    .unwrap();

  match report.outcome(&key("boom")) {
    Some(TaskOutcome::Failed(TaskError::Panicked { message })) => {
      assert_eq!(message, "unit boom exploded");
    }
    other => panic!("expected panic failure, got {other:?}"),
  }
  assert!(matches!(
    report.outcome(&key("after")),
    Some(TaskOutcome::Blocked { .. })
  ));
  assert!(report.outcome(&key("other")).unwrap().is_done());
}

#[tokio::test]
async fn test_events_follow_the_run() {
  let ledger = Arc::new(Ledger::default());
  let tasks = map(vec![unit("v1", &[]), unit("s1", &["v1"])]);
  let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
  let engine = engine(&ledger).with_notifier(ChannelNotifier::new(tx));

  let report = engine
    .run(&tasks, Lifecycle::Apply, CancellationToken::new())
    .await
    .unwrap();
  drop(engine);

  let mut events = Vec::new();
  while let Some(event) = rx.recv().await {
    events.push(event);
  }

  assert!(matches!(
    events.first(),
    Some(ExecutionEvent::RunStarted { tasks: 2, .. })
  ));
  assert!(matches!(
    events.last(),
    Some(ExecutionEvent::RunCompleted { success: true, run_id }) if run_id == &report.run_id
  ));
  let phases: Vec<(String, Phase)> = events
    .iter()
    .filter_map(|e| match e {
      ExecutionEvent::TaskStarted { task, phase, .. } => Some((task.to_string(), *phase)),
      _ => None,
    })
    .collect();
  assert_eq!(
    phases,
    vec![
      ("unit:v1".to_string(), Phase::Find),
      ("unit:v1".to_string(), Phase::Render),
      ("unit:s1".to_string(), Phase::Find),
      ("unit:s1".to_string(), Phase::Render),
    ]
  );
  let completed = events
    .iter()
    .filter(|e| matches!(e, ExecutionEvent::TaskCompleted { .. }))
    .count();
  assert_eq!(completed, 2);
}

#[tokio::test]
async fn test_zero_concurrency_is_rejected() {
  let ledger = Arc::new(Ledger::default());
  let tasks = map(vec![unit("a", &[])]);
  let engine = Engine::new(
    ledger.clone(),
    EngineConfig {
      concurrency: 0,
      fail_fast: false,
    },
  );

  let err = engine
    .run(&tasks, Lifecycle::Apply, CancellationToken::new())
    .await
    .unwrap_err();
  assert!(matches!(err, EngineError::InvalidConfig { .. }));
}
