use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use cairn_graph::Graph;
use cairn_task::{Context, Delta, Lifecycle, Task, TaskError, TaskKey, TaskMap};
use futures::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier, Phase};
use crate::report::{RunReport, TaskOutcome};

/// Converges task maps against one provider.
pub struct Engine<C, N = NoopNotifier> {
  cloud: Arc<C>,
  config: EngineConfig,
  notifier: Arc<N>,
}

impl<C> Engine<C>
where
  C: Send + Sync + 'static,
{
  pub fn new(cloud: Arc<C>, config: EngineConfig) -> Self {
    Self {
      cloud,
      config,
      notifier: Arc::new(NoopNotifier),
    }
  }
}

impl<C, N> Engine<C, N>
where
  C: Send + Sync + 'static,
  N: ExecutionNotifier + 'static,
{
  /// Replace the notifier that receives [`ExecutionEvent`]s.
  pub fn with_notifier<M: ExecutionNotifier + 'static>(self, notifier: M) -> Engine<C, M> {
    Engine {
      cloud: self.cloud,
      config: self.config,
      notifier: Arc::new(notifier),
    }
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  pub fn cloud(&self) -> &Arc<C> {
    &self.cloud
  }

  /// Converge every task in `tasks`.
  ///
  /// References are resolved and the graph is built first; any problem
  /// there is returned as an error before a single provider call. After
  /// that the run always produces a report, successful or not. Cancelling
  /// `cancel` stops new tasks from starting and lets running ones finish.
  #[instrument(
    name = "engine_run",
    skip_all,
    fields(lifecycle = %lifecycle, tasks = tasks.len())
  )]
  pub async fn run(
    &self,
    tasks: &TaskMap<C>,
    lifecycle: Lifecycle,
    cancel: CancellationToken,
  ) -> Result<RunReport, EngineError> {
    self.config.validate()?;
    cairn_resolver::resolve(tasks)?;
    let graph = Graph::build(tasks)?;
    let graph = match lifecycle {
      Lifecycle::Destroy => graph.reversed(),
      Lifecycle::Apply | Lifecycle::DryRun => graph,
    };

    let run_id = uuid::Uuid::new_v4().to_string();
    info!(
      run_id = %run_id,
      lifecycle = %lifecycle,
      tasks = tasks.len(),
      edges = graph.edge_count(),
      "run_started"
    );
    self.notifier.notify(ExecutionEvent::RunStarted {
      run_id: run_id.clone(),
      lifecycle,
      tasks: tasks.len(),
    });

    let ctx = Context::new(self.cloud.clone(), lifecycle, run_id.clone());
    let outcomes = self.schedule(tasks, &graph, &ctx, &cancel).await;

    let report = RunReport {
      run_id,
      lifecycle,
      outcomes,
    };
    if report.is_success() {
      info!(
        run_id = %report.run_id,
        changes = report.changes().count(),
        "run_completed"
      );
    } else {
      error!(
        run_id = %report.run_id,
        failed = report.failures().count(),
        blocked = report.blocked().count(),
        cancelled = report.cancelled().count(),
        "run_failed"
      );
    }
    self.notifier.notify(ExecutionEvent::RunCompleted {
      run_id: report.run_id.clone(),
      success: report.is_success(),
    });
    Ok(report)
  }

  /// Dependency-count scheduling: a task is spawned once every task
  /// upstream of it is `Done`, with at most `concurrency` in flight.
  async fn schedule(
    &self,
    tasks: &TaskMap<C>,
    graph: &Graph,
    ctx: &Context<C>,
    cancel: &CancellationToken,
  ) -> BTreeMap<TaskKey, TaskOutcome> {
    let mut pending: BTreeMap<&TaskKey, usize> = graph
      .nodes()
      .map(|key| (key, graph.upstream(key).len()))
      .collect();
    let mut ready: BTreeSet<&TaskKey> = graph.entry_points().iter().collect();
    let mut outcomes: BTreeMap<TaskKey, TaskOutcome> = BTreeMap::new();
    let mut running: JoinSet<(TaskKey, Result<Delta, TaskError>)> = JoinSet::new();
    let mut stopping = false;

    loop {
      if !stopping && cancel.is_cancelled() {
        warn!(run_id = %ctx.run_id(), "run cancelled, draining running tasks");
        stopping = true;
      }

      while !stopping && running.len() < self.config.concurrency {
        let Some(key) = ready.pop_first() else {
          break;
        };
        let Some(task) = tasks.get(key) else {
          continue;
        };
        running.spawn(converge(
          task.clone(),
          key.clone(),
          ctx.clone(),
          self.notifier.clone(),
        ));
      }

      if running.is_empty() {
        break;
      }

      let joined = tokio::select! {
        joined = running.join_next() => joined,
        _ = cancel.cancelled(), if !stopping => continue,
      };
      let Some(joined) = joined else {
        break;
      };

      let (key, result) = match joined {
        Ok(done) => done,
        Err(err) => {
          // Panics are caught inside the worker, so this is only an abort.
          error!(run_id = %ctx.run_id(), error = %err, "task worker aborted");
          continue;
        }
      };

      match result {
        Ok(delta) => {
          if !delta.is_noop() {
            info!(task = %key, action = ?delta.action, applied = delta.applied, "task_changed");
          }
          self.notifier.notify(ExecutionEvent::TaskCompleted {
            run_id: ctx.run_id().to_string(),
            task: key.clone(),
            delta: delta.clone(),
          });
          for next in graph.downstream(&key) {
            if let Some(count) = pending.get_mut(next) {
              *count -= 1;
              if *count == 0 {
                ready.insert(next);
              }
            }
          }
          outcomes.insert(key, TaskOutcome::Done(delta));
        }
        Err(err) => {
          error!(run_id = %ctx.run_id(), task = %key, error = %err, "task_failed");
          self.notifier.notify(ExecutionEvent::TaskFailed {
            run_id: ctx.run_id().to_string(),
            task: key.clone(),
            error: err.to_string(),
          });
          self.block_dependents(graph, &key, ctx, &mut outcomes);
          outcomes.insert(key, TaskOutcome::Failed(err));
          if self.config.fail_fast && !stopping {
            warn!(run_id = %ctx.run_id(), "fail_fast set, draining running tasks");
            stopping = true;
          }
        }
      }
    }

    for key in graph.nodes() {
      outcomes
        .entry(key.clone())
        .or_insert(TaskOutcome::Cancelled);
    }
    outcomes
  }

  /// Mark every task downstream of `failed` that has no outcome yet as
  /// blocked by it.
  fn block_dependents(
    &self,
    graph: &Graph,
    failed: &TaskKey,
    ctx: &Context<C>,
    outcomes: &mut BTreeMap<TaskKey, TaskOutcome>,
  ) {
    let mut queue: VecDeque<&TaskKey> = graph.downstream(failed).iter().collect();
    while let Some(key) = queue.pop_front() {
      if outcomes.contains_key(key) {
        continue;
      }
      warn!(task = %key, by = %failed, "task_blocked");
      self.notifier.notify(ExecutionEvent::TaskBlocked {
        run_id: ctx.run_id().to_string(),
        task: key.clone(),
        by: failed.clone(),
      });
      outcomes.insert(
        key.clone(),
        TaskOutcome::Blocked {
          by: failed.clone(),
        },
      );
      queue.extend(graph.downstream(key));
    }
  }
}

/// Find then render one task. Runs on its own tokio task.
#[instrument(name = "task_converge", skip_all, fields(run_id = %ctx.run_id(), task = %key))]
async fn converge<C, N>(
  task: Arc<dyn Task<C>>,
  key: TaskKey,
  ctx: Context<C>,
  notifier: Arc<N>,
) -> (TaskKey, Result<Delta, TaskError>)
where
  C: Send + Sync + 'static,
  N: ExecutionNotifier + 'static,
{
  let work = async {
    notifier.notify(ExecutionEvent::TaskStarted {
      run_id: ctx.run_id().to_string(),
      task: key.clone(),
      phase: Phase::Find,
    });
    let observed = task.find(ctx.cloud()).await?;
    debug!(found = observed.is_found(), "observed");

    notifier.notify(ExecutionEvent::TaskStarted {
      run_id: ctx.run_id().to_string(),
      task: key.clone(),
      phase: Phase::Render,
    });
    task.render(&ctx, observed).await
  };

  let result = match AssertUnwindSafe(work).catch_unwind().await {
    Ok(result) => result,
    Err(panic) => Err(TaskError::Panicked {
      message: panic_message(panic.as_ref()),
    }),
  };
  (key, result)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
  if let Some(message) = panic.downcast_ref::<&str>() {
    message.to_string()
  } else if let Some(message) = panic.downcast_ref::<String>() {
    message.clone()
  } else {
    "unknown panic".to_string()
  }
}
