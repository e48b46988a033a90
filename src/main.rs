mod config;
mod logging;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use cairn_cloudtasks::{MockCloud, cloud_types};
use cairn_engine::{Engine, EngineConfig, RunReport};
use cairn_graph::Graph;
use cairn_kutil::{KubeconfigBuilder, default_kubeconfig_path};
use cairn_loader::{FsModelStore, Loader, TypeRegistry};
use cairn_nodetasks::{HostApi, KubeApiServerBuilder, LocalHost, NodeConfig, node_types};
use cairn_task::{Lifecycle, ModelBuilder, TaskMap};

use crate::config::CairnConfig;

/// cairn - converge infrastructure described as a graph of tasks
#[derive(Parser)]
#[command(name = "cairn")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.cairn)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Log more (-v info, -vv debug); RUST_LOG takes precedence
  #[arg(short, long, global = true, action = clap::ArgAction::Count)]
  verbose: u8,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Converge cloud tasks loaded from a model directory
  Apply {
    #[command(flatten)]
    model: ModelArgs,

    #[command(flatten)]
    run: RunArgs,

    /// Cloud state file (default: <data-dir>/cloud.json)
    #[arg(long)]
    state: Option<PathBuf>,
  },

  /// Converge the local node from a node config
  Nodeup {
    /// Path to the node config (YAML)
    config: PathBuf,

    /// Directory host paths are placed under
    #[arg(long, default_value = "/")]
    root: PathBuf,

    /// Extra model directory with file tasks
    #[arg(long)]
    model: Option<PathBuf>,

    /// Layers of the extra model to load, in order
    #[arg(long = "layer", requires = "model")]
    layers: Vec<String>,

    #[command(flatten)]
    run: RunArgs,
  },

  /// Print the dependency graph of a model as Graphviz dot
  Graph {
    #[command(flatten)]
    model: ModelArgs,
  },

  /// Manage the kubeconfig entries for a cluster
  Kubecfg {
    #[command(subcommand)]
    action: KubecfgAction,
  },
}

#[derive(Args)]
struct ModelArgs {
  /// Model directory holding one subdirectory per layer
  model: PathBuf,

  /// Layers to load, in order
  #[arg(long = "layer", default_value = "cloudup")]
  layers: Vec<String>,

  /// Template variables as key=value (values parse as JSON, else string)
  #[arg(long = "set", value_parser = parse_assignment)]
  vars: Vec<(String, serde_json::Value)>,
}

#[derive(Args)]
struct RunArgs {
  /// Report what would change without changing it
  #[arg(long, conflicts_with = "destroy")]
  dry_run: bool,

  /// Delete everything the model describes, dependents first
  #[arg(long)]
  destroy: bool,

  /// Override the configured task concurrency
  #[arg(long)]
  concurrency: Option<usize>,

  /// Stop scheduling after the first failure
  #[arg(long)]
  fail_fast: bool,
}

#[derive(Subcommand)]
enum KubecfgAction {
  /// Add or update the cluster's entries and make its context current
  Write {
    #[command(flatten)]
    target: KubecfgTarget,

    /// Master address
    #[arg(long)]
    master: String,

    #[arg(long)]
    namespace: Option<String>,

    #[arg(long)]
    token: Option<String>,

    #[arg(long)]
    user: Option<String>,

    #[arg(long, requires = "user")]
    password: Option<String>,

    /// PEM file with the cluster CA
    #[arg(long)]
    ca_cert: Option<PathBuf>,
  },

  /// Remove the cluster's entries
  Delete {
    #[command(flatten)]
    target: KubecfgTarget,
  },
}

#[derive(Args)]
struct KubecfgTarget {
  /// Context name
  #[arg(long)]
  context: String,

  /// Kubeconfig file (default: $KUBECONFIG or ~/.kube/config)
  #[arg(long)]
  kubeconfig: Option<PathBuf>,
}

fn parse_assignment(s: &str) -> Result<(String, serde_json::Value), String> {
  let (key, value) = s
    .split_once('=')
    .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
  let value = serde_json::from_str(value).unwrap_or_else(|_| serde_json::Value::from(value));
  Ok((key.to_string(), value))
}

impl RunArgs {
  fn lifecycle(&self) -> Lifecycle {
    if self.destroy {
      Lifecycle::Destroy
    } else if self.dry_run {
      Lifecycle::DryRun
    } else {
      Lifecycle::Apply
    }
  }

  fn engine_config(&self, mut config: EngineConfig) -> Result<EngineConfig> {
    if let Some(concurrency) = self.concurrency {
      config.concurrency = concurrency;
    }
    config.fail_fast |= self.fail_fast;
    config.validate()?;
    Ok(config)
  }
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  logging::init(cli.verbose);

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".cairn"),
  };

  let Some(command) = cli.command else {
    println!("cairn - use --help to see available commands");
    return Ok(());
  };

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async {
    let config = CairnConfig::load(&data_dir.join("config.toml")).await?;
    match command {
      Commands::Apply { model, run, state } => {
        let state = state.unwrap_or_else(|| data_dir.join("cloud.json"));
        apply(&model, &run, &state, config.engine).await
      }
      Commands::Nodeup {
        config: node_config,
        root,
        model,
        layers,
        run,
      } => nodeup(&node_config, root, model, layers, &run, config.engine).await,
      Commands::Graph { model } => graph(&model).await,
      Commands::Kubecfg { action } => kubecfg(action).await,
    }
  })
}

fn cancel_on_ctrl_c() -> CancellationToken {
  let cancel = CancellationToken::new();
  let token = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      warn!("interrupted, waiting for running tasks");
      token.cancel();
    }
  });
  cancel
}

async fn load_cloud_tasks(model: &ModelArgs) -> Result<TaskMap<MockCloud>> {
  let mut registry = TypeRegistry::new();
  registry.add_types(cloud_types::<MockCloud>())?;
  let mut loader = Loader::new(registry);
  for (key, value) in &model.vars {
    loader.set_context(key.clone(), value)?;
  }

  let store = FsModelStore::new(&model.model);
  let layers: Vec<&str> = model.layers.iter().map(String::as_str).collect();
  loader
    .build_tasks(&store, &layers)
    .await
    .with_context(|| format!("failed to load model: {}", model.model.display()))
}

async fn converge<C: Send + Sync + 'static>(
  cloud: Arc<C>,
  tasks: &TaskMap<C>,
  run: &RunArgs,
  config: EngineConfig,
) -> Result<RunReport> {
  let lifecycle = run.lifecycle();
  let engine = Engine::new(cloud, run.engine_config(config)?);
  let report = engine.run(tasks, lifecycle, cancel_on_ctrl_c()).await?;

  for delta in report.changes() {
    println!("{}", delta.describe());
  }
  if report.changes().next().is_none() {
    println!("no changes");
  }
  Ok(report)
}

async fn apply(model: &ModelArgs, run: &RunArgs, state: &Path, config: EngineConfig) -> Result<()> {
  let tasks = load_cloud_tasks(model).await?;
  let cloud = Arc::new(
    MockCloud::load(state)
      .await
      .context("failed to load cloud state")?,
  );

  let report = converge(cloud.clone(), &tasks, run, config).await?;

  if report.lifecycle != Lifecycle::DryRun {
    if let Some(parent) = state.parent() {
      tokio::fs::create_dir_all(parent)
        .await
        .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    cloud
      .save(state)
      .await
      .context("failed to save cloud state")?;
    info!(path = %state.display(), "cloud state saved");
  }

  report.into_result()?;
  Ok(())
}

async fn nodeup(
  node_config: &Path,
  root: PathBuf,
  model: Option<PathBuf>,
  layers: Vec<String>,
  run: &RunArgs,
  config: EngineConfig,
) -> Result<()> {
  let text = tokio::fs::read_to_string(node_config)
    .await
    .with_context(|| format!("failed to read node config: {}", node_config.display()))?;
  let node: NodeConfig = serde_yaml::from_str(&text)
    .with_context(|| format!("failed to parse node config: {}", node_config.display()))?;

  let mut tasks = TaskMap::new();
  let builders: Vec<Box<dyn ModelBuilder<LocalHost>>> = vec![Box::new(KubeApiServerBuilder::new(node))];
  for builder in &builders {
    builder.build(&mut tasks)?;
  }

  if let Some(model) = model {
    load_node_model(&model, &layers, &mut tasks).await?;
  }
  if tasks.is_empty() {
    bail!("nothing to do: the node config produced no tasks");
  }

  let host = Arc::new(LocalHost::new(root));
  let report = converge(host, &tasks, run, config).await?;
  report.into_result()?;
  Ok(())
}

async fn load_node_model<H: HostApi>(model: &Path, layers: &[String], tasks: &mut TaskMap<H>) -> Result<()> {
  let mut registry = TypeRegistry::new();
  registry.add_types(node_types::<H>())?;
  let loader = Loader::new(registry);
  let layers: Vec<&str> = layers.iter().map(String::as_str).collect();
  loader
    .load_into(&FsModelStore::new(model), &layers, tasks)
    .await
    .with_context(|| format!("failed to load model: {}", model.display()))
}

async fn graph(model: &ModelArgs) -> Result<()> {
  let tasks = load_cloud_tasks(model).await?;
  let graph = Graph::build(&tasks)?;
  print!("{}", graph.to_dot());
  Ok(())
}

async fn kubecfg(action: KubecfgAction) -> Result<()> {
  let path = |target: &KubecfgTarget| match &target.kubeconfig {
    Some(path) => Ok(path.clone()),
    None => default_kubeconfig_path(),
  };

  match action {
    KubecfgAction::Write {
      target,
      master,
      namespace,
      token,
      user,
      password,
      ca_cert,
    } => {
      let ca_cert = match ca_cert {
        Some(file) => Some(
          tokio::fs::read(&file)
            .await
            .with_context(|| format!("failed to read {}", file.display()))?,
        ),
        None => None,
      };
      let builder = KubeconfigBuilder {
        master,
        context: target.context.clone(),
        namespace,
        bearer_token: token,
        user,
        password,
        ca_cert,
        ..Default::default()
      };
      let path = path(&target)?;
      builder
        .write_kubecfg(&path)
        .await
        .context("failed to write kubeconfig")?;
      println!("kubectl context set to {}", target.context);
    }
    KubecfgAction::Delete { target } => {
      let builder = KubeconfigBuilder {
        context: target.context.clone(),
        ..Default::default()
      };
      let path = path(&target)?;
      builder
        .delete_kubecfg(&path)
        .await
        .context("failed to delete kubeconfig entries")?;
      println!("deleted kubectl config for {}", target.context);
    }
  }
  Ok(())
}
