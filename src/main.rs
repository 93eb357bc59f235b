use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use braid_config::WorkflowDef;
use braid_dispatch::{ComponentRegistry, TracingLogSink};
use braid_engine::{
  ChannelNotifier, ExecutionEvent, Orchestrator, OrchestratorConfig, register_builtins,
};
use braid_store::MemoryStore;
use braid_workflow::{TreeNode, Workflow};

/// Braid - a workflow orchestration engine with branch joins
#[derive(Parser)]
#[command(name = "braid")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Log filter, e.g. "info" or "braid_join=debug"
  #[arg(long, global = true, env = "RUST_LOG", default_value = "info")]
  log_level: String,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Print the node tree of a workflow definition
  Inspect {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,
  },

  /// Run a workflow once with the built-in components
  Run {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,

    /// Initial data as a JSON object (default: read from stdin)
    #[arg(long)]
    data: Option<String>,

    /// Give up when the run has not completed after this many milliseconds
    #[arg(long, default_value_t = 30_000)]
    timeout_ms: u64,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
    .with_target(false)
    .with_writer(io::stderr)
    .init();

  match cli.command {
    Some(Commands::Inspect { workflow_file }) => inspect(&workflow_file)?,
    Some(Commands::Run {
      workflow_file,
      data,
      timeout_ms,
    }) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(run_workflow(
        workflow_file,
        data,
        Duration::from_millis(timeout_ms),
      ))?;
    }
    None => {
      println!("braid - use --help to see available commands");
    }
  }

  Ok(())
}

fn load_workflow(workflow_file: &Path) -> Result<Workflow> {
  let def = WorkflowDef::from_path(workflow_file)
    .with_context(|| format!("failed to load workflow file: {}", workflow_file.display()))?;
  Workflow::from_def(def)
    .with_context(|| format!("invalid workflow: {}", workflow_file.display()))
}

fn inspect(workflow_file: &Path) -> Result<()> {
  let workflow = load_workflow(workflow_file)?;
  println!("{} ({})", workflow.name, workflow.workflow_id);
  if let Some(description) = &workflow.description {
    println!("{description}");
  }
  print!("{}", outline(&workflow));

  let graph = workflow.graph();
  let mut joins: Vec<&str> = graph
    .join_points()
    .iter()
    .filter_map(|id| workflow.node(id))
    .map(|node| node.route_key())
    .collect();
  joins.sort_unstable();
  if !joins.is_empty() {
    println!("join points: {}", joins.join(", "));
  }
  Ok(())
}

/// One line per tree entry; nodes already shown are printed as links.
fn outline(workflow: &Workflow) -> String {
  fn walk(workflow: &Workflow, tree: &TreeNode, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    match tree {
      TreeNode::Node { node, children } => {
        let component = node
          .component
          .as_deref()
          .map(|c| format!(" [{c}]"))
          .unwrap_or_default();
        out.push_str(&format!(
          "{indent}{} ({:?}){component}\n",
          node.route_key(),
          node.node_type
        ));
        for child in children {
          walk(workflow, child, depth + 1, out);
        }
      }
      TreeNode::Link { id } => {
        let key = workflow.node(id).map(|n| n.route_key()).unwrap_or(id);
        out.push_str(&format!("{indent}-> {key}\n"));
      }
    }
  }

  let mut out = String::new();
  for root in workflow.inflate() {
    walk(workflow, &root, 0, &mut out);
  }
  out
}

async fn run_workflow(workflow_file: PathBuf, data: Option<String>, timeout: Duration) -> Result<()> {
  let workflow = load_workflow(&workflow_file)?;
  let workflow_id = workflow.workflow_id.clone();
  eprintln!("Loaded workflow: {}", workflow.name);

  let data = match data {
    Some(data) => serde_json::from_str(&data).context("failed to parse --data JSON")?,
    None => read_payload_from_stdin()?,
  };
  let serde_json::Value::Object(data) = data else {
    bail!("initial data must be a JSON object");
  };

  let mut registry = ComponentRegistry::new();
  register_builtins(&mut registry);

  let (notifier, mut events) = ChannelNotifier::channel();
  let orchestrator = Orchestrator::with_notifier(
    OrchestratorConfig::default(),
    Arc::new(MemoryStore::new()),
    Arc::new(registry),
    Arc::new(TracingLogSink),
    notifier,
  );
  orchestrator
    .deploy(workflow)
    .await
    .context("failed to deploy workflow")?;

  let started = orchestrator
    .start(&workflow_id, data)
    .await
    .context("failed to start workflow")?;
  eprintln!("Started execution: {started}");

  let mut last_data = serde_json::Value::Null;
  let completed = tokio::time::timeout(timeout, async {
    while let Some(event) = events.recv().await {
      match event {
        ExecutionEvent::NodeCompleted { data, .. } => last_data = data,
        ExecutionEvent::NodeFailed { node_id, error, .. } => {
          bail!("node {node_id} failed: {error}");
        }
        ExecutionEvent::WorkflowCompleted { execution_id } => return Ok(execution_id),
        _ => {}
      }
    }
    bail!("execution events closed before completion")
  })
  .await
  .with_context(|| format!("workflow did not complete within {}ms", timeout.as_millis()))??;

  eprintln!("Execution completed: {completed}");
  println!("{}", serde_json::to_string_pretty(&last_data)?);

  orchestrator.flush().await;
  orchestrator.shutdown();
  Ok(())
}

fn read_payload_from_stdin() -> Result<serde_json::Value> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    // No stdin pipe, use empty object
    Ok(serde_json::json!({}))
  } else {
    let mut input = String::new();
    io::stdin()
      .read_to_string(&mut input)
      .context("failed to read payload from stdin")?;

    if input.trim().is_empty() {
      Ok(serde_json::json!({}))
    } else {
      serde_json::from_str(&input).context("failed to parse payload JSON from stdin")
    }
  }
}
