use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::signal;
use tokio::sync::mpsc;

use foreman::config::Config;
use foreman::core::{TaskGraph, TaskSpec};
use foreman::sandbox::{ContainerConfig, ContainerRuntime};
use foreman::worker::{AgentEvent, WorkerPool};
use foreman::{flog, Error, Result};

/// Foreman - sandboxed coding-agent orchestration
#[derive(Parser, Debug)]
#[command(name = "foreman")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    FOREMAN_DEBUG=1     Enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.foreman/foreman.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Build and print the dependency graph for a tasks JSON file
    Graph {
        /// Path to a JSON array of tasks ({id, title, status, blocked_by})
        file: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: GraphFormat,
    },

    /// Run one worker in a sandbox and stream its output
    Run {
        /// The task description handed to the worker
        prompt: String,

        /// Container image (defaults to the configured image)
        #[arg(long)]
        image: Option<String>,

        /// Host directory mounted read-write at /workspace
        #[arg(long, default_value = ".")]
        workdir: PathBuf,

        /// Host directory mounted read-only at /plan
        #[arg(long)]
        plan_dir: Option<PathBuf>,

        /// Extra environment variables (KEY=VALUE, repeatable)
        #[arg(long = "env", value_name = "KEY=VALUE")]
        env: Vec<String>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    foreman::log::init_with_debug(cli.debug);

    match cli.command {
        Command::Graph { file, format } => run_graph(&file, format),
        Command::Run {
            prompt,
            image,
            workdir,
            plan_dir,
            env,
        } => run_worker(&prompt, image, workdir, plan_dir, &env).await,
    }
}

fn run_graph(file: &PathBuf, format: GraphFormat) -> Result<()> {
    let data = std::fs::read_to_string(file)?;
    let tasks: Vec<TaskSpec> = serde_json::from_str(&data)?;
    let graph = TaskGraph::build(&tasks)?;

    match format {
        GraphFormat::Json => println!("{}", serde_json::to_string_pretty(&graph)?),
        GraphFormat::Text => print!("{}", render_graph_text(&graph)),
    }
    Ok(())
}

/// Layered text rendering: one line per task, grouped by depth, critical
/// path marked with `*`.
fn render_graph_text(graph: &TaskGraph) -> String {
    let mut out = String::new();
    for depth in 0..=graph.max_depth {
        let mut layer: Vec<_> = graph
            .nodes
            .values()
            .filter(|n| n.depth == depth)
            .collect();
        if layer.is_empty() {
            continue;
        }
        layer.sort_by(|a, b| a.id.cmp(&b.id));

        out.push_str(&format!("depth {}:\n", depth));
        for node in layer {
            let marker = if node.on_critical_path { "*" } else { " " };
            let blockers = if node.blocked_by.is_empty() {
                String::new()
            } else {
                format!("  <- {}", node.blocked_by.join(", "))
            };
            out.push_str(&format!(
                "  {} {} [{}] {}{}\n",
                marker, node.id, node.status, node.title, blockers
            ));
        }
    }
    if !graph.critical_path.is_empty() {
        out.push_str(&format!(
            "critical path: {}\n",
            graph.critical_path.join(" -> ")
        ));
    }
    out
}

async fn run_worker(
    prompt: &str,
    image: Option<String>,
    workdir: PathBuf,
    plan_dir: Option<PathBuf>,
    env: &[String],
) -> Result<()> {
    let config = Config::load()?;
    config.ensure_dirs()?;
    let runtime = ContainerRuntime::from_config(&config)?;

    let image = image.unwrap_or_else(|| config.effective_image().to_string());
    let workdir = workdir.canonicalize()?;
    let mut container = ContainerConfig::new(&image, &workdir, prompt);
    if let Some(dir) = plan_dir {
        container = container.with_plan_dir(&dir);
    }
    if let Some(proxy) = &config.proxy_url {
        container = container.with_env("TOOL_PROXY_URL", proxy);
    }
    for pair in env {
        let (key, value) = parse_env_pair(pair)?;
        container = container.with_env(key, value);
    }

    let (tx, mut rx) = mpsc::channel(256);
    let mut pool = WorkerPool::new(1, tx);
    let id = pool.spawn(&runtime, &container).await?;
    flog!("Dispatched worker {} with image {}", id.short(), image);

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                eprintln!("stopping worker {}", id.short());
                pool.stop_all().await;
                break;
            }
            event = rx.recv() => match event {
                Some(AgentEvent::Stream { event, .. }) => {
                    if let Some(text) = event.text() {
                        println!("[{}] {}", event.type_name(), text);
                    }
                }
                Some(AgentEvent::Completed { exit_code, .. }) => {
                    println!("worker {} completed (exit {})", id.short(), exit_code);
                    break;
                }
                Some(AgentEvent::Failed { error, .. }) => {
                    eprintln!("worker {} failed: {}", id.short(), error);
                    std::process::exit(1);
                }
                None => break,
            }
        }
    }
    Ok(())
}

fn parse_env_pair(pair: &str) -> Result<(&str, &str)> {
    pair.split_once('=')
        .ok_or_else(|| Error::Validation(format!("invalid env pair (expected KEY=VALUE): {}", pair)))
}
