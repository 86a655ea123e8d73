use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use switchyard_core::config::AppConfig;
use switchyard_core::event::EventBus;
use switchyard_core::graph::Graph;

use switchyard_engine::{validate, RunLogger, RunState, WorkflowEngine};
use switchyard_integrations::IntegrationRouter;

const DEFAULT_CONFIG: &str = "switchyard.toml";

#[derive(Parser)]
#[command(name = "switchyard", version, about = "Workflow graph simulation engine")]
struct Cli {
    /// Path to config file (default: ./switchyard.toml, then ~/.switchyard/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow graph and print the run report
    Run {
        /// Graph JSON in the editor's `{nodes, edges}` format
        graph: PathBuf,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check a workflow graph without running it
    Validate {
        graph: PathBuf,
    },
    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("switchyard=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Validate { graph } => {
            let graph = load_graph(&graph)?;
            let report = validate(&graph);
            for warning in report.warning_messages() {
                println!("warning: {}", warning);
            }
            for error in report.error_messages() {
                println!("error: {}", error);
            }
            if !report.valid {
                anyhow::bail!("workflow is invalid ({} errors)", report.errors.len());
            }
            println!(
                "Workflow is valid: {} nodes, {} edges",
                graph.nodes.len(),
                graph.edges.len()
            );
            Ok(())
        }
        Commands::Run { graph, json } => run(&config, &graph, json).await,
    }
}

async fn run(config: &AppConfig, path: &Path, json: bool) -> anyhow::Result<()> {
    let graph = load_graph(path)?;

    let check = validate(&graph);
    for warning in check.warning_messages() {
        warn!("{}", warning);
    }
    if !check.valid {
        for error in check.error_messages() {
            eprintln!("error: {}", error);
        }
        anyhow::bail!("refusing to run an invalid workflow");
    }

    let router = Arc::new(IntegrationRouter::new(config)?);
    let event_bus = Arc::new(EventBus::default());
    let engine = WorkflowEngine::new(router, config).with_events(event_bus.clone());

    // Subscribe before the run so RunStarted is not missed
    let cancel = CancellationToken::new();
    let logger = config.log_dir().map(|log_dir| {
        let rx = event_bus.subscribe();
        info!(dir = %log_dir.display(), "Run logging enabled");
        tokio::spawn(RunLogger::new(log_dir).run(rx, cancel.clone()))
    });

    let report = engine.run(&graph).await;

    if let Some(handle) = logger {
        match handle.await {
            Ok(Some(path)) => info!(path = %path.display(), "Run log written"),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "RunLogger task failed"),
        }
    }
    cancel.cancel();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in report.log_lines() {
            println!("{}", line);
        }
        for error in &report.errors {
            println!("error: {}", error);
        }
        println!("{}", report.summary());
    }

    if report.state == RunState::Failed {
        anyhow::bail!("run {} failed", report.run_id);
    }
    Ok(())
}

fn load_graph(path: &Path) -> anyhow::Result<Graph> {
    Graph::from_file(path).with_context(|| format!("failed to load graph from {}", path.display()))
}

/// An explicit path must exist; otherwise fall back through the defaults.
fn load_config(explicit: Option<&Path>) -> anyhow::Result<AppConfig> {
    if let Some(path) = explicit {
        return Ok(AppConfig::load(path)?);
    }

    let local = PathBuf::from(DEFAULT_CONFIG);
    if local.exists() {
        return Ok(AppConfig::load(&local)?);
    }
    if let Some(home) = dirs_home().map(|h| h.join(".switchyard").join("config.toml")) {
        if home.exists() {
            info!(path = %home.display(), "Loading config from home directory");
            return Ok(AppConfig::load(&home)?);
        }
    }
    info!("No config file found, using defaults");
    Ok(AppConfig::default())
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
