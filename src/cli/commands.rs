//! CLI command definitions for keyharvest.
//!
//! Thin glue over the library: load the config, expand tasks, and either
//! print the plan or run it and report the summary.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use crate::config::HarvestConfig;
use crate::engine::Engine;
use crate::handlers;
use crate::job::collect_tasks;
use crate::planner;

/// Default config file path.
const DEFAULT_CONFIG_PATH: &str = "harvest.json";

/// Multi-source keyword harvesting orchestrator.
#[derive(Parser)]
#[command(name = "keyharvest")]
#[command(about = "Run keyword harvest jobs against pluggable sources")]
#[command(version)]
#[command(
    long_about = "keyharvest expands declarative jobs (source + keywords + parameters) into tasks and executes them concurrently with per-task retries.\n\nExample usage:\n  keyharvest run --config harvest.json --sources echo --dry-run"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Execute the jobs from a config file.
    Run(RunArgs),

    /// List the built-in source keys.
    Sources,
}

/// Arguments for `keyharvest run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the harvest config file (JSON).
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Only run jobs with these ids (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub jobs: Vec<String>,

    /// Only run jobs with these source keys (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub sources: Vec<String>,

    /// Override the maximum number of concurrent tasks.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Override the per-task retry limit.
    #[arg(long)]
    pub retry_limit: Option<u32>,

    /// Print the planned tasks without executing them.
    #[arg(long)]
    pub dry_run: bool,

    /// Output the run summary as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parses the command line without executing anything.
///
/// Splitting parsing from execution lets the binary initialize logging
/// from `--log-level` before any command runs.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parses the command line and executes the selected command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Executes an already-parsed command line.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => {
            run_harvest_command(args).await?;
        }
        Commands::Sources => {
            run_sources_command();
        }
    }
    Ok(())
}

async fn run_harvest_command(args: RunArgs) -> anyhow::Result<()> {
    let config = HarvestConfig::load(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;

    let tasks = collect_tasks(&config.jobs, &args.jobs, &args.sources);
    info!(
        config = %args.config.display(),
        jobs = config.jobs.len(),
        tasks = tasks.len(),
        "collected tasks"
    );

    if args.dry_run {
        println!("Planned tasks ({}):", tasks.len());
        for line in planner::describe_tasks(&tasks) {
            println!(" - {line}");
        }
        return Ok(());
    }

    if tasks.is_empty() {
        warn!("no tasks to execute, check job filters and enabled flags");
    }

    let engine_config = config
        .global
        .engine_config(args.concurrency, args.retry_limit);
    let engine = Engine::new(engine_config, handlers::builtin_registry())?;

    let summary = engine.run_tasks(tasks).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("\n=== Harvest Summary ===");
        println!("Total tasks: {}", summary.total);
        println!("Success:     {}", summary.success);
        println!("Failed:      {}", summary.failed);
        println!("Skipped:     {}", summary.skipped);
    }

    Ok(())
}

fn run_sources_command() {
    for source in handlers::builtin_registry().sources() {
        println!("{source}");
    }
}
