mod app;
mod logging;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use embench_core::{Config, ModelStatus, RunSummary};
use tracing::info;

use crate::logging::LogContext;

#[derive(Parser)]
#[command(name = "embench")]
#[command(about = "Resumable benchmark runs for embedding models", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "embench.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate every task that has no complete result yet
    Run {
        #[command(flatten)]
        selection: Selection,

        /// Worker count passed to the evaluation backend
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// Print pending work as JSON without evaluating anything
    Plan {
        #[command(flatten)]
        selection: Selection,
    },
    /// Show completed/total tasks per model and benchmark
    Status {
        #[command(flatten)]
        selection: Selection,
    },
    /// Render all configured reports from the result store
    Report,
}

#[derive(Args)]
struct Selection {
    /// Comma-separated benchmark keys (default: all configured)
    #[arg(short, long, value_delimiter = ',')]
    benchmarks: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::from_file(&cli.config)
        .with_context(|| format!("loading configuration {}", cli.config.display()))?;

    let logs = LogContext::init(config.log_dir.as_deref())?;
    if let Some(path) = logs.path() {
        info!(path = %path.display(), "Writing run log");
    }

    let result = run(cli.command, config).await;
    logs.shutdown()?;
    result
}

async fn run(command: Command, config: Config) -> Result<()> {
    let app = app::App::new(config)?;

    match command {
        Command::Run { selection, workers } => {
            let summary = app.run(&selection.benchmarks, workers).await?;
            print_summary(&summary)?;
            if !summary.is_clean() {
                bail!(
                    "{} task(s) failed, {} not run",
                    summary.tasks_failed(),
                    summary.tasks_not_run()
                );
            }
        }
        Command::Plan { selection } => {
            let plan = app.plan(&selection.benchmarks);
            eprintln!(
                "{} task(s) pending across {} model(s); {} model(s) complete",
                plan.task_count(),
                plan.queues.len(),
                plan.complete.len()
            );
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        Command::Status { selection } => {
            print_status(&app.status(&selection.benchmarks));
        }
        Command::Report => {
            let outcome = app.report();
            for path in &outcome.written {
                println!("{}", path.display());
            }
            if !outcome.failed.is_empty() {
                bail!("{} report(s) failed", outcome.failed.len());
            }
        }
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) -> Result<()> {
    eprintln!(
        "Models loaded: {}, tasks succeeded: {}, failed: {}, not run: {}",
        summary.models_loaded(),
        summary.tasks_succeeded(),
        summary.tasks_failed(),
        summary.tasks_not_run()
    );
    println!("{}", serde_json::to_string_pretty(summary)?);
    Ok(())
}

fn print_status(status: &[ModelStatus]) {
    let width = status
        .iter()
        .map(|s| s.model.id.len())
        .max()
        .unwrap_or(0)
        .max("model".len());

    let benchmarks: Vec<&str> = status
        .first()
        .map(|s| s.benchmarks.iter().map(|b| b.benchmark.as_str()).collect())
        .unwrap_or_default();

    let mut header = format!("{:<width$}", "model");
    for benchmark in &benchmarks {
        header.push_str(&format!("  {benchmark:>12}"));
    }
    println!("{header}");

    for model in status {
        let mut line = format!("{:<width$}", model.model.id);
        for b in &model.benchmarks {
            let cell = format!("{}/{}", b.completed, b.total);
            line.push_str(&format!("  {cell:>12}"));
        }
        if model.is_complete() {
            line.push_str("  done");
        }
        println!("{line}");
    }
}
