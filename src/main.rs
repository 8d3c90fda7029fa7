use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use nexus::audit::AuditLog;
use nexus::config::Config;
use nexus::orchestration::{work, BatchResult, ShellWork};
use nexus::state::CheckpointStore;
use nexus::{nlog, nlog_warn, progress, Error, ErrorStrategy, ExecutionEngine, Plan, Result};

/// How long `run` waits for the audit writer to drain after the engine stops.
const AUDIT_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Nexus - checkpoint-backed batch execution for feature plans
#[derive(Parser, Debug)]
#[command(name = "nexus")]
#[command(version, about, long_about = None)]
#[command(after_help = concat!(
    "ENVIRONMENT:\n",
    "    NEXUS_DEBUG=1               Enable debug logging (alternative to --debug)\n",
    "    NEXUS_LOG=<level>           Log threshold: error, warn, info, debug, trace\n",
    "    NEXUS_MAX_PARALLEL_TASKS    Override execution.max_parallel_tasks\n",
    "    NEXUS_TASK_TIMEOUT          Override execution.task_timeout_minutes\n",
    "    NEXUS_ERROR_STRATEGY        Override execution.error_strategy\n",
    "    NEXUS_MAX_RETRIES           Override execution.max_retries\n",
    "    NEXUS_RETRY_DELAY           Override execution.retry_delay_seconds",
))]
pub struct Cli {
    /// Enable debug logging (writes to ~/.nexus/nexus.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Project root holding .nexus.toml and .nexus-temp (defaults to the current directory)
    #[arg(short = 'p', long, global = true)]
    pub project: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Execute a JSON plan, resuming from its checkpoint when one exists
    Run {
        /// Path to the plan file
        plan: PathBuf,

        /// Discard any existing checkpoint and start over
        #[arg(long)]
        fresh: bool,

        /// Override the configured error strategy (retry, skip, fail-fast, ask)
        #[arg(long)]
        strategy: Option<ErrorStrategy>,
    },

    /// List stored checkpoints
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show the progress summary of one feature
    Show {
        feature: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Show where a feature would resume
    Resume { feature: String },

    /// Delete a feature's checkpoint
    Delete { feature: String },

    /// Print the effective configuration as TOML
    Config {
        /// Write the effective configuration to the project's .nexus.toml
        #[arg(long)]
        init: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    nexus::log::init_with_debug(cli.debug);

    let project = match cli.project {
        Some(path) => path,
        None => std::env::current_dir()?,
    };

    match cli.command {
        Command::Run {
            plan,
            fresh,
            strategy,
        } => run_plan(&project, &plan, fresh, strategy),
        Command::List { json } => run_list(&project, json),
        Command::Show { feature, json } => run_show(&project, &feature, json),
        Command::Resume { feature } => run_resume(&project, &feature),
        Command::Delete { feature } => run_delete(&project, &feature),
        Command::Config { init } => run_config(&project, init),
    }
}

fn open_store(project: &Path) -> Result<(Config, CheckpointStore)> {
    let config = Config::load(project)?;
    let store = CheckpointStore::new(config.checkpoint_dir(project));
    Ok((config, store))
}

/// Execute a plan with `sh -c` work and live progress output.
fn run_plan(
    project: &Path,
    plan_path: &Path,
    fresh: bool,
    strategy: Option<ErrorStrategy>,
) -> Result<()> {
    nlog!(
        "Run command: plan={}, fresh={}, strategy={:?}",
        plan_path.display(),
        fresh,
        strategy
    );

    let plan = Plan::load(plan_path)?;
    let (config, store) = open_store(project)?;
    let mut options = config.engine_options();
    if let Some(strategy) = strategy {
        options.error_strategy = strategy;
    }

    println!("Feature:  {}", plan.feature);
    println!(
        "Plan:     {} batches, {} tasks",
        plan.batches.len(),
        plan.total_tasks()
    );
    println!("Strategy: {}", options.error_strategy);
    println!();

    let rt = tokio::runtime::Runtime::new()?;
    let (results, interrupted) = rt.block_on(async {
        let (tx, rx) = mpsc::unbounded_channel();
        let audit = AuditLog::new(config.log_dir(project), &plan.feature).spawn(rx);

        let mut engine = ExecutionEngine::new(&plan.feature, Arc::new(store), options)
            .with_events(tx);
        let started = Instant::now();
        let total = plan.total_tasks();
        engine
            .on_task_start(|id, name| println!("  → {id} {name}"))
            .on_task_complete(|result| println!("{}", progress::task_line(result)))
            .on_progress_update(move |update| {
                let mut line = progress::progress_line(update);
                if let Some(eta) =
                    progress::estimate_remaining(started.elapsed(), update.completed, update.total)
                {
                    line.push_str(&format!(", ~{} left", progress::format_duration(eta)));
                }
                println!("{line}");
            })
            .on_batch_complete(|result| println!("{}\n", progress::batch_line(result)));

        let cancel = engine.cancellation_token();
        let ctrl_c = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nInterrupted, finishing in-flight work...");
                cancel.cancel();
            }
        });

        let work = work::shared(ShellWork::new(project));
        let outcome = engine.execute_all_batches(&plan.batches, work, !fresh).await;
        let interrupted = engine.is_cancelled();
        ctrl_c.abort();
        nlog!("Plan {} ran {} tasks", plan.feature, total);

        // The audit writer stops once the last event sender is gone.
        drop(engine);
        match tokio::time::timeout(AUDIT_FLUSH_TIMEOUT, audit).await {
            Ok(Ok(stats)) => nlog!(
                "Audit: {} completed, {} failed, {} skipped, {} retries",
                stats.completed_tasks,
                stats.failed_tasks,
                stats.skipped_tasks,
                stats.retried_tasks
            ),
            Ok(Err(e)) => nlog_warn!("Audit writer failed: {}", e),
            Err(_) => nlog_warn!("Audit writer did not finish in time"),
        }

        outcome.map(|results| (results, interrupted))
    })?;

    print_run_summary(&results);

    let (_, store) = open_store(project)?;
    if let Some(summary) = store.get_execution_summary(&plan.feature) {
        println!();
        println!("{}", progress::summary_report(&summary));
    }

    let failed: usize = results.iter().map(BatchResult::failed_count).sum();
    if interrupted {
        println!();
        println!("Run again to resume: nexus run {}", plan_path.display());
        return Err(Error::execution("execution cancelled"));
    }
    if failed > 0 {
        return Err(Error::execution(format!("{failed} task(s) failed")));
    }
    Ok(())
}

fn print_run_summary(results: &[BatchResult]) {
    let ok: usize = results.iter().map(BatchResult::success_count).sum();
    let failed: usize = results.iter().map(BatchResult::failed_count).sum();
    let skipped: usize = results.iter().map(BatchResult::skipped_count).sum();
    let elapsed: Duration = results.iter().map(|r| r.duration).sum();

    println!("════════════════════════════════════════════════════════════");
    println!(
        "  {} batches run: {} ok, {} failed, {} skipped in {}",
        results.len(),
        ok,
        failed,
        skipped,
        progress::format_duration(elapsed)
    );
    println!("════════════════════════════════════════════════════════════");
}

fn run_list(project: &Path, json: bool) -> Result<()> {
    nlog!("List command: project={}", project.display());

    let (_, store) = open_store(project)?;
    let summaries = store.list_checkpoints();

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }
    if summaries.is_empty() {
        println!("No checkpoints in {}", store.dir().display());
        return Ok(());
    }

    println!(
        "{:<24} {:<10} {:<10} {:>7}  {}",
        "FEATURE", "BATCHES", "TASKS", "DONE", "UPDATED"
    );
    for summary in &summaries {
        println!(
            "{:<24} {:<10} {:<10} {:>6.1}%  {}",
            truncate(&summary.feature_name, 24),
            summary.progress.batches,
            summary.progress.tasks,
            summary.progress.percentage,
            summary.updated_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

fn run_show(project: &Path, feature: &str, json: bool) -> Result<()> {
    nlog!("Show command: feature={}", feature);

    let (_, store) = open_store(project)?;
    let summary = store
        .get_execution_summary(feature)
        .ok_or_else(|| Error::CheckpointNotFound(feature.to_string()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", progress::summary_report(&summary));
    }
    Ok(())
}

fn run_resume(project: &Path, feature: &str) -> Result<()> {
    nlog!("Resume command: feature={}", feature);

    let (_, store) = open_store(project)?;
    if !store.exists(feature) {
        return Err(Error::CheckpointNotFound(feature.to_string()));
    }
    match store.get_resume_point(feature) {
        Some(point) => println!("{}", progress::resume_report(&point)),
        None => println!("{feature} has nothing left to run"),
    }
    Ok(())
}

fn run_delete(project: &Path, feature: &str) -> Result<()> {
    nlog!("Delete command: feature={}", feature);

    let (_, store) = open_store(project)?;
    if !store.exists(feature) {
        return Err(Error::CheckpointNotFound(feature.to_string()));
    }
    if !store.delete(feature) {
        return Err(Error::Validation(format!(
            "could not delete checkpoint for {feature}"
        )));
    }
    println!("Deleted checkpoint for {feature}");
    Ok(())
}

fn run_config(project: &Path, init: bool) -> Result<()> {
    nlog!("Config command: init={}", init);

    let config = Config::load(project)?;
    if init {
        let path = config.save_project(project)?;
        println!("Wrote {}", path.display());
        return Ok(());
    }
    print!("{}", config.to_toml()?);
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}
