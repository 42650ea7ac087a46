//! backuptasks - periodic LVM snapshot rotation daemon.
//!
//! Usage:
//!   backuptasks -c <config> [run]        Run the scheduler until Ctrl+C
//!   backuptasks -c <config> validate     Validate the configuration
//!   backuptasks -c <config> list         List tasks and the computed tick
//!   backuptasks -c <config> trigger <t>  Run one task now

use backuptasks::{
    BackupConfig, HdparmDriveMonitor, LvmVolumeManager, RunStatus, Scheduler, Task, TaskBuilder,
    TaskId, TaskOutcome, VolumeManager, YamlLoader,
};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// backuptasks - periodic LVM snapshot rotation
#[derive(Parser)]
#[command(name = "backuptasks")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, global = true, default_value = "/etc/backuptasks.yaml")]
    config: PathBuf,

    /// Log verbosity (RUST_LOG overrides it)
    #[arg(short, long, global = true, value_enum, default_value_t = Verbosity::Normal)]
    verbosity: Verbosity,

    /// Simulate volume operations without changing anything
    #[arg(long, global = true)]
    dry_run: bool,

    /// Log in a compact, colorless format suited to a service manager
    /// (also used whenever stderr is not a terminal)
    #[arg(short, long, global = true)]
    background: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler until interrupted (default)
    Run,

    /// Validate the configuration without running
    Validate,

    /// List tasks, their periods and the scheduler tick
    List,

    /// Run one task now, ignoring its period
    Trigger {
        /// Task name (configuration section)
        #[arg(value_name = "TASK")]
        task: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Verbosity {
    Warning,
    Normal,
    Debug,
}

impl Verbosity {
    fn directive(self) -> &'static str {
        match self {
            Verbosity::Warning => "warn",
            Verbosity::Normal => "info",
            Verbosity::Debug => "debug",
        }
    }
}

/// How log lines are rendered on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogStyle {
    /// Full format with colours, for an interactive terminal.
    Terminal,
    /// Compact, colourless, no timestamps: the supervisor adds its own.
    Plain,
}

impl LogStyle {
    fn select(background: bool, stderr_is_terminal: bool) -> Self {
        if background || !stderr_is_terminal {
            LogStyle::Plain
        } else {
            LogStyle::Terminal
        }
    }
}

fn init_logging(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.verbosity.directive()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if let Some(path) = &cli.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        builder
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
            .try_init().map_err(|e| -> Box<dyn std::error::Error> { e })?;
        return Ok(());
    }

    match LogStyle::select(cli.background, std::io::stderr().is_terminal()) {
        LogStyle::Plain => builder
            .compact()
            .without_time()
            .with_ansi(false)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init().map_err(|e| -> Box<dyn std::error::Error> { e })?,
        LogStyle::Terminal => builder.with_writer(std::io::stderr).try_init().map_err(|e| -> Box<dyn std::error::Error> { e })?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    match cli.command.as_ref().unwrap_or(&Commands::Run) {
        Commands::Run => run_scheduler(&cli.config, cli.dry_run).await?,
        Commands::Validate => validate(&cli.config, cli.dry_run)?,
        Commands::List => list_tasks(&cli.config, cli.dry_run)?,
        Commands::Trigger { task } => trigger_task(&cli.config, cli.dry_run, task).await?,
    }

    Ok(())
}

/// Load the configuration and build its tasks against the LVM tools.
fn load(path: &Path, dry_run: bool) -> Result<(BackupConfig, Vec<Task>), Box<dyn std::error::Error>> {
    info!(config = %path.display(), "Loading configuration");
    let config = YamlLoader::load(path)?;

    let mut lvm = LvmVolumeManager::new();
    if let Some(timeout) = config.command_timeout() {
        lvm = lvm.with_timeout(timeout);
    }
    let volumes: Arc<dyn VolumeManager> = Arc::new(lvm);

    let tasks = TaskBuilder::new(volumes).dry_run(dry_run).build(&config)?;
    Ok((config, tasks))
}

fn build_scheduler(config: &BackupConfig, tasks: Vec<Task>) -> Result<Scheduler, Box<dyn std::error::Error>> {
    let mut drives = HdparmDriveMonitor::new();
    if let Some(timeout) = config.command_timeout() {
        drives = drives.with_timeout(Some(timeout));
    }
    Ok(Scheduler::new(tasks, Arc::new(drives)).with_max_tick(config.max_tick()?))
}

/// Run the scheduler until Ctrl+C.
async fn run_scheduler(path: &Path, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    let (config, tasks) = load(path, dry_run)?;

    info!("Loaded {} task(s)", tasks.len());
    for task in &tasks {
        info!(
            task = %task.id(),
            action = task.action().kind(),
            period = %task.period(),
            drives = task.drives().len(),
            "Registered task"
        );
    }
    if dry_run {
        info!("Dry run: volume commands run in test mode");
    }

    let scheduler = build_scheduler(&config, tasks)?;
    let (handle, scheduler_task) = scheduler.start()?;
    info!("Press Ctrl+C to stop");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
            handle.shutdown().await?;
        }
        _ = scheduler_task => {
            info!("Scheduler stopped");
        }
    }

    Ok(())
}

/// Validate the configuration without running.
fn validate(path: &Path, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    match load(path, dry_run).and_then(|(config, tasks)| {
        let tick = build_scheduler(&config, tasks)?.tick()?;
        Ok(tick)
    }) {
        Ok(tick) => {
            println!("{}: OK (tick {})", path.display(), tick);
            Ok(())
        }
        Err(e) => {
            error!("Validation failed: {}", e);
            Err(e)
        }
    }
}

/// List tasks and the computed tick.
fn list_tasks(path: &Path, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    let (config, tasks) = load(path, dry_run)?;

    println!("Tasks in {}:", path.display());
    println!();
    for task in &tasks {
        println!("{}", task.id());
        println!("  Action: {}", task.action().kind());
        if let Some(description) = task.action().description() {
            println!("  Details: {}", description);
        }
        println!("  Period: {}", task.period());
        if !task.drives().is_empty() {
            let drives: Vec<&str> = task.drives().iter().map(|d| d.device()).collect();
            println!("  Drives: {}", drives.join(", "));
        }
        println!();
    }

    let tick = build_scheduler(&config, tasks)?.tick()?;
    println!("Tick: {}", tick);
    Ok(())
}

/// Run one task now and report its outcome.
async fn trigger_task(path: &Path, dry_run: bool, task: &str) -> Result<(), Box<dyn std::error::Error>> {
    let (config, tasks) = load(path, dry_run)?;
    let known: Vec<String> = tasks.iter().map(|t| t.id().to_string()).collect();

    let mut scheduler = build_scheduler(&config, tasks)?;
    let reports = match scheduler.trigger(&TaskId::new(task), Utc::now()).await {
        Ok(reports) => reports,
        Err(e) => {
            error!("Available tasks: {}", known.join(", "));
            return Err(e.into());
        }
    };

    let mut failed = false;
    for report in &reports {
        match &report.outcome {
            Ok(TaskOutcome::Completed) => println!("{} ({}): success", report.task, report.action),
            Ok(TaskOutcome::Skipped(reason)) => {
                println!("{} ({}): skipped: {}", report.task, report.action, reason)
            }
            Err(e) => println!("{} ({}): failed: {}", report.task, report.action, e),
        }
        failed |= report.status() == RunStatus::Failed;
    }

    if failed {
        return Err(format!("task '{}' failed", task).into());
    }
    Ok(())
}
