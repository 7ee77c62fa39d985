//! distfork worker agent.
//!
//! Runs one execution plan with this process's own stdio as the channel back
//! to the client: stdin feeds the command (and inline input archives),
//! stdout carries its output (and inline output archives), stderr carries
//! progress and error lines. Logs go to stderr as well.

#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dfk_common::{
    Executable, ExecutionPlan, LocalChannel, LocalEndpoint, LogConfig, WorkerId, WorkerNode,
    init_logging,
};
use dfk_wkr::{ProcessLauncher, TaskRunner};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "dfk-wkr")]
#[command(author, version, about = "distfork worker agent - runs one forked command")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an execution plan against this process's stdio
    Run {
        /// Execution plan as JSON
        #[arg(long)]
        plan: String,

        /// Directory scratch directories are created under
        #[arg(long, env = "DFK_WORK_ROOT")]
        root: Option<PathBuf>,

        /// Name reported to the client
        #[arg(long, default_value = "worker")]
        name: String,
    },

    /// Respond to health check
    Health,

    /// Report worker info
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env("warn").with_stderr();
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    let logging_guards = init_logging(&log_config)?;

    match cli.command {
        Commands::Run { plan, root, name } => {
            let plan: ExecutionPlan =
                serde_json::from_str(&plan).context("Failed to parse execution plan")?;
            plan.validate()?;

            let root = root.unwrap_or_else(|| std::env::temp_dir().join("distfork"));
            let node = WorkerNode {
                id: WorkerId::new(name),
                root,
                launcher: Arc::new(ProcessLauncher),
                endpoint: Arc::new(LocalEndpoint::new("worker")),
            };
            let channel = Arc::new(LocalChannel::current_dir()?);
            info!("Running {:?} on {}", plan.command(), node.id);

            let abort = CancellationToken::new();
            let on_signal = abort.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_signal.cancel();
                }
            });

            let code = TaskRunner::new(plan, channel).run(&node, abort).await;
            // Flush buffered file logs; `exit` skips destructors.
            drop(logging_guards);
            std::process::exit(code);
        }
        Commands::Health => {
            println!("OK");
            Ok(())
        }
        Commands::Info => {
            print_worker_info();
            Ok(())
        }
    }
}

fn print_worker_info() {
    println!("=== Worker Info ===");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("OS: {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    let user = whoami::username().unwrap_or_else(|_| "unknown".to_string());
    println!("User: {}", user);
    println!(
        "Work root: {}",
        std::env::var("DFK_WORK_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("distfork"))
            .display()
    );
    if let Ok(cores) = std::thread::available_parallelism() {
        println!("Cores: {}", cores);
    }
}
