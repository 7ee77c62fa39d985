//! distfork CLI.
//!
//! Forks one command onto a worker picked by label, relays this process's
//! stdio to it and exits with the command's exit status (255 when the fork
//! itself failed).

#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use dfk::cli::Cli;
use dfk::{Dispatcher, LocalQueue};
use dfk_common::{DfkConfig, DfkError, LocalChannel, LogConfig, Principal, init_logging};
use std::sync::Arc;
use tracing::debug;

/// Exit status for failures of the fork itself.
const SYSTEM_FAILURE: i32 = 255;

/// Print `err` with its catalog entry and return the exit status to use.
fn report(err: &DfkError) -> i32 {
    match err {
        DfkError::Cancelled => eprintln!("Task cancelled"),
        _ => {
            let entry = err.code().entry();
            eprintln!("ERROR: {}", err.report());
            eprintln!("  [{}] {}", entry.code, entry.message);
            for hint in entry.remediation {
                eprintln!("  hint: {}", hint);
            }
        }
    }
    SYSTEM_FAILURE
}

async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        debug!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn run(cli: Cli, config: Result<DfkConfig, DfkError>) -> Result<i32, DfkError> {
    let config = config?;
    let request = cli.into_request(Principal::current())?;

    let dispatcher = Dispatcher::new(Arc::new(LocalQueue::from_config(&config)));
    let channel = Arc::new(LocalChannel::current_dir()?);
    dispatcher.dispatch(request, channel, interrupted()).await
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = DfkConfig::load(cli.config.as_deref());
    let default_level = config
        .as_ref()
        .map(|c| c.general.log_level.clone())
        .unwrap_or_else(|_| "warn".to_string());
    let mut log_config = LogConfig::from_env(&default_level).with_stderr();
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    let logging_guards = init_logging(&log_config)?;

    let code = match run(cli, config).await {
        Ok(code) => code,
        Err(e) => report(&e),
    };

    // Flush buffered file logs; `exit` skips destructors. Exiting instead of
    // returning also avoids waiting on a blocked stdin reader.
    drop(logging_guards);
    std::process::exit(code);
}
