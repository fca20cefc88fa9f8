//! agentflow - Composable agent workflow engine
//!
//! Main entry point for the agentflow CLI.

mod cli;
mod cmd_history;
mod cmd_workflow;
mod demos;

use std::sync::OnceLock;

use anyhow::{Context, bail};
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use agentflow_config::{Config, ConfigLoader, ConfigValidator, LoggingConfig};

use crate::cli::{Cli, Commands};

/// Keeps the file writer flushing until the process exits.
static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Initialize tracing with console and optional file output.
///
/// `RUST_LOG` overrides `logging.level`. Files rotate daily under
/// `logging.directory` when it is set.
fn init_tracing(config: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let console = if config.json {
        fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_ansi(true)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let file = match &config.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("agentflow")
                .filename_suffix("log")
                .max_log_files(30)
                .build(dir)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let _ = LOG_GUARD.set(guard);
            Some(
                fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file)
        .try_init()?;

    Ok(())
}

/// Validate the configuration and print the findings.
fn check_config(cli: &Cli, config: &Config) -> anyhow::Result<()> {
    let result = ConfigValidator::validate(config);

    for warning in &result.warnings {
        println!("warning: {}: {}", warning.path, warning.message);
    }
    for error in &result.errors {
        println!("error: {}: {}", error.path, error.message);
    }

    if !result.is_valid() {
        bail!(
            "{} has {} error(s)",
            cli.config.display(),
            result.errors.len()
        );
    }
    println!("{} is valid", cli.config.display());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    init_tracing(&config.logging)?;

    match &cli.command {
        Commands::Demos { format } => cmd_workflow::list_demos(&config, format).await,
        Commands::Run {
            demo,
            input,
            stream,
        } => cmd_workflow::run_demo(&config, demo, input.as_deref(), *stream).await,
        Commands::History { workflow } => {
            cmd_history::show_history(&config, workflow.as_deref()).await
        }
        Commands::ConfigCheck => check_config(&cli, &config),
    }
}
