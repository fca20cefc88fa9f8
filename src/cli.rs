//! CLI definitions for agentflow.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// agentflow CLI.
#[derive(Parser)]
#[command(name = "agentflow")]
#[command(about = "Composable agent workflow engine")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        env = "AGENTFLOW_CONFIG",
        default_value = "config/default.toml",
        global = true
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// List the built-in demo workflows
    Demos {
        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Run a demo workflow
    Run {
        /// Demo workflow id
        demo: String,

        /// JSON input (defaults to the demo's sample input)
        #[arg(short, long)]
        input: Option<String>,

        /// Print lifecycle events as they happen
        #[arg(long)]
        stream: bool,
    },

    /// Show stored execution history
    History {
        /// Only show executions of this workflow
        #[arg(short, long)]
        workflow: Option<String>,
    },

    /// Validate the configuration file
    ConfigCheck,
}
