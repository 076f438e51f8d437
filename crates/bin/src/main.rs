//! logshield command line
//!
//! Exercises the containment stack against the configured sinks.

mod commands;
mod startup;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use logshield_infrastructure::{init_tracing, start_signal_handler};
use logshield_shared::config::{ConfigLoader, LogShieldConfig};
use startup::Stack;

/// CLI arguments for logshield
#[derive(Parser, Debug)]
#[command(name = "logshield")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Error containment for long-running services", long_about = None)]
struct Args {
    /// Load environment variables from this file first
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Remove remote log entries older than the retention period
    Cleanup {
        /// Days of logs to keep
        #[arg(long, default_value_t = 7)]
        days: u32,

        /// Only report what would be deleted
        #[arg(long)]
        dry_run: bool,
    },

    #[command(flatten)]
    Stack(StackCommand),
}

/// Commands that run against the full containment stack
#[derive(Subcommand, Debug)]
enum StackCommand {
    /// Fire uncaught storage failures through the global handlers
    SimulateStorm {
        #[arg(short, long, default_value_t = 50)]
        count: usize,

        /// Pause between failures in milliseconds
        #[arg(long, default_value_t = 0)]
        interval_ms: u64,
    },

    /// Fire identical errors and count what reached the sinks
    SimulateDedup {
        #[arg(short, long, default_value_t = 1000)]
        count: usize,
    },

    /// Print the health report as JSON
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = ConfigLoader::new(args.env_file).load()?;
    init_tracing(&config.logging)?;

    match args.command {
        Command::Cleanup { days, dry_run } => commands::cleanup::run(&config, days, dry_run).await,
        Command::Stack(command) => run_with_stack(config, command).await,
    }
}

async fn run_with_stack(config: LogShieldConfig, command: StackCommand) -> anyhow::Result<()> {
    let stack = Stack::build(config).await?;
    let signals = start_signal_handler(stack.coordinator.clone());

    let result = match command {
        StackCommand::SimulateStorm { count, interval_ms } => {
            commands::simulate::storm(&stack, count, Duration::from_millis(interval_ms)).await
        }
        StackCommand::SimulateDedup { count } => commands::simulate::dedup(&stack, count).await,
        StackCommand::Health => commands::health::run(&stack),
    };

    signals.abort();
    stack.logger.flush().await;
    if let Some(remote) = &stack.remote {
        remote.close().await;
    }
    result
}
