use clap::Parser;
use std::io;

mod commands;

use commands::Commands;

#[derive(Parser)]
#[command(name = "rollout")]
#[command(about = "Compute per-node deployment plans from a task catalog", long_about = None)]
#[command(version)]
struct Cli {
    /// Log level used when ROLLOUT_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    rollout_utils::tracing::init(&cli.log_level)
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    let stdout = io::stdout();
    cli.command.execute(&mut stdout.lock())
}
