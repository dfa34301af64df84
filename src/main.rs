//! Composition root and CLI.

mod cli;
mod telemetry;

use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    telemetry::init(&cli.log_level)?;

    if let Err(err) = cli.run().await {
        tracing::error!(error = %err, "command failed");
        std::process::exit(1);
    }
    Ok(())
}
