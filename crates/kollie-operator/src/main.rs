//! Kollie CLI

use anyhow::Context;
use clap::Parser;

use kollie_common::telemetry::{init_tracing, LogFormat};
use kollie_operator::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(LogFormat::for_stage(&cli.settings.stage)).context("failed to initialize logging")?;

    cli.run().await?;
    Ok(())
}
