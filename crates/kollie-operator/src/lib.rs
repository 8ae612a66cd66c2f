//! Kollie operator and command line
//!
//! The `kollie` binary drives the environment lifecycle from the command
//! line and runs the image-update reconciliation loop (`kollie reconcile`).

#![deny(missing_docs)]

pub mod commands;
pub mod image_updater;
pub mod settings;
pub mod shutdown;

pub use kollie_common::{Error, Result};

use clap::{Parser, Subcommand};

use commands::Context;
use settings::SettingsArgs;

/// Kollie - ephemeral per-developer environments on Flux
#[derive(Parser, Debug)]
#[command(name = "kollie")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Settings shared by every subcommand
    #[command(flatten)]
    pub settings: SettingsArgs,

    /// What to do
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Copy newly resolved image tags into apps until stopped
    Reconcile,
    /// Manage environments
    #[command(subcommand)]
    Envs(commands::envs::EnvCommand),
    /// Manage apps inside an environment
    #[command(subcommand)]
    Apps(commands::apps::AppCommand),
    /// Inspect app bundles
    #[command(subcommand)]
    Bundles(commands::bundles::BundleCommand),
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        let stage = self.settings.stage.clone();
        let settings = self.settings.load()?;

        let ctx = Context::connect(&stage, settings).await?;
        match self.command {
            Commands::Reconcile => commands::reconcile::run(ctx).await,
            Commands::Envs(command) => commands::envs::run(command, &ctx).await,
            Commands::Apps(command) => commands::apps::run(command, &ctx).await,
            Commands::Bundles(command) => commands::bundles::run(command, &ctx),
        }
    }
}
