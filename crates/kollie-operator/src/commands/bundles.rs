//! `kollie bundles`

use clap::Subcommand;

use kollie_common::Result;

use super::{print_json, Context};

/// Bundle subcommands
#[derive(Subcommand, Debug)]
pub enum BundleCommand {
    /// List every app bundle
    List,
}

/// Run a bundle subcommand
pub fn run(command: BundleCommand, ctx: &Context) -> Result<()> {
    match command {
        BundleCommand::List => print_json(ctx.orchestrator.available_bundles()),
    }
}
