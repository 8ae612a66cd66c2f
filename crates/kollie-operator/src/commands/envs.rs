//! `kollie envs`

use clap::Subcommand;
use serde_json::json;

use kollie_common::lease::{DEFAULT_LEASE_DAYS, DEFAULT_LEASE_HOUR};
use kollie_common::Result;

use super::{print_json, Context};

/// Environment subcommands
#[derive(Subcommand, Debug)]
pub enum EnvCommand {
    /// List environments, optionally only those of one owner
    List {
        /// Owner email to filter on
        #[arg(long)]
        owner: Option<String>,
    },
    /// Show an environment and its apps
    Show {
        /// Environment name
        name: String,
    },
    /// Create an environment
    Create {
        /// Environment name
        name: String,
        /// Owner email
        #[arg(long)]
        owner: String,
        /// Track this branch of the default Flux repository instead of its default branch
        #[arg(long)]
        branch: Option<String>,
    },
    /// Delete an environment and everything in it
    Delete {
        /// Environment name
        name: String,
    },
    /// Move the end of every app's uptime window
    ExtendLease {
        /// Environment name
        name: String,
        /// UTC hour the lease ends at
        #[arg(long, default_value_t = DEFAULT_LEASE_HOUR)]
        hour: u32,
        /// Days from today
        #[arg(long, default_value_t = DEFAULT_LEASE_DAYS)]
        days: u32,
    },
    /// Apps that have a template but aren't deployed in the environment
    AvailableApps {
        /// Environment name
        name: String,
    },
    /// Deploy every app of a bundle that isn't deployed yet
    InstallBundle {
        /// Environment name
        name: String,
        /// Bundle name
        bundle: String,
        /// Owner email
        #[arg(long)]
        owner: String,
    },
}

/// Run an environment subcommand
pub async fn run(command: EnvCommand, ctx: &Context) -> Result<()> {
    let orchestrator = &ctx.orchestrator;

    match command {
        EnvCommand::List { owner } => print_json(&orchestrator.list_envs(owner.as_deref()).await?),
        EnvCommand::Show { name } => print_json(&orchestrator.get_env(&name).await?),
        EnvCommand::Create {
            name,
            owner,
            branch,
        } => {
            orchestrator
                .create_env(&name, &owner, branch.as_deref())
                .await?;
            print_json(&orchestrator.get_env(&name).await?)
        }
        EnvCommand::Delete { name } => {
            orchestrator.delete_env(&name).await?;
            print_json(&json!({ "deleted": name }))
        }
        EnvCommand::ExtendLease { name, hour, days } => {
            orchestrator.extend_lease(&name, hour, days).await?;
            let env = orchestrator.get_env(&name).await?;
            print_json(&json!({ "name": env.name, "lease_until": env.lease_until() }))
        }
        EnvCommand::AvailableApps { name } => {
            let env = orchestrator.get_env(&name).await?;
            print_json(&orchestrator.available_apps(&env)?)
        }
        EnvCommand::InstallBundle {
            name,
            bundle,
            owner,
        } => {
            orchestrator.install_bundle(&name, &bundle, &owner).await?;
            print_json(&orchestrator.get_env(&name).await?)
        }
    }
}
