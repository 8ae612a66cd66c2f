//! `kollie apps`

use clap::Subcommand;
use serde_json::json;

use kollie_cluster::kustomization::AppAttribute;
use kollie_common::{Error, Result};

use super::{print_json, Context};

/// App subcommands
#[derive(Subcommand, Debug)]
pub enum AppCommand {
    /// Deploy an app into an environment
    Create {
        /// Environment name
        env: String,
        /// App name
        app: String,
        /// Owner email
        #[arg(long)]
        owner: String,
        /// Track images with this prefix instead of the template default
        #[arg(long)]
        image_tag_prefix: Option<String>,
    },
    /// Show an app
    Show {
        /// Environment name
        env: String,
        /// App name
        app: String,
    },
    /// Change an app's image, tracked prefix or uptime window
    Update {
        /// Environment name
        env: String,
        /// App name
        app: String,
        /// Attributes to change
        #[command(flatten)]
        attributes: UpdateArgs,
    },
    /// Remove an app from an environment
    Delete {
        /// Environment name
        env: String,
        /// App name
        app: String,
    },
}

/// Attributes `apps update` can change
#[derive(clap::Args, Debug, Default)]
pub struct UpdateArgs {
    /// Deploy this image tag
    #[arg(long)]
    pub image_tag: Option<String>,
    /// Track images with this prefix
    #[arg(long)]
    pub image_tag_prefix: Option<String>,
    /// Raw downscaler uptime window
    #[arg(long)]
    pub uptime_window: Option<String>,
}

impl UpdateArgs {
    /// Attributes to patch, or a validation error if none were given
    pub fn into_attributes(self) -> Result<Vec<AppAttribute>> {
        let attributes: Vec<_> = [
            self.image_tag.map(AppAttribute::ImageTag),
            self.image_tag_prefix.map(AppAttribute::ImageTagPrefix),
            self.uptime_window.map(AppAttribute::UptimeWindow),
        ]
        .into_iter()
        .flatten()
        .collect();

        if attributes.is_empty() {
            return Err(Error::validation(
                "nothing to update: pass --image-tag, --image-tag-prefix or --uptime-window",
            ));
        }
        Ok(attributes)
    }
}

/// Run an app subcommand
pub async fn run(command: AppCommand, ctx: &Context) -> Result<()> {
    let orchestrator = &ctx.orchestrator;

    match command {
        AppCommand::Create {
            env,
            app,
            owner,
            image_tag_prefix,
        } => {
            orchestrator
                .create_app(&env, &app, &owner, image_tag_prefix.as_deref())
                .await?;
            print_json(&orchestrator.get_app(&env, &app).await?)
        }
        AppCommand::Show { env, app } => print_json(&orchestrator.get_app(&env, &app).await?),
        AppCommand::Update {
            env,
            app,
            attributes,
        } => {
            let attributes = attributes.into_attributes()?;
            orchestrator.update_app(&env, &app, &attributes).await?;
            print_json(&orchestrator.get_app(&env, &app).await?)
        }
        AppCommand::Delete { env, app } => {
            orchestrator.delete_app(&env, &app).await?;
            print_json(&json!({ "deleted": app, "env": env }))
        }
    }
}
