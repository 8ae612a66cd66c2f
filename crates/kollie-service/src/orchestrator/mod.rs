//! Lifecycle orchestration of environments and apps
//!
//! Every operation is a short sequence of reads and writes through the
//! [`ClusterClient`]. No state is kept between calls: the cluster is the
//! source of truth and serializes conflicting writes itself.
//!
//! Write failures are wrapped with the resource, action and owner they
//! concerned and always returned to the caller. Nothing here retries.

mod apps;
mod envs;

use std::sync::Arc;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use kollie_cluster::git_repository::{git_repository_name, GitRepository};
use kollie_cluster::{ClusterClient, ClusterConfig};
use kollie_common::{Error, Result};

use crate::config::Settings;
use crate::persistence::{AppBundleStore, AppTemplateStore};

/// Sequences environment and app operations against the cluster
pub struct Orchestrator {
    client: Arc<dyn ClusterClient>,
    templates: AppTemplateStore,
    bundles: AppBundleStore,
    settings: Settings,
}

impl Orchestrator {
    /// Build an orchestrator over a cluster gateway and the read-only stores
    pub fn new(
        client: Arc<dyn ClusterClient>,
        templates: AppTemplateStore,
        bundles: AppBundleStore,
        settings: Settings,
    ) -> Self {
        Self {
            client,
            templates,
            bundles,
            settings,
        }
    }

    fn cluster_config(&self) -> &ClusterConfig {
        &self.settings.cluster
    }

    /// The environment ConfigMap, or a not-found error
    async fn env_config_map(&self, env_name: &str) -> Result<ConfigMap> {
        self.client
            .get_config_map(env_name)
            .await?
            .ok_or_else(|| Error::env_not_found(env_name))
    }

    /// The branch override source of an environment, if it has one
    ///
    /// Without a default Flux repository there can be no override, so this
    /// is `None` rather than an error.
    pub async fn get_git_repository(&self, env_name: &str) -> Result<Option<GitRepository>> {
        let Some(repository) = self.cluster_config().default_flux_repository.as_deref() else {
            return Ok(None);
        };
        self.client
            .get_git_repository(&git_repository_name(repository, env_name))
            .await
    }
}

/// UID of a resource returned by the API server
fn uid_of<'a>(metadata: &'a ObjectMeta, kind: &str) -> Result<&'a str> {
    metadata.uid.as_deref().ok_or_else(|| {
        Error::internal_with_context(
            "orchestrator",
            format!(
                "{} {} has no uid",
                kind,
                metadata.name.as_deref().unwrap_or_default()
            ),
        )
    })
}
