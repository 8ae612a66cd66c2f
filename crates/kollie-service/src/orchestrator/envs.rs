//! Environment operations

use tracing::{debug, info, instrument};

use kollie_cluster::configmap::CreateEnvConfigMapRequest;
use kollie_cluster::git_repository::CreateGitRepositoryRequest;
use kollie_cluster::kustomization::AppAttribute;
use kollie_common::kube_utils::LabelSelector;
use kollie_common::lease::uptime_window;
use kollie_common::{Error, Result, ANNOTATION_OWNER, LABEL_MANAGED_BY, MANAGED_BY_KOLLIE};

use super::{uid_of, Orchestrator};
use crate::models::{EnvironmentMetadata, KollieEnvironment};
use crate::persistence::AppBundle;

impl Orchestrator {
    /// Environments managed by Kollie, sorted by name
    ///
    /// Owner filtering happens here: the owner is an annotation and the API
    /// server can only select on labels.
    pub async fn list_envs(&self, owner_email: Option<&str>) -> Result<Vec<EnvironmentMetadata>> {
        let selector = LabelSelector::new().with(LABEL_MANAGED_BY, MANAGED_BY_KOLLIE);
        let config_maps = self.client.list_config_maps(&selector).await?;

        let mut envs = Vec::with_capacity(config_maps.len());
        for config_map in &config_maps {
            if config_map.data.is_none() {
                continue;
            }
            if let Some(owner) = owner_email {
                let annotated = config_map
                    .metadata
                    .annotations
                    .as_ref()
                    .and_then(|a| a.get(ANNOTATION_OWNER));
                if annotated.map(String::as_str) != Some(owner) {
                    continue;
                }
            }
            envs.push(EnvironmentMetadata::from_config_map(config_map)?);
        }

        envs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(envs)
    }

    /// One environment with all of its apps
    pub async fn get_env(&self, env_name: &str) -> Result<KollieEnvironment> {
        let config_map = self.env_config_map(env_name).await?;
        let metadata = EnvironmentMetadata::from_config_map(&config_map)?;

        let branch = self
            .get_git_repository(env_name)
            .await?
            .and_then(|repo| repo.branch().map(str::to_string));

        let kustomizations = self
            .client
            .list_kustomizations(&LabelSelector::for_app(env_name, None))
            .await?;

        KollieEnvironment::from_kustomizations(metadata, &kustomizations, branch)
    }

    /// Templates not yet deployed in an environment, in template order
    pub fn available_apps(&self, env: &KollieEnvironment) -> Result<Vec<String>> {
        Ok(self
            .templates
            .get_all()?
            .into_iter()
            .map(|template| template.app_name)
            .filter(|name| !env.has_app(name))
            .collect())
    }

    /// Every bundle
    pub fn available_bundles(&self) -> &[AppBundle] {
        self.bundles.get_all_bundles()
    }

    /// Create an environment record, plus a branch source if a branch is given
    #[instrument(skip(self, owner_email))]
    pub async fn create_env(
        &self,
        env_name: &str,
        owner_email: &str,
        flux_repository_branch: Option<&str>,
    ) -> Result<()> {
        // A branch override needs the default repository; check before any write
        if flux_repository_branch.is_some() {
            self.cluster_config().require_default_flux_repository()?;
        }

        let request = CreateEnvConfigMapRequest {
            env_name: env_name.to_string(),
            owner_email: owner_email.to_string(),
            lease_exclusion_window: self
                .settings
                .lease_exclusion_window(env_name)
                .map(str::to_string),
            apps: Vec::new(),
        };
        let config_map = self
            .client
            .create_config_map(&request.body(self.cluster_config())?)
            .await
            .map_err(|e| Error::resource("create", "ConfigMap", env_name, None, e))?;

        if let Some(branch) = flux_repository_branch {
            let request = CreateGitRepositoryRequest {
                env_name,
                branch,
                owner_email,
                owner_uid: uid_of(&config_map.metadata, "ConfigMap")?,
            };
            self.client
                .create_git_repository(&request.body(self.cluster_config())?)
                .await
                .map_err(|e| Error::resource("create", "GitRepository", env_name, None, e))?;
        }

        info!(
            env_name = %env_name,
            branch = ?flux_repository_branch,
            excluded_from_lease = request.lease_exclusion_window.is_some(),
            "environment created"
        );
        Ok(())
    }

    /// Move the lease end of every app in an environment
    ///
    /// `hour` and `days` are validated before anything is read or written.
    #[instrument(skip(self))]
    pub async fn extend_lease(&self, env_name: &str, hour: u32, days: u32) -> Result<()> {
        let window = uptime_window(hour, days)?;
        let env = self.get_env(env_name).await?;

        for app in &env.apps {
            self.update_app(
                env_name,
                &app.name,
                &[AppAttribute::UptimeWindow(window.clone())],
            )
            .await?;
        }

        info!(env_name = %env_name, uptime_window = %window, apps = env.apps.len(), "lease extended");
        Ok(())
    }

    /// Delete an environment; everything it owns is garbage-collected
    #[instrument(skip(self))]
    pub async fn delete_env(&self, env_name: &str) -> Result<()> {
        self.client
            .delete_config_map(env_name)
            .await
            .map_err(|e| Error::resource("delete", "ConfigMap", env_name, None, e))?;
        info!(env_name = %env_name, "environment deleted");
        Ok(())
    }

    /// Deploy every app of a bundle that isn't already in the environment
    ///
    /// Templates for all of the bundle's apps are checked before anything is
    /// created. A failure part-way through leaves the apps created so far in
    /// place; running the install again skips them.
    #[instrument(skip(self, owner_email))]
    pub async fn install_bundle(
        &self,
        env_name: &str,
        bundle_name: &str,
        owner_email: &str,
    ) -> Result<()> {
        let bundle = self
            .bundles
            .get_bundle(bundle_name)
            .ok_or_else(|| Error::config(format!("Bundle not found for {}", bundle_name)))?;

        let env = self.get_env(env_name).await?;

        let templates = bundle
            .apps
            .iter()
            .map(|app| self.templates.require(app))
            .collect::<Result<Vec<_>>>()?;

        for template in &templates {
            if env.has_app(&template.app_name) {
                debug!(env_name = %env_name, app_name = %template.app_name, "app already deployed");
                continue;
            }
            self.create_app(
                env_name,
                &template.app_name,
                owner_email,
                Some(template.default_image_tag_prefix.as_str()),
            )
            .await?;
            debug!(env_name = %env_name, app_name = %template.app_name, "app deployed");
        }

        info!(env_name = %env_name, bundle_name = %bundle_name, "bundle installed");
        Ok(())
    }
}
