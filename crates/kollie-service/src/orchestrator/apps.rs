//! App operations

use tracing::{debug, info, instrument, warn};

use kollie_cluster::app_resource_name;
use kollie_cluster::configmap::EnvConfigData;
use kollie_cluster::image_policy::{CreateImagePolicyRequest, ImagePolicy};
use kollie_cluster::kustomization::{
    AppAttribute, CreateKustomizationRequest, PatchKustomizationRequest,
};
use kollie_common::kube_utils::LabelSelector;
use kollie_common::{Error, Result, INGRESS_LABEL_ENVIRONMENT, LABEL_APP_NAME};

use super::{uid_of, Orchestrator};
use crate::models::KollieApp;

impl Orchestrator {
    /// Deploy an app into an existing environment
    ///
    /// Creates the app's Kustomization owned by the environment record, then
    /// its ImagePolicy owned by the Kustomization. The template's default
    /// prefix is tracked when none is given.
    #[instrument(skip(self, owner_email))]
    pub async fn create_app(
        &self,
        env_name: &str,
        app_name: &str,
        owner_email: &str,
        image_tag_prefix: Option<&str>,
    ) -> Result<()> {
        let config_map = self.env_config_map(env_name).await?;
        let env_data = EnvConfigData::from_config_map(&config_map)?;
        let env_uid = uid_of(&config_map.metadata, "ConfigMap")?;

        let template = self.templates.require(app_name)?;
        let image_tag_prefix = image_tag_prefix.unwrap_or(&template.default_image_tag_prefix);

        let git_repository = self.get_git_repository(env_name).await?;
        let git_repository_name = git_repository
            .as_ref()
            .and_then(|repo| repo.metadata.name.as_deref());

        let request = CreateKustomizationRequest {
            env_name,
            app_template: &template,
            image_tag_prefix,
            owner_email,
            owner_uid: env_uid,
            lease_exclusion_window: env_data.lease_exclusion_window.as_deref(),
            git_repository_name,
        };
        let kustomization = self
            .client
            .create_kustomization(&request.body(self.cluster_config()))
            .await
            .map_err(|e| Error::resource("create", "Kustomization", env_name, Some(app_name), e))?;

        self.create_image_policy(
            env_name,
            &template,
            image_tag_prefix,
            uid_of(&kustomization.metadata, "Kustomization")?,
        )
        .await?;

        info!(
            env_name = %env_name,
            app_name = %app_name,
            image_tag_prefix = %image_tag_prefix,
            "app created"
        );
        Ok(())
    }

    /// Look up one app, with the URLs from its Ingress
    pub async fn get_app(&self, env_name: &str, app_name: &str) -> Result<KollieApp> {
        let kustomizations = self
            .client
            .list_kustomizations(&LabelSelector::for_app(env_name, Some(app_name)))
            .await?;

        // List order is not guaranteed; with duplicates any one may win
        let kustomization = kustomizations
            .first()
            .ok_or_else(|| Error::app_not_found(env_name, app_name))?;

        let ingress_selector = LabelSelector::new()
            .with(INGRESS_LABEL_ENVIRONMENT, env_name)
            .with(LABEL_APP_NAME, app_name);
        let ingress = self.client.find_ingress(&ingress_selector).await?;

        KollieApp::from_resources(kustomization, ingress.as_ref())
    }

    /// Change attributes of an existing app in one patch
    ///
    /// A new image tag prefix also replaces the app's ImagePolicy, since the
    /// filter pattern is derived from it.
    #[instrument(skip(self))]
    pub async fn update_app(
        &self,
        env_name: &str,
        app_name: &str,
        attributes: &[AppAttribute],
    ) -> Result<()> {
        self.get_app(env_name, app_name).await?;

        let mut request = PatchKustomizationRequest::new(env_name, app_name);
        for attribute in attributes {
            request.apply(attribute);
        }

        let kustomization = self
            .client
            .patch_kustomization(&request.kustomization_name(), &request.patch)
            .await
            .map_err(|e| Error::resource("patch", "Kustomization", env_name, Some(app_name), e))?;

        let new_prefix = attributes.iter().find_map(|attribute| match attribute {
            AppAttribute::ImageTagPrefix(prefix) => Some(prefix.as_str()),
            _ => None,
        });
        if let Some(prefix) = new_prefix {
            self.refresh_image_policy(
                env_name,
                app_name,
                prefix,
                uid_of(&kustomization.metadata, "Kustomization")?,
            )
            .await?;
        }

        debug!(
            env_name = %env_name,
            app_name = %app_name,
            attributes = ?attributes.iter().map(AppAttribute::name).collect::<Vec<_>>(),
            "app updated"
        );
        Ok(())
    }

    /// Remove an app; its ImagePolicy goes with the Kustomization
    #[instrument(skip(self))]
    pub async fn delete_app(&self, env_name: &str, app_name: &str) -> Result<()> {
        let kustomizations = self
            .client
            .list_kustomizations(&LabelSelector::for_app(env_name, Some(app_name)))
            .await?;

        if kustomizations.is_empty() {
            warn!(env_name = %env_name, app_name = %app_name, "no kustomization to delete");
        }

        for kustomization in &kustomizations {
            let name = kustomization
                .metadata
                .name
                .clone()
                .unwrap_or_else(|| app_resource_name(env_name, app_name));
            self.client
                .delete_kustomization(&name)
                .await
                .map_err(|e| {
                    Error::resource("delete", "Kustomization", env_name, Some(app_name), e)
                })?;
        }

        info!(env_name = %env_name, app_name = %app_name, "app deleted");
        Ok(())
    }

    /// ImagePolicies labelled with an environment and app
    pub async fn list_image_policies(
        &self,
        env_name: &str,
        app_name: &str,
    ) -> Result<Vec<ImagePolicy>> {
        self.client
            .list_image_policies(&LabelSelector::for_app(env_name, Some(app_name)))
            .await
    }

    async fn create_image_policy(
        &self,
        env_name: &str,
        template: &kollie_cluster::AppTemplate,
        image_tag_prefix: &str,
        owner_uid: &str,
    ) -> Result<()> {
        let request = CreateImagePolicyRequest {
            env_name,
            app_template: template,
            image_tag_prefix,
            owner_uid,
        };
        self.client
            .create_image_policy(&request.body(self.cluster_config()))
            .await
            .map_err(|e| {
                Error::resource(
                    "create",
                    "ImagePolicy",
                    env_name,
                    Some(&template.app_name),
                    e,
                )
            })?;
        Ok(())
    }

    /// Delete the app's ImagePolicies and create one for the new prefix
    ///
    /// The template is checked first so a missing template never leaves the
    /// app without a policy.
    async fn refresh_image_policy(
        &self,
        env_name: &str,
        app_name: &str,
        image_tag_prefix: &str,
        owner_uid: &str,
    ) -> Result<()> {
        let template = self.templates.require(app_name)?;

        for policy in self.list_image_policies(env_name, app_name).await? {
            let name = policy
                .metadata
                .name
                .clone()
                .unwrap_or_else(|| app_resource_name(env_name, app_name));
            self.client
                .delete_image_policy(&name)
                .await
                .map_err(|e| Error::resource("delete", "ImagePolicy", env_name, Some(app_name), e))?;
        }

        self.create_image_policy(env_name, &template, image_tag_prefix, owner_uid)
            .await
    }
}
