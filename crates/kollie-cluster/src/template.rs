//! App templates: what Kollie needs to know to deploy an app

use serde::{Deserialize, Serialize};

/// Reference to an ImageRepository the ImagePolicies of an app watch
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageRepositoryRef {
    /// ImageRepository name
    pub name: String,
    /// ImageRepository namespace
    pub namespace: String,
}

/// Describes an application Kollie can deploy into an environment
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppTemplate {
    /// App name, also the `tails-app-name` label value
    pub app_name: String,
    /// Display label
    pub label: String,
    /// Flux GitRepository holding the app's manifests. Empty until the
    /// loading store fills in the default repository.
    #[serde(default)]
    pub git_repository_name: String,
    /// Path of the app's manifests within the repository
    pub git_repository_path: String,
    /// Image tag prefix tracked when none is chosen
    pub default_image_tag_prefix: String,
    /// ImageRepository the app's images are discovered through
    pub image_repository_ref: ImageRepositoryRef,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn pricing_service() -> AppTemplate {
        AppTemplate {
            app_name: "pricing-service".to_string(),
            label: "Pricing Service".to_string(),
            git_repository_name: "k8s-apps".to_string(),
            git_repository_path: "./apps/pricing-service/testing".to_string(),
            default_image_tag_prefix: "main".to_string(),
            image_repository_ref: ImageRepositoryRef {
                name: "pricing-service".to_string(),
                namespace: "flux-system".to_string(),
            },
        }
    }
}
