//! Per-environment GitRepository sources tracking a branch

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

use kollie_common::kube_utils::HasApiResource;
use kollie_common::{
    Result, ANNOTATION_OWNER, ANNOTATION_TRACKING_BRANCH, LABEL_ENVIRONMENT, LABEL_STAGE,
    STAGE_TESTING,
};

use crate::{owner_reference, ClusterConfig};

/// Polling interval for branch sources
pub const GIT_REPOSITORY_INTERVAL: &str = "5m";

/// Flux GitRepository resource
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GitRepository {
    /// API version
    #[serde(default = "GitRepository::default_api_version")]
    pub api_version: String,
    /// Resource kind
    #[serde(default = "GitRepository::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// Source specification
    pub spec: GitRepositorySpec,
}

impl HasApiResource for GitRepository {
    const API_VERSION: &'static str = "source.toolkit.fluxcd.io/v1";
    const KIND: &'static str = "GitRepository";
}

impl GitRepository {
    fn default_api_version() -> String {
        <Self as HasApiResource>::API_VERSION.to_string()
    }
    fn default_kind() -> String {
        <Self as HasApiResource>::KIND.to_string()
    }

    /// Branch this source tracks
    pub fn branch(&self) -> Option<&str> {
        self.spec.reference.as_ref()?.branch.as_deref()
    }
}

/// GitRepository spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GitRepositorySpec {
    /// Polling interval
    pub interval: String,
    /// Repository URL
    pub url: String,
    /// Git reference to check out
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<GitRepositoryRef>,
    /// Secret holding the credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretRef>,
}

/// Git reference
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct GitRepositoryRef {
    /// Branch name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

/// Reference to a Secret in the same namespace
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SecretRef {
    /// Secret name
    pub name: String,
}

/// Name of the branch override source for an environment
pub fn git_repository_name(default_repository: &str, env_name: &str) -> String {
    format!("{}-{}", default_repository, env_name)
}

/// A request to create the branch override source of an environment
#[derive(Clone, Debug)]
pub struct CreateGitRepositoryRequest<'a> {
    /// Environment name
    pub env_name: &'a str,
    /// Branch to track
    pub branch: &'a str,
    /// Owner email
    pub owner_email: &'a str,
    /// UID of the environment ConfigMap
    pub owner_uid: &'a str,
}

impl CreateGitRepositoryRequest<'_> {
    /// Render the GitRepository
    ///
    /// Fails when no default Flux repository is configured, since the
    /// override is a copy of that repository on another branch.
    pub fn body(&self, config: &ClusterConfig) -> Result<GitRepository> {
        let repository = config.require_default_flux_repository()?;

        Ok(GitRepository {
            api_version: GitRepository::default_api_version(),
            kind: GitRepository::default_kind(),
            metadata: ObjectMeta {
                name: Some(git_repository_name(repository, self.env_name)),
                namespace: Some(config.namespace.clone()),
                labels: Some(BTreeMap::from([
                    (LABEL_STAGE.to_string(), STAGE_TESTING.to_string()),
                    (LABEL_ENVIRONMENT.to_string(), self.env_name.to_string()),
                ])),
                annotations: Some(BTreeMap::from([
                    (ANNOTATION_OWNER.to_string(), self.owner_email.to_string()),
                    (ANNOTATION_TRACKING_BRANCH.to_string(), self.branch.to_string()),
                ])),
                owner_references: Some(vec![owner_reference(
                    "v1",
                    "ConfigMap",
                    self.env_name,
                    self.owner_uid,
                )]),
                ..Default::default()
            },
            spec: GitRepositorySpec {
                interval: GIT_REPOSITORY_INTERVAL.to_string(),
                url: format!("{}/{}", config.git_url_prefix, repository),
                reference: Some(GitRepositoryRef {
                    branch: Some(self.branch.to_string()),
                }),
                secret_ref: Some(SecretRef {
                    name: repository.to_string(),
                }),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kollie_common::Error;

    fn request() -> CreateGitRepositoryRequest<'static> {
        CreateGitRepositoryRequest {
            env_name: "feature-foo",
            branch: "feature/foo",
            owner_email: "dev@tails.com",
            owner_uid: "cm-uid-1",
        }
    }

    fn config() -> ClusterConfig {
        ClusterConfig {
            default_flux_repository: Some("k8s-apps".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn source_is_named_after_default_repository_and_env() {
        let repo = request().body(&config()).unwrap();

        assert_eq!(repo.metadata.name.as_deref(), Some("k8s-apps-feature-foo"));
        assert_eq!(repo.metadata.namespace.as_deref(), Some("kollie"));
        assert_eq!(repo.branch(), Some("feature/foo"));
        assert_eq!(repo.spec.url, "ssh://git@github.com/tailsdotcom/k8s-apps");
        assert_eq!(repo.spec.secret_ref.as_ref().unwrap().name, "k8s-apps");
    }

    #[test]
    fn source_records_owner_and_branch_as_annotations() {
        let repo = request().body(&config()).unwrap();
        let annotations = repo.metadata.annotations.unwrap();
        assert_eq!(annotations[ANNOTATION_OWNER], "dev@tails.com");
        assert_eq!(annotations[ANNOTATION_TRACKING_BRANCH], "feature/foo");

        let owner = &repo.metadata.owner_references.unwrap()[0];
        assert_eq!((owner.kind.as_str(), owner.name.as_str()), ("ConfigMap", "feature-foo"));
        assert_eq!(owner.uid, "cm-uid-1");
    }

    #[test]
    fn serializes_branch_under_ref() {
        let value = serde_json::to_value(request().body(&config()).unwrap()).unwrap();
        assert_eq!(value["apiVersion"], "source.toolkit.fluxcd.io/v1");
        assert_eq!(value["spec"]["ref"]["branch"], "feature/foo");
        assert_eq!(value["spec"]["secretRef"]["name"], "k8s-apps");
    }

    #[test]
    fn missing_default_repository_is_a_config_error() {
        let err = request().body(&ClusterConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
