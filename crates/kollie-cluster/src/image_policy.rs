//! Flux ImagePolicy resources: discovery of the latest image tag for an app

use std::collections::BTreeMap;
use std::sync::LazyLock;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use regex::Regex;
use serde::{Deserialize, Serialize};

use kollie_common::kube_utils::HasApiResource;
use kollie_common::{LABEL_APP_NAME, LABEL_ENVIRONMENT, LABEL_STAGE, STAGE_TESTING};

use crate::kustomization::Kustomization;
use crate::{app_resource_name, owner_reference, AppTemplate, ClusterConfig, ImageRepositoryRef};

static UNSAFE_TAG_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"[^a-zA-Z0-9._-]+").expect("static pattern is valid")
});

/// ImagePolicy resource
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImagePolicy {
    /// API version
    #[serde(default = "ImagePolicy::default_api_version")]
    pub api_version: String,
    /// Resource kind
    #[serde(default = "ImagePolicy::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// Policy specification
    pub spec: ImagePolicySpec,
    /// Status written by the image-reflector-controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ImagePolicyStatus>,
}

impl HasApiResource for ImagePolicy {
    const API_VERSION: &'static str = "image.toolkit.fluxcd.io/v1beta2";
    const KIND: &'static str = "ImagePolicy";
}

impl ImagePolicy {
    fn default_api_version() -> String {
        <Self as HasApiResource>::API_VERSION.to_string()
    }
    fn default_kind() -> String {
        <Self as HasApiResource>::KIND.to_string()
    }

    /// Latest resolved image reference, e.g. `registry/app:main-abc-1700000000`
    pub fn latest_image(&self) -> Option<&str> {
        self.status.as_ref()?.latest_image.as_deref()
    }
}

/// ImagePolicy spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImagePolicySpec {
    /// ImageRepository whose tags are filtered
    pub image_repository_ref: ImageRepositoryRef,
    /// Tag filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_tags: Option<FilterTags>,
    /// Ordering policy
    pub policy: Policy,
}

/// Tag filter with a named capture used for ordering
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FilterTags {
    /// Regular expression tags must match
    pub pattern: String,
    /// Replacement producing the value to order by
    pub extract: String,
}

/// Ordering policy
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Policy {
    /// Numerical ordering of the extracted value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numerical: Option<NumericalPolicy>,
}

/// Numerical ordering
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NumericalPolicy {
    /// "asc" or "desc"
    pub order: String,
}

/// ImagePolicy status
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImagePolicyStatus {
    /// Image reference chosen by the policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_image: Option<String>,
}

/// Collapse every run of characters outside `[A-Za-z0-9._-]` into one hyphen
///
/// Branch names such as `feature/foo` become usable tag prefixes.
pub fn sanitize_image_tag_prefix(prefix: &str) -> String {
    UNSAFE_TAG_CHARS.replace_all(prefix, "-").into_owned()
}

/// Tag filter pattern selecting `{prefix}-{hexhash}-{timestamp}` tags
pub fn image_tag_pattern(prefix: &str) -> String {
    format!(
        "^{}-[a-fA-F0-9]+-(?P<ts>.*)",
        sanitize_image_tag_prefix(prefix)
    )
}

/// A request to create the ImagePolicy of an app
#[derive(Clone, Debug)]
pub struct CreateImagePolicyRequest<'a> {
    /// Environment name
    pub env_name: &'a str,
    /// Template of the app
    pub app_template: &'a AppTemplate,
    /// Image tag prefix to track, sanitized before use
    pub image_tag_prefix: &'a str,
    /// UID of the app's Kustomization
    pub owner_uid: &'a str,
}

impl CreateImagePolicyRequest<'_> {
    /// Name of the ImagePolicy, `{env}-{app}`
    pub fn image_policy_name(&self) -> String {
        app_resource_name(self.env_name, &self.app_template.app_name)
    }

    /// Render the ImagePolicy
    pub fn body(&self, config: &ClusterConfig) -> ImagePolicy {
        let name = self.image_policy_name();
        ImagePolicy {
            api_version: ImagePolicy::default_api_version(),
            kind: ImagePolicy::default_kind(),
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: Some(config.namespace.clone()),
                labels: Some(BTreeMap::from([
                    (LABEL_STAGE.to_string(), STAGE_TESTING.to_string()),
                    (LABEL_ENVIRONMENT.to_string(), self.env_name.to_string()),
                    (
                        LABEL_APP_NAME.to_string(),
                        self.app_template.app_name.clone(),
                    ),
                ])),
                // The Kustomization shares the ImagePolicy's name
                owner_references: Some(vec![owner_reference(
                    Kustomization::API_VERSION,
                    Kustomization::KIND,
                    name,
                    self.owner_uid,
                )]),
                ..Default::default()
            },
            spec: ImagePolicySpec {
                image_repository_ref: self.app_template.image_repository_ref.clone(),
                filter_tags: Some(FilterTags {
                    pattern: image_tag_pattern(self.image_tag_prefix),
                    extract: "$ts".to_string(),
                }),
                policy: Policy {
                    numerical: Some(NumericalPolicy {
                        order: "asc".to_string(),
                    }),
                },
            },
            status: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::fixtures::pricing_service;
    use serde_json::json;

    #[test]
    fn story_branch_name_is_sanitized_into_prefix() {
        assert_eq!(sanitize_image_tag_prefix("feature/foo$!@%!@^bar"), "feature-foo-bar");
        assert_eq!(sanitize_image_tag_prefix("release_1.2-rc"), "release_1.2-rc");
        assert_eq!(sanitize_image_tag_prefix("a b"), "a-b");
    }

    #[test]
    fn main_prefix_yields_timestamp_pattern() {
        assert_eq!(image_tag_pattern("main"), "^main-[a-fA-F0-9]+-(?P<ts>.*)");
    }

    #[test]
    fn generated_pattern_selects_hash_timestamp_tags() {
        let pattern = Regex::new(&image_tag_pattern("feature/foo")).unwrap();
        let caps = pattern.captures("feature-foo-abc123-1700000000").unwrap();
        assert_eq!(&caps["ts"], "1700000000");
        assert!(!pattern.is_match("main-abc123-1700000000"));
    }

    #[test]
    fn policy_is_owned_by_kustomization_of_same_name() {
        let template = pricing_service();
        let policy = CreateImagePolicyRequest {
            env_name: "feature-foo",
            app_template: &template,
            image_tag_prefix: "main",
            owner_uid: "k-uid-1",
        }
        .body(&ClusterConfig::default());

        assert_eq!(policy.metadata.name.as_deref(), Some("feature-foo-pricing-service"));
        let owner = &policy.metadata.owner_references.as_ref().unwrap()[0];
        assert_eq!(owner.kind, "Kustomization");
        assert_eq!(owner.api_version, "kustomize.toolkit.fluxcd.io/v1");
        assert_eq!(owner.name, "feature-foo-pricing-service");
        assert_eq!(owner.uid, "k-uid-1");

        let labels = policy.metadata.labels.as_ref().unwrap();
        assert_eq!(labels[LABEL_ENVIRONMENT], "feature-foo");
        assert_eq!(labels[LABEL_APP_NAME], "pricing-service");
        assert_eq!(labels[LABEL_STAGE], "testing");
    }

    #[test]
    fn body_serializes_with_flux_field_names() {
        let template = pricing_service();
        let policy = CreateImagePolicyRequest {
            env_name: "feature-foo",
            app_template: &template,
            image_tag_prefix: "main",
            owner_uid: "k-uid-1",
        }
        .body(&ClusterConfig::default());
        let value = serde_json::to_value(&policy).unwrap();

        assert_eq!(value["apiVersion"], "image.toolkit.fluxcd.io/v1beta2");
        assert_eq!(
            value["spec"],
            json!({
                "imageRepositoryRef": {"name": "pricing-service", "namespace": "flux-system"},
                "filterTags": {"pattern": "^main-[a-fA-F0-9]+-(?P<ts>.*)", "extract": "$ts"},
                "policy": {"numerical": {"order": "asc"}}
            })
        );
    }

    #[test]
    fn latest_image_reads_status() {
        let policy: ImagePolicy = serde_json::from_value(json!({
            "metadata": {"name": "feature-foo-pricing-service"},
            "spec": {
                "imageRepositoryRef": {"name": "pricing-service", "namespace": "flux-system"},
                "policy": {"semver": {"range": ">=1.0.0"}}
            },
            "status": {"latestImage": "registry/pricing-service:main-abc-1", "observedGeneration": 2}
        }))
        .unwrap();

        assert_eq!(policy.latest_image(), Some("registry/pricing-service:main-abc-1"));
        assert_eq!(policy.kind, "ImagePolicy");
    }
}
