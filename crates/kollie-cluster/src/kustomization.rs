//! Flux Kustomization resources: one per app in an environment
//!
//! The Kustomization drives the Flux kustomize-controller to apply an app's
//! manifests. Per-environment values reach the manifests through
//! `spec.postBuild.substitute`.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use serde::{Deserialize, Serialize};

use kollie_common::kube_utils::HasApiResource;
use kollie_common::lease::default_uptime_window;
use kollie_common::{
    ANNOTATION_IMAGE_TAG_PREFIX, ANNOTATION_OWNER, FLUX_SYSTEM_NAMESPACE, LABEL_APP_NAME,
    LABEL_ENVIRONMENT, LABEL_STAGE, STAGE_TESTING, SUBSTITUTE_DOWNSCALER_UPTIME,
    SUBSTITUTE_ENVIRONMENT, SUBSTITUTE_IMAGE_TAG,
};

use crate::{app_resource_name, owner_reference, AppTemplate, ClusterConfig};

/// Reconciliation interval for app Kustomizations
pub const KUSTOMIZATION_INTERVAL: &str = "5m";

// =============================================================================
// Resource types
// =============================================================================

/// Flux Kustomization resource
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Kustomization {
    /// API version
    #[serde(default = "Kustomization::default_api_version")]
    pub api_version: String,
    /// Resource kind
    #[serde(default = "Kustomization::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// Kustomization specification
    pub spec: KustomizationSpec,
    /// Status written by the kustomize-controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<KustomizationStatus>,
}

impl HasApiResource for Kustomization {
    const API_VERSION: &'static str = "kustomize.toolkit.fluxcd.io/v1";
    const KIND: &'static str = "Kustomization";
}

impl Kustomization {
    fn default_api_version() -> String {
        <Self as HasApiResource>::API_VERSION.to_string()
    }
    fn default_kind() -> String {
        <Self as HasApiResource>::KIND.to_string()
    }

    /// postBuild substitutions, empty if none are set
    pub fn substitutions(&self) -> Option<&BTreeMap<String, String>> {
        self.spec.post_build.as_ref().map(|pb| &pb.substitute)
    }

    /// Value of a single annotation
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(key))
            .map(String::as_str)
    }

    /// Value of a single label
    pub fn label(&self, key: &str) -> Option<&str> {
        self.metadata
            .labels
            .as_ref()
            .and_then(|l| l.get(key))
            .map(String::as_str)
    }
}

/// Kustomization spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KustomizationSpec {
    /// Path of the manifests within the source
    pub path: String,
    /// Reconciliation interval
    pub interval: String,
    /// Source the manifests come from
    pub source_ref: SourceRef,
    /// Whether removed manifests are garbage collected
    #[serde(default)]
    pub prune: bool,
    /// Post-build variable substitution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_build: Option<PostBuild>,
}

/// Reference to a Flux source
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SourceRef {
    /// Source kind
    pub kind: String,
    /// Source name
    pub name: String,
    /// Source namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Post-build settings
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PostBuild {
    /// Variables substituted into the built manifests
    #[serde(default)]
    pub substitute: BTreeMap<String, String>,
}

/// Kustomization status
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct KustomizationStatus {
    /// Status conditions in the order the controller reports them
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// A status condition
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Condition {
    /// Condition type, e.g. "Ready"
    #[serde(rename = "type")]
    pub type_: String,
    /// "True", "False" or "Unknown"
    pub status: String,
    /// Machine-readable reason
    #[serde(default)]
    pub reason: String,
    /// Human-readable message
    #[serde(default)]
    pub message: String,
}

// =============================================================================
// Create
// =============================================================================

/// A request to create a Kustomization for an app
#[derive(Clone, Debug)]
pub struct CreateKustomizationRequest<'a> {
    /// Environment name
    pub env_name: &'a str,
    /// Template of the app being deployed
    pub app_template: &'a AppTemplate,
    /// Image tag prefix the app tracks
    pub image_tag_prefix: &'a str,
    /// Owner email
    pub owner_email: &'a str,
    /// UID of the environment ConfigMap
    pub owner_uid: &'a str,
    /// Fixed uptime window; a fresh daily window is used when absent
    pub lease_exclusion_window: Option<&'a str>,
    /// Per-environment GitRepository overriding the template's source
    pub git_repository_name: Option<&'a str>,
}

impl CreateKustomizationRequest<'_> {
    /// Name of the Kustomization, `{env}-{app}`
    pub fn kustomization_name(&self) -> String {
        app_resource_name(self.env_name, &self.app_template.app_name)
    }

    /// Render the Kustomization with a freshly computed uptime window
    pub fn body(&self, config: &ClusterConfig) -> Kustomization {
        let uptime = match self.lease_exclusion_window {
            Some(window) => window.to_string(),
            None => default_uptime_window(),
        };
        self.body_with_uptime(config, uptime)
    }

    /// Render the Kustomization with an explicit uptime window
    pub fn body_with_uptime(&self, config: &ClusterConfig, uptime: String) -> Kustomization {
        let source_ref = match self.git_repository_name {
            Some(name) => SourceRef {
                kind: "GitRepository".to_string(),
                name: name.to_string(),
                namespace: Some(config.namespace.clone()),
            },
            None => SourceRef {
                kind: "GitRepository".to_string(),
                name: self.app_template.git_repository_name.clone(),
                namespace: Some(FLUX_SYSTEM_NAMESPACE.to_string()),
            },
        };

        // Common substitutions win over the per-environment ones
        let mut substitute = BTreeMap::from([
            (SUBSTITUTE_ENVIRONMENT.to_string(), self.env_name.to_string()),
            (SUBSTITUTE_DOWNSCALER_UPTIME.to_string(), uptime),
        ]);
        substitute.extend(config.common_substitutions.clone());

        Kustomization {
            api_version: Kustomization::default_api_version(),
            kind: Kustomization::default_kind(),
            metadata: ObjectMeta {
                name: Some(self.kustomization_name()),
                namespace: Some(config.namespace.clone()),
                labels: Some(BTreeMap::from([
                    (LABEL_STAGE.to_string(), STAGE_TESTING.to_string()),
                    (LABEL_ENVIRONMENT.to_string(), self.env_name.to_string()),
                    (
                        LABEL_APP_NAME.to_string(),
                        self.app_template.app_name.clone(),
                    ),
                ])),
                annotations: Some(BTreeMap::from([
                    (ANNOTATION_OWNER.to_string(), self.owner_email.to_string()),
                    (
                        ANNOTATION_IMAGE_TAG_PREFIX.to_string(),
                        self.image_tag_prefix.to_string(),
                    ),
                ])),
                owner_references: Some(vec![env_owner_reference(self.env_name, self.owner_uid)]),
                ..Default::default()
            },
            spec: KustomizationSpec {
                path: self.app_template.git_repository_path.clone(),
                interval: KUSTOMIZATION_INTERVAL.to_string(),
                source_ref,
                prune: true,
                post_build: Some(PostBuild { substitute }),
            },
            status: None,
        }
    }
}

fn env_owner_reference(env_name: &str, uid: &str) -> OwnerReference {
    owner_reference("v1", "ConfigMap", env_name, uid)
}

// =============================================================================
// Patch
// =============================================================================

/// An attribute of an app that can be changed after creation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AppAttribute {
    /// Deployed image tag
    ImageTag(String),
    /// Image tag prefix tracked by the app's ImagePolicy
    ImageTagPrefix(String),
    /// Downscaler uptime window
    UptimeWindow(String),
    /// UID of the environment ConfigMap owning the app
    Owner(String),
}

impl AppAttribute {
    /// Attribute name as used on the command line and in logs
    pub fn name(&self) -> &'static str {
        match self {
            AppAttribute::ImageTag(_) => "image_tag",
            AppAttribute::ImageTagPrefix(_) => "image_tag_prefix",
            AppAttribute::UptimeWindow(_) => "uptime_window",
            AppAttribute::Owner(_) => "owner",
        }
    }
}

/// JSON merge patch for a Kustomization
///
/// Each setter touches only its own path, so several attributes can be
/// combined into a single patch call.
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct KustomizationPatch {
    #[serde(skip_serializing_if = "PatchMetadata::is_empty")]
    metadata: PatchMetadata,
    #[serde(skip_serializing_if = "PatchSpec::is_empty")]
    spec: PatchSpec,
}

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct PatchMetadata {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    annotations: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    owner_references: Option<Vec<OwnerReference>>,
}

impl PatchMetadata {
    fn is_empty(&self) -> bool {
        self.annotations.is_empty() && self.owner_references.is_none()
    }
}

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct PatchSpec {
    #[serde(skip_serializing_if = "PostBuild::is_empty")]
    post_build: PostBuild,
}

impl PatchSpec {
    fn is_empty(&self) -> bool {
        self.post_build.is_empty()
    }
}

impl PostBuild {
    fn is_empty(&self) -> bool {
        self.substitute.is_empty()
    }
}

/// A request to patch the Kustomization of an app
#[derive(Clone, Debug)]
pub struct PatchKustomizationRequest {
    /// Environment name
    pub env_name: String,
    /// App name
    pub app_name: String,
    /// Accumulated patch body
    pub patch: KustomizationPatch,
}

impl PatchKustomizationRequest {
    /// Start an empty patch for an app
    pub fn new(env_name: impl Into<String>, app_name: impl Into<String>) -> Self {
        Self {
            env_name: env_name.into(),
            app_name: app_name.into(),
            patch: KustomizationPatch::default(),
        }
    }

    /// Name of the Kustomization being patched
    pub fn kustomization_name(&self) -> String {
        app_resource_name(&self.env_name, &self.app_name)
    }

    /// Apply one attribute change
    pub fn apply(&mut self, attribute: &AppAttribute) -> &mut Self {
        match attribute {
            AppAttribute::ImageTag(tag) => self.set_image_tag(tag),
            AppAttribute::ImageTagPrefix(prefix) => self.set_image_tag_prefix(prefix),
            AppAttribute::UptimeWindow(window) => self.set_uptime_window(window),
            AppAttribute::Owner(uid) => self.set_owner(uid),
        }
    }

    /// Set the deployed image tag
    pub fn set_image_tag(&mut self, image_tag: &str) -> &mut Self {
        self.patch
            .spec
            .post_build
            .substitute
            .insert(SUBSTITUTE_IMAGE_TAG.to_string(), image_tag.to_string());
        self
    }

    /// Set the tracked image tag prefix
    pub fn set_image_tag_prefix(&mut self, image_tag_prefix: &str) -> &mut Self {
        self.patch.metadata.annotations.insert(
            ANNOTATION_IMAGE_TAG_PREFIX.to_string(),
            image_tag_prefix.to_string(),
        );
        self
    }

    /// Point the owner reference at the environment ConfigMap with this UID
    pub fn set_owner(&mut self, owner_uid: &str) -> &mut Self {
        self.patch.metadata.owner_references =
            Some(vec![env_owner_reference(&self.env_name, owner_uid)]);
        self
    }

    /// Set the downscaler uptime window
    pub fn set_uptime_window(&mut self, uptime_window: &str) -> &mut Self {
        self.patch.spec.post_build.substitute.insert(
            SUBSTITUTE_DOWNSCALER_UPTIME.to_string(),
            uptime_window.to_string(),
        );
        self
    }
}
