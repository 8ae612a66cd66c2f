//! Shared Kubernetes helpers: API resource construction and label selectors
//!
//! Label selectors are the only query mechanism Kollie has against the
//! cluster, so every list call builds its selector through [`LabelSelector`]
//! to keep the stage label in front and the key names consistent.

use std::fmt;

use kube::api::ApiResource;

use crate::{LABEL_APP_NAME, LABEL_ENVIRONMENT, LABEL_STAGE, STAGE_TESTING};

// =============================================================================
// HasApiResource Trait
// =============================================================================

/// Trait for types that have a known API group, version, and kind.
///
/// Implement this for the Flux resource types to derive their `ApiResource`
/// from their internal constants, keeping serialization and API calls on
/// the same apiVersion.
///
/// # Example
/// ```ignore
/// impl HasApiResource for ImagePolicy {
///     const API_VERSION: &'static str = "image.toolkit.fluxcd.io/v1beta2";
///     const KIND: &'static str = "ImagePolicy";
/// }
///
/// let ar = ImagePolicy::api_resource();
/// assert_eq!(ar.plural, "imagepolicies");
/// ```
pub trait HasApiResource {
    /// Full API version (e.g., "kustomize.toolkit.fluxcd.io/v1", "v1")
    const API_VERSION: &'static str;
    /// Resource kind (e.g., "Kustomization")
    const KIND: &'static str;

    /// Build an ApiResource from the type's constants.
    fn api_resource() -> ApiResource {
        build_api_resource(Self::API_VERSION, Self::KIND)
    }
}

/// Build an ApiResource from a known apiVersion and kind.
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = parse_api_version(api_version);
    ApiResource {
        group,
        version,
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        plural: pluralize_kind(kind),
    }
}

/// Split an apiVersion into (group, version). Core types have an empty group.
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Pluralize a resource kind the way the API server names its resources
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();

    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}

// =============================================================================
// Label selectors
// =============================================================================

/// Equality-based label selector, rendered as `k1=v1,k2=v2`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelSelector {
    terms: Vec<(String, String)>,
}

impl LabelSelector {
    /// Empty selector
    pub fn new() -> Self {
        Self::default()
    }

    /// Selector scoped to Kollie's stage label, the base of every query
    pub fn testing() -> Self {
        Self::new().with(LABEL_STAGE, STAGE_TESTING)
    }

    /// Selector for the resources of one environment, optionally one app
    pub fn for_app(env_name: &str, app_name: Option<&str>) -> Self {
        let selector = Self::testing().with(LABEL_ENVIRONMENT, env_name);
        match app_name {
            Some(app) => selector.with(LABEL_APP_NAME, app),
            None => selector,
        }
    }

    /// Add an equality term
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.terms.push((key.into(), value.into()));
        self
    }

    /// Whether the selector has no terms
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in &self.terms {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{}={}", key, value)?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakePolicy;

    impl HasApiResource for FakePolicy {
        const API_VERSION: &'static str = "image.toolkit.fluxcd.io/v1beta2";
        const KIND: &'static str = "ImagePolicy";
    }

    #[test]
    fn test_pluralize_kind() {
        assert_eq!(pluralize_kind("Kustomization"), "kustomizations");
        assert_eq!(pluralize_kind("ImagePolicy"), "imagepolicies");
        assert_eq!(pluralize_kind("GitRepository"), "gitrepositories");
        assert_eq!(pluralize_kind("Ingress"), "ingresses");
        assert_eq!(pluralize_kind("ConfigMap"), "configmaps");
        assert_eq!(pluralize_kind("Gateway"), "gateways");
    }

    #[test]
    fn test_parse_api_version_with_group() {
        let (group, version) = parse_api_version("kustomize.toolkit.fluxcd.io/v1");
        assert_eq!(group, "kustomize.toolkit.fluxcd.io");
        assert_eq!(version, "v1");
    }

    #[test]
    fn test_parse_api_version_core() {
        let (group, version) = parse_api_version("v1");
        assert_eq!(group, "");
        assert_eq!(version, "v1");
    }

    #[test]
    fn test_api_resource_from_trait() {
        let ar = FakePolicy::api_resource();
        assert_eq!(ar.group, "image.toolkit.fluxcd.io");
        assert_eq!(ar.version, "v1beta2");
        assert_eq!(ar.kind, "ImagePolicy");
        assert_eq!(ar.plural, "imagepolicies");
    }

    #[test]
    fn selector_puts_stage_first() {
        let selector = LabelSelector::for_app("feature-foo", Some("pricing-service"));
        assert_eq!(
            selector.to_string(),
            "tails-app-stage=testing,tails-app-environment=feature-foo,tails-app-name=pricing-service"
        );
    }

    #[test]
    fn selector_for_whole_environment() {
        let selector = LabelSelector::for_app("feature-foo", None);
        assert_eq!(
            selector.to_string(),
            "tails-app-stage=testing,tails-app-environment=feature-foo"
        );
    }

    #[test]
    fn empty_selector_renders_empty() {
        assert!(LabelSelector::new().is_empty());
        assert_eq!(LabelSelector::new().to_string(), "");
    }
}
