//! Domain projection: environments and apps rebuilt from cluster resources
//!
//! Nothing here is stored. Every read lists the resources again and folds
//! them into these views, so they are only as fresh as the last query.

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::api::networking::v1::Ingress;
use serde::Serialize;

use kollie_cluster::configmap::EnvConfigData;
use kollie_cluster::kustomization::{Condition, Kustomization};
use kollie_common::lease::LeaseInfo;
use kollie_common::timestamp::parse_timestamp;
use kollie_common::{
    Error, Result, ANNOTATION_IMAGE_TAG_PREFIX, ANNOTATION_OWNER, ANNOTATION_TRACKING_BRANCH,
    LABEL_APP_NAME, LABEL_ENVIRONMENT, SUBSTITUTE_DOWNSCALER_UPTIME, SUBSTITUTE_IMAGE_TAG,
};

/// Most URLs projected for one app
pub const URL_LIMIT: usize = 10;

/// One status condition of an app's Kustomization
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AppEvent {
    /// Whether the condition status is "True"
    pub ready: bool,
    /// Condition type
    #[serde(rename = "type")]
    pub type_: String,
    /// Machine-readable reason
    pub reason: String,
    /// Human-readable message
    pub message: String,
}

impl AppEvent {
    fn from_condition(condition: &Condition) -> Self {
        Self {
            ready: condition.status == "True",
            type_: condition.type_.clone(),
            reason: condition.reason.clone(),
            message: condition.message.clone(),
        }
    }

    /// Placeholder for apps the controller has not reported on yet
    pub fn no_events() -> Self {
        Self {
            ready: false,
            type_: "Unknown".to_string(),
            reason: "No events".to_string(),
            message: "No events have been recorded for this app.".to_string(),
        }
    }
}

/// An app deployed in an environment
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct KollieApp {
    /// App name
    pub name: String,
    /// Environment name
    pub env_name: String,
    /// Owner email
    pub owner_email: String,
    /// Deployed image tag, once one has been discovered
    pub image_tag: Option<String>,
    /// Image tag prefix the app tracks
    pub image_tag_prefix: Option<String>,
    /// Status conditions, most recent last
    pub events: Vec<AppEvent>,
    /// End of the uptime window
    pub lease_until: Option<DateTime<Utc>>,
    /// Externally reachable URLs
    pub urls: Vec<String>,
}

impl KollieApp {
    /// Project an app from its Kustomization and optional Ingress
    ///
    /// Missing name, environment or owner is an error. Derived fields
    /// (lease, URLs, events) are left empty when they can't be read.
    pub fn from_resources(kustomization: &Kustomization, ingress: Option<&Ingress>) -> Result<Self> {
        let resource_name = kustomization.metadata.name.as_deref().unwrap_or_default();
        let required_label = |key: &str| {
            kustomization.label(key).map(str::to_string).ok_or_else(|| {
                Error::parse(
                    resource_name,
                    format!("Kustomization {} has no {} label", resource_name, key),
                )
            })
        };

        let name = required_label(LABEL_APP_NAME)?;
        let env_name = required_label(LABEL_ENVIRONMENT)?;
        let owner_email = kustomization
            .annotation(ANNOTATION_OWNER)
            .map(str::to_string)
            .ok_or_else(|| {
                Error::parse(
                    resource_name,
                    format!("Kustomization {} has no owner annotation", resource_name),
                )
            })?;

        // Environments created before the prefix annotation existed only
        // carry the tracking branch
        let image_tag_prefix = kustomization
            .annotation(ANNOTATION_IMAGE_TAG_PREFIX)
            .filter(|prefix| !prefix.is_empty())
            .or_else(|| kustomization.annotation(ANNOTATION_TRACKING_BRANCH))
            .map(str::to_string);

        let substitutions = kustomization.substitutions();
        let image_tag = substitutions
            .and_then(|subs| subs.get(SUBSTITUTE_IMAGE_TAG))
            .cloned();
        let lease_until = substitutions
            .and_then(|subs| subs.get(SUBSTITUTE_DOWNSCALER_UPTIME))
            .and_then(|window| parse_timestamp(window).ok());

        let events = kustomization
            .status
            .as_ref()
            .map(|status| status.conditions.iter().map(AppEvent::from_condition).collect())
            .unwrap_or_default();

        let urls = ingress.map(ingress_urls).unwrap_or_default();

        Ok(Self {
            name,
            env_name,
            owner_email,
            image_tag,
            image_tag_prefix,
            events,
            lease_until,
            urls,
        })
    }

    /// Most recent event, or a placeholder when there are none
    pub fn status(&self) -> AppEvent {
        self.events.last().cloned().unwrap_or_else(AppEvent::no_events)
    }

    /// Lease details, if the app has a parseable uptime window
    pub fn lease_info(&self) -> Option<LeaseInfo> {
        self.lease_until.map(LeaseInfo::new)
    }
}

/// `https://{host}{path}` for each rule and path in order, at most [`URL_LIMIT`]
fn ingress_urls(ingress: &Ingress) -> Vec<String> {
    let rules = ingress
        .spec
        .as_ref()
        .and_then(|spec| spec.rules.as_deref())
        .unwrap_or_default();

    rules
        .iter()
        .filter_map(|rule| Some((rule.host.as_deref()?, rule.http.as_ref()?)))
        .flat_map(|(host, http)| {
            http.paths
                .iter()
                .map(move |p| format!("https://{}{}", host, p.path.as_deref().unwrap_or_default()))
        })
        .take(URL_LIMIT)
        .collect()
}

/// Shallow view of an environment record
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EnvironmentMetadata {
    /// Environment name
    pub name: String,
    /// Owner email
    pub owner_email: Option<String>,
    /// When the environment was created
    pub created_at: DateTime<Utc>,
    /// Fixed uptime window, if the environment is excluded from lease expiry
    pub lease_exclusion_window: Option<String>,
}

impl EnvironmentMetadata {
    /// Project an environment ConfigMap
    pub fn from_config_map(config_map: &ConfigMap) -> Result<Self> {
        let data = EnvConfigData::from_config_map(config_map)?;
        let owner_email = config_map
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(ANNOTATION_OWNER))
            .cloned();

        Ok(Self {
            name: config_map
                .metadata
                .name
                .clone()
                .unwrap_or_else(|| data.env_name.clone()),
            owner_email,
            created_at: parse_timestamp(&data.created_at)?,
            lease_exclusion_window: data.lease_exclusion_window,
        })
    }
}

/// An environment and the apps deployed in it
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct KollieEnvironment {
    /// Environment name
    pub name: String,
    /// Owner email
    pub owner_email: Option<String>,
    /// Apps in listing order
    pub apps: Vec<KollieApp>,
    /// Branch tracked by the environment's GitRepository override
    pub flux_repository_branch: Option<String>,
    /// When the environment was created
    pub created_at: DateTime<Utc>,
    /// Fixed uptime window, if the environment is excluded from lease expiry
    pub lease_exclusion_window: Option<String>,
}

impl KollieEnvironment {
    /// Project an environment from its record and Kustomizations
    pub fn from_kustomizations(
        metadata: EnvironmentMetadata,
        kustomizations: &[Kustomization],
        flux_repository_branch: Option<String>,
    ) -> Result<Self> {
        let apps = kustomizations
            .iter()
            .map(|k| KollieApp::from_resources(k, None))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: metadata.name,
            owner_email: metadata.owner_email,
            apps,
            flux_repository_branch,
            created_at: metadata.created_at,
            lease_exclusion_window: metadata.lease_exclusion_window,
        })
    }

    /// Names of the deployed apps
    pub fn app_names(&self) -> Vec<&str> {
        self.apps.iter().map(|app| app.name.as_str()).collect()
    }

    /// Whether an app is deployed
    pub fn has_app(&self, app_name: &str) -> bool {
        self.apps.iter().any(|app| app.name == app_name)
    }

    /// Earliest lease end among the apps
    pub fn lease_until(&self) -> Option<DateTime<Utc>> {
        self.apps.iter().filter_map(|app| app.lease_until).min()
    }

    /// Lease details for the environment as a whole
    pub fn lease_info(&self) -> Option<LeaseInfo> {
        self.lease_until().map(LeaseInfo::new)
    }
}
