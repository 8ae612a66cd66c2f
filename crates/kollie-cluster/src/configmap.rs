//! Environment configuration records
//!
//! Each environment is backed by a ConfigMap named after it. The ConfigMap
//! is the root of the ownership tree: deleting it removes the whole
//! environment.

use std::collections::BTreeMap;

use chrono::Utc;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

use kollie_common::timestamp::format_timestamp;
use kollie_common::{
    Error, Result, ANNOTATION_CREATED_AT, ANNOTATION_OWNER, LABEL_ENVIRONMENT, LABEL_MANAGED_BY,
    LABEL_STAGE, MANAGED_BY_KOLLIE, STAGE_TESTING,
};

use crate::ClusterConfig;

/// Key of the ConfigMap data entry holding [`EnvConfigData`] as JSON
pub const DATA_KEY: &str = "json";

/// Payload stored in an environment ConfigMap
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvConfigData {
    /// Environment name
    pub env_name: String,
    /// Creation timestamp as written
    pub created_at: String,
    /// App names requested at creation
    #[serde(default)]
    pub apps: Vec<String>,
    /// Fixed uptime window for environments excluded from lease expiry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_exclusion_window: Option<String>,
}

impl EnvConfigData {
    /// Decode the payload of an environment ConfigMap
    pub fn from_config_map(config_map: &ConfigMap) -> Result<Self> {
        let name = config_map.metadata.name.as_deref().unwrap_or_default();
        let raw = config_map
            .data
            .as_ref()
            .and_then(|data| data.get(DATA_KEY))
            .ok_or_else(|| {
                Error::parse(name, format!("ConfigMap {} has no '{}' entry", name, DATA_KEY))
            })?;

        serde_json::from_str(raw).map_err(|e| {
            Error::parse(raw.as_str(), format!("ConfigMap {} holds malformed JSON: {}", name, e))
        })
    }
}

/// A request to create an environment ConfigMap
#[derive(Clone, Debug)]
pub struct CreateEnvConfigMapRequest {
    /// Environment name
    pub env_name: String,
    /// Owner email
    pub owner_email: String,
    /// Fixed uptime window, if the environment is excluded from lease expiry
    pub lease_exclusion_window: Option<String>,
    /// App names to record
    pub apps: Vec<String>,
}

impl CreateEnvConfigMapRequest {
    /// Render the ConfigMap, stamped with the current time
    pub fn body(&self, config: &ClusterConfig) -> Result<ConfigMap> {
        self.body_created_at(config, &format_timestamp(&Utc::now()))
    }

    /// Render the ConfigMap with an explicit creation timestamp
    pub fn body_created_at(&self, config: &ClusterConfig, created_at: &str) -> Result<ConfigMap> {
        let data = EnvConfigData {
            env_name: self.env_name.clone(),
            created_at: created_at.to_string(),
            apps: self.apps.clone(),
            lease_exclusion_window: self.lease_exclusion_window.clone(),
        };
        let json = serde_json::to_string(&data)
            .map_err(|e| Error::serialization_for_kind("ConfigMap", e.to_string()))?;

        Ok(ConfigMap {
            metadata: ObjectMeta {
                name: Some(self.env_name.clone()),
                namespace: Some(config.namespace.clone()),
                annotations: Some(BTreeMap::from([
                    (ANNOTATION_CREATED_AT.to_string(), created_at.to_string()),
                    (ANNOTATION_OWNER.to_string(), self.owner_email.clone()),
                ])),
                labels: Some(BTreeMap::from([
                    (LABEL_STAGE.to_string(), STAGE_TESTING.to_string()),
                    (LABEL_ENVIRONMENT.to_string(), self.env_name.clone()),
                    (LABEL_MANAGED_BY.to_string(), MANAGED_BY_KOLLIE.to_string()),
                ])),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(DATA_KEY.to_string(), json)])),
            ..Default::default()
        })
    }
}
