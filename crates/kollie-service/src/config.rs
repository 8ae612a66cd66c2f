//! Service settings

use std::path::PathBuf;

use kollie_cluster::ClusterConfig;
use kollie_common::LEASE_EXCLUSION_WINDOW;

/// Default location of the app template file
pub const DEFAULT_APP_TEMPLATE_JSON_PATH: &str = "app_templates.json";

/// Default location of the app bundle file
pub const DEFAULT_APP_BUNDLE_JSON_PATH: &str = "app_bundles.json";

/// Settings the orchestrator is constructed with
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Namespace, repository and substitution settings for resource bodies
    pub cluster: ClusterConfig,
    /// Environments kept up during business hours instead of following a lease
    pub lease_exclusion_list: Vec<String>,
    /// App template JSON file
    pub app_template_json_path: PathBuf,
    /// App bundle JSON file
    pub app_bundle_json_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cluster: ClusterConfig::default(),
            lease_exclusion_list: Vec::new(),
            app_template_json_path: PathBuf::from(DEFAULT_APP_TEMPLATE_JSON_PATH),
            app_bundle_json_path: PathBuf::from(DEFAULT_APP_BUNDLE_JSON_PATH),
        }
    }
}

impl Settings {
    /// Fixed uptime window for an environment on the exclusion list
    pub fn lease_exclusion_window(&self, env_name: &str) -> Option<&'static str> {
        self.lease_exclusion_list
            .iter()
            .any(|name| name == env_name)
            .then_some(LEASE_EXCLUSION_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listed_environment_gets_business_hours_window() {
        let settings = Settings {
            lease_exclusion_list: vec!["qa".to_string(), "demo".to_string()],
            ..Default::default()
        };

        assert_eq!(
            settings.lease_exclusion_window("demo"),
            Some("Mon-Fri 07:00-19:00 Europe/London")
        );
        assert_eq!(settings.lease_exclusion_window("feature-foo"), None);
    }

    #[test]
    fn empty_exclusion_list_excludes_nothing() {
        assert_eq!(Settings::default().lease_exclusion_window(""), None);
    }
}
