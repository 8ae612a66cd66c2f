//! Command-line and environment settings

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::Args;

use kollie_cluster::config::{load_common_substitutions, DEFAULT_GIT_URL_PREFIX};
use kollie_cluster::ClusterConfig;
use kollie_common::{Result, DEFAULT_NAMESPACE};
use kollie_service::config::{DEFAULT_APP_BUNDLE_JSON_PATH, DEFAULT_APP_TEMPLATE_JSON_PATH};
use kollie_service::Settings;

/// Stage assumed when `APPLICATION_STAGE` is unset
pub const DEFAULT_STAGE: &str = "production";

/// Settings shared by every subcommand
#[derive(Args, Clone, Debug)]
pub struct SettingsArgs {
    /// Namespace holding Kollie-managed resources
    #[arg(long, env = "KOLLIE_NAMESPACE", default_value = DEFAULT_NAMESPACE, global = true)]
    pub namespace: String,

    /// Flux GitRepository used by templates that don't name one
    #[arg(long, env = "KOLLIE_DEFAULT_FLUX_REPOSITORY", global = true)]
    pub default_flux_repository: Option<String>,

    /// Prefix of the Git URL for per-environment branch sources
    #[arg(long, env = "KOLLIE_GIT_URL_PREFIX", default_value = DEFAULT_GIT_URL_PREFIX, global = true)]
    pub git_url_prefix: String,

    /// JSON object of postBuild substitutions added to every app
    #[arg(long, env = "KOLLIE_COMMON_SUBSTITUTIONS_JSON_PATH", global = true)]
    pub common_substitutions_json_path: Option<PathBuf>,

    /// Environments kept up during business hours, comma separated
    #[arg(long, env = "KOLLIE_LEASE_EXCLUSION_LIST", value_delimiter = ',', global = true)]
    pub lease_exclusion_list: Vec<String>,

    /// App template JSON file
    #[arg(long, env = "KOLLIE_APP_TEMPLATE_JSON_PATH", default_value = DEFAULT_APP_TEMPLATE_JSON_PATH, global = true)]
    pub app_template_json_path: PathBuf,

    /// App bundle JSON file
    #[arg(long, env = "KOLLIE_APP_BUNDLE_JSON_PATH", default_value = DEFAULT_APP_BUNDLE_JSON_PATH, global = true)]
    pub app_bundle_json_path: PathBuf,

    /// Deployment stage; `local` logs human-readable output, `test` never touches a cluster
    #[arg(long, env = "APPLICATION_STAGE", default_value = DEFAULT_STAGE, global = true)]
    pub stage: String,
}

impl SettingsArgs {
    /// Resolve into service settings, reading the common substitutions file
    pub fn load(&self) -> Result<Settings> {
        let common_substitutions = match &self.common_substitutions_json_path {
            Some(path) => load_common_substitutions(path)?,
            None => BTreeMap::new(),
        };

        Ok(Settings {
            cluster: ClusterConfig {
                namespace: self.namespace.clone(),
                default_flux_repository: self
                    .default_flux_repository
                    .clone()
                    .filter(|name| !name.is_empty()),
                git_url_prefix: self.git_url_prefix.clone(),
                common_substitutions,
            },
            lease_exclusion_list: self
                .lease_exclusion_list
                .iter()
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect(),
            app_template_json_path: self.app_template_json_path.clone(),
            app_bundle_json_path: self.app_bundle_json_path.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use kollie_common::Error;

    use crate::Cli;

    fn parse(args: &[&str]) -> SettingsArgs {
        let mut argv = vec!["kollie"];
        argv.extend_from_slice(args);
        argv.extend_from_slice(&["bundles", "list"]);
        Cli::try_parse_from(argv).unwrap().settings
    }

    #[test]
    fn exclusion_list_splits_on_commas() {
        let settings = parse(&["--lease-exclusion-list", "qa, demo,,staging"])
            .load()
            .unwrap();
        assert_eq!(settings.lease_exclusion_list, vec!["qa", "demo", "staging"]);
    }

    #[test]
    fn flags_reach_cluster_config() {
        let settings = parse(&[
            "--namespace",
            "kollie-dev",
            "--default-flux-repository",
            "k8s-apps",
        ])
        .load()
        .unwrap();

        assert_eq!(settings.cluster.namespace, "kollie-dev");
        assert_eq!(
            settings.cluster.default_flux_repository.as_deref(),
            Some("k8s-apps")
        );
    }

    #[test]
    fn missing_substitutions_file_is_fatal() {
        let err = parse(&["--common-substitutions-json-path", "/nonexistent/subs.json"])
            .load()
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
