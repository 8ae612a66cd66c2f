//! CLI commands
//!
//! Every command prints JSON on stdout; logs go to stderr.

use std::path::Path;
use std::sync::Arc;

use kube::api::{Api, DynamicObject};
use kube::Client;
use serde::Serialize;
use tracing::{info, warn};

use kollie_cluster::image_policy::ImagePolicy;
use kollie_cluster::{ClusterClient, KubeClusterClient};
use kollie_common::telemetry::TEST_STAGE;
use kollie_common::{Error, Result};
use kollie_service::persistence::{AppBundle, JsonFileAppTemplateSource, JsonItemSource};
use kollie_service::{AppBundleStore, AppTemplateStore, Orchestrator, Settings};

pub mod apps;
pub mod bundles;
pub mod envs;
pub mod reconcile;

/// Connected cluster and orchestrator for commands that need one
pub struct Context {
    /// Orchestrator over the connected cluster
    pub orchestrator: Arc<Orchestrator>,
    cluster: KubeClusterClient,
}

impl Context {
    /// Connect with in-cluster config, falling back to the local kubeconfig
    ///
    /// Refuses to connect in the test stage.
    pub async fn connect(stage: &str, settings: Settings) -> Result<Self> {
        if stage == TEST_STAGE {
            return Err(Error::config(
                "refusing to connect to a live cluster when APPLICATION_STAGE=test",
            ));
        }

        let client = Client::try_default().await?;
        let cluster = KubeClusterClient::new(client, settings.cluster.namespace.clone());
        info!(namespace = %cluster.namespace(), "connected to cluster");

        let orchestrator = build_orchestrator(Arc::new(cluster.clone()), settings)?;
        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            cluster,
        })
    }

    /// ImagePolicies in the managed namespace, for watching
    pub fn image_policy_api(&self) -> Api<DynamicObject> {
        self.cluster.dynamic_api::<ImagePolicy>()
    }
}

/// Orchestrator over a gateway, with stores read from the configured files
pub fn build_orchestrator(client: Arc<dyn ClusterClient>, settings: Settings) -> Result<Orchestrator> {
    let templates = AppTemplateStore::new(JsonFileAppTemplateSource::new(
        &settings.app_template_json_path,
        settings.cluster.default_flux_repository.clone(),
    ));
    let bundles = load_bundles(&settings.app_bundle_json_path)?;
    Ok(Orchestrator::new(client, templates, bundles, settings))
}

/// Bundles from `path`; a deployment without a bundle file has none
pub fn load_bundles(path: &Path) -> Result<AppBundleStore> {
    if !path.exists() {
        warn!(path = %path.display(), "app bundle file not found, no bundles available");
        return Ok(AppBundleStore::from_bundles(Vec::new()));
    }
    AppBundleStore::load(&JsonItemSource::<AppBundle>::from_path(path)?)
}

/// Print a value as pretty JSON on stdout
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| Error::serialization(format!("failed to render output: {}", e)))?;
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn absent_bundle_file_means_no_bundles() {
        let store = load_bundles(Path::new("/nonexistent/app_bundles.json")).unwrap();
        assert!(store.get_all_bundles().is_empty());
    }

    #[test]
    fn bundle_file_is_read_when_present() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"name": "checkout", "description": "Checkout flow", "apps": ["basket", "pricing-service"]}}]"#
        )
        .unwrap();

        let store = load_bundles(file.path()).unwrap();
        let bundle = store.get_bundle("checkout").unwrap();
        assert_eq!(bundle.apps, vec!["basket", "pricing-service"]);
    }

    #[tokio::test]
    async fn test_stage_never_connects() {
        let result = Context::connect(TEST_STAGE, Settings::default()).await;
        assert!(matches!(result, Err(Error::Config { .. })));
    }
}
