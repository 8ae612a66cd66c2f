//! Cluster gateway
//!
//! [`ClusterClient`] is the only way the rest of Kollie touches the cluster.
//! The real implementation talks to the API server through `kube`; tests use
//! the generated `MockClusterClient`.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

#[cfg(any(test, feature = "mock"))]
use mockall::automock;

use kollie_common::kube_utils::{HasApiResource, LabelSelector};
use kollie_common::{Error, Result};

use crate::git_repository::GitRepository;
use crate::image_policy::ImagePolicy;
use crate::kustomization::{Kustomization, KustomizationPatch};

/// Operations Kollie performs against the cluster
///
/// Lookups by name return `Ok(None)` when the object does not exist. Lists
/// return items in whatever order the API server gives them.
#[cfg_attr(any(test, feature = "mock"), automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Create an environment ConfigMap
    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap>;

    /// Get an environment ConfigMap by name
    async fn get_config_map(&self, name: &str) -> Result<Option<ConfigMap>>;

    /// List ConfigMaps matching a selector
    async fn list_config_maps(&self, selector: &LabelSelector) -> Result<Vec<ConfigMap>>;

    /// Delete an environment ConfigMap, cascading to everything it owns
    async fn delete_config_map(&self, name: &str) -> Result<()>;

    /// Create a Kustomization
    async fn create_kustomization(&self, kustomization: &Kustomization) -> Result<Kustomization>;

    /// List Kustomizations matching a selector
    async fn list_kustomizations(&self, selector: &LabelSelector) -> Result<Vec<Kustomization>>;

    /// Merge-patch a Kustomization by name
    async fn patch_kustomization(
        &self,
        name: &str,
        patch: &KustomizationPatch,
    ) -> Result<Kustomization>;

    /// Delete a Kustomization, cascading to its ImagePolicy
    async fn delete_kustomization(&self, name: &str) -> Result<()>;

    /// Create an ImagePolicy
    async fn create_image_policy(&self, image_policy: &ImagePolicy) -> Result<ImagePolicy>;

    /// List ImagePolicies matching a selector
    async fn list_image_policies(&self, selector: &LabelSelector) -> Result<Vec<ImagePolicy>>;

    /// Delete an ImagePolicy
    async fn delete_image_policy(&self, name: &str) -> Result<()>;

    /// Create a GitRepository
    async fn create_git_repository(&self, git_repository: &GitRepository)
        -> Result<GitRepository>;

    /// Get a GitRepository by name
    async fn get_git_repository(&self, name: &str) -> Result<Option<GitRepository>>;

    /// First Ingress in any namespace matching a selector
    async fn find_ingress(&self, selector: &LabelSelector) -> Result<Option<Ingress>>;
}

/// [`ClusterClient`] backed by a live API server
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
    namespace: String,
}

impl KubeClusterClient {
    /// Create a client writing to the given namespace
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    /// Namespace Kollie resources live in
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Untyped API for a Flux resource kind in Kollie's namespace
    pub fn dynamic_api<K: HasApiResource>(&self) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), &self.namespace, &K::api_resource())
    }

    fn config_maps(&self) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    async fn create_dynamic<K>(&self, object: &K) -> Result<K>
    where
        K: HasApiResource + Serialize + DeserializeOwned,
    {
        let api = self.dynamic_api::<K>();
        let created = api.create(&PostParams::default(), &to_dynamic(object)?).await?;
        debug!(
            kind = K::KIND,
            name = created.metadata.name.as_deref().unwrap_or_default(),
            "created resource"
        );
        from_dynamic(created)
    }

    async fn get_dynamic<K>(&self, name: &str) -> Result<Option<K>>
    where
        K: HasApiResource + DeserializeOwned,
    {
        match self.dynamic_api::<K>().get(name).await {
            Ok(obj) => Ok(Some(from_dynamic(obj)?)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_dynamic<K>(&self, selector: &LabelSelector) -> Result<Vec<K>>
    where
        K: HasApiResource + DeserializeOwned,
    {
        let lp = ListParams::default().labels(&selector.to_string());
        let list = self.dynamic_api::<K>().list(&lp).await?;
        list.items.into_iter().map(from_dynamic).collect()
    }

    async fn delete_dynamic<K: HasApiResource>(&self, name: &str) -> Result<()> {
        self.dynamic_api::<K>()
            .delete(name, &DeleteParams::default())
            .await?;
        debug!(kind = K::KIND, name = %name, "deleted resource");
        Ok(())
    }
}

/// Convert a typed Flux resource into the untyped form `kube` sends
pub fn to_dynamic<K: Serialize>(object: &K) -> Result<DynamicObject> {
    let value = serde_json::to_value(object)?;
    Ok(serde_json::from_value(value)?)
}

/// Convert an untyped object from the API server into a typed Flux resource
pub fn from_dynamic<K: HasApiResource + DeserializeOwned>(object: DynamicObject) -> Result<K> {
    let value = serde_json::to_value(&object)?;
    serde_json::from_value(value).map_err(|e| Error::serialization_for_kind(K::KIND, e.to_string()))
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap> {
        let created = self
            .config_maps()
            .create(&PostParams::default(), config_map)
            .await?;
        debug!(
            name = created.metadata.name.as_deref().unwrap_or_default(),
            "created environment config map"
        );
        Ok(created)
    }

    async fn get_config_map(&self, name: &str) -> Result<Option<ConfigMap>> {
        match self.config_maps().get(name).await {
            Ok(cm) => Ok(Some(cm)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_config_maps(&self, selector: &LabelSelector) -> Result<Vec<ConfigMap>> {
        let lp = ListParams::default().labels(&selector.to_string());
        Ok(self.config_maps().list(&lp).await?.items)
    }

    async fn delete_config_map(&self, name: &str) -> Result<()> {
        self.config_maps()
            .delete(name, &DeleteParams::default())
            .await?;
        debug!(name = %name, "deleted environment config map");
        Ok(())
    }

    async fn create_kustomization(&self, kustomization: &Kustomization) -> Result<Kustomization> {
        self.create_dynamic(kustomization).await
    }

    async fn list_kustomizations(&self, selector: &LabelSelector) -> Result<Vec<Kustomization>> {
        self.list_dynamic(selector).await
    }

    async fn patch_kustomization(
        &self,
        name: &str,
        patch: &KustomizationPatch,
    ) -> Result<Kustomization> {
        let patched = self
            .dynamic_api::<Kustomization>()
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await?;
        debug!(name = %name, "patched kustomization");
        from_dynamic(patched)
    }

    async fn delete_kustomization(&self, name: &str) -> Result<()> {
        self.delete_dynamic::<Kustomization>(name).await
    }

    async fn create_image_policy(&self, image_policy: &ImagePolicy) -> Result<ImagePolicy> {
        self.create_dynamic(image_policy).await
    }

    async fn list_image_policies(&self, selector: &LabelSelector) -> Result<Vec<ImagePolicy>> {
        self.list_dynamic(selector).await
    }

    async fn delete_image_policy(&self, name: &str) -> Result<()> {
        self.delete_dynamic::<ImagePolicy>(name).await
    }

    async fn create_git_repository(
        &self,
        git_repository: &GitRepository,
    ) -> Result<GitRepository> {
        self.create_dynamic(git_repository).await
    }

    async fn get_git_repository(&self, name: &str) -> Result<Option<GitRepository>> {
        self.get_dynamic(name).await
    }

    async fn find_ingress(&self, selector: &LabelSelector) -> Result<Option<Ingress>> {
        let api: Api<Ingress> = Api::all(self.client.clone());
        let lp = ListParams::default().labels(&selector.to_string());
        Ok(api.list(&lp).await?.items.into_iter().next())
    }
}
