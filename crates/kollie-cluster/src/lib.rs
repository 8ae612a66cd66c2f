//! Flux resource bodies, builders and the cluster gateway
//!
//! Kollie models an environment as a tree of owned resources:
//!
//! ```text
//! ConfigMap (environment record)
//! ├── GitRepository        (optional branch override)
//! └── Kustomization {env}-{app}
//!     └── ImagePolicy {env}-{app}
//! ```
//!
//! Deleting a parent lets the API server garbage-collect its children, so
//! every builder here sets an owner reference with `blockOwnerDeletion`.

#![deny(missing_docs)]

pub mod client;
pub mod config;
pub mod configmap;
pub mod git_repository;
pub mod image_policy;
pub mod kustomization;
pub mod template;

pub use client::{ClusterClient, KubeClusterClient};
#[cfg(any(test, feature = "mock"))]
pub use client::MockClusterClient;
pub use config::ClusterConfig;
pub use template::{AppTemplate, ImageRepositoryRef};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

/// Owner reference that blocks deletion of the owner until this resource is gone
pub fn owner_reference(
    api_version: &str,
    kind: &str,
    name: impl Into<String>,
    uid: impl Into<String>,
) -> OwnerReference {
    OwnerReference {
        api_version: api_version.to_string(),
        kind: kind.to_string(),
        name: name.into(),
        uid: uid.into(),
        block_owner_deletion: Some(true),
        controller: None,
    }
}

/// Name shared by an app's Kustomization and ImagePolicy
pub fn app_resource_name(env_name: &str, app_name: &str) -> String {
    format!("{}-{}", env_name, app_name)
}
