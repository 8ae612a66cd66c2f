//! Cluster-side configuration shared by the resource builders

use std::collections::BTreeMap;
use std::path::Path;

use kollie_common::{Error, Result, DEFAULT_NAMESPACE};

/// Default Git URL prefix for per-environment GitRepository sources
pub const DEFAULT_GIT_URL_PREFIX: &str = "ssh://git@github.com/tailsdotcom";

/// Where and how Kollie writes its resources
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterConfig {
    /// Namespace holding every Kollie-managed resource
    pub namespace: String,
    /// Flux GitRepository used by app templates that don't name one, and the
    /// base name of per-environment branch overrides
    pub default_flux_repository: Option<String>,
    /// Prefix joined with the repository name to form its Git URL
    pub git_url_prefix: String,
    /// postBuild substitutions added to every Kustomization
    pub common_substitutions: BTreeMap<String, String>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            default_flux_repository: None,
            git_url_prefix: DEFAULT_GIT_URL_PREFIX.to_string(),
            common_substitutions: BTreeMap::new(),
        }
    }
}

impl ClusterConfig {
    /// The default Flux repository, or a configuration error if unset
    pub fn require_default_flux_repository(&self) -> Result<&str> {
        self.default_flux_repository
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| Error::config("no default Flux repository configured"))
    }
}

/// Load the common substitution map from a JSON object of strings
///
/// A missing or malformed file is a configuration error; Kollie refuses to
/// start without it.
pub fn load_common_substitutions(path: impl AsRef<Path>) -> Result<BTreeMap<String, String>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::config(format!(
            "failed to read common substitutions {}: {}",
            path.display(),
            e
        ))
    })?;

    serde_json::from_str(&content).map_err(|e| {
        Error::config(format!(
            "common substitutions {} is not a JSON object of strings: {}",
            path.display(),
            e
        ))
    })
}
