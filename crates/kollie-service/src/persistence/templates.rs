//! App template store

use std::path::{Path, PathBuf};

use kollie_cluster::AppTemplate;
use kollie_common::{Error, Result};

/// Something that yields the app templates
pub trait AppTemplateSource: Send + Sync {
    /// Load every template
    fn load(&self) -> Result<Vec<AppTemplate>>;
}

impl AppTemplateSource for Vec<AppTemplate> {
    fn load(&self) -> Result<Vec<AppTemplate>> {
        Ok(self.clone())
    }
}

/// Templates read from a JSON array file on every load
///
/// An empty file holds no templates. Templates that don't name a Git
/// repository get the configured default.
#[derive(Clone, Debug)]
pub struct JsonFileAppTemplateSource {
    path: PathBuf,
    default_git_repository: Option<String>,
}

impl JsonFileAppTemplateSource {
    /// Source reading `path`, filling in `default_git_repository` where needed
    pub fn new(path: impl AsRef<Path>, default_git_repository: Option<String>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            default_git_repository,
        }
    }
}

impl AppTemplateSource for JsonFileAppTemplateSource {
    fn load(&self) -> Result<Vec<AppTemplate>> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            Error::config(format!("failed to read {}: {}", self.path.display(), e))
        })?;

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let mut templates: Vec<AppTemplate> = serde_json::from_str(&content).map_err(|e| {
            Error::config(format!(
                "File {} contains malformed JSON: {}",
                self.path.display(),
                e
            ))
        })?;

        if let Some(default) = &self.default_git_repository {
            for template in templates
                .iter_mut()
                .filter(|t| t.git_repository_name.is_empty())
            {
                template.git_repository_name = default.clone();
            }
        }

        Ok(templates)
    }
}

/// Lookup over an [`AppTemplateSource`]
pub struct AppTemplateStore {
    source: Box<dyn AppTemplateSource>,
}

impl AppTemplateStore {
    /// Store over the given source
    pub fn new(source: impl AppTemplateSource + 'static) -> Self {
        Self {
            source: Box::new(source),
        }
    }

    /// Template for an app, if one exists
    pub fn get_by_name(&self, app_name: &str) -> Result<Option<AppTemplate>> {
        Ok(self
            .source
            .load()?
            .into_iter()
            .find(|template| template.app_name == app_name))
    }

    /// Template for an app, or a configuration error
    pub fn require(&self, app_name: &str) -> Result<AppTemplate> {
        self.get_by_name(app_name)?
            .ok_or_else(|| Error::config(format!("App template not found for {}", app_name)))
    }

    /// Every template in file order
    pub fn get_all(&self) -> Result<Vec<AppTemplate>> {
        self.source.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TEMPLATES: &str = r#"[
        {
            "app_name": "pricing-service",
            "label": "Pricing Service",
            "git_repository_path": "./apps/pricing-service/testing",
            "default_image_tag_prefix": "main",
            "image_repository_ref": {"name": "pricing-service", "namespace": "flux-system"}
        },
        {
            "app_name": "basket",
            "label": "Basket",
            "git_repository_name": "basket-deploy",
            "git_repository_path": "./testing",
            "default_image_tag_prefix": "master",
            "image_repository_ref": {"name": "basket", "namespace": "flux-system"}
        }
    ]"#;

    fn file_with(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn default_repository_fills_unnamed_templates() {
        let file = file_with(TEMPLATES);
        let store = AppTemplateStore::new(JsonFileAppTemplateSource::new(
            file.path(),
            Some("k8s-apps".to_string()),
        ));

        let pricing = store.get_by_name("pricing-service").unwrap().unwrap();
        assert_eq!(pricing.git_repository_name, "k8s-apps");

        let basket = store.get_by_name("basket").unwrap().unwrap();
        assert_eq!(basket.git_repository_name, "basket-deploy");
    }

    #[test]
    fn templates_keep_file_order() {
        let file = file_with(TEMPLATES);
        let store = AppTemplateStore::new(JsonFileAppTemplateSource::new(file.path(), None));

        let names: Vec<_> = store
            .get_all()
            .unwrap()
            .into_iter()
            .map(|t| t.app_name)
            .collect();
        assert_eq!(names, vec!["pricing-service", "basket"]);
    }

    #[test]
    fn empty_file_holds_no_templates() {
        let file = file_with("");
        let store = AppTemplateStore::new(JsonFileAppTemplateSource::new(file.path(), None));
        assert!(store.get_all().unwrap().is_empty());
        assert!(store.get_by_name("pricing-service").unwrap().is_none());
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let file = file_with("[{");
        let store = AppTemplateStore::new(JsonFileAppTemplateSource::new(file.path(), None));
        assert!(matches!(store.get_all(), Err(Error::Config { .. })));
    }

    #[test]
    fn unknown_template_is_a_config_error() {
        let store = AppTemplateStore::new(Vec::<AppTemplate>::new());
        let err = store.require("pricing-service").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("pricing-service"));
    }
}
