//! App bundles: named sets of apps installed together

use serde::{Deserialize, Serialize};

use kollie_common::Result;

use super::item_source::ItemSource;

/// A named set of apps
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppBundle {
    /// Bundle name
    pub name: String,
    /// What the bundle is for
    pub description: String,
    /// App names in install order
    pub apps: Vec<String>,
}

/// Bundles loaded from a source at construction
#[derive(Clone, Debug, Default)]
pub struct AppBundleStore {
    bundles: Vec<AppBundle>,
}

impl AppBundleStore {
    /// Load every bundle from a source
    pub fn load(source: &dyn ItemSource<AppBundle>) -> Result<Self> {
        Ok(Self::from_bundles(source.load()?))
    }

    /// Build a store over already-loaded bundles
    ///
    /// A later bundle with the same name replaces an earlier one.
    pub fn from_bundles(bundles: Vec<AppBundle>) -> Self {
        let mut store = Self::default();
        for bundle in bundles {
            match store.bundles.iter_mut().find(|b| b.name == bundle.name) {
                Some(existing) => *existing = bundle,
                None => store.bundles.push(bundle),
            }
        }
        store
    }

    /// Look a bundle up by name
    pub fn get_bundle(&self, name: &str) -> Option<&AppBundle> {
        self.bundles.iter().find(|bundle| bundle.name == name)
    }

    /// Every bundle in load order
    pub fn get_all_bundles(&self) -> &[AppBundle] {
        &self.bundles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::JsonItemSource;

    #[test]
    fn bundles_are_looked_up_by_name() {
        let source = JsonItemSource::<AppBundle>::from_json(
            r#"[
                {"name": "checkout", "description": "Checkout flow", "apps": ["basket", "payments"]},
                {"name": "pricing", "description": "Pricing", "apps": ["pricing-service"]}
            ]"#,
        );
        let store = AppBundleStore::load(&source).unwrap();

        assert_eq!(store.get_all_bundles().len(), 2);
        assert_eq!(
            store.get_bundle("checkout").unwrap().apps,
            vec!["basket", "payments"]
        );
        assert!(store.get_bundle("unknown").is_none());
    }

    #[test]
    fn later_duplicate_replaces_earlier_in_place() {
        let bundle = |name: &str, description: &str| AppBundle {
            name: name.to_string(),
            description: description.to_string(),
            apps: vec![],
        };
        let store = AppBundleStore::from_bundles(vec![
            bundle("a", "first"),
            bundle("b", "other"),
            bundle("a", "second"),
        ]);

        let names: Vec<_> = store.get_all_bundles().iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(store.get_bundle("a").unwrap().description, "second");
    }
}
