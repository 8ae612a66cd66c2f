//! Read-only stores for app templates and bundles
//!
//! Both are loaded from static JSON files. The sources are traits so the
//! orchestrator can be built over any backend, and over plain vectors in
//! tests.

pub mod bundles;
pub mod item_source;
pub mod templates;

pub use bundles::{AppBundle, AppBundleStore};
pub use item_source::{ItemSource, JsonItemSource};
pub use templates::{AppTemplateSource, AppTemplateStore, JsonFileAppTemplateSource};
