//! Environment and app lifecycle for Kollie
//!
//! The [`Orchestrator`] turns requests such as "create an environment" or
//! "move this app to another image tag prefix" into writes through the
//! cluster gateway, and projects what it reads back into [`KollieApp`] and
//! [`KollieEnvironment`] views.

#![deny(missing_docs)]

pub mod config;
pub mod models;
pub mod orchestrator;
pub mod persistence;

pub use config::Settings;
pub use models::{AppEvent, EnvironmentMetadata, KollieApp, KollieEnvironment};
pub use orchestrator::Orchestrator;
pub use persistence::{AppBundle, AppBundleStore, AppTemplateStore};
