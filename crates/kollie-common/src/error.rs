//! Error types for Kollie
//!
//! Errors are structured with fields to aid debugging in production.
//! Variants that concern a single environment or app carry those names
//! so callers and logs can identify what failed without parsing messages.

use thiserror::Error;

/// Main error type for Kollie operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Referenced template, bundle or setting does not exist or is unusable
    #[error("configuration error: {message}")]
    Config {
        /// Description of what is misconfigured
        message: String,
    },

    /// An environment or app the operation relies on does not exist
    #[error("{kind} not found: {name}")]
    NotFound {
        /// What was looked up ("environment", "app")
        kind: &'static str,
        /// Name of the missing object (`env` or `env/app`)
        name: String,
    },

    /// A write against the cluster failed
    #[error("failed to {action} {resource} for {target}: {source}")]
    Resource {
        /// Operation that failed (create, patch, delete)
        action: &'static str,
        /// Resource kind (Kustomization, ImagePolicy, ...)
        resource: &'static str,
        /// Environment (and app, if app-scoped) the resource belongs to
        target: String,
        /// The underlying failure
        #[source]
        source: Box<Error>,
    },

    /// Input rejected before any work was done
    #[error("validation error: {message}")]
    Validation {
        /// Description of what's invalid
        message: String,
        /// The invalid field (e.g., "hour")
        field: Option<String>,
    },

    /// A stored value could not be parsed
    #[error("parse error: {message}")]
    Parse {
        /// Description of what failed
        message: String,
        /// The offending input
        input: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "watcher", "cli")
        context: String,
    },
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a not-found error for an environment
    pub fn env_not_found(env_name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "environment",
            name: env_name.into(),
        }
    }

    /// Create a not-found error for an app within an environment
    pub fn app_not_found(env_name: &str, app_name: &str) -> Self {
        Self::NotFound {
            kind: "app",
            name: format!("{}/{}", env_name, app_name),
        }
    }

    /// Wrap a failed cluster write with the resource and owner it concerned
    pub fn resource(
        action: &'static str,
        resource: &'static str,
        env_name: &str,
        app_name: Option<&str>,
        source: Error,
    ) -> Self {
        let target = match app_name {
            Some(app) => format!("{} in {}", app, env_name),
            None => env_name.to_string(),
        };
        Self::Resource {
            action,
            resource,
            target,
            source: Box::new(source),
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error for a specific field
    pub fn validation_for_field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a parse error for the given input
    pub fn parse(input: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
            input: input.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Whether this error means the environment or app does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Kube {
                source: kube::Error::Api(ae),
            } => ae.code == 404,
            Error::Resource { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::serialization(e.to_string())
    }
}
