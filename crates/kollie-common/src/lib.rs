//! Common types for Kollie: label conventions, errors, and time utilities

#![deny(missing_docs)]

pub mod error;
pub mod kube_utils;
pub mod lease;
pub mod telemetry;
pub mod timestamp;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Namespace Kollie creates its resources in unless configured otherwise
pub const DEFAULT_NAMESPACE: &str = "kollie";

/// Namespace holding the cluster-wide Flux sources
pub const FLUX_SYSTEM_NAMESPACE: &str = "flux-system";

// =============================================================================
// Labels
// =============================================================================

/// Label carried by every resource belonging to an ephemeral environment
pub const LABEL_STAGE: &str = "tails-app-stage";

/// Value of [`LABEL_STAGE`] for Kollie-managed resources
pub const STAGE_TESTING: &str = "testing";

/// Label holding the environment name
pub const LABEL_ENVIRONMENT: &str = "tails-app-environment";

/// Label holding the app name on app-scoped resources
pub const LABEL_APP_NAME: &str = "tails-app-name";

/// Label marking environment configuration records
pub const LABEL_MANAGED_BY: &str = "kollie.tails.com/managed-by";

/// Value of [`LABEL_MANAGED_BY`]
pub const MANAGED_BY_KOLLIE: &str = "kollie";

/// Environment label used by the ingresses the deployed apps create
pub const INGRESS_LABEL_ENVIRONMENT: &str = "tails-environment";

// =============================================================================
// Annotations
// =============================================================================

/// Owner email. Emails are not valid label values, so this is an annotation.
pub const ANNOTATION_OWNER: &str = "tails.com/owner";

/// Creation timestamp of an environment configuration record
pub const ANNOTATION_CREATED_AT: &str = "kollie.tails.com/created-at";

/// Image tag prefix an app's ImagePolicy tracks
pub const ANNOTATION_IMAGE_TAG_PREFIX: &str = "tails.com/tracking-image-tag-prefix";

/// Legacy name of [`ANNOTATION_IMAGE_TAG_PREFIX`], also the branch a
/// GitRepository tracks
pub const ANNOTATION_TRACKING_BRANCH: &str = "tails.com/tracking-branch";

// =============================================================================
// Kustomization postBuild substitutions
// =============================================================================

/// Substitution holding the environment name
pub const SUBSTITUTE_ENVIRONMENT: &str = "environment";

/// Substitution holding the downscaler uptime window
pub const SUBSTITUTE_DOWNSCALER_UPTIME: &str = "downscaler_uptime";

/// Substitution holding the deployed image tag
pub const SUBSTITUTE_IMAGE_TAG: &str = "image_tag";

/// Uptime window applied to environments excluded from lease expiry
pub const LEASE_EXCLUSION_WINDOW: &str = "Mon-Fri 07:00-19:00 Europe/London";
