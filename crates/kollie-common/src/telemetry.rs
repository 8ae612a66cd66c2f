//! Tracing initialization
//!
//! Deployed stages log JSON so the log pipeline can index fields; the
//! `local` stage logs human-readable lines.

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Stage name that selects human-readable logs
pub const LOCAL_STAGE: &str = "local";

/// Stage name used by test runs; must never reach a live cluster
pub const TEST_STAGE: &str = "test";

const DEFAULT_FILTER: &str = "info,kollie=debug,kube=info,tower=warn,hyper=warn";

/// Errors that can occur during telemetry initialization
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to initialize tracing subscriber
    #[error("failed to initialize tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// Log output format
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines
    Pretty,
    /// One JSON object per line
    Json,
}

impl LogFormat {
    /// Pick the format for an application stage
    pub fn for_stage(stage: &str) -> Self {
        if stage == LOCAL_STAGE {
            LogFormat::Pretty
        } else {
            LogFormat::Json
        }
    }
}

/// Install the global tracing subscriber
///
/// Logs go to stderr so command output on stdout stays machine-readable.
/// `RUST_LOG` overrides the default filter.
pub fn init_tracing(format: LogFormat) -> Result<(), TelemetryError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };

    result.map_err(|e| TelemetryError::SubscriberInit(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_stage_logs_pretty() {
        assert_eq!(LogFormat::for_stage("local"), LogFormat::Pretty);
    }

    #[test]
    fn other_stages_log_json() {
        assert_eq!(LogFormat::for_stage("production"), LogFormat::Json);
        assert_eq!(LogFormat::for_stage("staging"), LogFormat::Json);
        assert_eq!(LogFormat::for_stage(""), LogFormat::Json);
    }
}
