//! Error types for telemetry operations.

use std::error::Error;
use std::fmt::{self, Display, Formatter};

use prometheus::Error as PrometheusError;
use tracing_subscriber::util::TryInitError;

/// Result alias for telemetry operations.
pub type TelemetryResult<T> = std::result::Result<T, TelemetryError>;

/// Errors raised by telemetry helpers.
#[derive(Debug)]
pub enum TelemetryError {
    /// A global tracing subscriber was already installed, or installing one failed.
    SubscriberInstall {
        /// Underlying tracing subscriber error.
        source: TryInitError,
    },
    /// A collector could not be built or added to the registry.
    Collector {
        /// `build` or `register`.
        operation: &'static str,
        /// Metric the collector backs.
        name: &'static str,
        /// Underlying Prometheus error.
        source: PrometheusError,
    },
    /// The registry could not be rendered as exposition text.
    Render {
        /// Encoder or UTF-8 failure.
        source: Box<dyn Error + Send + Sync>,
    },
}

impl Display for TelemetryError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::SubscriberInstall { .. } => {
                formatter.write_str("failed to install tracing subscriber")
            }
            Self::Collector { .. } => formatter.write_str("metrics collector setup failed"),
            Self::Render { .. } => formatter.write_str("failed to render metrics"),
        }
    }
}

impl Error for TelemetryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::SubscriberInstall { source } => Some(source),
            Self::Collector { source, .. } => Some(source),
            Self::Render { source } => Some(source.as_ref()),
        }
    }
}
