//! Typed settings documents.
//!
//! # Design
//! - Pure data carriers; loading and validation live in sibling modules.
//! - Every section defaults independently so a partial document is valid.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use batchline_core::ConflictAction;
use serde::{Deserialize, Serialize};

use crate::defaults::{DEFAULT_LOG_LEVEL, DEFAULT_MAX_CONCURRENCY};
use crate::error::{ConfigError, ConfigResult};
use crate::validate;

/// Default handling for destination collisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Ask the human-decision provider for every conflict.
    #[default]
    Ask,
    /// Skip colliding items.
    Skip,
    /// Overwrite colliding destinations.
    Overwrite,
    /// Rename colliding destinations.
    Rename,
    /// Cancel the batch on the first collision.
    Cancel,
}

impl ConflictPolicy {
    /// Render the policy as its lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ask => "ask",
            Self::Skip => "skip",
            Self::Overwrite => "overwrite",
            Self::Rename => "rename",
            Self::Cancel => "cancel",
        }
    }

    /// Action applied without prompting, or `None` when the policy is `Ask`.
    #[must_use]
    pub const fn fixed_action(self) -> Option<ConflictAction> {
        match self {
            Self::Ask => None,
            Self::Skip => Some(ConflictAction::Skip),
            Self::Overwrite => Some(ConflictAction::Overwrite),
            Self::Rename => Some(ConflictAction::Rename),
            Self::Cancel => Some(ConflictAction::Cancel),
        }
    }
}

impl Display for ConflictPolicy {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for ConflictPolicy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        validate::parse_conflict_policy(value)
    }
}

/// Pipeline tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Number of worker slots; accepted range is 1–64.
    pub max_concurrency: usize,
    /// Default conflict handling.
    pub on_conflict: ConflictPolicy,
}

impl PipelineConfig {
    /// Check the configuration against the accepted bounds.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] when `max_concurrency` is out of range.
    pub fn validate(&self) -> ConfigResult<()> {
        validate::validate_pipeline(self)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            on_conflict: ConflictPolicy::Ask,
        }
    }
}

/// Logging preferences recorded in the settings document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    /// Log level directive (`info`, `debug`, `batchline_pipeline=trace`, ...).
    pub level: String,
    /// Output format (`json` or `pretty`); inferred from the build when absent.
    pub format: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            format: None,
        }
    }
}

/// Complete settings document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Pipeline section.
    pub pipeline: PipelineConfig,
    /// Logging section.
    pub logging: LoggingSettings,
}
