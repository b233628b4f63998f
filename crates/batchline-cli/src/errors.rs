//! CLI error type with exit-code mapping.

use std::fmt::{self, Display, Formatter};

use anyhow::anyhow;
use batchline_config::ConfigError;
use batchline_core::describe_error;
use batchline_pipeline::PipelineError;

/// CLI-level error type to distinguish validation from operational failures.
#[derive(Debug)]
pub(crate) enum CliError {
    /// The batch ran but did not finish cleanly.
    Incomplete(String),
    /// User input or configuration was rejected.
    Validation(String),
    /// Something went wrong while doing the work.
    Failure(anyhow::Error),
}

/// Convenience alias for functions returning a `CliError`.
pub(crate) type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn incomplete(message: impl Into<String>) -> Self {
        Self::Incomplete(message.into())
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    pub(crate) const fn exit_code(&self) -> i32 {
        match self {
            Self::Incomplete(_) => 1,
            Self::Validation(_) => 2,
            Self::Failure(_) => 3,
        }
    }

    pub(crate) fn display_message(&self) -> String {
        match self {
            Self::Incomplete(message) | Self::Validation(message) => message.clone(),
            Self::Failure(error) => format!("{error:#}"),
        }
    }
}

impl Display for CliError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str("cli error")
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::InvalidField {
                section,
                field,
                value,
                reason,
            } => Self::validation(match value {
                Some(value) => format!("{section}.{field} {reason} (got {value:?})"),
                None => format!("{section}.{field} {reason}"),
            }),
            other => Self::failure(anyhow!(describe_error(&other))),
        }
    }
}

impl From<PipelineError> for CliError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Configuration { source } => source.into(),
            PipelineError::InvalidInput {
                field,
                reason,
                value,
            } => Self::validation(match value {
                Some(value) => format!("{field}: {reason} (got {value:?})"),
                None => format!("{field}: {reason}"),
            }),
            other => Self::failure(anyhow!(describe_error(&other))),
        }
    }
}
