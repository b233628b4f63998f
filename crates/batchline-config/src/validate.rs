//! Validation helpers and parsing utilities for settings documents.

use crate::defaults::{MAX_CONCURRENCY, MIN_CONCURRENCY};
use crate::error::{ConfigError, ConfigResult};
use crate::model::{ConflictPolicy, LoggingSettings, PipelineConfig};

const PIPELINE_SECTION: &str = "pipeline";
const LOGGING_SECTION: &str = "logging";

/// Check the pipeline section against the accepted bounds.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] when `max_concurrency` falls outside 1–64.
pub fn validate_pipeline(config: &PipelineConfig) -> ConfigResult<()> {
    if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&config.max_concurrency) {
        return Err(ConfigError::invalid(
            PIPELINE_SECTION,
            "max_concurrency",
            Some(config.max_concurrency.to_string()),
            "must be between 1 and 64",
        ));
    }
    Ok(())
}

pub(crate) fn validate_logging(logging: &LoggingSettings) -> ConfigResult<()> {
    if logging.level.trim().is_empty() {
        return Err(ConfigError::invalid(
            LOGGING_SECTION,
            "level",
            None,
            "must not be empty",
        ));
    }
    if let Some(format) = logging.format.as_deref() {
        parse_log_format(format)?;
    }
    Ok(())
}

pub(crate) fn parse_max_concurrency(raw: &str) -> ConfigResult<usize> {
    let value = raw.trim().parse::<usize>().map_err(|_| {
        ConfigError::invalid(
            PIPELINE_SECTION,
            "max_concurrency",
            Some(raw.to_string()),
            "must be a positive integer",
        )
    })?;
    validate_pipeline(&PipelineConfig {
        max_concurrency: value,
        ..PipelineConfig::default()
    })?;
    Ok(value)
}

pub(crate) fn parse_conflict_policy(raw: &str) -> ConfigResult<ConflictPolicy> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "ask" => Ok(ConflictPolicy::Ask),
        "skip" => Ok(ConflictPolicy::Skip),
        "overwrite" => Ok(ConflictPolicy::Overwrite),
        "rename" => Ok(ConflictPolicy::Rename),
        "cancel" => Ok(ConflictPolicy::Cancel),
        _ => Err(ConfigError::invalid(
            PIPELINE_SECTION,
            "on_conflict",
            Some(raw.to_string()),
            "must be one of ask, skip, overwrite, rename, cancel",
        )),
    }
}

pub(crate) fn parse_log_format(raw: &str) -> ConfigResult<&'static str> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "json" => Ok("json"),
        "pretty" => Ok("pretty"),
        _ => Err(ConfigError::invalid(
            LOGGING_SECTION,
            "format",
            Some(raw.to_string()),
            "must be json or pretty",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_concurrency: usize) -> PipelineConfig {
        PipelineConfig {
            max_concurrency,
            on_conflict: ConflictPolicy::Ask,
        }
    }

    #[test]
    fn concurrency_bounds_are_inclusive() {
        assert!(validate_pipeline(&config(1)).is_ok());
        assert!(validate_pipeline(&config(64)).is_ok());
    }

    #[test]
    fn concurrency_outside_bounds_is_rejected() {
        for value in [0, 65, 1_000] {
            let err = validate_pipeline(&config(value)).expect_err("out of range");
            match err {
                ConfigError::InvalidField { field, value: got, .. } => {
                    assert_eq!(field, "max_concurrency");
                    assert_eq!(got, Some(value.to_string()));
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }

    #[test]
    fn parse_max_concurrency_rejects_garbage_and_range() {
        assert_eq!(parse_max_concurrency(" 8 ").expect("parse"), 8);
        assert!(parse_max_concurrency("eight").is_err());
        assert!(parse_max_concurrency("-1").is_err());
        assert!(parse_max_concurrency("0").is_err());
        assert!(parse_max_concurrency("65").is_err());
    }

    #[test]
    fn parse_conflict_policy_is_case_insensitive() {
        assert_eq!(
            parse_conflict_policy("Rename").expect("parse"),
            ConflictPolicy::Rename
        );
        assert!(parse_conflict_policy("maybe").is_err());
    }

    #[test]
    fn logging_validation_checks_level_and_format() {
        let mut logging = LoggingSettings::default();
        assert!(validate_logging(&logging).is_ok());
        logging.format = Some("xml".into());
        assert!(validate_logging(&logging).is_err());
        logging.format = Some("JSON".into());
        assert!(validate_logging(&logging).is_ok());
        logging.level = "  ".into();
        assert!(validate_logging(&logging).is_err());
    }
}
