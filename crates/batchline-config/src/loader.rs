//! Settings document loading, environment overrides, and persistence.
//!
//! # Design
//! - Precedence: built-in defaults, then the JSON document, then environment.
//! - Environment access goes through a lookup closure so callers (and tests)
//!   can supply their own source without mutating the process environment.
//! - Validation runs after every layer is applied, before anything consumes it.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::model::Settings;
use crate::validate::{
    parse_conflict_policy, parse_log_format, parse_max_concurrency, validate_logging,
    validate_pipeline,
};

/// Environment variable overriding `pipeline.max_concurrency`.
pub const ENV_MAX_CONCURRENCY: &str = "BATCHLINE_MAX_CONCURRENCY";
/// Environment variable overriding `pipeline.on_conflict`.
pub const ENV_ON_CONFLICT: &str = "BATCHLINE_ON_CONFLICT";
/// Environment variable overriding `logging.level`.
pub const ENV_LOG_LEVEL: &str = "BATCHLINE_LOG_LEVEL";
/// Environment variable overriding `logging.format`.
pub const ENV_LOG_FORMAT: &str = "BATCHLINE_LOG_FORMAT";

/// Builds a validated [`Settings`] from an optional document and the environment.
#[derive(Debug, Clone, Default)]
pub struct SettingsLoader {
    path: Option<PathBuf>,
}

impl SettingsLoader {
    /// Loader that starts from built-in defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self { path: None }
    }

    /// Loader that reads the given settings document; the file must exist.
    #[must_use]
    pub fn with_file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Load settings using the process environment for overrides.
    ///
    /// # Errors
    ///
    /// Returns an error when the document cannot be read or parsed, or when the
    /// resulting settings fail validation.
    pub fn load(&self) -> ConfigResult<Settings> {
        self.load_with(|name| std::env::var(name).ok())
    }

    /// Load settings using `lookup` as the environment source.
    ///
    /// # Errors
    ///
    /// Returns an error when the document cannot be read or parsed, or when the
    /// resulting settings fail validation.
    pub fn load_with<F>(&self, lookup: F) -> ConfigResult<Settings>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = match &self.path {
            Some(path) => read_settings(path)?,
            None => Settings::default(),
        };
        apply_overrides(&mut settings, lookup)?;
        validate_pipeline(&settings.pipeline)?;
        validate_logging(&settings.logging)?;
        info!(
            source = self
                .path
                .as_deref()
                .map_or_else(|| "defaults".to_string(), |p| p.display().to_string()),
            max_concurrency = settings.pipeline.max_concurrency,
            on_conflict = settings.pipeline.on_conflict.as_str(),
            "settings loaded"
        );
        Ok(settings)
    }
}

/// Parse a settings document from disk.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when the file cannot be read and
/// [`ConfigError::Json`] when it is not a valid settings document.
pub fn read_settings(path: &Path) -> ConfigResult<Settings> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        operation: "settings.read",
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
        operation: "settings.parse",
        path: path.to_path_buf(),
        source,
    })
}

/// Persist a settings document as pretty-printed JSON, creating parent directories.
///
/// # Errors
///
/// Returns an error when the settings are invalid or the file cannot be written.
pub fn write_settings(path: &Path, settings: &Settings) -> ConfigResult<()> {
    validate_pipeline(&settings.pipeline)?;
    validate_logging(&settings.logging)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
            operation: "settings.create_dir",
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let rendered = serde_json::to_string_pretty(settings).map_err(|source| ConfigError::Json {
        operation: "settings.render",
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, rendered).map_err(|source| ConfigError::Io {
        operation: "settings.write",
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "settings written");
    Ok(())
}

/// Apply environment overrides to `settings`; blank values are ignored.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] when an override cannot be parsed.
pub fn apply_overrides<F>(settings: &mut Settings, lookup: F) -> ConfigResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

    if let Some(raw) = read(ENV_MAX_CONCURRENCY) {
        settings.pipeline.max_concurrency = parse_max_concurrency(&raw)?;
    }
    if let Some(raw) = read(ENV_ON_CONFLICT) {
        settings.pipeline.on_conflict = parse_conflict_policy(&raw)?;
    }
    if let Some(raw) = read(ENV_LOG_LEVEL) {
        settings.logging.level = raw.trim().to_string();
    }
    if let Some(raw) = read(ENV_LOG_FORMAT) {
        settings.logging.format = Some(parse_log_format(&raw)?.to_string());
    }
    Ok(())
}
