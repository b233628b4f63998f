#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! File-backed settings for the Batchline pipeline.
//!
//! Layout: `model.rs` (typed settings documents), `validate.rs`
//! (range checks and parsing helpers), `loader.rs` (JSON document loading,
//! environment overrides, persistence), `defaults.rs` (bounds and defaults).

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use defaults::{DEFAULT_MAX_CONCURRENCY, MAX_CONCURRENCY, MIN_CONCURRENCY};
pub use error::{ConfigError, ConfigResult};
pub use loader::{
    ENV_LOG_FORMAT, ENV_LOG_LEVEL, ENV_MAX_CONCURRENCY, ENV_ON_CONFLICT, SettingsLoader,
    apply_overrides, read_settings, write_settings,
};
pub use model::{ConflictPolicy, LoggingSettings, PipelineConfig, Settings};
pub use validate::validate_pipeline;
