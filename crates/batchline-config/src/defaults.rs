//! Default values and accepted bounds for pipeline settings.

/// Smallest accepted worker pool size.
pub const MIN_CONCURRENCY: usize = 1;
/// Largest accepted worker pool size.
pub const MAX_CONCURRENCY: usize = 64;
/// Worker pool size used when no settings document provides one.
pub const DEFAULT_MAX_CONCURRENCY: usize = 2;
/// Log level used when neither the settings document nor `RUST_LOG` sets one.
pub const DEFAULT_LOG_LEVEL: &str = "info";
