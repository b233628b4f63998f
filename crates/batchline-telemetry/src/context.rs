//! Span helpers for application and batch context.
//!
//! # Design
//! - An application-level span carries mode and build info for the process lifetime.
//! - Each batch run gets its own span so worker logs can be correlated.

use tracing::{Span, span::Entered};
use uuid::Uuid;

use crate::init::build_sha;

/// Guard that keeps the application-level span entered for the lifetime of the process.
pub struct GlobalContextGuard {
    _guard: Entered<'static>,
}

impl GlobalContextGuard {
    /// Enter the application-level tracing span for the lifetime of the guard.
    #[must_use]
    pub fn new(mode: impl Into<String>) -> Self {
        let mode = mode.into();
        let span: &'static Span = Box::leak(Box::new(
            tracing::info_span!("app", mode = %mode, build_sha = %build_sha()),
        ));
        let guard = span.enter();
        Self { _guard: guard }
    }
}

/// Span wrapping one batch run; attach it to worker futures with `Instrument`.
#[must_use]
pub fn batch_span(batch_id: Uuid, max_concurrency: usize) -> Span {
    tracing::info_span!("batch", %batch_id, max_concurrency)
}
