//! # Design
//!
//! - Constant-message errors for queue, scheduler, and processor plumbing.
//! - Context travels in fields (`operation`, `field`, `reason`, `value`) so
//!   tests can match on it without parsing strings.
//! - Per-item failures never surface here; they end up on the item itself.

use std::io;
use std::path::PathBuf;

use batchline_config::ConfigError;
use batchline_core::{CoreError, ItemId};
use thiserror::Error;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors produced by the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The queue or scheduler was asked to do something its current state forbids.
    #[error("pipeline invalid state")]
    InvalidState {
        /// Operation that was rejected.
        operation: &'static str,
        /// Static reason for the rejection.
        reason: &'static str,
    },
    /// An item with the same identifier is already queued.
    #[error("duplicate work item")]
    DuplicateItem {
        /// Identifier that collided.
        item_id: ItemId,
    },
    /// The run configuration failed validation.
    #[error("invalid pipeline configuration")]
    Configuration {
        /// Underlying validation error.
        #[source]
        source: ConfigError,
    },
    /// A work item refused a lifecycle transition.
    #[error("work item transition rejected")]
    Transition {
        /// Underlying model error.
        #[source]
        source: CoreError,
    },
    /// Caller-supplied input could not be turned into work.
    #[error("pipeline invalid input")]
    InvalidInput {
        /// Field that failed validation.
        field: &'static str,
        /// Static reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
    /// Filesystem access needed by the pipeline itself failed.
    #[error("pipeline io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// A worker task panicked or was aborted.
    #[error("pipeline worker failed")]
    Worker {
        /// Underlying join error.
        #[source]
        source: tokio::task::JoinError,
    },
}

impl From<CoreError> for PipelineError {
    fn from(source: CoreError) -> Self {
        Self::Transition { source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchline_core::ItemState;
    use std::error::Error as _;

    #[test]
    fn messages_are_constant_and_sources_preserved() {
        let err = PipelineError::InvalidState {
            operation: "queue.enqueue",
            reason: "queue is finalized",
        };
        assert_eq!(err.to_string(), "pipeline invalid state");
        assert!(err.source().is_none());

        let err = PipelineError::from(CoreError::InvalidTransition {
            item_id: ItemId::nil(),
            from: ItemState::Succeeded,
            to: ItemState::Running,
        });
        assert_eq!(err.to_string(), "work item transition rejected");
        assert!(err.source().is_some());

        let err = PipelineError::Io {
            operation: "plan.output_dir",
            path: PathBuf::from("/nope"),
            source: io::Error::other("denied"),
        };
        assert_eq!(err.to_string(), "pipeline io failure");
        assert!(err.source().is_some());
    }
}
