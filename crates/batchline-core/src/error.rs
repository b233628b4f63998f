//! Error types for the work item model and processor collaborators.
//!
//! # Design
//! - Constant messages; context travels in fields so callers can match on it.
//! - `ProcessError::DestinationExists` is the only recoverable processing error;
//!   the scheduler routes it to the conflict resolver.

use std::error::Error;
use std::path::PathBuf;

use thiserror::Error;

use crate::model::{ItemId, ItemState};

/// Result alias for model operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the work item model.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The lifecycle graph has no edge between the two states.
    #[error("invalid work item transition")]
    InvalidTransition {
        /// Item whose transition was rejected.
        item_id: ItemId,
        /// State the item was in.
        from: ItemState,
        /// State that was requested.
        to: ItemState,
    },
    /// A conflict action label could not be parsed.
    #[error("unknown conflict action")]
    UnknownConflictAction {
        /// Label provided by the caller.
        value: String,
    },
}

/// Outcome of a failed processor invocation.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The destination is already occupied and overwriting was not requested.
    #[error("destination already exists")]
    DestinationExists {
        /// Occupied destination path.
        path: PathBuf,
    },
    /// Processing failed for any other reason.
    #[error("processing failed")]
    Failed {
        /// Processor stage that failed.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The processor observed the batch cancellation token and stopped early.
    #[error("processing cancelled")]
    Cancelled,
}

impl ProcessError {
    /// Build a [`ProcessError::Failed`] from any error-like source.
    pub fn failed(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: impl Into<Box<dyn Error + Send + Sync>>,
    ) -> Self {
        Self::Failed {
            operation,
            path: path.into(),
            source: source.into(),
        }
    }
}

/// Flatten an error and its source chain into one line (`outer: inner: root`).
#[must_use]
pub fn describe_error(error: &(dyn Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut current = error.source();
    while let Some(source) = current {
        message.push_str(": ");
        message.push_str(&source.to_string());
        current = source.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn failed_helper_preserves_source() {
        let err = ProcessError::failed("encode", "out/a.flac", io::Error::other("disk full"));
        assert!(matches!(err, ProcessError::Failed { operation: "encode", .. }));
        assert!(err.source().is_some());
    }

    #[test]
    fn describe_error_walks_the_chain() {
        let err = ProcessError::failed("encode", "out/a.flac", io::Error::other("disk full"));
        assert_eq!(describe_error(&err), "processing failed: disk full");
    }

    #[test]
    fn describe_error_without_source_is_message() {
        let err = ProcessError::DestinationExists {
            path: PathBuf::from("out/a.flac"),
        };
        assert_eq!(describe_error(&err), "destination already exists");
    }
}
