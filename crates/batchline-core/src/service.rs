//! Collaborator traits implemented by processors and conflict prompts.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ProcessError;
use crate::model::{ConflictDecision, ItemId, ItemProgress};

/// Flags forwarded to the processor for a single invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessOptions {
    /// Replace an existing destination instead of reporting a conflict.
    pub overwrite: bool,
}

/// Inputs for one processor invocation.
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    /// Item being processed.
    pub item_id: ItemId,
    /// Input location.
    pub source: PathBuf,
    /// Output location.
    pub destination: PathBuf,
    /// Invocation flags.
    pub options: ProcessOptions,
    /// Batch cancellation token; processors that can stop early should watch it.
    pub cancel: CancellationToken,
}

/// Receives progress updates emitted by a processor.
pub trait ProgressSink: Send + Sync {
    /// Record progress for `item_id`.
    fn report(&self, item_id: ItemId, progress: ItemProgress);
}

/// Sink that drops every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardProgress;

impl ProgressSink for DiscardProgress {
    fn report(&self, _item_id: ItemId, _progress: ItemProgress) {}
}

/// External processing engine (encoder, muxer, downloader, copier).
#[async_trait]
pub trait FileProcessor: Send + Sync {
    /// Produce `request.destination` from `request.source`.
    ///
    /// Implementations must return [`ProcessError::DestinationExists`] when the
    /// destination is occupied and `request.options.overwrite` is not set.
    async fn process(
        &self,
        request: &ProcessRequest,
        progress: &dyn ProgressSink,
    ) -> Result<(), ProcessError>;

    /// Short label used in logs.
    fn name(&self) -> &'static str {
        "processor"
    }
}

/// Human-facing source of conflict decisions.
#[async_trait]
pub trait DecisionProvider: Send + Sync {
    /// Ask what to do about the occupied `destination`.
    ///
    /// Returns `None` when the prompt was dismissed without an explicit choice.
    async fn ask_file_action(&self, destination: &Path) -> Option<ConflictDecision>;
}
