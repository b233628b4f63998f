//! Work item model, lifecycle states, and conflict vocabulary.
//!
//! # Design
//! - Every state change goes through `WorkItem::transition`, which enforces the
//!   lifecycle graph and refuses to leave a terminal state.
//! - Items are plain owned data; the queue hands ownership to a worker on
//!   dispatch and takes it back when the worker reports a terminal state.

use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

/// Identifier assigned to every work item.
pub type ItemId = Uuid;

/// Lifecycle states of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    /// Submitted and waiting for a free slot.
    Pending,
    /// Held by a worker and being processed.
    Running,
    /// Destination collided; waiting on the conflict resolver.
    AwaitingConflictResolution,
    /// Processed at its planned destination.
    Succeeded,
    /// Left untouched because of a conflict decision.
    Skipped,
    /// Processed at a destination reassigned by the conflict resolver.
    Renamed,
    /// Processing failed; the item carries the error message.
    Failed,
    /// Batch was cancelled before the item reached another terminal state.
    Cancelled,
}

impl ItemState {
    /// Every state in lifecycle order.
    pub const ALL: [Self; 8] = [
        Self::Pending,
        Self::Running,
        Self::AwaitingConflictResolution,
        Self::Succeeded,
        Self::Skipped,
        Self::Renamed,
        Self::Failed,
        Self::Cancelled,
    ];

    /// Render the state as its `snake_case` label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::AwaitingConflictResolution => "awaiting_conflict_resolution",
            Self::Succeeded => "succeeded",
            Self::Skipped => "skipped",
            Self::Renamed => "renamed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether no further transition is permitted from this state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Skipped | Self::Renamed | Self::Failed | Self::Cancelled
        )
    }

    /// Whether the lifecycle graph has an edge from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Running | Self::Cancelled),
            Self::Running => matches!(
                next,
                Self::Succeeded
                    | Self::Renamed
                    | Self::Failed
                    | Self::AwaitingConflictResolution
                    | Self::Cancelled
            ),
            Self::AwaitingConflictResolution => {
                matches!(next, Self::Running | Self::Skipped | Self::Cancelled)
            }
            Self::Succeeded | Self::Skipped | Self::Renamed | Self::Failed | Self::Cancelled => {
                false
            }
        }
    }
}

impl Display for ItemState {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Progress reported by a processor: a completion fraction, a status line, or both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemProgress {
    /// Completion in the range `0.0..=1.0` when the processor can measure it.
    pub fraction: Option<f64>,
    /// Free-form status text (for example the current encoder stage).
    pub status: Option<String>,
}

impl ItemProgress {
    /// Progress expressed as a fraction, clamped to `0.0..=1.0`.
    #[must_use]
    pub fn fraction(value: f64) -> Self {
        Self {
            fraction: Some(value.clamp(0.0, 1.0)),
            status: None,
        }
    }

    /// Progress expressed as a status line.
    #[must_use]
    pub fn status(text: impl Into<String>) -> Self {
        Self {
            fraction: None,
            status: Some(text.into()),
        }
    }

    /// Completion percentage when a fraction is known.
    #[must_use]
    pub fn percent(&self) -> Option<f64> {
        self.fraction.map(|fraction| fraction * 100.0)
    }
}

/// Resolution applied to a destination collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictAction {
    /// Leave the existing file and do not process the item.
    Skip,
    /// Replace the existing file.
    Overwrite,
    /// Process the item into a fresh, non-colliding destination.
    Rename,
    /// Abort the whole batch.
    Cancel,
}

impl ConflictAction {
    /// Render the action as its lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Overwrite => "overwrite",
            Self::Rename => "rename",
            Self::Cancel => "cancel",
        }
    }
}

impl Display for ConflictAction {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for ConflictAction {
    type Err = CoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "overwrite" => Ok(Self::Overwrite),
            "rename" => Ok(Self::Rename),
            "cancel" => Ok(Self::Cancel),
            _ => Err(CoreError::UnknownConflictAction {
                value: value.to_string(),
            }),
        }
    }
}

/// Answer returned by the human-decision provider for one conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictDecision {
    /// Action chosen for the conflicting item.
    pub action: ConflictAction,
    /// Reuse the action for every later conflict in the batch without asking.
    pub apply_to_all: bool,
}

impl ConflictDecision {
    /// Decision that applies to the current conflict only.
    #[must_use]
    pub const fn once(action: ConflictAction) -> Self {
        Self {
            action,
            apply_to_all: false,
        }
    }

    /// Decision cached for the remainder of the batch.
    #[must_use]
    pub const fn for_all(action: ConflictAction) -> Self {
        Self {
            action,
            apply_to_all: true,
        }
    }
}

/// One file's unit of work through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    /// Unique identifier of the item.
    pub id: ItemId,
    /// Input location.
    pub source_path: PathBuf,
    /// Output location; reassigned when a conflict is resolved by renaming.
    pub destination_path: PathBuf,
    /// Latest progress reported by the processor.
    pub progress: ItemProgress,
    /// Error message recorded when the item fails.
    pub error: Option<String>,
    /// Number of processor invocations made for this item.
    pub attempts: u32,
    state: ItemState,
    renamed: bool,
}

impl WorkItem {
    /// Construct a pending item with a fresh identifier.
    #[must_use]
    pub fn new(source_path: impl Into<PathBuf>, destination_path: impl Into<PathBuf>) -> Self {
        Self::with_id(Uuid::new_v4(), source_path, destination_path)
    }

    /// Construct a pending item with an explicit identifier.
    #[must_use]
    pub fn with_id(
        id: ItemId,
        source_path: impl Into<PathBuf>,
        destination_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id,
            source_path: source_path.into(),
            destination_path: destination_path.into(),
            progress: ItemProgress::default(),
            error: None,
            attempts: 0,
            state: ItemState::Pending,
            renamed: false,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ItemState {
        self.state
    }

    /// Whether the conflict resolver reassigned the destination.
    #[must_use]
    pub const fn was_renamed(&self) -> bool {
        self.renamed
    }

    /// Move the item to `next`, enforcing the lifecycle graph.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidTransition`] when the lifecycle has no such edge.
    pub fn transition(&mut self, next: ItemState) -> CoreResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                item_id: self.id,
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Point the item at a new destination chosen by the conflict resolver.
    pub fn reassign_destination(&mut self, destination: impl AsRef<Path>) {
        self.destination_path = destination.as_ref().to_path_buf();
        self.renamed = true;
    }
}

/// Per-terminal-state tallies for a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCounts {
    /// Items processed at their planned destination.
    pub succeeded: usize,
    /// Items processed at a renamed destination.
    pub renamed: usize,
    /// Items skipped because of a conflict decision.
    pub skipped: usize,
    /// Items that failed.
    pub failed: usize,
    /// Items cancelled with the batch.
    pub cancelled: usize,
}

impl BatchCounts {
    /// Add one item in `state` to the tally; non-terminal states are ignored.
    pub fn record(&mut self, state: ItemState) {
        match state {
            ItemState::Succeeded => self.succeeded += 1,
            ItemState::Renamed => self.renamed += 1,
            ItemState::Skipped => self.skipped += 1,
            ItemState::Failed => self.failed += 1,
            ItemState::Cancelled => self.cancelled += 1,
            ItemState::Pending | ItemState::Running | ItemState::AwaitingConflictResolution => {}
        }
    }

    /// Total number of items that reached a terminal state.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.succeeded + self.renamed + self.skipped + self.failed + self.cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_happy_path_reaches_succeeded() {
        let mut item = WorkItem::new("in/a.wav", "out/a.flac");
        assert_eq!(item.state(), ItemState::Pending);
        item.transition(ItemState::Running).expect("dispatch");
        item.transition(ItemState::Succeeded).expect("finish");
        assert!(item.state().is_terminal());
    }

    #[test]
    fn conflict_round_trip_returns_to_running() {
        let mut item = WorkItem::new("in/a.wav", "out/a.flac");
        item.transition(ItemState::Running).expect("dispatch");
        item.transition(ItemState::AwaitingConflictResolution)
            .expect("conflict");
        item.transition(ItemState::Running).expect("retry");
        item.transition(ItemState::Renamed).expect("finish");
    }

    #[test]
    fn terminal_states_refuse_every_transition() {
        for terminal in ItemState::ALL.into_iter().filter(|s| s.is_terminal()) {
            for next in ItemState::ALL {
                assert!(
                    !terminal.can_transition_to(next),
                    "{terminal} -> {next} must be rejected"
                );
            }
        }
    }

    #[test]
    fn nothing_reenters_pending() {
        for state in ItemState::ALL {
            assert!(!state.can_transition_to(ItemState::Pending));
        }
    }

    #[test]
    fn invalid_transition_reports_both_states() {
        let mut item = WorkItem::new("in/a.wav", "out/a.flac");
        let err = item
            .transition(ItemState::Succeeded)
            .expect_err("pending cannot finish directly");
        match err {
            CoreError::InvalidTransition { from, to, .. } => {
                assert_eq!(from, ItemState::Pending);
                assert_eq!(to, ItemState::Succeeded);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(item.state(), ItemState::Pending);
    }

    #[test]
    fn reassign_destination_marks_item_renamed() {
        let mut item = WorkItem::new("in/a.wav", "out/a.flac");
        item.reassign_destination("out/a (1).flac");
        assert!(item.was_renamed());
        assert_eq!(item.destination_path, PathBuf::from("out/a (1).flac"));
    }

    #[test]
    fn conflict_action_parses_labels() {
        assert_eq!(
            "Overwrite".parse::<ConflictAction>().expect("parse"),
            ConflictAction::Overwrite
        );
        assert_eq!(ConflictAction::Rename.to_string(), "rename");
        assert!("ask".parse::<ConflictAction>().is_err());
    }

    #[test]
    fn progress_fraction_is_clamped() {
        assert_eq!(ItemProgress::fraction(1.5).fraction, Some(1.0));
        assert_eq!(ItemProgress::fraction(-0.5).percent(), Some(0.0));
        assert_eq!(ItemProgress::status("muxing").fraction, None);
    }

    #[test]
    fn batch_counts_ignore_non_terminal_states() {
        let mut counts = BatchCounts::default();
        for state in ItemState::ALL {
            counts.record(state);
        }
        assert_eq!(counts.total(), 5);
        assert_eq!(counts.renamed, 1);
    }

    #[test]
    fn item_state_serializes_snake_case() {
        let json = serde_json::to_string(&ItemState::AwaitingConflictResolution).expect("json");
        assert_eq!(json, "\"awaiting_conflict_resolution\"");
    }
}
