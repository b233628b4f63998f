//! Event payload types published by the pipeline.

use batchline_core::{BatchCounts, ConflictAction, ItemId, ItemProgress, ItemState};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Identifier assigned to each event published on the bus.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
pub const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Typed pipeline events.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// An item was admitted to the queue.
    ItemQueued {
        /// Identifier of the queued item.
        item_id: ItemId,
        /// Input location.
        source: String,
        /// Planned output location.
        destination: String,
    },
    /// A batch run started dispatching items.
    BatchStarted {
        /// Identifier of the run.
        batch_id: Uuid,
        /// Items pending when the run started.
        total: usize,
        /// Number of worker slots.
        max_concurrency: usize,
    },
    /// An item moved to a new lifecycle state.
    ItemStateChanged {
        /// Identifier of the item.
        item_id: ItemId,
        /// State the item entered.
        state: ItemState,
    },
    /// The processor reported progress for an item.
    ItemProgress {
        /// Identifier of the item.
        item_id: ItemId,
        /// Reported progress.
        progress: ItemProgress,
    },
    /// An item's destination was occupied.
    ConflictRaised {
        /// Identifier of the item.
        item_id: ItemId,
        /// Occupied destination.
        destination: String,
    },
    /// The conflict resolver produced an action for an item.
    ConflictResolved {
        /// Identifier of the item.
        item_id: ItemId,
        /// Action applied.
        action: ConflictAction,
    },
    /// An item was pointed at a new, non-colliding destination.
    ItemRenamed {
        /// Identifier of the item.
        item_id: ItemId,
        /// Newly assigned destination.
        destination: String,
    },
    /// An item failed; siblings keep running.
    ItemFailed {
        /// Identifier of the item.
        item_id: ItemId,
        /// Error detail.
        message: String,
    },
    /// The batch stopped accepting new work.
    BatchCancelled {
        /// Identifier of the run.
        batch_id: Uuid,
    },
    /// The batch finished draining.
    BatchCompleted {
        /// Identifier of the run.
        batch_id: Uuid,
        /// Terminal state tallies.
        counts: BatchCounts,
    },
}

impl Event {
    /// Machine-friendly discriminator for subscribers and metrics labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ItemQueued { .. } => "item_queued",
            Self::BatchStarted { .. } => "batch_started",
            Self::ItemStateChanged { .. } => "item_state_changed",
            Self::ItemProgress { .. } => "item_progress",
            Self::ConflictRaised { .. } => "conflict_raised",
            Self::ConflictResolved { .. } => "conflict_resolved",
            Self::ItemRenamed { .. } => "item_renamed",
            Self::ItemFailed { .. } => "item_failed",
            Self::BatchCancelled { .. } => "batch_cancelled",
            Self::BatchCompleted { .. } => "batch_completed",
        }
    }

    /// Item the event refers to, when it is item-scoped.
    #[must_use]
    pub const fn item_id(&self) -> Option<ItemId> {
        match self {
            Self::ItemQueued { item_id, .. }
            | Self::ItemStateChanged { item_id, .. }
            | Self::ItemProgress { item_id, .. }
            | Self::ConflictRaised { item_id, .. }
            | Self::ConflictResolved { item_id, .. }
            | Self::ItemRenamed { item_id, .. }
            | Self::ItemFailed { item_id, .. } => Some(*item_id),
            Self::BatchStarted { .. }
            | Self::BatchCancelled { .. }
            | Self::BatchCompleted { .. } => None,
        }
    }
}

/// Metadata wrapper around events. Each envelope tracks the event id and emission timestamp.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct EventEnvelope {
    /// Monotonic identifier assigned to the wrapped event.
    pub id: EventId,
    /// Timestamp recording when the envelope was produced.
    pub timestamp: DateTime<Utc>,
    /// Wrapped event payload.
    pub event: Event,
}
