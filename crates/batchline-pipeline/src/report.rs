//! Batch summary returned by a completed or cancelled run.

use std::path::PathBuf;

use batchline_core::{BatchCounts, ItemId, ItemState, WorkItem};
use serde::Serialize;
use uuid::Uuid;

/// Final view of one item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemReport {
    /// Item identifier.
    pub id: ItemId,
    /// Input location.
    pub source: PathBuf,
    /// Destination the item ended with (reassigned when renamed).
    pub destination: PathBuf,
    /// Final state; `Pending` only when the run never dispatched it.
    pub state: ItemState,
    /// Error detail for failed items.
    pub error: Option<String>,
    /// Processor invocations made for the item.
    pub attempts: u32,
}

impl From<&WorkItem> for ItemReport {
    fn from(item: &WorkItem) -> Self {
        Self {
            id: item.id,
            source: item.source_path.clone(),
            destination: item.destination_path.clone(),
            state: item.state(),
            error: item.error.clone(),
            attempts: item.attempts,
        }
    }
}

/// Per-item outcomes plus terminal tallies for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    /// Identifier of the run.
    pub batch_id: Uuid,
    /// Items in submission order.
    pub items: Vec<ItemReport>,
    /// Terminal state tallies.
    pub counts: BatchCounts,
    /// Whether the run was cancelled.
    pub cancelled: bool,
}

impl BatchReport {
    /// Build a report from items already in submission order.
    pub fn from_items<'a>(
        batch_id: Uuid,
        items: impl IntoIterator<Item = &'a WorkItem>,
        cancelled: bool,
    ) -> Self {
        let items: Vec<ItemReport> = items.into_iter().map(ItemReport::from).collect();
        let mut counts = BatchCounts::default();
        for item in &items {
            counts.record(item.state);
        }
        Self {
            batch_id,
            items,
            counts,
            cancelled,
        }
    }

    /// Final state of `item_id`, if the report covers it.
    #[must_use]
    pub fn state_of(&self, item_id: ItemId) -> Option<ItemState> {
        self.items
            .iter()
            .find(|item| item.id == item_id)
            .map(|item| item.state)
    }

    /// Failed items paired with their error messages.
    #[must_use]
    pub fn failures(&self) -> Vec<(&ItemReport, &str)> {
        self.items
            .iter()
            .filter(|item| item.state == ItemState::Failed)
            .map(|item| (item, item.error.as_deref().unwrap_or("unknown error")))
            .collect()
    }

    /// True when nothing failed and the run was not cancelled.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.counts.failed == 0 && !self.cancelled
    }
}
