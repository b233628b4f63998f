//! FIFO job queue and the ledger of finished items.
//!
//! # Design
//! - A single mutex guards the pending FIFO, the in-flight set, and the
//!   finished ledger, so the in-flight count moves in step with dispatch.
//! - Items leave the queue on dispatch and return through `mark_finished`;
//!   workers own them in between.
//! - Events are published after the lock is released.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use batchline_core::{ItemId, ItemState, WorkItem};
use batchline_events::{Event, EventBus};
use tokio::sync::Notify;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::{PipelineError, PipelineResult};
use crate::report::BatchReport;

/// Ordered queue of pending work items plus the items already finished.
pub struct JobQueue {
    state: Mutex<QueueState>,
    idle: Notify,
    events: EventBus,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<WorkItem>,
    in_flight: HashMap<ItemId, PathBuf>,
    finished: HashMap<ItemId, WorkItem>,
    order: Vec<ItemId>,
    known: HashSet<ItemId>,
    intake_closed: bool,
    finalized: bool,
}

impl JobQueue {
    /// Create an empty queue that reports lifecycle changes on `events`.
    #[must_use]
    pub fn new(events: EventBus) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            idle: Notify::new(),
            events,
        }
    }

    /// Append a pending item at the tail of the queue.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidState`] when the queue is finalized or the
    /// item is not pending, and [`PipelineError::DuplicateItem`] when the id is
    /// already known.
    pub fn enqueue(&self, item: WorkItem) -> PipelineResult<ItemId> {
        if item.state() != ItemState::Pending {
            return Err(PipelineError::InvalidState {
                operation: "queue.enqueue",
                reason: "only pending items can be queued",
            });
        }
        let item_id = item.id;
        let event = Event::ItemQueued {
            item_id,
            source: item.source_path.display().to_string(),
            destination: item.destination_path.display().to_string(),
        };
        {
            let mut state = self.lock();
            if state.finalized {
                return Err(PipelineError::InvalidState {
                    operation: "queue.enqueue",
                    reason: "queue is finalized; clear it before adding work",
                });
            }
            if !state.known.insert(item_id) {
                return Err(PipelineError::DuplicateItem { item_id });
            }
            state.order.push(item_id);
            state.pending.push_back(item);
        }
        self.events.publish(event);
        Ok(item_id)
    }

    /// Queue every item in order, stopping at the first rejection.
    ///
    /// # Errors
    ///
    /// Propagates the first [`JobQueue::enqueue`] failure; items before it stay queued.
    pub fn enqueue_all(
        &self,
        items: impl IntoIterator<Item = WorkItem>,
    ) -> PipelineResult<Vec<ItemId>> {
        items.into_iter().map(|item| self.enqueue(item)).collect()
    }

    /// Take the oldest pending item, marking it running.
    ///
    /// Returns `None` when nothing is pending or intake has been closed. The
    /// `Running` event is published while the queue lock is held, so every
    /// dispatch event precedes anything published after `close_intake`.
    pub fn try_dequeue(&self) -> Option<WorkItem> {
        let mut state = self.lock();
        if state.intake_closed {
            return None;
        }
        while let Some(mut item) = state.pending.pop_front() {
            match item.transition(ItemState::Running) {
                Ok(()) => {
                    state
                        .in_flight
                        .insert(item.id, item.destination_path.clone());
                    self.publish_state(item.id, ItemState::Running);
                    drop(state);
                    debug!(item_id = %item.id, "item dispatched");
                    return Some(item);
                }
                Err(err) => {
                    warn!(item_id = %item.id, error = %err, "dropping non-pending item from queue");
                    state.finished.insert(item.id, item);
                }
            }
        }
        None
    }

    /// Return a worker's item to the ledger in `final_state`.
    ///
    /// The in-flight count is decremented even when the transition is rejected,
    /// so a misbehaving caller cannot wedge `wait_idle`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidState`] when `final_state` is not terminal
    /// or the item was not dispatched by this queue, and
    /// [`PipelineError::Transition`] when the lifecycle forbids the move.
    pub fn mark_finished(&self, mut item: WorkItem, final_state: ItemState) -> PipelineResult<()> {
        if !final_state.is_terminal() {
            return Err(PipelineError::InvalidState {
                operation: "queue.mark_finished",
                reason: "final state must be terminal",
            });
        }
        let item_id = item.id;
        let transitioned = if item.state() == final_state {
            Ok(())
        } else {
            item.transition(final_state)
        };
        let now_idle = {
            let mut state = self.lock();
            if state.in_flight.remove(&item_id).is_none() {
                return Err(PipelineError::InvalidState {
                    operation: "queue.mark_finished",
                    reason: "item is not in flight",
                });
            }
            state.finished.insert(item_id, item);
            state.in_flight.is_empty()
        };
        if now_idle {
            self.idle.notify_waiters();
        }
        transitioned?;
        self.publish_state(item_id, final_state);
        Ok(())
    }

    /// Drop every pending and finished item and reopen intake.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidState`] while items are still in flight.
    pub fn clear(&self) -> PipelineResult<()> {
        let mut state = self.lock();
        if !state.in_flight.is_empty() {
            return Err(PipelineError::InvalidState {
                operation: "queue.clear",
                reason: "items are still in flight",
            });
        }
        *state = QueueState::default();
        Ok(())
    }

    /// Stop handing out pending items; `try_dequeue` returns `None` from now on.
    pub fn close_intake(&self) {
        self.lock().intake_closed = true;
    }

    /// Whether `try_dequeue` may still hand out items.
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        !self.lock().intake_closed
    }

    /// Move every pending item to `Cancelled` and return their ids in queue order.
    pub fn cancel_pending(&self) -> Vec<ItemId> {
        let cancelled: Vec<ItemId> = {
            let mut state = self.lock();
            let pending: Vec<WorkItem> = state.pending.drain(..).collect();
            let mut ids = Vec::with_capacity(pending.len());
            for mut item in pending {
                if let Err(err) = item.transition(ItemState::Cancelled) {
                    warn!(item_id = %item.id, error = %err, "pending item refused cancellation");
                } else {
                    ids.push(item.id);
                }
                state.finished.insert(item.id, item);
            }
            ids
        };
        for item_id in &cancelled {
            self.publish_state(*item_id, ItemState::Cancelled);
        }
        cancelled
    }

    /// Seal the queue; further `enqueue` calls fail until `clear`.
    pub fn finalize(&self) {
        let mut state = self.lock();
        state.intake_closed = true;
        state.finalized = true;
    }

    /// Whether the queue has been sealed by a completed or cancelled run.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.lock().finalized
    }

    /// Resolve once no item is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Number of items waiting to be dispatched.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Number of items currently held by workers.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight.len()
    }

    /// Number of items known to the queue in any state.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    /// Whether the queue holds no items at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().order.is_empty()
    }

    /// Destinations claimed by every known item.
    #[must_use]
    pub fn destinations(&self) -> Vec<PathBuf> {
        let state = self.lock();
        state
            .pending
            .iter()
            .map(|item| item.destination_path.clone())
            .chain(state.in_flight.values().cloned())
            .chain(
                state
                    .finished
                    .values()
                    .map(|item| item.destination_path.clone()),
            )
            .collect()
    }

    /// Snapshot of a pending or finished item.
    #[must_use]
    pub fn item(&self, item_id: ItemId) -> Option<WorkItem> {
        let state = self.lock();
        state.finished.get(&item_id).cloned().or_else(|| {
            state
                .pending
                .iter()
                .find(|item| item.id == item_id)
                .cloned()
        })
    }

    /// Summarise every pending and finished item in submission order.
    #[must_use]
    pub fn report(&self, batch_id: Uuid, cancelled: bool) -> BatchReport {
        let state = self.lock();
        let items = state.order.iter().filter_map(|item_id| {
            state
                .finished
                .get(item_id)
                .or_else(|| state.pending.iter().find(|item| item.id == *item_id))
        });
        BatchReport::from_items(batch_id, items, cancelled)
    }

    fn publish_state(&self, item_id: ItemId, state: ItemState) {
        self.events
            .publish(Event::ItemStateChanged { item_id, state });
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("job queue mutex poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn queue() -> JobQueue {
        JobQueue::new(EventBus::new())
    }

    fn item(name: &str) -> WorkItem {
        WorkItem::new(format!("in/{name}"), format!("out/{name}"))
    }

    #[test]
    fn dequeue_follows_submission_order() -> PipelineResult<()> {
        let queue = queue();
        let ids = queue.enqueue_all(["a", "b", "c"].map(item))?;

        let dispatched: Vec<ItemId> = std::iter::from_fn(|| queue.try_dequeue())
            .map(|item| {
                assert_eq!(item.state(), ItemState::Running);
                item.id
            })
            .collect();
        assert_eq!(dispatched, ids);
        assert_eq!(queue.in_flight(), 3);
        assert_eq!(queue.pending_len(), 0);
        Ok(())
    }

    #[test]
    fn duplicate_ids_are_rejected() -> PipelineResult<()> {
        let queue = queue();
        let first = item("a");
        let copy = first.clone();
        queue.enqueue(first)?;
        let err = queue.enqueue(copy).expect_err("duplicate id");
        assert!(matches!(err, PipelineError::DuplicateItem { .. }));
        Ok(())
    }

    #[test]
    fn non_pending_items_are_rejected() -> PipelineResult<()> {
        let queue = queue();
        let mut running = item("a");
        running.transition(ItemState::Running)?;
        let err = queue.enqueue(running).expect_err("running item");
        assert!(matches!(
            err,
            PipelineError::InvalidState {
                operation: "queue.enqueue",
                ..
            }
        ));
        Ok(())
    }

    #[test]
    fn mark_finished_moves_item_to_ledger() -> PipelineResult<()> {
        let queue = queue();
        let id = queue.enqueue(item("a"))?;
        let dispatched = queue.try_dequeue().expect("pending item");
        queue.mark_finished(dispatched, ItemState::Succeeded)?;

        assert_eq!(queue.in_flight(), 0);
        let stored = queue.item(id).expect("finished item");
        assert_eq!(stored.state(), ItemState::Succeeded);
        Ok(())
    }

    #[test]
    fn mark_finished_rejects_non_terminal_and_unknown_items() -> PipelineResult<()> {
        let queue = queue();
        queue.enqueue(item("a"))?;
        let dispatched = queue.try_dequeue().expect("pending item");

        let err = queue
            .mark_finished(dispatched.clone(), ItemState::Running)
            .expect_err("non-terminal");
        assert!(matches!(err, PipelineError::InvalidState { .. }));
        assert_eq!(queue.in_flight(), 1);

        let stranger = item("b");
        let err = queue
            .mark_finished(stranger, ItemState::Failed)
            .expect_err("unknown item");
        assert!(matches!(err, PipelineError::InvalidState { .. }));
        assert_eq!(queue.in_flight(), 1);
        Ok(())
    }

    #[test]
    fn rejected_transition_still_releases_slot() -> PipelineResult<()> {
        let queue = queue();
        queue.enqueue(item("a"))?;
        let dispatched = queue.try_dequeue().expect("pending item");

        let err = queue
            .mark_finished(dispatched, ItemState::Skipped)
            .expect_err("running cannot skip directly");
        assert!(matches!(err, PipelineError::Transition { .. }));
        assert_eq!(queue.in_flight(), 0);
        Ok(())
    }

    #[test]
    fn closed_intake_stops_dispatch_and_cancel_pending_drains() -> PipelineResult<()> {
        let queue = queue();
        let ids = queue.enqueue_all(["a", "b"].map(item))?;
        queue.close_intake();
        assert!(!queue.is_accepting());
        assert!(queue.try_dequeue().is_none());

        let cancelled = queue.cancel_pending();
        assert_eq!(cancelled, ids);
        assert_eq!(queue.pending_len(), 0);
        for id in ids {
            assert_eq!(
                queue.item(id).map(|item| item.state()),
                Some(ItemState::Cancelled)
            );
        }
        Ok(())
    }

    #[test]
    fn finalized_queue_refuses_work_until_cleared() -> PipelineResult<()> {
        let queue = queue();
        queue.enqueue(item("a"))?;
        queue.finalize();
        assert!(queue.is_finalized());
        let err = queue.enqueue(item("b")).expect_err("finalized");
        assert!(matches!(err, PipelineError::InvalidState { .. }));

        queue.clear()?;
        assert!(queue.is_empty());
        assert!(!queue.is_finalized());
        queue.enqueue(item("b"))?;
        assert_eq!(queue.pending_len(), 1);
        Ok(())
    }

    #[test]
    fn clear_is_refused_while_items_are_in_flight() -> PipelineResult<()> {
        let queue = queue();
        queue.enqueue(item("a"))?;
        let _held = queue.try_dequeue().expect("pending item");
        let err = queue.clear().expect_err("in flight");
        assert!(matches!(
            err,
            PipelineError::InvalidState {
                operation: "queue.clear",
                ..
            }
        ));
        Ok(())
    }

    #[test]
    fn destinations_cover_pending_running_and_finished() -> PipelineResult<()> {
        let queue = queue();
        queue.enqueue_all(["a", "b", "c"].map(item))?;
        let first = queue.try_dequeue().expect("a");
        queue.mark_finished(first, ItemState::Failed)?;
        let _second = queue.try_dequeue().expect("b");

        let mut destinations = queue.destinations();
        destinations.sort();
        assert_eq!(
            destinations,
            vec![
                PathBuf::from("out/a"),
                PathBuf::from("out/b"),
                PathBuf::from("out/c")
            ]
        );
        Ok(())
    }

    #[test]
    fn queue_events_are_published() -> PipelineResult<()> {
        let events = EventBus::new();
        let queue = JobQueue::new(events.clone());
        let id = queue.enqueue(item("a"))?;
        let dispatched = queue.try_dequeue().expect("pending item");
        queue.mark_finished(dispatched, ItemState::Succeeded)?;

        let kinds: Vec<&str> = events
            .backlog_since(0)
            .iter()
            .map(|envelope| envelope.event.kind())
            .collect();
        assert_eq!(
            kinds,
            vec!["item_queued", "item_state_changed", "item_state_changed"]
        );
        assert!(
            events
                .backlog_since(0)
                .iter()
                .all(|envelope| envelope.event.item_id() == Some(id))
        );
        Ok(())
    }

    #[tokio::test]
    async fn wait_idle_resolves_after_last_item_finishes() -> PipelineResult<()> {
        let queue = Arc::new(queue());
        queue.wait_idle().await;

        queue.enqueue(item("a"))?;
        let dispatched = queue.try_dequeue().expect("pending item");
        let finisher = Arc::clone(&queue);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            finisher.mark_finished(dispatched, ItemState::Succeeded)
        });

        tokio::time::timeout(Duration::from_secs(5), queue.wait_idle())
            .await
            .expect("queue became idle");
        handle.await.expect("finisher task")?;
        Ok(())
    }
}
