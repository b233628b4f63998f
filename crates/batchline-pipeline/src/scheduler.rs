//! Worker slots and the per-item drive loop.
//!
//! # Design
//! - `run` spawns exactly `max_concurrency` workers on a `JoinSet`. Each worker
//!   pulls from the shared queue until it is drained or intake closes, so no
//!   more than that many items are ever held at once.
//! - A worker owns its item from dispatch until `mark_finished`; conflict
//!   retries stay inside the same slot.
//! - Cancellation closes intake before the batch token trips. Running items
//!   finish their current processor call and whatever is still pending ends
//!   `Cancelled`.
//! - An item whose destination resolves to its own source fails before the
//!   processor is called.
//! - Every batch gets a child of the scheduler's token, so a `Cancel` decision
//!   stops only that batch while `Scheduler::cancel` stops all of them.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use batchline_config::PipelineConfig;
use batchline_core::{
    ConflictAction, DecisionProvider, FileProcessor, ItemId, ItemProgress, ItemState,
    ProcessError, ProcessOptions, ProcessRequest, ProgressSink, WorkItem, describe_error,
};
use batchline_events::{Event, EventBus};
use batchline_telemetry::{Metrics, batch_span};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};
use uuid::Uuid;

use crate::error::{PipelineError, PipelineResult};
use crate::queue::JobQueue;
use crate::report::BatchReport;
use crate::resolver::ConflictResolver;

/// Conflict rounds allowed per item before it is failed.
pub const MAX_CONFLICT_ROUNDS: u32 = 8;

/// Dispatches queued items to a bounded set of workers.
pub struct Scheduler {
    queue: Arc<JobQueue>,
    processor: Arc<dyn FileProcessor>,
    decisions: Arc<dyn DecisionProvider>,
    events: EventBus,
    metrics: Metrics,
    cancel: CancellationToken,
}

impl Scheduler {
    /// Wire the scheduler to its queue and collaborators.
    #[must_use]
    pub fn new(
        queue: Arc<JobQueue>,
        processor: Arc<dyn FileProcessor>,
        decisions: Arc<dyn DecisionProvider>,
        events: EventBus,
        metrics: Metrics,
    ) -> Self {
        Self {
            queue,
            processor,
            decisions,
            events,
            metrics,
            cancel: CancellationToken::new(),
        }
    }

    /// Queue feeding this scheduler.
    #[must_use]
    pub const fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    /// Token that trips when the scheduler is cancelled; watch it to observe cancellation.
    ///
    /// Stop a batch through [`Scheduler::cancel`], which also closes queue intake.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop dispatching; running items finish their current call.
    ///
    /// Intake closes before the token trips, so no item is dispatched once
    /// cancellation is observable.
    pub fn cancel(&self) {
        self.queue.close_intake();
        self.cancel.cancel();
    }

    /// Drain the queue with `config.max_concurrency` workers.
    ///
    /// Per-item failures are recorded on the items and never abort the run.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Configuration`] before anything is dispatched
    /// when the configuration is invalid, [`PipelineError::InvalidState`] when
    /// the queue was already finalized or has items in flight, and
    /// [`PipelineError::Worker`] when a worker task panicked.
    pub async fn run(&self, config: &PipelineConfig) -> PipelineResult<BatchReport> {
        config
            .validate()
            .map_err(|source| PipelineError::Configuration { source })?;
        if self.queue.is_finalized() {
            return Err(PipelineError::InvalidState {
                operation: "scheduler.run",
                reason: "queue is finalized; clear it before running again",
            });
        }
        if self.queue.in_flight() > 0 {
            return Err(PipelineError::InvalidState {
                operation: "scheduler.run",
                reason: "another batch is still running",
            });
        }

        let batch_id = Uuid::new_v4();
        let max_concurrency = config.max_concurrency;
        let span = batch_span(batch_id, max_concurrency);
        let batch_cancel = self.cancel.child_token();
        let resolver = Arc::new(
            ConflictResolver::new(
                config.on_conflict,
                Arc::clone(&self.decisions),
                batch_cancel.clone(),
            )
            .with_intake(Arc::clone(&self.queue)),
        );
        resolver.reserve(self.queue.destinations());

        let total = self.queue.pending_len();
        self.metrics.set_queue_depth(total);
        emit(
            &self.events,
            &self.metrics,
            Event::BatchStarted {
                batch_id,
                total,
                max_concurrency,
            },
        );
        info!(
            parent: &span,
            total,
            on_conflict = %config.on_conflict,
            processor = self.processor.name(),
            "batch started"
        );

        let mut workers = JoinSet::new();
        for slot in 0..max_concurrency {
            let worker = Worker {
                slot,
                queue: Arc::clone(&self.queue),
                processor: Arc::clone(&self.processor),
                resolver: Arc::clone(&resolver),
                events: self.events.clone(),
                metrics: self.metrics.clone(),
                cancel: batch_cancel.clone(),
            };
            workers.spawn(worker.run().instrument(span.clone()));
        }

        let mut worker_failure = None;
        while let Some(joined) = workers.join_next().await {
            if let Err(source) = joined {
                error!(parent: &span, error = %source, "worker task failed");
                worker_failure.get_or_insert(source);
            }
        }

        let cancelled = batch_cancel.is_cancelled();
        if cancelled {
            self.queue.close_intake();
            let dropped = self.queue.cancel_pending();
            for _ in &dropped {
                self.metrics.inc_item(ItemState::Cancelled.as_str());
            }
            emit(
                &self.events,
                &self.metrics,
                Event::BatchCancelled { batch_id },
            );
            warn!(parent: &span, cancelled_pending = dropped.len(), "batch cancelled");
        }
        self.queue.finalize();
        self.metrics.set_queue_depth(self.queue.pending_len());

        if let Some(source) = worker_failure {
            return Err(PipelineError::Worker { source });
        }

        let report = self.queue.report(batch_id, cancelled);
        emit(
            &self.events,
            &self.metrics,
            Event::BatchCompleted {
                batch_id,
                counts: report.counts,
            },
        );
        info!(
            parent: &span,
            succeeded = report.counts.succeeded,
            renamed = report.counts.renamed,
            skipped = report.counts.skipped,
            failed = report.counts.failed,
            cancelled = report.counts.cancelled,
            prompts = resolver.prompt_count(),
            "batch completed"
        );
        Ok(report)
    }
}

async fn is_same_file(source: &Path, destination: &Path) -> bool {
    match (
        tokio::fs::canonicalize(source).await,
        tokio::fs::canonicalize(destination).await,
    ) {
        (Ok(source), Ok(destination)) => source == destination,
        _ => false,
    }
}

fn emit(events: &EventBus, metrics: &Metrics, event: Event) {
    metrics.inc_event(event.kind());
    events.publish(event);
}

enum ConflictStep {
    Retry(ProcessOptions),
    Finish(ItemState),
}

struct Worker {
    slot: usize,
    queue: Arc<JobQueue>,
    processor: Arc<dyn FileProcessor>,
    resolver: Arc<ConflictResolver>,
    events: EventBus,
    metrics: Metrics,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self) {
        let mut handled = 0_usize;
        while !self.cancel.is_cancelled() {
            let Some(item) = self.queue.try_dequeue() else {
                break;
            };
            self.metrics.set_queue_depth(self.queue.pending_len());
            self.drive(item).await;
            handled += 1;
        }
        debug!(slot = self.slot, handled, "worker finished");
    }

    async fn drive(&self, mut item: WorkItem) {
        let item_id = item.id;
        self.metrics.inc_running();
        let sink = ItemProgressSink {
            events: self.events.clone(),
            metrics: self.metrics.clone(),
            latest: Mutex::new(None),
        };
        let final_state = self.process_item(&mut item, &sink).await;
        if let Some(progress) = sink.take_latest() {
            item.progress = progress;
        }
        self.metrics.dec_running();
        self.metrics.inc_item(final_state.as_str());

        if final_state == ItemState::Failed {
            warn!(
                item_id = %item_id,
                source = %item.source_path.display(),
                error = item.error.as_deref().unwrap_or_default(),
                "item failed"
            );
        } else {
            info!(
                item_id = %item_id,
                destination = %item.destination_path.display(),
                state = %final_state,
                attempts = item.attempts,
                "item finished"
            );
        }
        if let Err(err) = self.queue.mark_finished(item, final_state) {
            error!(item_id = %item_id, error = %err, "failed to record finished item");
        }
    }

    async fn process_item(&self, item: &mut WorkItem, sink: &ItemProgressSink) -> ItemState {
        if self.cancel.is_cancelled() {
            return ItemState::Cancelled;
        }
        let mut options = ProcessOptions::default();
        let mut rounds = 0_u32;
        loop {
            if is_same_file(&item.source_path, &item.destination_path).await {
                let err = ProcessError::failed(
                    "pipeline.check_destination",
                    &item.destination_path,
                    "source and destination are the same file",
                );
                return self.fail(item, describe_error(&err));
            }
            item.attempts += 1;
            let request = ProcessRequest {
                item_id: item.id,
                source: item.source_path.clone(),
                destination: item.destination_path.clone(),
                options,
                cancel: self.cancel.clone(),
            };
            match self.processor.process(&request, sink).await {
                Ok(()) if item.was_renamed() => return ItemState::Renamed,
                Ok(()) => return ItemState::Succeeded,
                Err(ProcessError::Cancelled) => return ItemState::Cancelled,
                Err(ProcessError::DestinationExists { path }) => {
                    if options.overwrite {
                        return self.fail(item, "destination still occupied after overwrite");
                    }
                    if rounds >= MAX_CONFLICT_ROUNDS {
                        return self.fail(item, "conflict retry limit reached");
                    }
                    rounds += 1;
                    match self.resolve_conflict(item, &path).await {
                        ConflictStep::Retry(next) => options = next,
                        ConflictStep::Finish(state) => return state,
                    }
                }
                Err(err) => return self.fail(item, describe_error(&err)),
            }
        }
    }

    async fn resolve_conflict(&self, item: &mut WorkItem, occupied: &Path) -> ConflictStep {
        let item_id = item.id;
        self.advance(item, ItemState::AwaitingConflictResolution);
        self.publish(Event::ConflictRaised {
            item_id,
            destination: occupied.display().to_string(),
        });

        let resolution = self.resolver.resolve(occupied).await;
        self.metrics.inc_conflict(resolution.action.as_str());
        self.publish(Event::ConflictResolved {
            item_id,
            action: resolution.action,
        });

        match resolution.action {
            ConflictAction::Skip => ConflictStep::Finish(ItemState::Skipped),
            ConflictAction::Cancel => {
                self.queue.close_intake();
                ConflictStep::Finish(ItemState::Cancelled)
            }
            ConflictAction::Overwrite | ConflictAction::Rename if self.cancel.is_cancelled() => {
                ConflictStep::Finish(ItemState::Cancelled)
            }
            ConflictAction::Overwrite => {
                self.advance(item, ItemState::Running);
                ConflictStep::Retry(ProcessOptions { overwrite: true })
            }
            ConflictAction::Rename => {
                self.advance(item, ItemState::Running);
                match self.resolver.rename(&item.destination_path) {
                    Ok(destination) => {
                        item.reassign_destination(&destination);
                        self.publish(Event::ItemRenamed {
                            item_id,
                            destination: destination.display().to_string(),
                        });
                        ConflictStep::Retry(ProcessOptions::default())
                    }
                    Err(err) => ConflictStep::Finish(self.fail(item, describe_error(&err))),
                }
            }
        }
    }

    fn fail(&self, item: &mut WorkItem, message: impl Into<String>) -> ItemState {
        let message = message.into();
        item.error = Some(message.clone());
        self.publish(Event::ItemFailed {
            item_id: item.id,
            message,
        });
        ItemState::Failed
    }

    fn advance(&self, item: &mut WorkItem, next: ItemState) {
        match item.transition(next) {
            Ok(()) => self.publish(Event::ItemStateChanged {
                item_id: item.id,
                state: next,
            }),
            Err(err) => warn!(item_id = %item.id, error = %err, "work item transition rejected"),
        }
    }

    fn publish(&self, event: Event) {
        emit(&self.events, &self.metrics, event);
    }
}

struct ItemProgressSink {
    events: EventBus,
    metrics: Metrics,
    latest: Mutex<Option<ItemProgress>>,
}

impl ItemProgressSink {
    fn lock(&self) -> MutexGuard<'_, Option<ItemProgress>> {
        self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_latest(&self) -> Option<ItemProgress> {
        self.lock().take()
    }
}

impl ProgressSink for ItemProgressSink {
    fn report(&self, item_id: ItemId, progress: ItemProgress) {
        *self.lock() = Some(progress.clone());
        emit(
            &self.events,
            &self.metrics,
            Event::ItemProgress { item_id, progress },
        );
    }
}
