//! Event bus routing helpers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio::sync::broadcast::{self, Sender};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use crate::payloads::{DEFAULT_REPLAY_CAPACITY, Event, EventEnvelope, EventId};

/// Shared event bus built on top of `tokio::broadcast`.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    replay: Arc<Mutex<VecDeque<EventEnvelope>>>,
    replay_capacity: usize,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    /// Construct a bus with a custom replay capacity (minimum one event).
    #[must_use]
    pub fn with_capacity(replay_capacity: usize) -> Self {
        let replay_capacity = replay_capacity.max(1);
        let (sender, _) = broadcast::channel(replay_capacity);
        Self {
            sender,
            replay: Arc::new(Mutex::new(VecDeque::with_capacity(replay_capacity))),
            replay_capacity,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Construct a bus with the default replay capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Subscribe to the bus, replaying buffered events newer than `last_event_id`.
    #[must_use]
    pub fn subscribe(&self, last_event_id: Option<EventId>) -> EventStream {
        let live = BroadcastStream::new(self.sender.subscribe());
        let backlog: VecDeque<EventEnvelope> = last_event_id
            .map(|last| self.backlog_since(last).into())
            .unwrap_or_default();
        let replayed_through = backlog.back().map(|env| env.id);
        EventStream {
            backlog,
            live,
            replayed_through,
        }
    }

    /// Publish a new event to all subscribers and return its identifier.
    pub fn publish(&self, event: Event) -> EventId {
        let mut replay = self.lock_replay();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };
        if replay.len() == self.replay_capacity {
            let _ = replay.pop_front();
        }
        replay.push_back(envelope.clone());
        let _ = self.sender.send(envelope);
        drop(replay);
        id
    }

    /// Last event id observed in the replay buffer.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        self.lock_replay().back().map(|env| env.id)
    }

    /// Collect a backlog of events emitted after the specified id.
    #[must_use]
    pub fn backlog_since(&self, id: EventId) -> Vec<EventEnvelope> {
        let replay = self.lock_replay();
        replay.iter().filter(|env| env.id > id).cloned().collect()
    }

    fn lock_replay(&self) -> MutexGuard<'_, VecDeque<EventEnvelope>> {
        self.replay
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscriber handle yielding replayed events first, then live ones.
pub struct EventStream {
    backlog: VecDeque<EventEnvelope>,
    live: BroadcastStream<EventEnvelope>,
    replayed_through: Option<EventId>,
}

impl EventStream {
    /// Receive the next event; returns `None` once every bus handle is dropped.
    ///
    /// Events lost to lag are skipped rather than surfaced as errors.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        if let Some(envelope) = self.backlog.pop_front() {
            return Some(envelope);
        }
        loop {
            match self.live.next().await? {
                Ok(envelope) => {
                    if self
                        .replayed_through
                        .is_some_and(|through| envelope.id <= through)
                    {
                        continue;
                    }
                    return Some(envelope);
                }
                Err(BroadcastStreamRecvError::Lagged(_)) => {}
            }
        }
    }
}
