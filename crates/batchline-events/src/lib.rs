#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Event bus for the Batchline pipeline.
//!
//! The bus carries typed pipeline events with sequential identifiers and keeps
//! a bounded replay ring so late subscribers (UIs, log tails) can catch up.
//! Internally it uses `tokio::broadcast`; when a subscriber lags, the oldest
//! events are dropped for that subscriber only.

pub mod payloads;
pub mod routing;

pub use payloads::{DEFAULT_REPLAY_CAPACITY, Event, EventEnvelope, EventId};
pub use routing::{EventBus, EventStream};
