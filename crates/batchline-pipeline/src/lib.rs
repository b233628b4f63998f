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

//! Bounded-concurrency batch pipeline: job queue, scheduler, and conflict resolution.
//!
//! Layout: `queue.rs` (FIFO of pending items and the finished ledger),
//! `scheduler.rs` (worker slots and the per-item drive loop), `resolver.rs`
//! (conflict policy, prompt serialisation, rename planning), `plan.rs`
//! (destination planning), `processors/` (built-in file processors),
//! `report.rs` (batch summary), `error.rs`.

pub mod error;
pub mod plan;
pub mod processors;
pub mod queue;
pub mod report;
pub mod resolver;
pub mod scheduler;

pub use error::{PipelineError, PipelineResult};
pub use plan::DestinationPlanner;
pub use processors::{CommandProcessor, CopyProcessor};
pub use queue::JobQueue;
pub use report::{BatchReport, ItemReport};
pub use resolver::{ConflictResolver, Resolution, ResolutionOrigin, renamed_candidate};
pub use scheduler::{MAX_CONFLICT_ROUNDS, Scheduler};
