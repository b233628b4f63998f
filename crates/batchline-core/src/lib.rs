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

//! Processor-agnostic batch pipeline interfaces and DTOs.
//!
//! Layout: `model.rs` (work items, lifecycle states, conflict vocabulary),
//! `service.rs` (collaborator traits implemented by processors and prompts),
//! `error.rs` (state-machine and processing errors).

pub mod error;
pub mod model;
pub mod service;

pub use error::{CoreError, CoreResult, ProcessError, describe_error};
pub use model::{
    BatchCounts, ConflictAction, ConflictDecision, ItemId, ItemProgress, ItemState, WorkItem,
};
pub use service::{
    DecisionProvider, DiscardProgress, FileProcessor, ProcessOptions, ProcessRequest,
    ProgressSink,
};
