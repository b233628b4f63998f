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
#![allow(clippy::redundant_pub_crate)]

//! Command-line front end for the Batchline pipeline.
//!
//! Layout:
//! - `cli.rs`: argument parsing, settings resolution, and command dispatch
//! - `commands/`: command handlers grouped by concern
//! - `errors.rs`: CLI error type and exit codes
//! - `prompt.rs`: terminal conflict prompt
//! - `output.rs`: renderers and formatting helpers
//! - `main.rs`: thin entrypoint delegating to `run()`

pub(crate) mod cli;
pub(crate) mod commands;
pub(crate) mod errors;
pub(crate) mod output;
pub(crate) mod prompt;

pub use cli::{run, run_from};
