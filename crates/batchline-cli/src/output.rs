//! Output renderers and formatting helpers for CLI commands.

use std::fmt::Write as _;

use anyhow::anyhow;
use batchline_config::Settings;
use batchline_events::Event;
use batchline_pipeline::BatchReport;

use crate::cli::OutputFormat;
use crate::errors::{CliError, CliResult};

pub(crate) fn render_report(report: &BatchReport, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => println!("{}", to_json(report)?),
        OutputFormat::Table => print!("{}", format_report(report)),
    }
    Ok(())
}

pub(crate) fn render_settings(settings: &Settings, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => println!("{}", to_json(settings)?),
        OutputFormat::Table => print!("{}", format_settings(settings)),
    }
    Ok(())
}

fn to_json(value: &impl serde::Serialize) -> CliResult<String> {
    serde_json::to_string_pretty(value)
        .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}")))
}

pub(crate) fn format_report(report: &BatchReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<10} {:>3}  SOURCE -> DESTINATION", "STATE", "TRY");
    for item in &report.items {
        let _ = writeln!(
            out,
            "{:<10} {:>3}  {} -> {}",
            item.state.as_str(),
            item.attempts,
            item.source.display(),
            item.destination.display()
        );
    }
    let counts = &report.counts;
    let _ = writeln!(
        out,
        "summary: {} succeeded, {} renamed, {} skipped, {} failed, {} cancelled",
        counts.succeeded, counts.renamed, counts.skipped, counts.failed, counts.cancelled
    );
    let failures = report.failures();
    if !failures.is_empty() {
        let _ = writeln!(out, "failures:");
        for (item, message) in failures {
            let _ = writeln!(out, "  {}: {message}", item.source.display());
        }
    }
    if report.cancelled {
        let _ = writeln!(out, "batch was cancelled");
    }
    out
}

pub(crate) fn format_settings(settings: &Settings) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "pipeline.max_concurrency = {}",
        settings.pipeline.max_concurrency
    );
    let _ = writeln!(out, "pipeline.on_conflict = {}", settings.pipeline.on_conflict);
    let _ = writeln!(out, "logging.level = {}", settings.logging.level);
    let _ = writeln!(
        out,
        "logging.format = {}",
        settings.logging.format.as_deref().unwrap_or("auto")
    );
    out
}

/// One-line rendering of an event for `--progress`; `None` for events not worth printing.
pub(crate) fn format_event(event: &Event) -> Option<String> {
    match event {
        Event::BatchStarted {
            total,
            max_concurrency,
            ..
        } => Some(format!("starting {total} item(s) with {max_concurrency} slot(s)")),
        Event::ItemStateChanged { item_id, state } => Some(format!("{item_id} {state}")),
        Event::ItemProgress { item_id, progress } => match (progress.percent(), &progress.status) {
            (Some(percent), _) => Some(format!("{item_id} {percent:.0}%")),
            (None, Some(status)) => Some(format!("{item_id} {status}")),
            (None, None) => None,
        },
        Event::ItemRenamed {
            item_id,
            destination,
        } => Some(format!("{item_id} renamed to {destination}")),
        Event::ItemFailed { item_id, message } => Some(format!("{item_id} failed: {message}")),
        Event::BatchCancelled { .. } => Some("batch cancelled".to_string()),
        Event::ItemQueued { .. }
        | Event::ConflictRaised { .. }
        | Event::ConflictResolved { .. }
        | Event::BatchCompleted { .. } => None,
    }
}
