//! `run`: plan destinations, queue the files, and drive the batch.

use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::time::Duration;

use batchline_config::{ConflictPolicy, PipelineConfig, Settings};
use batchline_core::FileProcessor;
use batchline_events::{Event, EventBus};
use batchline_pipeline::{CommandProcessor, CopyProcessor, DestinationPlanner, JobQueue, Scheduler};
use batchline_telemetry::Metrics;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cli::{OutputFormat, RunArgs};
use crate::errors::{CliError, CliResult};
use crate::output::{format_event, render_report};
use crate::prompt::TerminalDecisionProvider;

const PROGRESS_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);
const INTERRUPTED_EXIT_CODE: i32 = 130;

pub(crate) async fn handle_run(
    settings: &Settings,
    args: RunArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let config = pipeline_config(settings, &args)?;
    let processor: Arc<dyn FileProcessor> = match args.command.as_deref() {
        Some(template) => Arc::new(CommandProcessor::from_template(template)?),
        None => Arc::new(CopyProcessor::new()),
    };

    let mut planner = DestinationPlanner::new(&args.output_dir);
    if let Some(extension) = &args.extension {
        planner = planner.with_extension(extension);
    }
    let items = planner.plan_items(&args.files)?;

    let events = EventBus::new();
    let metrics = Metrics::new().map_err(CliError::failure)?;
    let queue = Arc::new(JobQueue::new(events.clone()));
    queue.enqueue_all(items)?;

    if config.on_conflict == ConflictPolicy::Ask && !io::stdin().is_terminal() {
        warn!("stdin is not a terminal; conflicts left unanswered will be skipped");
    }
    let scheduler = Arc::new(Scheduler::new(
        queue,
        processor,
        Arc::new(TerminalDecisionProvider),
        events.clone(),
        metrics.clone(),
    ));

    let printer = args.progress.then(|| spawn_progress_printer(&events));
    let interrupt = spawn_interrupt_handler(Arc::clone(&scheduler));
    let result = scheduler.run(&config).await;
    interrupt.abort();
    if let Some(printer) = printer {
        if result.is_ok() {
            let _ = tokio::time::timeout(PROGRESS_DRAIN_TIMEOUT, printer).await;
        } else {
            printer.abort();
        }
    }

    let report = result?;
    let snapshot = metrics.snapshot();
    info!(
        batch_id = %report.batch_id,
        succeeded = report.counts.succeeded,
        renamed = report.counts.renamed,
        failed = report.counts.failed,
        items_running = snapshot.items_running,
        "batch finished"
    );
    debug!(metrics = %metrics.render().map_err(CliError::failure)?, "batch metrics");
    render_report(&report, format)?;

    if report.cancelled {
        return Err(CliError::incomplete("batch was cancelled"));
    }
    if report.counts.failed > 0 {
        return Err(CliError::incomplete(format!(
            "{} item(s) failed",
            report.counts.failed
        )));
    }
    Ok(())
}

fn pipeline_config(settings: &Settings, args: &RunArgs) -> CliResult<PipelineConfig> {
    let mut config = settings.pipeline;
    if let Some(max_concurrency) = args.max_concurrency {
        config.max_concurrency = max_concurrency;
    }
    if let Some(policy) = args.on_conflict {
        config.on_conflict = policy;
    }
    config.validate()?;
    Ok(config)
}

fn spawn_progress_printer(events: &EventBus) -> JoinHandle<()> {
    let mut stream = events.subscribe(None);
    tokio::spawn(async move {
        while let Some(envelope) = stream.next().await {
            if let Some(line) = format_event(&envelope.event) {
                eprintln!("{line}");
            }
            if matches!(envelope.event, Event::BatchCompleted { .. }) {
                break;
            }
        }
    })
}

fn spawn_interrupt_handler(scheduler: Arc<Scheduler>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        eprintln!("interrupt received; finishing running items (Ctrl-C again to abort)");
        scheduler.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn args(max_concurrency: Option<usize>, on_conflict: Option<ConflictPolicy>) -> RunArgs {
        RunArgs {
            files: vec![PathBuf::from("a.wav")],
            output_dir: PathBuf::from("out"),
            extension: None,
            max_concurrency,
            on_conflict,
            command: None,
            progress: false,
        }
    }

    #[test]
    fn flags_override_settings() -> CliResult<()> {
        let settings = Settings::default();
        let config = pipeline_config(&settings, &args(Some(5), Some(ConflictPolicy::Skip)))?;
        assert_eq!(config.max_concurrency, 5);
        assert_eq!(config.on_conflict, ConflictPolicy::Skip);

        let config = pipeline_config(&settings, &args(None, None))?;
        assert_eq!(config, settings.pipeline);
        Ok(())
    }

    #[test]
    fn out_of_range_concurrency_is_rejected() {
        let err = pipeline_config(&Settings::default(), &args(Some(65), None))
            .expect_err("too many slots");
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn progress_printer_stops_at_batch_completion() {
        let events = EventBus::new();
        let printer = spawn_progress_printer(&events);
        events.publish(Event::BatchCompleted {
            batch_id: uuid::Uuid::nil(),
            counts: batchline_core::BatchCounts::default(),
        });
        tokio::time::timeout(Duration::from_secs(5), printer)
            .await
            .expect("printer finished")
            .expect("printer task");
    }
}
