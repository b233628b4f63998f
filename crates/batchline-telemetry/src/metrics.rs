//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes the counters/gauges the pipeline needs: per-state item totals,
//!   the running-slot gauge, queue depth, conflict actions and event volume.

use std::sync::Arc;

use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{TelemetryError, TelemetryResult};

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    items_total: IntCounterVec,
    conflicts_total: IntCounterVec,
    events_emitted_total: IntCounterVec,
    items_running: IntGauge,
    queue_depth: IntGauge,
}

/// Snapshot of selected gauges for progress reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Items currently held by workers.
    pub items_running: i64,
    /// Items waiting in the queue.
    pub queue_depth: i64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// built or registered.
    pub fn new() -> TelemetryResult<Self> {
        let registry = Registry::new();

        let items_total = IntCounterVec::new(
            Opts::new("items_total", "Work items that reached a terminal state"),
            &["state"],
        )
        .map_err(build_failed("items_total"))?;
        let conflicts_total = IntCounterVec::new(
            Opts::new("conflicts_total", "Destination conflicts by resolved action"),
            &["action"],
        )
        .map_err(build_failed("conflicts_total"))?;
        let events_emitted_total = IntCounterVec::new(
            Opts::new("events_emitted_total", "Scheduler events emitted by type"),
            &["type"],
        )
        .map_err(build_failed("events_emitted_total"))?;
        let items_running = IntGauge::with_opts(Opts::new(
            "items_running",
            "Work items currently held by a worker",
        ))
        .map_err(build_failed("items_running"))?;
        let queue_depth = IntGauge::with_opts(Opts::new("queue_depth", "Pending work items"))
            .map_err(build_failed("queue_depth"))?;

        register(&registry, "items_total", Box::new(items_total.clone()))?;
        register(&registry, "conflicts_total", Box::new(conflicts_total.clone()))?;
        register(
            &registry,
            "events_emitted_total",
            Box::new(events_emitted_total.clone()),
        )?;
        register(&registry, "items_running", Box::new(items_running.clone()))?;
        register(&registry, "queue_depth", Box::new(queue_depth.clone()))?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                items_total,
                conflicts_total,
                events_emitted_total,
                items_running,
                queue_depth,
            }),
        })
    }

    /// Count an item that reached the given terminal state.
    pub fn inc_item(&self, state: &str) {
        self.inner.items_total.with_label_values(&[state]).inc();
    }

    /// Count a resolved conflict.
    pub fn inc_conflict(&self, action: &str) {
        self.inner.conflicts_total.with_label_values(&[action]).inc();
    }

    /// Increment the emitted event counter for the specific event type.
    pub fn inc_event(&self, event_type: &str) {
        self.inner
            .events_emitted_total
            .with_label_values(&[event_type])
            .inc();
    }

    /// Mark one more item as held by a worker.
    pub fn inc_running(&self) {
        self.inner.items_running.inc();
    }

    /// Mark one item as released by its worker.
    pub fn dec_running(&self) {
        self.inner.items_running.dec();
    }

    /// Set the queue depth gauge.
    pub fn set_queue_depth(&self, depth: usize) {
        self.inner
            .queue_depth
            .set(i64::try_from(depth).unwrap_or(i64::MAX));
    }

    /// Total items counted for `state` so far.
    #[must_use]
    pub fn item_count(&self, state: &str) -> u64 {
        self.inner.items_total.with_label_values(&[state]).get()
    }

    /// Total conflicts resolved with `action` so far.
    #[must_use]
    pub fn conflict_count(&self, action: &str) -> u64 {
        self.inner
            .conflicts_total
            .with_label_values(&[action])
            .get()
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::Render {
                source: Box::new(source),
            })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::Render {
            source: Box::new(source),
        })
    }

    /// Take a point-in-time snapshot of the gauges.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            items_running: self.inner.items_running.get(),
            queue_depth: self.inner.queue_depth.get(),
        }
    }
}

fn build_failed(name: &'static str) -> impl FnOnce(prometheus::Error) -> TelemetryError {
    move |source| TelemetryError::Collector {
        operation: "build",
        name,
        source,
    }
}

fn register(
    registry: &Registry,
    name: &'static str,
    collector: Box<dyn prometheus::core::Collector>,
) -> TelemetryResult<()> {
    registry
        .register(collector)
        .map_err(|source| TelemetryError::Collector {
            operation: "register",
            name,
            source,
        })
}
