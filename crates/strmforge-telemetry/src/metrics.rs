//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes a minimal set of counters/gauges relevant to strmforge services.

use anyhow::Result;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: std::sync::Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    runs_total: IntCounterVec,
    files_processed_total: IntCounterVec,
    origin_requests_total: IntCounterVec,
    outbox_deliveries_total: IntCounterVec,
    validation_probes_total: IntCounterVec,
    events_emitted_total: IntCounterVec,
    executor_queue_depth: IntGauge,
    running_tasks: IntGauge,
}

/// Snapshot of selected gauges for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Run requests waiting for an executor slot.
    pub executor_queue_depth: i64,
    /// Runs currently in flight.
    pub running_tasks: i64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors
    /// registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let runs_total = IntCounterVec::new(
            Opts::new("runs_total", "Sync runs reaching a terminal state"),
            &["status"],
        )?;
        let files_processed_total = IntCounterVec::new(
            Opts::new(
                "files_processed_total",
                "Remote entries processed by category and outcome",
            ),
            &["category", "outcome"],
        )?;
        let origin_requests_total = IntCounterVec::new(
            Opts::new("origin_requests_total", "Origin HTTP calls by outcome"),
            &["outcome"],
        )?;
        let outbox_deliveries_total = IntCounterVec::new(
            Opts::new(
                "outbox_deliveries_total",
                "Notification delivery attempts by channel and outcome",
            ),
            &["channel", "outcome"],
        )?;
        let validation_probes_total = IntCounterVec::new(
            Opts::new("validation_probes_total", "Pointer probes by outcome"),
            &["outcome"],
        )?;
        let events_emitted_total = IntCounterVec::new(
            Opts::new("events_emitted_total", "Domain events emitted by type"),
            &["type"],
        )?;
        let executor_queue_depth = IntGauge::with_opts(Opts::new(
            "executor_queue_depth",
            "Run requests waiting for an executor slot",
        ))?;
        let running_tasks =
            IntGauge::with_opts(Opts::new("running_tasks", "Runs currently in flight"))?;

        registry.register(Box::new(runs_total.clone()))?;
        registry.register(Box::new(files_processed_total.clone()))?;
        registry.register(Box::new(origin_requests_total.clone()))?;
        registry.register(Box::new(outbox_deliveries_total.clone()))?;
        registry.register(Box::new(validation_probes_total.clone()))?;
        registry.register(Box::new(events_emitted_total.clone()))?;
        registry.register(Box::new(executor_queue_depth.clone()))?;
        registry.register(Box::new(running_tasks.clone()))?;

        Ok(Self {
            inner: std::sync::Arc::new(MetricsInner {
                registry,
                runs_total,
                files_processed_total,
                origin_requests_total,
                outbox_deliveries_total,
                validation_probes_total,
                events_emitted_total,
                executor_queue_depth,
                running_tasks,
            }),
        })
    }

    /// Count one run reaching a terminal state.
    pub fn inc_run(&self, status: &str) {
        self.inner.runs_total.with_label_values(&[status]).inc();
    }

    /// Count one processed entry by category and outcome.
    pub fn inc_file(&self, category: &str, outcome: &str) {
        self.inner
            .files_processed_total
            .with_label_values(&[category, outcome])
            .inc();
    }

    /// Count one origin HTTP call by outcome.
    pub fn inc_origin_request(&self, outcome: &str) {
        self.inner
            .origin_requests_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Count one notification delivery attempt.
    pub fn inc_outbox_delivery(&self, channel: &str, outcome: &str) {
        self.inner
            .outbox_deliveries_total
            .with_label_values(&[channel, outcome])
            .inc();
    }

    /// Count one validation probe by outcome.
    pub fn inc_validation_probe(&self, outcome: &str) {
        self.inner
            .validation_probes_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Count one emitted domain event by type.
    pub fn inc_event(&self, kind: &str) {
        self.inner
            .events_emitted_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Record the number of run requests waiting for an executor slot.
    pub fn set_queue_depth(&self, depth: i64) {
        self.inner.executor_queue_depth.set(depth);
    }

    /// Record a run entering flight.
    pub fn inc_running_tasks(&self) {
        self.inner.running_tasks.inc();
    }

    /// Record a run leaving flight.
    pub fn dec_running_tasks(&self) {
        self.inner.running_tasks.dec();
    }

    /// Render the registry in the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or produces invalid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.inner.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Capture the gauges surfaced by the health endpoint.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            executor_queue_depth: self.inner.executor_queue_depth.get(),
            running_tasks: self.inner.running_tasks.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_render_into_exposition_text() {
        let metrics = Metrics::new().expect("registry builds");
        metrics.inc_run("completed");
        metrics.inc_file("main", "generated");
        metrics.inc_origin_request("success");
        metrics.inc_outbox_delivery("telegram", "completed");
        metrics.inc_validation_probe("valid");
        metrics.inc_event("run_completed");

        let rendered = metrics.render().expect("render succeeds");
        assert!(rendered.contains("runs_total"));
        assert!(rendered.contains("files_processed_total"));
        assert!(rendered.contains("outbox_deliveries_total"));
    }

    #[test]
    fn snapshot_tracks_gauges() {
        let metrics = Metrics::new().expect("registry builds");
        metrics.set_queue_depth(3);
        metrics.inc_running_tasks();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.executor_queue_depth, 3);
        assert_eq!(snapshot.running_tasks, 1);

        metrics.dec_running_tasks();
        assert_eq!(metrics.snapshot().running_tasks, 0);

        let serialised = serde_json::to_value(metrics.snapshot()).expect("serialise");
        assert_eq!(serialised["running_tasks"], 0);
    }
}
