//! Metrics collection and export module

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::time::Instant;

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Counters
    pub pipeline_requests: IntCounter,
    pub pipeline_failures: IntCounterVec,
    pub signing_failures: IntCounterVec,
    pub owner_heals: IntCounter,
    pub broadcast_attempts: IntCounterVec,
    pub broadcast_successes: IntCounterVec,
    pub confirmation_outcomes: IntCounterVec,
    pub tip_fallbacks: IntCounter,

    // Gauges
    pub inflight_pipelines: IntGauge,

    // Histograms
    pub lock_wait: Histogram,
    pub pipeline_latency: Histogram,
    pub confirmation_latency: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let pipeline_requests = IntCounter::with_opts(Opts::new(
            "pipeline_requests_total",
            "Total number of execution pipeline runs",
        ))?;

        let pipeline_failures = IntCounterVec::new(
            Opts::new("pipeline_failures_total", "Pipeline runs that ended in an error"),
            &["kind"],
        )?;

        let signing_failures = IntCounterVec::new(
            Opts::new("signing_failures_total", "Remote signing failures by category"),
            &["category"],
        )?;

        let owner_heals = IntCounter::with_opts(Opts::new(
            "signer_owner_heals_total",
            "Wallets that were assigned an owner key and re-signed",
        ))?;

        let broadcast_attempts = IntCounterVec::new(
            Opts::new("broadcast_attempts_total", "Broadcast attempts per path"),
            &["path"],
        )?;

        let broadcast_successes = IntCounterVec::new(
            Opts::new("broadcast_successes_total", "Accepted broadcasts per method"),
            &["method"],
        )?;

        let confirmation_outcomes = IntCounterVec::new(
            Opts::new("confirmation_outcomes_total", "Confirmation tracker results"),
            &["outcome"],
        )?;

        let tip_fallbacks = IntCounter::with_opts(Opts::new(
            "tip_fallbacks_total",
            "Bundles assembled with the fallback tip or without a tip",
        ))?;

        let inflight_pipelines = IntGauge::with_opts(Opts::new(
            "inflight_pipelines",
            "Pipelines currently between lock acquisition and result",
        ))?;

        let lock_wait = Histogram::with_opts(
            HistogramOpts::new("wallet_lock_wait_seconds", "Time spent waiting for a wallet lock")
                .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0]),
        )?;

        let pipeline_latency = Histogram::with_opts(
            HistogramOpts::new("pipeline_latency_seconds", "End-to-end pipeline latency")
                .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 15.0, 30.0, 90.0]),
        )?;

        let confirmation_latency = Histogram::with_opts(
            HistogramOpts::new(
                "confirmation_latency_seconds",
                "Time from broadcast to a confirmation result",
            )
            .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]),
        )?;

        // Register all metrics
        registry.register(Box::new(pipeline_requests.clone()))?;
        registry.register(Box::new(pipeline_failures.clone()))?;
        registry.register(Box::new(signing_failures.clone()))?;
        registry.register(Box::new(owner_heals.clone()))?;
        registry.register(Box::new(broadcast_attempts.clone()))?;
        registry.register(Box::new(broadcast_successes.clone()))?;
        registry.register(Box::new(confirmation_outcomes.clone()))?;
        registry.register(Box::new(tip_fallbacks.clone()))?;
        registry.register(Box::new(inflight_pipelines.clone()))?;
        registry.register(Box::new(lock_wait.clone()))?;
        registry.register(Box::new(pipeline_latency.clone()))?;
        registry.register(Box::new(confirmation_latency.clone()))?;

        Ok(Self {
            registry,
            pipeline_requests,
            pipeline_failures,
            signing_failures,
            owner_heals,
            broadcast_attempts,
            broadcast_successes,
            confirmation_outcomes,
            tip_fallbacks,
            inflight_pipelines,
            lock_wait,
            pipeline_latency,
            confirmation_latency,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.start.elapsed().as_secs_f64());
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
