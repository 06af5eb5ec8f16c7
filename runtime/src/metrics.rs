//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for every stage of the protocol:
//! - Submissions (accepted / rejected)
//! - Dispatch (published / in-process / malformed)
//! - Worker pool (in flight, finalized, abandoned, processing time)
//! - Polls (by outcome)
//!
//! # Example
//!
//! ```rust,no_run
//! use asyncreq_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Render the current snapshot, e.g. from an HTTP handler
//! let body = server.render().unwrap_or_default();
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from installing the Prometheus recorder.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// The histogram bucket configuration was rejected
    #[error("Invalid histogram buckets: {0}")]
    Build(String),
    /// Another recorder could not be replaced
    #[error("Failed to install Prometheus recorder: {0}")]
    Install(String),
}

/// Bucket bounds (seconds) for submission and processing latency.
///
/// Submissions are one store write plus a publish, so the low end is fine
/// grained; processing runs caller code and can take up to the record TTL.
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Process-wide Prometheus recorder for the `asyncreq_*` metrics.
///
/// [`start`](Self::start) installs the global recorder once; the binary serves
/// [`render`](Self::render) on `addr` through whatever HTTP stack it already
/// runs. A second `start` in the same process (common in tests) keeps the
/// existing recorder and leaves this instance without a handle.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Prepare a recorder to be scraped at `addr`.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Describe every `asyncreq_*` metric and install the recorder.
    ///
    /// # Errors
    ///
    /// [`MetricsError::Build`] if the latency buckets are rejected, and
    /// [`MetricsError::Install`] if installation fails for any reason other
    /// than a recorder already being present.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(Matcher::Suffix("duration_seconds".to_string()), LATENCY_BUCKETS)
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Correlation metrics recorder installed");
                Ok(())
            }
            Err(e) if e.to_string().contains("already initialized") => {
                tracing::warn!(addr = %self.addr, "Metrics recorder already installed, reusing it");
                Ok(())
            }
            Err(e) => Err(MetricsError::Install(e.to_string())),
        }
    }

    /// The render handle, if this instance installed the recorder.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Current snapshot in Prometheus text format.
    ///
    /// `None` unless this instance installed the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }

    /// Address the owner serves [`render`](Self::render) on.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Submission
    describe_counter!(
        "asyncreq_submissions_total",
        "Total number of accepted submissions"
    );
    describe_counter!(
        "asyncreq_submission_failures_total",
        "Total number of submissions rejected before a record was registered"
    );
    describe_histogram!(
        "asyncreq_submission_duration_seconds",
        "Time taken to register and dispatch a submission"
    );

    // Dispatch
    describe_counter!(
        "asyncreq_dispatch_published_total",
        "Total number of dispatch messages published to the bus"
    );
    describe_counter!(
        "asyncreq_dispatch_publish_errors_total",
        "Total number of dispatch messages that failed to publish"
    );
    describe_counter!(
        "asyncreq_dispatch_consumed_total",
        "Total number of dispatch messages consumed by a subscriber"
    );
    describe_counter!(
        "asyncreq_dispatch_rejected_total",
        "Total number of malformed or undeliverable dispatch messages"
    );

    // Worker pool
    describe_gauge!(
        "asyncreq_in_flight",
        "Number of requests currently queued or processing in the worker pool"
    );
    describe_counter!(
        "asyncreq_finalized_total",
        "Total number of requests finalized (label: outcome)"
    );
    describe_counter!(
        "asyncreq_abandoned_total",
        "Total number of requests abandoned after processing"
    );
    describe_histogram!(
        "asyncreq_processing_duration_seconds",
        "Time spent inside the processor"
    );

    // Polls
    describe_counter!(
        "asyncreq_polls_total",
        "Total number of polls (label: outcome)"
    );

    // Dead letter queue
    describe_gauge!("asyncreq_dlq_size", "Abandoned requests held in the dead letter queue");
    describe_counter!(
        "asyncreq_dlq_evicted_total",
        "Abandoned requests evicted from a full dead letter queue"
    );
}

/// Submission metrics recorder.
pub struct SubmissionMetrics;

impl SubmissionMetrics {
    /// Record an accepted submission.
    pub fn record_accepted(duration: Duration) {
        counter!("asyncreq_submissions_total").increment(1);
        histogram!("asyncreq_submission_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a rejected submission.
    pub fn record_rejected() {
        counter!("asyncreq_submission_failures_total").increment(1);
    }
}

/// Dispatch metrics recorder.
pub struct DispatchMetrics;

impl DispatchMetrics {
    /// Record a published dispatch message.
    pub fn record_published() {
        counter!("asyncreq_dispatch_published_total").increment(1);
    }

    /// Record a publish failure.
    pub fn record_publish_error() {
        counter!("asyncreq_dispatch_publish_errors_total").increment(1);
    }

    /// Record a consumed dispatch message.
    pub fn record_consumed() {
        counter!("asyncreq_dispatch_consumed_total").increment(1);
    }

    /// Record a rejected dispatch message.
    pub fn record_rejected() {
        counter!("asyncreq_dispatch_rejected_total").increment(1);
    }
}

/// Worker pool metrics recorder.
pub struct WorkerMetrics;

impl WorkerMetrics {
    /// Record the current in-flight count.
    #[allow(clippy::cast_precision_loss)] // in-flight counts are far below 2^52
    pub fn record_in_flight(count: usize) {
        gauge!("asyncreq_in_flight").set(count as f64);
    }

    /// Record time spent in the processor.
    pub fn record_processing(duration: Duration) {
        histogram!("asyncreq_processing_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a finalized request.
    pub fn record_finalized(is_error: bool) {
        let outcome = if is_error { "error" } else { "success" };
        counter!("asyncreq_finalized_total", "outcome" => outcome).increment(1);
    }

    /// Record an abandoned request.
    pub fn record_abandoned() {
        counter!("asyncreq_abandoned_total").increment(1);
    }
}

/// Poll metrics recorder.
pub struct PollMetrics;

impl PollMetrics {
    /// Record a poll by outcome (`pending`, `finished`, `not_found`, `error`).
    pub fn record(outcome: &'static str) {
        counter!("asyncreq_polls_total", "outcome" => outcome).increment(1);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[tokio::test]
    async fn test_metrics_server_creation() {
        let addr = "127.0.0.1:9000".parse().unwrap();
        let server = MetricsServer::new(addr);
        assert!(server.handle().is_none());
        assert!(server.render().is_none());
        assert_eq!(server.addr(), addr);
    }

    #[tokio::test]
    async fn test_metrics_server_render() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let mut server = MetricsServer::new(addr);

        server.start().unwrap();

        SubmissionMetrics::record_accepted(Duration::from_millis(3));
        WorkerMetrics::record_finalized(false);
        PollMetrics::record("pending");

        // The recorder is process-global; another test may have installed it first.
        if let Some(rendered) = server.render() {
            assert!(rendered.contains("asyncreq_submissions_total"));
            assert!(rendered.contains("asyncreq_finalized_total"));
            assert!(rendered.contains("asyncreq_polls_total"));
        }
    }
}
