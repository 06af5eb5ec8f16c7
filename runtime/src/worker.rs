//! Bounded worker pool and record finalization.
//!
//! Every dispatched request becomes one task on the pool:
//!
//! 1. Wait for one of `max_concurrency` permits
//! 2. Run the [`Processor`] to a terminal [`ProcessOutcome`]
//! 3. Read the pending record back from the store
//! 4. Merge the outcome into it (identifier, request payload and creation time are reused)
//! 5. Overwrite the record with the finished version
//!
//! Failures in steps 3-5 are not retried. They are reported on the
//! [`DispatchReport`] channel, counted, and pushed onto the dead letter queue;
//! the request is left as the store holds it (typically pending until its TTL
//! elapses). One request's failure never affects another's.
//!
//! In-flight work is counted from the moment a request is accepted until its
//! task completes, so [`WorkerPool::shutdown`] can stop intake and drain.

use crate::config::AsyncRequestConfig;
use crate::dead_letter::DeadLetterQueue;
use crate::error::{DispatchError, WorkerError};
use crate::metrics::{DispatchMetrics, WorkerMetrics};
use crate::record_store::RecordStore;
use crate::HealthCheck;
use asyncreq_core::processor::{ProcessOutcome, ProcessRequest, Processor};
use asyncreq_core::record::{CorrelationRecord, RequestId};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, broadcast, watch};

/// Operational report emitted for every request the pool handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchReport {
    /// The finished record was written.
    Finalized {
        /// The finalized request
        request_id: RequestId,
        /// Whether the processor reported an error outcome
        is_error: bool,
    },

    /// The request's outcome will never be recorded (processing ran but the
    /// write-back failed, or the request was consumed during shutdown).
    Abandoned {
        /// The abandoned request
        request_id: RequestId,
        /// Why it was abandoned
        reason: String,
    },

    /// A dispatch message was dropped before reaching the processor.
    Rejected {
        /// Why it was rejected
        reason: String,
    },
}

/// Dead letter entry payload for abandoned or rejected work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbandonedRequest {
    /// The affected request, when known
    pub request_id: Option<RequestId>,
    /// The failure that caused it to be abandoned
    pub error: DispatchError,
}

/// Read back the pending record for `request_id`, merge `outcome`, and write it.
///
/// A record that is already finished is left untouched: under at-least-once
/// delivery the same request may be processed twice, and the first recorded
/// outcome wins.
///
/// # Errors
///
/// - [`DispatchError::ReadBack`] if the record cannot be read (e.g. expired)
/// - [`DispatchError::AlreadyFinished`] if the record is already finished
/// - [`DispatchError::Finalize`] if the finished record cannot be written
pub async fn finalize(
    store: &RecordStore,
    request_id: &RequestId,
    outcome: &ProcessOutcome,
) -> Result<CorrelationRecord, DispatchError> {
    let pending = store
        .get(request_id)
        .await
        .map_err(|source| DispatchError::ReadBack {
            request_id: request_id.clone(),
            source,
        })?;

    if pending.is_finished() {
        return Err(DispatchError::AlreadyFinished(request_id.clone()));
    }

    let finished = pending.finish(outcome);
    store
        .put(&finished)
        .await
        .map_err(|source| DispatchError::Finalize {
            request_id: request_id.clone(),
            source,
        })?;

    Ok(finished)
}

struct PoolInner {
    store: RecordStore,
    processor: Arc<dyn Processor>,
    permits: Arc<Semaphore>,
    max_concurrency: usize,
    accepting: AtomicBool,
    in_flight: watch::Sender<usize>,
    reports: broadcast::Sender<DispatchReport>,
    dlq: DeadLetterQueue<AbandonedRequest>,
}

impl PoolInner {
    fn report(&self, report: DispatchReport) {
        // No subscribers is fine; reports are best-effort observation.
        let _ = self.reports.send(report);
    }

    fn abandon(&self, error: DispatchError) {
        let request_id = error.request_id().cloned();

        match &request_id {
            Some(id) => {
                tracing::warn!(request_id = %id, error = %error, "Request abandoned");
                WorkerMetrics::record_abandoned();
                self.report(DispatchReport::Abandoned {
                    request_id: id.clone(),
                    reason: error.to_string(),
                });
            }
            None => {
                tracing::warn!(error = %error, "Dispatch message rejected");
                DispatchMetrics::record_rejected();
                self.report(DispatchReport::Rejected {
                    reason: error.to_string(),
                });
            }
        }

        let message = error.to_string();
        self.dlq.push(AbandonedRequest { request_id, error }, message);
    }

    async fn execute(&self, request: ProcessRequest) {
        let request_id = request.request_id.clone();
        tracing::debug!(request_id = %request_id, "Processing request");

        let started = Instant::now();
        let outcome = match AssertUnwindSafe(async { self.processor.process(request).await })
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::error!(request_id = %request_id, "Processor panicked");
                ProcessOutcome::failure("processor panicked")
            }
        };
        WorkerMetrics::record_processing(started.elapsed());

        match finalize(&self.store, &request_id, &outcome).await {
            Ok(_) => {
                tracing::info!(
                    request_id = %request_id,
                    is_error = outcome.is_error,
                    elapsed_ms = started.elapsed().as_millis(),
                    "Request finalized"
                );
                WorkerMetrics::record_finalized(outcome.is_error);
                self.report(DispatchReport::Finalized {
                    request_id,
                    is_error: outcome.is_error,
                });
            }
            Err(error) => self.abandon(error),
        }
    }
}

/// Counts a request as in flight until dropped.
struct InFlightGuard(Arc<PoolInner>);

impl InFlightGuard {
    fn new(inner: Arc<PoolInner>) -> Self {
        inner.in_flight.send_modify(|n| *n += 1);
        WorkerMetrics::record_in_flight(*inner.in_flight.borrow());
        Self(inner)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.send_modify(|n| *n = n.saturating_sub(1));
        WorkerMetrics::record_in_flight(*self.0.in_flight.borrow());
    }
}

/// Bounded pool running the processor and finalizing records.
///
/// Cheap to clone; clones share permits, counters and the report channel.
///
/// # Example
///
/// ```ignore
/// let pool = WorkerPool::new(record_store, Arc::new(MyProcessor), &config);
/// let mut reports = pool.subscribe_reports();
///
/// pool.dispatch(ProcessRequest::new(id, "payload"))?;
///
/// if let Ok(DispatchReport::Finalized { request_id, .. }) = reports.recv().await {
///     println!("{request_id} done");
/// }
///
/// pool.shutdown(Duration::from_secs(30)).await?;
/// ```
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    /// Create a pool sized by `config.max_concurrency`.
    #[must_use]
    pub fn new(
        store: RecordStore,
        processor: Arc<dyn Processor>,
        config: &AsyncRequestConfig,
    ) -> Self {
        let (in_flight, _) = watch::channel(0);
        let (reports, _) = broadcast::channel(config.report_capacity.max(1));
        let max_concurrency = config.max_concurrency.max(1);

        Self {
            inner: Arc::new(PoolInner {
                store,
                processor,
                permits: Arc::new(Semaphore::new(max_concurrency)),
                max_concurrency,
                accepting: AtomicBool::new(true),
                in_flight,
                reports,
                dlq: DeadLetterQueue::new(config.dlq_max_size.max(1)),
            }),
        }
    }

    /// Accept a request without waiting for capacity.
    ///
    /// The task is queued behind the concurrency limit and this call returns
    /// immediately; the caller never waits for processing. Only execution is
    /// bounded: every accepted request holds a spawned task until a permit
    /// frees up, so the backlog grows with the submission rate. Callers that
    /// need backpressure use [`dispatch_when_ready`](Self::dispatch_when_ready).
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ShuttingDown`] once [`shutdown`](Self::shutdown)
    /// has been called.
    pub fn dispatch(&self, request: ProcessRequest) -> Result<(), DispatchError> {
        let guard = self.admit()?;
        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            let _guard = guard;
            let Ok(permit) = Arc::clone(&inner.permits).acquire_owned().await else {
                return;
            };
            Self::run(&inner, request, permit).await;
        });

        Ok(())
    }

    /// Accept a request once a concurrency permit is available.
    ///
    /// Used by the dispatch subscriber so a full pool applies backpressure to
    /// the message stream instead of queueing unboundedly.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ShuttingDown`] once [`shutdown`](Self::shutdown)
    /// has been called.
    pub async fn dispatch_when_ready(&self, request: ProcessRequest) -> Result<(), DispatchError> {
        let guard = self.admit()?;
        let permit = Arc::clone(&self.inner.permits)
            .acquire_owned()
            .await
            .map_err(|_| DispatchError::ShuttingDown)?;
        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            let _guard = guard;
            Self::run(&inner, request, permit).await;
        });

        Ok(())
    }

    /// Record a dispatch message that never reached the processor.
    pub fn reject(&self, error: DispatchError) {
        self.inner.abandon(error);
    }

    fn admit(&self) -> Result<InFlightGuard, DispatchError> {
        // Count first, then check, so shutdown never observes zero while a
        // request is being admitted.
        let guard = InFlightGuard::new(Arc::clone(&self.inner));
        if self.inner.accepting.load(Ordering::Acquire) {
            Ok(guard)
        } else {
            Err(DispatchError::ShuttingDown)
        }
    }

    async fn run(inner: &PoolInner, request: ProcessRequest, permit: OwnedSemaphorePermit) {
        inner.execute(request).await;
        drop(permit);
    }

    /// Stop accepting requests and wait for in-flight ones to finish.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::ShutdownTimeout`] with the number of requests
    /// still in flight if they do not finish within `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), WorkerError> {
        tracing::info!(
            in_flight = self.in_flight(),
            timeout_ms = timeout.as_millis(),
            "Worker pool shutting down"
        );
        self.inner.accepting.store(false, Ordering::Release);

        let mut in_flight = self.inner.in_flight.subscribe();
        let drained = tokio::time::timeout(timeout, in_flight.wait_for(|n| *n == 0))
            .await
            .is_ok();

        if drained {
            tracing::info!("Worker pool drained");
            Ok(())
        } else {
            let pending = self.in_flight();
            tracing::error!(in_flight = pending, "Worker pool shutdown timed out");
            Err(WorkerError::ShutdownTimeout(pending))
        }
    }

    /// Number of requests accepted and not yet completed.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        *self.inner.in_flight.borrow()
    }

    /// Whether the pool still accepts requests.
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        self.inner.accepting.load(Ordering::Acquire)
    }

    /// Maximum number of requests processed concurrently.
    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        self.inner.max_concurrency
    }

    /// Subscribe to operational reports.
    #[must_use]
    pub fn subscribe_reports(&self) -> broadcast::Receiver<DispatchReport> {
        self.inner.reports.subscribe()
    }

    /// Access the dead letter queue of abandoned requests.
    #[must_use]
    pub fn dead_letters(&self) -> DeadLetterQueue<AbandonedRequest> {
        self.inner.dlq.clone()
    }

    /// The record store this pool finalizes into.
    #[must_use]
    pub fn record_store(&self) -> &RecordStore {
        &self.inner.store
    }

    /// Perform a health check on the pool.
    ///
    /// Checks:
    /// - Dead letter queue size (degraded if > 50% capacity, unhealthy if full)
    /// - Whether the pool still accepts work (degraded once shutting down)
    #[must_use]
    pub fn health(&self) -> HealthCheck {
        let dlq_size = self.inner.dlq.len();
        let dlq_capacity = self.inner.dlq.max_size();
        #[allow(clippy::cast_precision_loss)] // queue sizes < 2^52
        let dlq_usage = (dlq_size as f64 / dlq_capacity as f64) * 100.0;

        let check = if dlq_size >= dlq_capacity {
            HealthCheck::unhealthy(
                "worker_pool",
                "Dead letter queue full, oldest abandoned requests are being evicted",
            )
        } else if dlq_usage > 50.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let usage_pct = dlq_usage as u32;
            HealthCheck::degraded(
                "worker_pool",
                format!("{usage_pct}% of dead letter capacity holds abandoned requests"),
            )
        } else if !self.is_accepting() {
            HealthCheck::degraded("worker_pool", "Draining for shutdown, new requests rejected")
        } else {
            HealthCheck::healthy("worker_pool")
        };

        check
            .with_metadata("in_flight", self.in_flight().to_string())
            .with_metadata("max_concurrency", self.inner.max_concurrency.to_string())
            .with_metadata("dlq_size", dlq_size.to_string())
            .with_metadata("dlq_capacity", dlq_capacity.to_string())
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("max_concurrency", &self.inner.max_concurrency)
            .field("in_flight", &self.in_flight())
            .field("accepting", &self.is_accepting())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::error::StoreError;
    use asyncreq_testing::{
        EchoProcessor, FnProcessor, GatedProcessor, InMemoryKeyValueStore, PanickingProcessor,
    };

    fn record_store(kv: &InMemoryKeyValueStore) -> RecordStore {
        RecordStore::new(Arc::new(kv.clone()), Duration::from_secs(30))
    }

    async fn seed_pending(store: &RecordStore, payload: &str) -> CorrelationRecord {
        let record = CorrelationRecord::pending(RequestId::generate(), payload, 1_000);
        store.put(&record).await.unwrap();
        record
    }

    async fn next_report(reports: &mut broadcast::Receiver<DispatchReport>) -> DispatchReport {
        tokio::time::timeout(Duration::from_secs(5), reports.recv())
            .await
            .expect("report should arrive")
            .expect("report channel open")
    }

    #[tokio::test]
    async fn test_finalize_merges_outcome_into_pending_record() {
        let kv = InMemoryKeyValueStore::new();
        let store = record_store(&kv);
        let pending = seed_pending(&store, "x").await;

        let finished = finalize(&store, &pending.request_id, &ProcessOutcome::success("y"))
            .await
            .unwrap();

        assert_eq!(finished.request_payload, "x");
        assert_eq!(finished.created_at, 1_000);
        assert_eq!(finished.response_payload, "y");
        assert!(finished.is_response_finished);
        assert_eq!(store.get(&pending.request_id).await.unwrap(), finished);
    }

    #[tokio::test]
    async fn test_finalize_missing_record_is_read_back_error() {
        let store = record_store(&InMemoryKeyValueStore::new());
        let id = RequestId::new("expired");

        let err = finalize(&store, &id, &ProcessOutcome::success("y"))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            DispatchError::ReadBack {
                request_id: id,
                source: StoreError::NotFound(RequestId::new("expired")),
            }
        );
    }

    #[tokio::test]
    async fn test_finalize_never_overwrites_finished_record() {
        let kv = InMemoryKeyValueStore::new();
        let store = record_store(&kv);
        let pending = seed_pending(&store, "x").await;
        finalize(&store, &pending.request_id, &ProcessOutcome::success("first"))
            .await
            .unwrap();

        let err = finalize(&store, &pending.request_id, &ProcessOutcome::success("second"))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::AlreadyFinished(_)));
        let stored = store.get(&pending.request_id).await.unwrap();
        assert_eq!(stored.response_payload, "first");
    }

    #[tokio::test]
    async fn test_finalize_write_failure_leaves_record_pending() {
        let kv = InMemoryKeyValueStore::new();
        let store = record_store(&kv);
        let pending = seed_pending(&store, "x").await;
        kv.fail_writes(true);

        let err = finalize(&store, &pending.request_id, &ProcessOutcome::success("y"))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Finalize { .. }));
        kv.fail_writes(false);
        assert!(!store.get(&pending.request_id).await.unwrap().is_finished());
    }

    #[tokio::test]
    async fn test_dispatch_processes_and_reports() {
        let kv = InMemoryKeyValueStore::new();
        let store = record_store(&kv);
        let pending = seed_pending(&store, "hello").await;
        let pool = WorkerPool::new(
            store.clone(),
            Arc::new(EchoProcessor),
            &AsyncRequestConfig::default(),
        );
        let mut reports = pool.subscribe_reports();

        pool.dispatch(ProcessRequest::new(pending.request_id.clone(), "hello"))
            .unwrap();

        assert_eq!(
            next_report(&mut reports).await,
            DispatchReport::Finalized {
                request_id: pending.request_id.clone(),
                is_error: false,
            }
        );
        let stored = store.get(&pending.request_id).await.unwrap();
        assert_eq!(stored.response_payload, "hello");
    }

    #[tokio::test]
    async fn test_error_outcome_is_recorded_as_finished_error() {
        let kv = InMemoryKeyValueStore::new();
        let store = record_store(&kv);
        let pending = seed_pending(&store, "bad").await;
        let processor = FnProcessor::new(|req| ProcessOutcome::failure(format!("rejected {}", req.payload)));
        let pool = WorkerPool::new(store.clone(), Arc::new(processor), &AsyncRequestConfig::default());
        let mut reports = pool.subscribe_reports();

        pool.dispatch(ProcessRequest::new(pending.request_id.clone(), "bad"))
            .unwrap();

        assert!(matches!(
            next_report(&mut reports).await,
            DispatchReport::Finalized { is_error: true, .. }
        ));
        let stored = store.get(&pending.request_id).await.unwrap();
        assert!(stored.is_response_finished);
        assert!(stored.is_response_error);
        assert_eq!(stored.response_payload, "rejected bad");
    }

    #[tokio::test]
    async fn test_processor_panic_becomes_error_outcome() {
        let kv = InMemoryKeyValueStore::new();
        let store = record_store(&kv);
        let pending = seed_pending(&store, "x").await;
        let pool = WorkerPool::new(store.clone(), Arc::new(PanickingProcessor), &AsyncRequestConfig::default());
        let mut reports = pool.subscribe_reports();

        pool.dispatch(ProcessRequest::new(pending.request_id.clone(), "x"))
            .unwrap();

        assert!(matches!(
            next_report(&mut reports).await,
            DispatchReport::Finalized { is_error: true, .. }
        ));
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_requests_land_in_dead_letter_queue() {
        let kv = InMemoryKeyValueStore::new();
        let pool = WorkerPool::new(record_store(&kv), Arc::new(EchoProcessor), &AsyncRequestConfig::default());
        let mut reports = pool.subscribe_reports();

        // No pending record exists, so read-back fails.
        pool.dispatch(ProcessRequest::new(RequestId::new("ghost"), "x"))
            .unwrap();

        assert!(matches!(
            next_report(&mut reports).await,
            DispatchReport::Abandoned { ref request_id, .. } if request_id.as_str() == "ghost"
        ));
        let dead = pool.dead_letters().drain();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].payload.request_id, Some(RequestId::new("ghost")));
        assert!(kv.is_empty());
    }

    #[tokio::test]
    async fn test_read_back_transport_failure_abandons_request() {
        let kv = InMemoryKeyValueStore::new();
        let store = record_store(&kv);
        let pending = seed_pending(&store, "x").await;
        let pool = WorkerPool::new(store.clone(), Arc::new(EchoProcessor), &AsyncRequestConfig::default());
        let mut reports = pool.subscribe_reports();
        kv.fail_reads(true);

        pool.dispatch(ProcessRequest::new(pending.request_id.clone(), "x"))
            .unwrap();

        assert!(matches!(
            next_report(&mut reports).await,
            DispatchReport::Abandoned { ref request_id, .. } if *request_id == pending.request_id
        ));
        let dead = pool.dead_letters().drain();
        assert_eq!(dead.len(), 1);
        assert!(matches!(
            dead[0].payload.error,
            DispatchError::ReadBack {
                source: StoreError::Transport(_),
                ..
            }
        ));

        kv.fail_reads(false);
        let stored = store.get(&pending.request_id).await.unwrap();
        assert!(!stored.is_finished());
        assert_eq!(stored, pending);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let kv = InMemoryKeyValueStore::new();
        let store = record_store(&kv);
        let gate = GatedProcessor::new();
        let config = AsyncRequestConfig::default().with_max_concurrency(2);
        let pool = WorkerPool::new(store.clone(), Arc::new(gate.clone()), &config);

        for i in 0..5 {
            let record = seed_pending(&store, &format!("p{i}")).await;
            pool.dispatch(ProcessRequest::new(record.request_id, record.request_payload))
                .unwrap();
        }

        gate.wait_for_started(2).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(gate.active(), 2);
        assert_eq!(pool.in_flight(), 5);

        gate.release(5);
        pool.shutdown(Duration::from_secs(5)).await.unwrap();
        assert_eq!(gate.max_active(), 2);
        assert_eq!(gate.started(), 5);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_work_and_drains() {
        let kv = InMemoryKeyValueStore::new();
        let store = record_store(&kv);
        let gate = GatedProcessor::new();
        let pool = WorkerPool::new(store.clone(), Arc::new(gate.clone()), &AsyncRequestConfig::default());
        let pending = seed_pending(&store, "x").await;
        pool.dispatch(ProcessRequest::new(pending.request_id.clone(), "x"))
            .unwrap();
        gate.wait_for_started(1).await;

        let shutdown = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.shutdown(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!pool.is_accepting());
        assert_eq!(
            pool.dispatch(ProcessRequest::new(RequestId::generate(), "late")),
            Err(DispatchError::ShuttingDown)
        );

        gate.release(1);
        shutdown.await.unwrap().unwrap();
        assert!(store.get(&pending.request_id).await.unwrap().is_finished());
    }

    #[tokio::test]
    async fn test_shutdown_times_out_with_stuck_work() {
        let kv = InMemoryKeyValueStore::new();
        let store = record_store(&kv);
        let gate = GatedProcessor::new();
        let pool = WorkerPool::new(store.clone(), Arc::new(gate.clone()), &AsyncRequestConfig::default());
        let pending = seed_pending(&store, "x").await;
        pool.dispatch(ProcessRequest::new(pending.request_id, "x"))
            .unwrap();
        gate.wait_for_started(1).await;

        let result = pool.shutdown(Duration::from_millis(50)).await;
        assert_eq!(result, Err(WorkerError::ShutdownTimeout(1)));

        gate.release(1);
    }

    #[tokio::test]
    async fn test_health_degrades_with_dead_letters() {
        let kv = InMemoryKeyValueStore::new();
        let config = AsyncRequestConfig::default().with_dlq_max_size(2);
        let pool = WorkerPool::new(record_store(&kv), Arc::new(EchoProcessor), &config);
        let health = pool.health();
        assert!(health.status.is_healthy());
        assert_eq!(health.metadata_value("dlq_capacity"), Some("2"));
        assert_eq!(health.metadata_value("in_flight"), Some("0"));

        pool.reject(DispatchError::MalformedMessage("a".to_string()));
        pool.reject(DispatchError::MalformedMessage("b".to_string()));
        let health = pool.health();
        assert!(health.status.is_unhealthy());
        assert_eq!(health.metadata_value("dlq_size"), Some("2"));

        pool.dead_letters().drain();
        pool.shutdown(Duration::from_millis(10)).await.unwrap();
        assert!(pool.health().status.is_degraded());
    }
}
