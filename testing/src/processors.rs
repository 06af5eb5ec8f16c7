//! Scripted processors.

use asyncreq_core::processor::{ProcessOutcome, ProcessRequest, Processor};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Semaphore, watch};

type ProcessFuture<'a> = Pin<Box<dyn Future<Output = ProcessOutcome> + Send + 'a>>;

/// Responds with the request payload unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoProcessor;

impl Processor for EchoProcessor {
    fn process(&self, request: ProcessRequest) -> ProcessFuture<'_> {
        Box::pin(async move { ProcessOutcome::success(request.payload) })
    }
}

/// Always reports an error outcome with a fixed message.
#[derive(Debug, Clone)]
pub struct FailingProcessor {
    message: String,
}

impl FailingProcessor {
    /// Create a processor failing with `message`
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Processor for FailingProcessor {
    fn process(&self, _request: ProcessRequest) -> ProcessFuture<'_> {
        let message = self.message.clone();
        Box::pin(async move { ProcessOutcome::failure(message) })
    }
}

/// Computes the outcome with a synchronous closure.
///
/// # Example
///
/// ```
/// use asyncreq_testing::FnProcessor;
/// use asyncreq_core::processor::ProcessOutcome;
///
/// let upper = FnProcessor::new(|req| ProcessOutcome::success(req.payload.to_uppercase()));
/// ```
pub struct FnProcessor<F> {
    f: F,
}

impl<F> FnProcessor<F>
where
    F: Fn(ProcessRequest) -> ProcessOutcome + Send + Sync,
{
    /// Wrap `f` as a processor
    #[must_use]
    pub const fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Processor for FnProcessor<F>
where
    F: Fn(ProcessRequest) -> ProcessOutcome + Send + Sync,
{
    fn process(&self, request: ProcessRequest) -> ProcessFuture<'_> {
        let outcome = (self.f)(request);
        Box::pin(async move { outcome })
    }
}

impl<F> std::fmt::Debug for FnProcessor<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnProcessor").finish_non_exhaustive()
    }
}

/// Echoes after sleeping for a fixed delay (honours paused test time).
#[derive(Debug, Clone, Copy)]
pub struct DelayedProcessor {
    delay: Duration,
}

impl DelayedProcessor {
    /// Create a processor that sleeps `delay` before echoing
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Processor for DelayedProcessor {
    fn process(&self, request: ProcessRequest) -> ProcessFuture<'_> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            ProcessOutcome::success(request.payload)
        })
    }
}

/// Panics while processing.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanickingProcessor;

impl Processor for PanickingProcessor {
    #[allow(clippy::panic)]
    fn process(&self, request: ProcessRequest) -> ProcessFuture<'_> {
        Box::pin(async move { panic!("processor exploded on {}", request.request_id) })
    }
}

#[derive(Debug)]
struct Gate {
    permits: Semaphore,
    started: watch::Sender<usize>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

/// Echoes, but only once released.
///
/// Each request blocks until [`release`](Self::release) hands out a permit, so
/// tests can observe the pending state and measure concurrency. Clones share
/// the gate.
#[derive(Debug, Clone)]
pub struct GatedProcessor {
    gate: Arc<Gate>,
}

impl Default for GatedProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl GatedProcessor {
    /// Create a closed gate
    #[must_use]
    pub fn new() -> Self {
        Self {
            gate: Arc::new(Gate {
                permits: Semaphore::new(0),
                started: watch::channel(0).0,
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
            }),
        }
    }

    /// Let `n` more requests complete
    pub fn release(&self, n: usize) {
        self.gate.permits.add_permits(n);
    }

    /// Wait until at least `n` requests have entered the processor
    pub async fn wait_for_started(&self, n: usize) {
        let mut started = self.gate.started.subscribe();
        let _ = started.wait_for(|count| *count >= n).await;
    }

    /// Number of requests that have entered the processor
    #[must_use]
    pub fn started(&self) -> usize {
        *self.gate.started.borrow()
    }

    /// Number of requests currently blocked in the processor
    #[must_use]
    pub fn active(&self) -> usize {
        self.gate.active.load(Ordering::SeqCst)
    }

    /// Highest number of requests ever blocked in the processor at once
    #[must_use]
    pub fn max_active(&self) -> usize {
        self.gate.max_active.load(Ordering::SeqCst)
    }
}

impl Processor for GatedProcessor {
    fn process(&self, request: ProcessRequest) -> ProcessFuture<'_> {
        Box::pin(async move {
            let gate = &self.gate;
            let active = gate.active.fetch_add(1, Ordering::SeqCst) + 1;
            gate.max_active.fetch_max(active, Ordering::SeqCst);
            gate.started.send_modify(|count| *count += 1);

            if let Ok(permit) = gate.permits.acquire().await {
                permit.forget();
            }

            gate.active.fetch_sub(1, Ordering::SeqCst);
            ProcessOutcome::success(request.payload)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asyncreq_core::record::RequestId;

    fn request(payload: &str) -> ProcessRequest {
        ProcessRequest::new(RequestId::new("r"), payload)
    }

    #[tokio::test]
    async fn test_scripted_outcomes() {
        assert_eq!(
            EchoProcessor.process(request("x")).await,
            ProcessOutcome::success("x")
        );
        assert_eq!(
            FailingProcessor::new("boom").process(request("x")).await,
            ProcessOutcome::failure("boom")
        );
        let upper = FnProcessor::new(|req| ProcessOutcome::success(req.payload.to_uppercase()));
        assert_eq!(upper.process(request("ab")).await, ProcessOutcome::success("AB"));
    }

    #[tokio::test]
    async fn test_gate_holds_until_released() {
        let gated = GatedProcessor::new();
        let task = {
            let gated = gated.clone();
            tokio::spawn(async move { gated.process(request("x")).await })
        };

        gated.wait_for_started(1).await;
        assert_eq!(gated.active(), 1);
        assert!(!task.is_finished());

        gated.release(1);
        assert_eq!(task.await.ok(), Some(ProcessOutcome::success("x")));
        assert_eq!(gated.active(), 0);
        assert_eq!(gated.max_active(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_processor_sleeps() {
        let started = tokio::time::Instant::now();
        let outcome = DelayedProcessor::new(Duration::from_secs(3))
            .process(request("x"))
            .await;

        assert_eq!(outcome, ProcessOutcome::success("x"));
        assert!(started.elapsed() >= Duration::from_secs(3));
    }
}
