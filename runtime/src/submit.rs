//! Submission handler and dispatcher.
//!
//! A submission is registered before it is dispatched: the pending record is
//! written first, and only a successful write triggers dispatch. A poller can
//! therefore never observe an identifier whose record does not yet exist.

use crate::error::DispatchError;
use crate::metrics::{DispatchMetrics, SubmissionMetrics};
use crate::record_store::RecordStore;
use crate::worker::WorkerPool;
use asyncreq_core::api::{SubmissionResult, SubmitRequest};
use asyncreq_core::environment::Clock;
use asyncreq_core::message_bus::MessageBus;
use asyncreq_core::record::{CorrelationRecord, DispatchMessage, RequestId};
use std::sync::Arc;
use std::time::Instant;

/// How a registered request reaches the processor.
#[derive(Clone)]
pub enum Dispatcher {
    /// Schedule on the local worker pool.
    InProcess(WorkerPool),

    /// Publish a [`DispatchMessage`] for subscribers to consume.
    Broadcast {
        /// Bus to publish on
        bus: Arc<dyn MessageBus>,
        /// Channel name
        channel: String,
    },
}

impl Dispatcher {
    /// Hand `message` to the processor side without waiting for processing.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::ShuttingDown`] if the local pool no longer accepts work
    /// - [`DispatchError::Publish`] if the message cannot be encoded or published
    pub async fn dispatch(&self, message: DispatchMessage) -> Result<(), DispatchError> {
        match self {
            Self::InProcess(pool) => pool.dispatch(message.into()),
            Self::Broadcast { bus, channel } => {
                let json = message
                    .to_json()
                    .map_err(|e| DispatchError::Publish(e.to_string()))?;

                bus.publish(channel, json).await.map_err(|e| {
                    DispatchMetrics::record_publish_error();
                    DispatchError::Publish(e.to_string())
                })?;

                DispatchMetrics::record_published();
                tracing::debug!(
                    request_id = %message.request_id,
                    channel = %channel,
                    "Dispatch message published"
                );
                Ok(())
            }
        }
    }

    /// Whether new requests can be dispatched.
    ///
    /// A broadcast dispatcher always accepts; its subscribers decide for themselves.
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        match self {
            Self::InProcess(pool) => pool.is_accepting(),
            Self::Broadcast { .. } => true,
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InProcess(pool) => f.debug_tuple("InProcess").field(pool).finish(),
            Self::Broadcast { channel, .. } => f
                .debug_struct("Broadcast")
                .field("channel", channel)
                .finish_non_exhaustive(),
        }
    }
}

/// Registers pending records and triggers dispatch.
#[derive(Clone)]
pub struct SubmissionHandler {
    store: RecordStore,
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
}

impl SubmissionHandler {
    /// Create a handler.
    #[must_use]
    pub fn new(store: RecordStore, dispatcher: Dispatcher, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            dispatcher,
            clock,
        }
    }

    /// Submit a request.
    ///
    /// Returns as soon as the pending record is stored and dispatch has been
    /// triggered; processing happens later. Failures are reported in the
    /// returned [`SubmissionResult`] rather than as an `Err`.
    ///
    /// - Store write fails: `is_error = true`, nothing dispatched
    /// - Local pool shutting down: `is_error = true`
    /// - Publish fails after the write: still accepted, the record exists and
    ///   stays pending until its TTL elapses
    pub async fn submit(&self, request: SubmitRequest) -> SubmissionResult {
        let started = Instant::now();
        let request_id = RequestId::generate();

        if !self.dispatcher.is_accepting() {
            SubmissionMetrics::record_rejected();
            tracing::warn!(request_id = %request_id, "Submission rejected, service is shutting down");
            return SubmissionResult::rejected(&request_id, DispatchError::ShuttingDown.to_string());
        }

        let record = CorrelationRecord::pending(
            request_id.clone(),
            request.payload.clone(),
            self.clock.now_millis(),
        );

        if let Err(e) = self.store.put(&record).await {
            SubmissionMetrics::record_rejected();
            tracing::warn!(request_id = %request_id, error = %e, "Failed to register request");
            return SubmissionResult::rejected(&request_id, format!("failed to register request: {e}"));
        }

        let message = DispatchMessage::new(request_id.clone(), request.payload);
        match self.dispatcher.dispatch(message).await {
            Ok(()) => {}
            Err(DispatchError::ShuttingDown) => {
                SubmissionMetrics::record_rejected();
                tracing::warn!(
                    request_id = %request_id,
                    "Worker pool shut down after registration, request will expire"
                );
                return SubmissionResult::rejected(&request_id, DispatchError::ShuttingDown.to_string());
            }
            Err(e) => {
                tracing::error!(
                    request_id = %request_id,
                    error = %e,
                    "Dispatch failed after registration, request stays pending until expiry"
                );
            }
        }

        SubmissionMetrics::record_accepted(started.elapsed());
        tracing::info!(request_id = %request_id, "Request submitted");
        SubmissionResult::accepted(&request_id)
    }

    /// The dispatcher in use.
    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

impl std::fmt::Debug for SubmissionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionHandler")
            .field("store", &self.store)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}
