//! # Async Request Runtime
//!
//! Runtime for the asynchronous request/response correlation protocol.
//!
//! A caller submits a request, receives an opaque correlation identifier
//! immediately, and polls for the result later while processing happens
//! out-of-band.
//!
//! ## Core Components
//!
//! - **[`RecordStore`]**: Typed get / put-with-TTL of correlation records
//! - **[`SubmissionHandler`]**: Registers a pending record, then triggers dispatch
//! - **[`WorkerPool`]**: Bounded, drainable pool that runs the processor and finalizes records
//! - **[`DispatchSubscriber`]**: Consumes broadcast dispatch messages into the worker pool
//! - **[`PollHandler`]**: Reports pending / finished for an identifier
//! - **[`AsyncRequestService`]**: Facade wiring the above from configuration
//!
//! ## Control Flow
//!
//! ```text
//! submit ─► RecordStore::put(Pending) ─► Dispatcher ─┬─► WorkerPool (in-process)
//!                                                    └─► MessageBus ─► DispatchSubscriber ─► WorkerPool
//!
//! WorkerPool: Processor::process ─► RecordStore::get ─► merge ─► RecordStore::put(Finished)
//!
//! poll ─► RecordStore::get ─► PollResult
//! ```
//!
//! All coordination happens through the external store; components share no
//! in-memory state beyond the worker pool's own bookkeeping.
//!
//! ## Example
//!
//! ```ignore
//! use asyncreq_runtime::AsyncRequestService;
//! use asyncreq_core::api::SubmitRequest;
//!
//! let service = AsyncRequestService::builder()
//!     .kv_store(store)
//!     .processor(processor)
//!     .build()?;
//!
//! let submitted = service.submit(SubmitRequest::new("x")).await;
//! let status = service.poll(&submitted.id()).await?;
//! assert!(!status.is_request_finished);
//! ```

/// Runtime configuration
pub mod config;

/// Dead letter queue for abandoned requests
pub mod dead_letter;

/// Prometheus metrics for observability
pub mod metrics;

/// Poll handler
pub mod poll;

/// Record store adapter
pub mod record_store;

/// Service facade and builder
pub mod service;

/// Submission handler and dispatcher
pub mod submit;

/// Broadcast dispatch subscriber
pub mod subscriber;

/// Bounded worker pool and record finalization
pub mod worker;

/// Error types for the correlation runtime
pub mod error {
    use asyncreq_core::record::RequestId;
    use thiserror::Error;

    /// Errors from the record store adapter.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// No live record exists for the identifier (never issued or expired)
        #[error("Record not found: {0}")]
        NotFound(RequestId),

        /// The store could not be reached or rejected the operation
        #[error("Store transport error: {0}")]
        Transport(String),

        /// The record could not be encoded or the stored value could not be decoded
        #[error("Record serialization error: {0}")]
        Serialization(String),
    }

    impl StoreError {
        /// Whether this error is a lookup miss.
        #[must_use]
        pub const fn is_not_found(&self) -> bool {
            matches!(self, Self::NotFound(_))
        }
    }

    /// Errors surfaced to pollers.
    ///
    /// Every variant is distinct from a legitimate "not finished" result.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum PollError {
        /// Identifier unknown or its record has expired
        #[error("Request not found: {0}")]
        NotFound(RequestId),

        /// The store read failed for transport reasons
        #[error("Store read failed: {0}")]
        Store(String),

        /// The stored record could not be decoded
        #[error("Record decode failed: {0}")]
        Decode(String),
    }

    impl From<StoreError> for PollError {
        fn from(err: StoreError) -> Self {
            match err {
                StoreError::NotFound(id) => Self::NotFound(id),
                StoreError::Transport(reason) => Self::Store(reason),
                StoreError::Serialization(reason) => Self::Decode(reason),
            }
        }
    }

    /// Worker-side failures.
    ///
    /// These are reported to the operational observer and the dead letter
    /// queue; they are never retried and never propagated to a caller.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum DispatchError {
        /// The pending record could not be read back after processing
        #[error("Read-back failed for {request_id}: {source}")]
        ReadBack {
            /// The request being finalized
            request_id: RequestId,
            /// Underlying store error
            source: StoreError,
        },

        /// The record was already finished, so this outcome was discarded
        #[error("Request {0} already finished, outcome discarded")]
        AlreadyFinished(RequestId),

        /// The finished record could not be written
        #[error("Finalize write failed for {request_id}: {source}")]
        Finalize {
            /// The request being finalized
            request_id: RequestId,
            /// Underlying store error
            source: StoreError,
        },

        /// A dispatch message could not be decoded
        #[error("Malformed dispatch message: {0}")]
        MalformedMessage(String),

        /// The subscription stream reported an error
        #[error("Dispatch stream error: {0}")]
        Stream(String),

        /// Subscribing to the dispatch channel failed
        #[error("Subscription failed: {0}")]
        Subscribe(String),

        /// Publishing a dispatch message failed
        #[error("Publish failed: {0}")]
        Publish(String),

        /// The worker pool is shutting down and not accepting new requests
        #[error("Worker pool is shutting down")]
        ShuttingDown,

        /// A dispatch message was consumed after the pool stopped accepting work
        #[error("Request {request_id} consumed during shutdown, never processed")]
        Undelivered {
            /// The consumed request
            request_id: RequestId,
            /// Its request payload, kept for replay
            payload: String,
        },
    }

    impl DispatchError {
        /// The request this failure concerns, when known.
        #[must_use]
        pub const fn request_id(&self) -> Option<&RequestId> {
            match self {
                Self::ReadBack { request_id, .. }
                | Self::Finalize { request_id, .. }
                | Self::Undelivered { request_id, .. }
                | Self::AlreadyFinished(request_id) => Some(request_id),
                _ => None,
            }
        }
    }

    /// Errors from worker pool lifecycle operations.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum WorkerError {
        /// Shutdown timed out waiting for in-flight requests
        #[error("Shutdown timed out with {0} requests still in flight")]
        ShutdownTimeout(usize),
    }

    /// Configuration errors.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum ConfigError {
        /// A configuration value is missing its required form
        #[error("Invalid configuration value for {key}: {reason}")]
        InvalidValue {
            /// The offending key
            key: String,
            /// Why it was rejected
            reason: String,
        },

        /// A collaborator required by the chosen configuration was not supplied
        #[error("Missing component: {0}")]
        MissingComponent(&'static str),
    }

    impl ConfigError {
        /// Shorthand for [`ConfigError::InvalidValue`].
        #[must_use]
        pub fn invalid(key: &str, reason: &str) -> Self {
            Self::InvalidValue {
                key: key.to_string(),
                reason: reason.to_string(),
            }
        }
    }

    /// Errors from the [`AsyncRequestService`](crate::service::AsyncRequestService) facade.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum ServiceError {
        /// Invalid or incomplete configuration
        #[error(transparent)]
        Config(#[from] ConfigError),

        /// Dispatch plumbing failed
        #[error(transparent)]
        Dispatch(#[from] DispatchError),

        /// Worker pool lifecycle failed
        #[error(transparent)]
        Worker(#[from] WorkerError),
    }
}

/// Overall state of a runtime component, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HealthStatus {
    /// Accepting requests with room left in the dead letter queue
    Healthy,

    /// Still finalizing requests, but draining for shutdown or the dead
    /// letter queue is past half full
    Degraded,

    /// The dead letter queue is full and abandoned requests are being evicted
    Unhealthy,
}

impl HealthStatus {
    /// `true` for [`HealthStatus::Healthy`]
    #[must_use]
    pub const fn is_healthy(self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// `true` for [`HealthStatus::Degraded`]
    #[must_use]
    pub const fn is_degraded(self) -> bool {
        matches!(self, Self::Degraded)
    }

    /// `true` for [`HealthStatus::Unhealthy`]
    #[must_use]
    pub const fn is_unhealthy(self) -> bool {
        matches!(self, Self::Unhealthy)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        })
    }
}

/// Snapshot returned by [`WorkerPool::health`](worker::WorkerPool::health).
///
/// `metadata` carries the gauges behind the verdict (in-flight count,
/// concurrency limit, dead letter size and capacity) as string pairs so they
/// can be logged or served as-is.
#[derive(Debug, Clone)]
pub struct HealthCheck {
    /// Component name, e.g. `worker_pool`
    pub component: String,

    /// Verdict
    pub status: HealthStatus,

    /// Why the component is not healthy
    pub message: Option<String>,

    /// Supporting gauges
    pub metadata: Vec<(String, String)>,
}

impl HealthCheck {
    fn with_status(component: impl Into<String>, status: HealthStatus, message: Option<String>) -> Self {
        Self {
            component: component.into(),
            status,
            message,
            metadata: Vec::new(),
        }
    }

    /// A healthy verdict
    #[must_use]
    pub fn healthy(component: impl Into<String>) -> Self {
        Self::with_status(component, HealthStatus::Healthy, None)
    }

    /// A degraded verdict with its reason
    #[must_use]
    pub fn degraded(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(component, HealthStatus::Degraded, Some(message.into()))
    }

    /// An unhealthy verdict with its reason
    #[must_use]
    pub fn unhealthy(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(component, HealthStatus::Unhealthy, Some(message.into()))
    }

    /// Attach a supporting gauge
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }

    /// Look up a supporting gauge by key
    #[must_use]
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

pub use config::{AsyncRequestConfig, DispatchMode};
pub use dead_letter::{DeadLetter, DeadLetterQueue};
pub use error::{ConfigError, DispatchError, PollError, ServiceError, StoreError, WorkerError};
pub use poll::PollHandler;
pub use record_store::RecordStore;
pub use service::{AsyncRequestService, AsyncRequestServiceBuilder};
pub use submit::{Dispatcher, SubmissionHandler};
pub use subscriber::DispatchSubscriber;
pub use worker::{AbandonedRequest, DispatchReport, WorkerPool, finalize};
