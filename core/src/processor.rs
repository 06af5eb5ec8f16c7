//! The processing capability supplied by the caller.
//!
//! A [`Processor`] turns a submitted request into a terminal outcome. It is
//! injected once at construction and invoked by the worker pool, always
//! asynchronously relative to the submission that registered the request.
//!
//! Processing is opaque to the protocol: an implementation may compute inline,
//! await other services, or delegate further. The only contract is that it
//! eventually yields a single [`ProcessOutcome`]. Partial or streaming results
//! are not supported.
//!
//! # Example
//!
//! ```
//! use asyncreq_core::processor::{ProcessOutcome, ProcessRequest, Processor};
//! use std::future::Future;
//! use std::pin::Pin;
//!
//! struct Uppercase;
//!
//! impl Processor for Uppercase {
//!     fn process(
//!         &self,
//!         request: ProcessRequest,
//!     ) -> Pin<Box<dyn Future<Output = ProcessOutcome> + Send + '_>> {
//!         Box::pin(async move { ProcessOutcome::success(request.payload.to_uppercase()) })
//!     }
//! }
//! ```

use crate::record::RequestId;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A request handed to the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    /// Correlation identifier the outcome will be written under.
    pub request_id: RequestId,

    /// Payload as submitted by the caller.
    pub payload: String,
}

impl ProcessRequest {
    /// Create a new process request.
    #[must_use]
    pub fn new(request_id: RequestId, payload: impl Into<String>) -> Self {
        Self {
            request_id,
            payload: payload.into(),
        }
    }
}

/// Terminal outcome of processing a request.
///
/// An error outcome is a valid terminal state, not a system fault: it is
/// persisted as a finished record with `is_response_error` set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Response payload (or error description for failures).
    pub payload: String,

    /// Whether the processor reported an error.
    pub is_error: bool,
}

impl ProcessOutcome {
    /// A successful outcome.
    #[must_use]
    pub fn success(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            is_error: false,
        }
    }

    /// An error outcome.
    #[must_use]
    pub fn failure(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            is_error: true,
        }
    }
}

impl<E: std::fmt::Display> From<Result<String, E>> for ProcessOutcome {
    fn from(result: Result<String, E>) -> Self {
        match result {
            Ok(payload) => Self::success(payload),
            Err(e) => Self::failure(e.to_string()),
        }
    }
}

/// Caller-supplied processing logic.
///
/// # Dyn Compatibility
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so processors can be shared as
/// `Arc<dyn Processor>` across worker tasks.
pub trait Processor: Send + Sync {
    /// Process a request to a terminal outcome.
    fn process(
        &self,
        request: ProcessRequest,
    ) -> Pin<Box<dyn Future<Output = ProcessOutcome> + Send + '_>>;
}

impl<P: Processor + ?Sized> Processor for Arc<P> {
    fn process(
        &self,
        request: ProcessRequest,
    ) -> Pin<Box<dyn Future<Output = ProcessOutcome> + Send + '_>> {
        (**self).process(request)
    }
}
