//! # Async Request Core
//!
//! Core types and collaborator traits for the asynchronous request/response
//! correlation protocol.
//!
//! A caller submits a request and immediately receives an opaque correlation
//! identifier. Processing happens out-of-band, possibly in another process, and
//! the caller later polls for the result with that identifier. All coordination
//! happens through an external key-value store with publish/subscribe support.
//!
//! ## Core Concepts
//!
//! - **[`CorrelationRecord`](record::CorrelationRecord)**: The single persisted entity, either
//!   *Pending* or *Finished*
//! - **[`KeyValueStore`](kv_store::KeyValueStore)**: Get / set-with-expiry against the shared store
//! - **[`MessageBus`](message_bus::MessageBus)**: Publish / subscribe used for cross-process dispatch
//! - **[`Processor`](processor::Processor)**: The caller-supplied business logic
//! - **[`Clock`](environment::Clock)**: Injected time source
//!
//! ## Lifecycle
//!
//! ```text
//!  submit ──► put(Pending, ttl) ──► dispatch ──► process ──► get ──► put(Finished, ttl)
//!                   ▲                                                     │
//!                   └──────────────── poll (any time) ◄───────────────────┘
//! ```
//!
//! This crate performs no I/O. The runtime lives in `asyncreq-runtime`, the Redis
//! implementations in `asyncreq-redis`, and in-memory doubles in `asyncreq-testing`.

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

/// Request and response shapes exposed to callers
pub mod api;

/// Key-value store abstraction (get / set-with-expiry)
pub mod kv_store;

/// Publish/subscribe abstraction used for cross-process dispatch
pub mod message_bus;

/// The caller-supplied processing capability
pub mod processor;

/// The persisted correlation record and its identifier
pub mod record;

/// Environment module - Injected dependencies
///
/// Traits that abstract the ambient world so the protocol stays
/// deterministic under test.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use asyncreq_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// assert!(clock.now_millis() > 0);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;

        /// Current time as milliseconds since the Unix epoch
        fn now_millis(&self) -> i64 {
            self.now().timestamp_millis()
        }
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

pub use api::{PollResult, SubmissionResult, SubmitRequest};
pub use kv_store::{KeyValueError, KeyValueStore};
pub use message_bus::{MessageBus, MessageBusError, MessageStream};
pub use processor::{ProcessOutcome, ProcessRequest, Processor};
pub use record::{CorrelationRecord, DispatchMessage, RecordError, RecordState, RequestId};

#[cfg(test)]
mod tests {
    use super::environment::{Clock, SystemClock};

    #[test]
    fn test_system_clock_reports_epoch_millis() {
        let clock = SystemClock;
        let before = chrono::Utc::now().timestamp_millis();
        let now = clock.now_millis();
        let after = chrono::Utc::now().timestamp_millis();
        assert!(before <= now && now <= after);
    }
}
