//! # Async Request Testing
//!
//! Testing utilities for the async request runtime.
//!
//! This crate provides:
//! - [`InMemoryKeyValueStore`]: TTL-honouring store with failure injection
//! - [`InMemoryMessageBus`]: per-channel broadcast bus with failure injection
//! - Scripted processors ([`EchoProcessor`], [`FnProcessor`], [`GatedProcessor`], [`DelayedProcessor`])
//! - [`FixedClock`]: deterministic time
//!
//! ## Example
//!
//! ```ignore
//! use asyncreq_testing::{EchoProcessor, InMemoryKeyValueStore, test_clock};
//! use asyncreq_runtime::AsyncRequestService;
//!
//! #[tokio::test]
//! async fn test_round_trip() {
//!     let service = AsyncRequestService::builder()
//!         .kv_store(Arc::new(InMemoryKeyValueStore::new()))
//!         .processor(Arc::new(EchoProcessor))
//!         .clock(Arc::new(test_clock()))
//!         .build()
//!         .unwrap();
//!
//!     let submitted = service.submit(SubmitRequest::new("x")).await;
//!     assert!(!submitted.is_error);
//! }
//! ```

use asyncreq_core::environment::Clock;
use chrono::{DateTime, Utc};

mod kv_store;
mod message_bus;
mod processors;

pub use kv_store::InMemoryKeyValueStore;
pub use message_bus::InMemoryMessageBus;
pub use processors::{
    DelayedProcessor, EchoProcessor, FailingProcessor, FnProcessor, GatedProcessor,
    PanickingProcessor,
};

/// Deterministic [`Clock`] for stamping `created_at`.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, RwLock};

    /// `created_at` stamped by [`test_clock`]: 2025-01-01T00:00:00Z in epoch millis.
    pub const TEST_EPOCH_MILLIS: i64 = 1_735_689_600_000;

    /// Clock that only moves when told to.
    ///
    /// Clones share the same instant, so a test can hand one clone to the
    /// service and [`advance`](Self::advance) another to move the submission
    /// timestamp between requests.
    ///
    /// # Example
    ///
    /// ```
    /// use asyncreq_testing::mocks::FixedClock;
    /// use asyncreq_core::environment::Clock;
    ///
    /// let clock = FixedClock::from_millis(1_000);
    /// let handle = clock.clone();
    /// handle.advance(chrono::Duration::milliseconds(250));
    /// assert_eq!(clock.now_millis(), 1_250);
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    impl FixedClock {
        /// Clock frozen at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
            }
        }

        /// Clock frozen at `millis` since the Unix epoch (out-of-range values clamp to the epoch)
        #[must_use]
        pub fn from_millis(millis: i64) -> Self {
            Self::new(DateTime::from_timestamp_millis(millis).unwrap_or_default())
        }

        /// Move every clone of this clock forward by `by`
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.write().unwrap_or_else(std::sync::PoisonError::into_inner);
            *time += by;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.read().unwrap_or_else(std::sync::PoisonError::into_inner)
        }
    }

    /// Clock frozen at [`TEST_EPOCH_MILLIS`]
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::from_millis(TEST_EPOCH_MILLIS)
    }
}

pub use mocks::{FixedClock, TEST_EPOCH_MILLIS, test_clock};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now_millis(), TEST_EPOCH_MILLIS);
    }

    #[test]
    fn test_fixed_clock_clones_advance_together() {
        let clock = test_clock();
        let handle = clock.clone();

        handle.advance(chrono::Duration::seconds(2));

        assert_eq!(clock.now_millis(), TEST_EPOCH_MILLIS + 2_000);
    }
}
