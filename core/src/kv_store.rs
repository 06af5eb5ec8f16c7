//! Key-value store abstraction.
//!
//! The protocol needs exactly two operations from the shared store: a
//! whole-value write with an expiry, and a read. There is no partial update and
//! no explicit delete; records disappear when their time-to-live elapses.
//!
//! # Implementations
//!
//! - `RedisKeyValueStore` (`asyncreq-redis`) - `SET key value PX ttl` / `GET key`
//! - `InMemoryKeyValueStore` (`asyncreq-testing`) - HashMap with expiry instants
//!
//! # Consistency
//!
//! Correctness relies only on per-key atomicity of individual `get`/`set`
//! operations. Under an eventually consistent store a read issued right after a
//! write may still miss; the protocol treats write-before-notify ordering as
//! best effort in that case.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during key-value store operations.
///
/// A missing key is not an error: [`KeyValueStore::get`] returns `Ok(None)`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyValueError {
    /// Failed to connect to the store
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A write did not succeed
    #[error("Write failed for key '{key}': {reason}")]
    WriteFailed {
        /// The key being written
        key: String,
        /// The reason for failure
        reason: String,
    },

    /// A read did not succeed
    #[error("Read failed for key '{key}': {reason}")]
    ReadFailed {
        /// The key being read
        key: String,
        /// The reason for failure
        reason: String,
    },

    /// The requested time-to-live cannot be expressed by the store
    #[error("Invalid TTL: {0:?}")]
    InvalidTtl(Duration),
}

/// Trait for key-value store implementations.
///
/// # Dyn Compatibility
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so the store can be shared as
/// `Arc<dyn KeyValueStore>` between submitters, workers and pollers.
pub trait KeyValueStore: Send + Sync {
    /// Overwrite `key` with `value`, expiring after `ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyValueError::WriteFailed`] if the write does not succeed and
    /// [`KeyValueError::InvalidTtl`] for a zero or unrepresentable TTL.
    fn set_with_ttl(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), KeyValueError>> + Send + '_>>;

    /// Read the current value of `key`, or `None` if absent or expired.
    ///
    /// # Errors
    ///
    /// Returns [`KeyValueError::ReadFailed`] for transport failures.
    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, KeyValueError>> + Send + '_>>;
}
