//! Message bus abstraction for cross-process dispatch.
//!
//! When dispatch runs in broadcast mode the submitter publishes a
//! [`DispatchMessage`](crate::record::DispatchMessage) on a channel and one or
//! more worker processes consume it through a subscription.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  Submitter  │
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌─────────────────┐
//! │ 1. Write record │
//! │    (Pending)    │◄─── Visible to pollers
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ 2. Publish to   │
//! │   channel       │◄─── At-least-once delivery
//! └────────┬────────┘
//!          │
//!     ┌────┴────┐
//!     │         │
//!     ▼         ▼
//! ┌────────┐ ┌────────┐
//! │Worker A│ │Worker B│
//! └────────┘ └────────┘
//! ```
//!
//! # Key Principles
//!
//! - **Write first**: The pending record is persisted before the message is published
//! - **At-least-once delivery**: A message may be delivered more than once
//! - **Idempotent finalize**: Workers never overwrite an already finished record
//!
//! # Implementations
//!
//! - `RedisMessageBus` (`asyncreq-redis`) - Redis PUBLISH / SUBSCRIBE
//! - `InMemoryMessageBus` (`asyncreq-testing`) - tokio broadcast channels
//!
//! # Example
//!
//! ```rust,ignore
//! use asyncreq_core::message_bus::MessageBus;
//! use futures::StreamExt;
//!
//! async fn example(bus: impl MessageBus) -> Result<(), Box<dyn std::error::Error>> {
//!     bus.publish("asyncreq:dispatch", "{...}".to_string()).await?;
//!
//!     let mut stream = bus.subscribe("asyncreq:dispatch").await?;
//!     while let Some(result) = stream.next().await {
//!         match result {
//!             Ok(message) => println!("Received: {message}"),
//!             Err(e) => eprintln!("Error: {e}"),
//!         }
//!     }
//!     Ok(())
//! }
//! ```

use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during message bus operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageBusError {
    /// Failed to connect to the message bus
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish a message to a channel
    #[error("Publish failed for channel '{channel}': {reason}")]
    PublishFailed {
        /// The channel that failed
        channel: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to a channel
    #[error("Subscription failed for channel '{channel}': {reason}")]
    SubscriptionFailed {
        /// The channel that failed to subscribe
        channel: String,
        /// The reason for failure
        reason: String,
    },

    /// A delivered message could not be read
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Messages were dropped because the subscriber fell behind
    #[error("Subscriber lagged, {0} messages skipped")]
    Lagged(u64),

    /// Network or transport error
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// Stream of raw messages from a subscription.
///
/// The stream is unbounded in length and ends only when the underlying
/// subscription is closed.
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<String, MessageBusError>> + Send>>;

/// Trait for message bus implementations.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync` so a single bus can be shared by
/// the submission handler and the dispatch subscriber.
///
/// # Dyn Compatibility
///
/// Uses explicit `Pin<Box<dyn Future>>` returns to enable `Arc<dyn MessageBus>`.
pub trait MessageBus: Send + Sync {
    /// Publish a message to a channel.
    ///
    /// # Errors
    ///
    /// Returns [`MessageBusError::PublishFailed`] if the publish does not succeed.
    fn publish(
        &self,
        channel: &str,
        message: String,
    ) -> Pin<Box<dyn Future<Output = Result<(), MessageBusError>> + Send + '_>>;

    /// Subscribe to a channel and receive a stream of messages.
    ///
    /// Only messages published after the subscription is established are
    /// delivered.
    ///
    /// # Errors
    ///
    /// Returns [`MessageBusError::SubscriptionFailed`] if the subscription fails.
    fn subscribe(
        &self,
        channel: &str,
    ) -> Pin<Box<dyn Future<Output = Result<MessageStream, MessageBusError>> + Send + '_>>;
}
