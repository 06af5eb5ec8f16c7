//! In-memory publish/subscribe bus.
//!
//! Each channel is a [`tokio::sync::broadcast`] channel. Like Redis pub/sub,
//! a message published with no subscribers is dropped, and a subscriber only
//! sees messages published after it subscribed.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Only poisoned locks panic

use asyncreq_core::message_bus::{MessageBus, MessageBusError, MessageStream};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 1024;

/// In-memory message bus for fast, deterministic testing.
///
/// # Example
///
/// ```
/// use asyncreq_testing::InMemoryMessageBus;
/// use asyncreq_core::message_bus::MessageBus;
/// use futures::StreamExt;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = InMemoryMessageBus::new();
/// let mut stream = bus.subscribe("jobs").await?;
///
/// bus.publish("jobs", "hello".to_string()).await?;
/// assert_eq!(stream.next().await, Some(Ok("hello".to_string())));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryMessageBus {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<String>>>>,
    capacity: usize,
    fail_publishes: Arc<AtomicBool>,
    published: Arc<AtomicUsize>,
}

impl Default for InMemoryMessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMessageBus {
    /// Create a bus whose channels buffer up to 1024 messages per subscriber
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus with a per-subscriber buffer of `capacity` messages.
    ///
    /// A subscriber falling further behind receives
    /// [`MessageBusError::Lagged`] and skips ahead.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
            fail_publishes: Arc::new(AtomicBool::new(false)),
            published: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make every subsequent publish fail (or succeed again)
    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Number of messages successfully published
    #[must_use]
    pub fn published_count(&self) -> usize {
        self.published.load(Ordering::SeqCst)
    }

    /// Number of live subscriptions on `channel`
    #[must_use]
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .lock()
            .unwrap()
            .get(channel)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Close `channel`, ending every stream subscribed to it
    pub fn close_channel(&self, channel: &str) {
        self.channels.lock().unwrap().remove(channel);
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        self.channels
            .lock()
            .unwrap()
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl MessageBus for InMemoryMessageBus {
    fn publish(
        &self,
        channel: &str,
        message: String,
    ) -> Pin<Box<dyn Future<Output = Result<(), MessageBusError>> + Send + '_>> {
        let channel = channel.to_string();
        Box::pin(async move {
            if self.fail_publishes.load(Ordering::SeqCst) {
                return Err(MessageBusError::PublishFailed {
                    channel,
                    reason: "injected publish failure".to_string(),
                });
            }

            // No subscribers: the message is dropped, as with Redis pub/sub.
            let _ = self.sender(&channel).send(message);
            self.published.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn subscribe(
        &self,
        channel: &str,
    ) -> Pin<Box<dyn Future<Output = Result<MessageStream, MessageBusError>> + Send + '_>> {
        let channel = channel.to_string();
        Box::pin(async move {
            let mut receiver = self.sender(&channel).subscribe();

            let stream = async_stream::stream! {
                loop {
                    match receiver.recv().await {
                        Ok(message) => yield Ok(message),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            yield Err(MessageBusError::Lagged(skipped));
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            };

            Ok(Box::pin(stream) as MessageStream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_every_subscriber_receives_each_message() {
        let bus = InMemoryMessageBus::new();
        let mut a = bus.subscribe("c").await.unwrap();
        let mut b = bus.subscribe("c").await.unwrap();

        bus.publish("c", "m".to_string()).await.unwrap();

        assert_eq!(a.next().await, Some(Ok("m".to_string())));
        assert_eq!(b.next().await, Some(Ok("m".to_string())));
        assert_eq!(bus.subscriber_count("c"), 2);
    }

    #[tokio::test]
    async fn test_messages_before_subscription_are_not_delivered() {
        let bus = InMemoryMessageBus::new();
        bus.publish("c", "early".to_string()).await.unwrap();
        let mut stream = bus.subscribe("c").await.unwrap();
        bus.publish("c", "late".to_string()).await.unwrap();

        assert_eq!(stream.next().await, Some(Ok("late".to_string())));
    }

    #[tokio::test]
    async fn test_slow_subscriber_sees_lag() {
        let bus = InMemoryMessageBus::with_capacity(2);
        let mut stream = bus.subscribe("c").await.unwrap();
        for i in 0..4 {
            bus.publish("c", i.to_string()).await.unwrap();
        }

        assert_eq!(stream.next().await, Some(Err(MessageBusError::Lagged(2))));
        assert_eq!(stream.next().await, Some(Ok("2".to_string())));
    }

    #[tokio::test]
    async fn test_closing_channel_ends_stream() {
        let bus = InMemoryMessageBus::new();
        let mut stream = bus.subscribe("c").await.unwrap();
        bus.close_channel("c");

        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_injected_publish_failure() {
        let bus = InMemoryMessageBus::new();
        bus.fail_publishes(true);

        assert!(matches!(
            bus.publish("c", "m".to_string()).await,
            Err(MessageBusError::PublishFailed { .. })
        ));
        assert_eq!(bus.published_count(), 0);
    }
}
