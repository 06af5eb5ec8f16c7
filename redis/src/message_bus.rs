//! Redis pub/sub message bus.

use asyncreq_core::message_bus::{MessageBus, MessageBusError, MessageStream};
use futures::StreamExt;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::future::Future;
use std::pin::Pin;

/// Message bus over Redis pub/sub.
///
/// Publishing reuses one multiplexed connection. Each subscription opens its
/// own pub/sub connection, owned by a forwarding task that feeds a bounded
/// channel; the returned stream ends when that connection closes.
///
/// # Example
///
/// ```no_run
/// use asyncreq_redis::RedisMessageBus;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = RedisMessageBus::builder()
///     .url("redis://localhost:6379")
///     .buffer_size(512)
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisMessageBus {
    client: redis::Client,
    conn: ConnectionManager,
    buffer_size: usize,
}

impl RedisMessageBus {
    /// Connect with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`MessageBusError::ConnectionFailed`] if the URL is invalid or
    /// Redis is unreachable.
    pub async fn connect(url: &str) -> Result<Self, MessageBusError> {
        Self::builder().url(url).build().await
    }

    /// Create a builder.
    #[must_use]
    pub fn builder() -> RedisMessageBusBuilder {
        RedisMessageBusBuilder::default()
    }

    /// Per-subscription buffer size.
    #[must_use]
    pub const fn buffer_size(&self) -> usize {
        self.buffer_size
    }
}

impl std::fmt::Debug for RedisMessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisMessageBus")
            .field("buffer_size", &self.buffer_size)
            .finish_non_exhaustive()
    }
}

/// Builder for [`RedisMessageBus`].
#[derive(Debug, Default)]
pub struct RedisMessageBusBuilder {
    url: Option<String>,
    buffer_size: Option<usize>,
}

impl RedisMessageBusBuilder {
    /// Set the Redis URL (required)
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the per-subscription buffer size (default: 1000)
    ///
    /// A subscriber that falls this far behind applies backpressure to its
    /// forwarding task; Redis then buffers on the server side up to its
    /// client output limits.
    #[must_use]
    pub const fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size);
        self
    }

    /// Connect and build the bus.
    ///
    /// # Errors
    ///
    /// Returns [`MessageBusError::ConnectionFailed`] if no URL was set, the URL
    /// is invalid, or the connection cannot be established.
    pub async fn build(self) -> Result<RedisMessageBus, MessageBusError> {
        let url = self
            .url
            .ok_or_else(|| MessageBusError::ConnectionFailed("Redis URL not set".to_string()))?;

        let client = redis::Client::open(url.as_str())
            .map_err(|e| MessageBusError::ConnectionFailed(format!("Invalid Redis URL: {e}")))?;

        let conn = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| MessageBusError::ConnectionFailed(e.to_string()))?;

        let buffer_size = self.buffer_size.unwrap_or(1000).max(1);
        tracing::info!(buffer_size, "Connected to Redis message bus");

        Ok(RedisMessageBus {
            client,
            conn,
            buffer_size,
        })
    }
}

impl MessageBus for RedisMessageBus {
    fn publish(
        &self,
        channel: &str,
        message: String,
    ) -> Pin<Box<dyn Future<Output = Result<(), MessageBusError>> + Send + '_>> {
        let channel = channel.to_string();
        Box::pin(async move {
            let mut conn = self.conn.clone();

            let receivers: i64 = conn.publish(&channel, message).await.map_err(|e| {
                tracing::error!(channel = %channel, error = %e, "Failed to publish message");
                MessageBusError::PublishFailed {
                    channel: channel.clone(),
                    reason: e.to_string(),
                }
            })?;

            if receivers == 0 {
                tracing::warn!(channel = %channel, "Published with no subscribers, message dropped");
            } else {
                tracing::debug!(channel = %channel, receivers, "Message published");
            }
            Ok(())
        })
    }

    fn subscribe(
        &self,
        channel: &str,
    ) -> Pin<Box<dyn Future<Output = Result<MessageStream, MessageBusError>> + Send + '_>> {
        let channel = channel.to_string();
        let buffer_size = self.buffer_size;

        Box::pin(async move {
            let mut pubsub = self.client.get_async_pubsub().await.map_err(|e| {
                MessageBusError::SubscriptionFailed {
                    channel: channel.clone(),
                    reason: format!("Failed to open pub/sub connection: {e}"),
                }
            })?;

            pubsub
                .subscribe(&channel)
                .await
                .map_err(|e| MessageBusError::SubscriptionFailed {
                    channel: channel.clone(),
                    reason: e.to_string(),
                })?;

            tracing::info!(channel = %channel, buffer_size, "Subscribed to channel");

            let (tx, mut rx) = tokio::sync::mpsc::channel(buffer_size);

            // The forwarding task owns the pub/sub connection.
            let task_channel = channel.clone();
            tokio::spawn(async move {
                let mut messages = pubsub.into_on_message();

                while let Some(message) = messages.next().await {
                    let item = message
                        .get_payload::<String>()
                        .map_err(|e| MessageBusError::MalformedMessage(e.to_string()));

                    if tx.send(item).await.is_err() {
                        tracing::debug!(channel = %task_channel, "Subscriber dropped, closing subscription");
                        return;
                    }
                }

                tracing::warn!(channel = %task_channel, "Redis subscription closed");
            });

            let stream = async_stream::stream! {
                while let Some(item) = rx.recv().await {
                    yield item;
                }
            };

            Ok(Box::pin(stream) as MessageStream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_requires_url() {
        let result = RedisMessageBus::builder().build().await;
        assert!(matches!(result, Err(MessageBusError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn test_invalid_url_is_connection_error() {
        let result = RedisMessageBus::connect("definitely not a url").await;
        assert!(matches!(result, Err(MessageBusError::ConnectionFailed(_))));
    }
}
