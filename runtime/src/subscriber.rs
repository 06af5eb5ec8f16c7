//! Broadcast dispatch subscriber.
//!
//! Consumes dispatch messages from a [`MessageBus`] channel and hands each one
//! to the [`WorkerPool`]. A message that cannot be decoded, or a transient
//! stream error, is reported and skipped; the loop keeps consuming until it is
//! told to stop or the subscription ends.

use crate::error::DispatchError;
use crate::metrics::DispatchMetrics;
use crate::worker::WorkerPool;
use asyncreq_core::message_bus::{MessageBus, MessageStream};
use asyncreq_core::record::DispatchMessage;
use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Long-running consumer of the dispatch channel.
///
/// The subscription is established by [`subscribe`](Self::subscribe), so
/// messages published after it returns are never missed.
pub struct DispatchSubscriber {
    channel: String,
    stream: MessageStream,
    pool: WorkerPool,
}

impl DispatchSubscriber {
    /// Subscribe to `channel` on `bus`, feeding messages into `pool`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Subscribe`] if the bus refuses the subscription.
    pub async fn subscribe(
        bus: &dyn MessageBus,
        channel: &str,
        pool: WorkerPool,
    ) -> Result<Self, DispatchError> {
        let stream = bus
            .subscribe(channel)
            .await
            .map_err(|e| DispatchError::Subscribe(e.to_string()))?;

        tracing::info!(channel, "Dispatch subscriber ready");

        Ok(Self {
            channel: channel.to_string(),
            stream,
            pool,
        })
    }

    /// Consume messages until `shutdown` flips to `true` (or its sender is
    /// dropped), the subscription ends, or the pool stops accepting work.
    ///
    /// The shutdown signal is checked between messages. A message already
    /// taken off the stream is admitted to the pool first, waiting for a
    /// permit if necessary, and is still processed after the signal fires;
    /// use [`WorkerPool::shutdown`] to drain it. A message taken off the stream
    /// after the pool stopped accepting work is reported as
    /// [`DispatchError::Undelivered`] and recorded in the dead letter queue.
    ///
    /// Returns the number of messages handed to the pool.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> u64 {
        let mut dispatched = 0u64;

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            let next = tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                next = self.stream.next() => next,
            };

            let Some(next) = next else {
                tracing::info!(channel = %self.channel, "Dispatch stream ended");
                break;
            };

            let raw = match next {
                Ok(raw) => raw,
                Err(e) => {
                    self.pool.reject(DispatchError::Stream(e.to_string()));
                    continue;
                }
            };

            let message = match DispatchMessage::from_json(&raw) {
                Ok(message) => message,
                Err(e) => {
                    self.pool
                        .reject(DispatchError::MalformedMessage(e.to_string()));
                    continue;
                }
            };

            DispatchMetrics::record_consumed();
            tracing::debug!(request_id = %message.request_id, "Dispatch message received");

            let request_id = message.request_id.clone();
            let payload = message.payload.clone();
            match self.pool.dispatch_when_ready(message.into()).await {
                Ok(()) => dispatched += 1,
                Err(DispatchError::ShuttingDown) => {
                    self.pool
                        .reject(DispatchError::Undelivered { request_id, payload });
                    tracing::info!("Worker pool shutting down, subscriber stopping");
                    break;
                }
                Err(e) => self.pool.reject(e),
            }
        }

        tracing::info!(channel = %self.channel, dispatched, "Dispatch subscriber stopped");
        dispatched
    }

    /// Run the subscriber on a background task.
    #[must_use]
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<u64> {
        tokio::spawn(self.run(shutdown))
    }

    /// The channel this subscriber consumes.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl std::fmt::Debug for DispatchSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchSubscriber")
            .field("channel", &self.channel)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::config::AsyncRequestConfig;
    use crate::record_store::RecordStore;
    use crate::worker::DispatchReport;
    use asyncreq_core::record::{CorrelationRecord, RequestId};
    use asyncreq_testing::{EchoProcessor, GatedProcessor, InMemoryKeyValueStore, InMemoryMessageBus};
    use std::sync::Arc;
    use std::time::Duration;

    const CHANNEL: &str = "test:dispatch";

    fn pool(kv: &InMemoryKeyValueStore) -> WorkerPool {
        let store = RecordStore::new(Arc::new(kv.clone()), Duration::from_secs(30));
        WorkerPool::new(store, Arc::new(EchoProcessor), &AsyncRequestConfig::default())
    }

    #[tokio::test]
    async fn test_malformed_message_is_skipped_and_loop_continues() {
        let kv = InMemoryKeyValueStore::new();
        let bus = InMemoryMessageBus::new();
        let pool = pool(&kv);
        let mut reports = pool.subscribe_reports();
        let store = pool.record_store().clone();

        let record = CorrelationRecord::pending(RequestId::generate(), "ok", 0);
        store.put(&record).await.unwrap();

        let (stop, shutdown) = watch::channel(false);
        let handle = DispatchSubscriber::subscribe(&bus, CHANNEL, pool.clone())
            .await
            .unwrap()
            .spawn(shutdown);

        bus.publish(CHANNEL, "{not json".to_string()).await.unwrap();
        let message = DispatchMessage::new(record.request_id.clone(), "ok");
        bus.publish(CHANNEL, message.to_json().unwrap()).await.unwrap();

        let first = tokio::time::timeout(Duration::from_secs(5), reports.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(first, DispatchReport::Rejected { .. }));

        let second = tokio::time::timeout(Duration::from_secs(5), reports.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            second,
            DispatchReport::Finalized {
                request_id: record.request_id.clone(),
                is_error: false,
            }
        );

        stop.send(true).unwrap();
        assert_eq!(handle.await.unwrap(), 1);
        assert_eq!(pool.dead_letters().len(), 1);
    }

    #[tokio::test]
    async fn test_stops_when_shutdown_is_signalled() {
        let kv = InMemoryKeyValueStore::new();
        let bus = InMemoryMessageBus::new();
        let (stop, shutdown) = watch::channel(false);

        let handle = DispatchSubscriber::subscribe(&bus, CHANNEL, pool(&kv))
            .await
            .unwrap()
            .spawn(shutdown);

        stop.send(true).unwrap();
        let dispatched = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("subscriber should stop")
            .unwrap();
        assert_eq!(dispatched, 0);
    }

    #[tokio::test]
    async fn test_consumed_message_after_pool_shutdown_is_dead_lettered() {
        let kv = InMemoryKeyValueStore::new();
        let bus = InMemoryMessageBus::new();
        let pool = pool(&kv);
        let mut reports = pool.subscribe_reports();
        let store = pool.record_store().clone();
        let (_stop, shutdown) = watch::channel(false);

        let handle = DispatchSubscriber::subscribe(&bus, CHANNEL, pool.clone())
            .await
            .unwrap()
            .spawn(shutdown);

        pool.shutdown(Duration::from_secs(1)).await.unwrap();
        let record = CorrelationRecord::pending(RequestId::generate(), "late", 0);
        store.put(&record).await.unwrap();
        let message = DispatchMessage::new(record.request_id.clone(), "late");
        bus.publish(CHANNEL, message.to_json().unwrap()).await.unwrap();

        let dispatched = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("subscriber should stop")
            .unwrap();
        assert_eq!(dispatched, 0);

        let report = tokio::time::timeout(Duration::from_secs(5), reports.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            report,
            DispatchReport::Abandoned { ref request_id, .. } if *request_id == record.request_id
        ));

        let dead = pool.dead_letters().drain();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].payload.request_id, Some(record.request_id.clone()));
        assert_eq!(
            dead[0].payload.error,
            DispatchError::Undelivered {
                request_id: record.request_id.clone(),
                payload: "late".to_string(),
            }
        );
        assert!(!store.get(&record.request_id).await.unwrap().is_finished());
    }

    #[tokio::test]
    async fn test_message_waiting_for_permit_is_dispatched_after_stop() {
        let kv = InMemoryKeyValueStore::new();
        let bus = InMemoryMessageBus::new();
        let gate = GatedProcessor::new();
        let store = RecordStore::new(Arc::new(kv.clone()), Duration::from_secs(30));
        let config = AsyncRequestConfig::default().with_max_concurrency(1);
        let pool = WorkerPool::new(store.clone(), Arc::new(gate.clone()), &config);
        let (stop, shutdown) = watch::channel(false);

        let handle = DispatchSubscriber::subscribe(&bus, CHANNEL, pool.clone())
            .await
            .unwrap()
            .spawn(shutdown);

        let mut ids = Vec::new();
        for payload in ["first", "second"] {
            let record = CorrelationRecord::pending(RequestId::generate(), payload, 0);
            store.put(&record).await.unwrap();
            let message = DispatchMessage::new(record.request_id.clone(), payload);
            bus.publish(CHANNEL, message.to_json().unwrap()).await.unwrap();
            ids.push(record.request_id);
        }

        // The second message is admitted and parked on the only permit.
        gate.wait_for_started(1).await;
        tokio::time::timeout(Duration::from_secs(5), async {
            while pool.in_flight() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("second message should be admitted");

        stop.send(true).unwrap();
        gate.release(2);

        let dispatched = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("subscriber should stop")
            .unwrap();
        assert_eq!(dispatched, 2);

        pool.shutdown(Duration::from_secs(5)).await.unwrap();
        for id in &ids {
            assert!(store.get(id).await.unwrap().is_finished());
        }
    }
}
