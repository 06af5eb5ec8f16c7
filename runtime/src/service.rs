//! Service facade and builder.
//!
//! Wires the record store, submission handler, poll handler, worker pool and
//! dispatch subscriber from an [`AsyncRequestConfig`] and a set of collaborators.
//!
//! | Role | Needs |
//! |------|-------|
//! | In-process (submit + process locally) | key-value store, processor |
//! | Broadcast submitter | key-value store, message bus |
//! | Broadcast worker | key-value store, message bus, processor |
//!
//! A broadcast node given a processor can both submit and consume; call
//! [`AsyncRequestService::spawn_subscriber`] to start consuming.

use crate::config::{AsyncRequestConfig, DispatchMode};
use crate::error::{ConfigError, PollError, ServiceError};
use crate::poll::PollHandler;
use crate::record_store::RecordStore;
use crate::submit::{Dispatcher, SubmissionHandler};
use crate::subscriber::DispatchSubscriber;
use crate::worker::WorkerPool;
use asyncreq_core::api::{PollResult, SubmissionResult, SubmitRequest};
use asyncreq_core::environment::{Clock, SystemClock};
use asyncreq_core::kv_store::KeyValueStore;
use asyncreq_core::message_bus::MessageBus;
use asyncreq_core::processor::Processor;
use asyncreq_core::record::RequestId;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// The asynchronous request/response service.
///
/// # Example
///
/// ```ignore
/// let service = AsyncRequestService::builder()
///     .kv_store(Arc::new(RedisKeyValueStore::connect(&url).await?))
///     .processor(Arc::new(MyProcessor))
///     .config(AsyncRequestConfig::from_env()?)
///     .build()?;
///
/// let submitted = service.submit(SubmitRequest::new("work")).await;
/// let status = service.poll(&submitted.id()).await?;
///
/// service.shutdown().await?;
/// ```
pub struct AsyncRequestService {
    config: AsyncRequestConfig,
    store: RecordStore,
    submissions: SubmissionHandler,
    polls: PollHandler,
    pool: Option<WorkerPool>,
    bus: Option<Arc<dyn MessageBus>>,
    shutdown: watch::Sender<bool>,
}

impl AsyncRequestService {
    /// Start building a service.
    #[must_use]
    pub fn builder() -> AsyncRequestServiceBuilder {
        AsyncRequestServiceBuilder::default()
    }

    /// Submit a request. See [`SubmissionHandler::submit`].
    pub async fn submit(&self, request: SubmitRequest) -> SubmissionResult {
        self.submissions.submit(request).await
    }

    /// Poll a request. See [`PollHandler::poll`].
    ///
    /// # Errors
    ///
    /// Returns [`PollError`] for unknown or expired identifiers and store failures.
    pub async fn poll(&self, request_id: &RequestId) -> Result<PollResult, PollError> {
        self.polls.poll(request_id).await
    }

    /// The local worker pool, present when a processor was supplied.
    #[must_use]
    pub const fn worker_pool(&self) -> Option<&WorkerPool> {
        self.pool.as_ref()
    }

    /// The record store adapter.
    #[must_use]
    pub const fn record_store(&self) -> &RecordStore {
        &self.store
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &AsyncRequestConfig {
        &self.config
    }

    /// Subscribe to the dispatch channel and consume it on a background task.
    ///
    /// The subscription is live when this returns. The task stops on
    /// [`shutdown`](Self::shutdown) and yields the number of messages dispatched.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::MissingComponent`] without a message bus or processor
    /// - [`DispatchError::Subscribe`](crate::error::DispatchError::Subscribe) if the bus refuses the subscription
    pub async fn spawn_subscriber(&self) -> Result<JoinHandle<u64>, ServiceError> {
        let bus = self
            .bus
            .as_ref()
            .ok_or(ConfigError::MissingComponent("message_bus"))?;
        let pool = self
            .pool
            .clone()
            .ok_or(ConfigError::MissingComponent("processor"))?;

        let subscriber =
            DispatchSubscriber::subscribe(bus.as_ref(), &self.config.channel, pool).await?;
        Ok(subscriber.spawn(self.shutdown.subscribe()))
    }

    /// Stop subscribers, stop accepting work, and drain in-flight requests
    /// within the configured shutdown timeout.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::ShutdownTimeout`](crate::error::WorkerError::ShutdownTimeout)
    /// if in-flight requests do not finish in time.
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        tracing::info!("Async request service shutting down");
        self.shutdown.send_replace(true);

        if let Some(pool) = &self.pool {
            pool.shutdown(self.config.shutdown_timeout).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for AsyncRequestService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncRequestService")
            .field("config", &self.config)
            .field("pool", &self.pool)
            .field("has_bus", &self.bus.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`AsyncRequestService`].
#[derive(Default)]
pub struct AsyncRequestServiceBuilder {
    kv_store: Option<Arc<dyn KeyValueStore>>,
    message_bus: Option<Arc<dyn MessageBus>>,
    processor: Option<Arc<dyn Processor>>,
    clock: Option<Arc<dyn Clock>>,
    config: Option<AsyncRequestConfig>,
}

impl AsyncRequestServiceBuilder {
    /// Set the key-value store (required)
    #[must_use]
    pub fn kv_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.kv_store = Some(store);
        self
    }

    /// Set the message bus (required for broadcast dispatch)
    #[must_use]
    pub fn message_bus(mut self, bus: Arc<dyn MessageBus>) -> Self {
        self.message_bus = Some(bus);
        self
    }

    /// Set the processor (required for in-process dispatch and for consuming)
    #[must_use]
    pub fn processor(mut self, processor: Arc<dyn Processor>) -> Self {
        self.processor = Some(processor);
        self
    }

    /// Set the clock used for record creation times (default: [`SystemClock`])
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set the configuration (default: [`AsyncRequestConfig::default`])
    #[must_use]
    pub fn config(mut self, config: AsyncRequestConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the service.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::InvalidValue`] if the configuration fails validation
    /// - [`ConfigError::MissingComponent`] if a collaborator required by the
    ///   dispatch mode is missing
    pub fn build(self) -> Result<AsyncRequestService, ConfigError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let kv = self
            .kv_store
            .ok_or(ConfigError::MissingComponent("kv_store"))?;
        let store = RecordStore::new(kv, config.ttl);
        let pool = self
            .processor
            .map(|processor| WorkerPool::new(store.clone(), processor, &config));

        let dispatcher = match config.dispatch_mode {
            DispatchMode::InProcess => Dispatcher::InProcess(
                pool.clone()
                    .ok_or(ConfigError::MissingComponent("processor"))?,
            ),
            DispatchMode::Broadcast => Dispatcher::Broadcast {
                bus: self
                    .message_bus
                    .clone()
                    .ok_or(ConfigError::MissingComponent("message_bus"))?,
                channel: config.channel.clone(),
            },
        };

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let (shutdown, _) = watch::channel(false);

        tracing::info!(
            dispatch_mode = %config.dispatch_mode,
            ttl_ms = config.ttl.as_millis(),
            max_concurrency = config.max_concurrency,
            "Async request service built"
        );

        Ok(AsyncRequestService {
            submissions: SubmissionHandler::new(store.clone(), dispatcher, clock),
            polls: PollHandler::new(store.clone()),
            store,
            pool,
            bus: self.message_bus,
            shutdown,
            config,
        })
    }
}

impl std::fmt::Debug for AsyncRequestServiceBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncRequestServiceBuilder")
            .field("has_kv_store", &self.kv_store.is_some())
            .field("has_message_bus", &self.message_bus.is_some())
            .field("has_processor", &self.processor.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use asyncreq_testing::{EchoProcessor, InMemoryKeyValueStore, InMemoryMessageBus};

    #[test]
    fn test_in_process_mode_requires_processor() {
        let err = AsyncRequestService::builder()
            .kv_store(Arc::new(InMemoryKeyValueStore::new()))
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingComponent("processor"));
    }

    #[test]
    fn test_broadcast_mode_requires_bus() {
        let err = AsyncRequestService::builder()
            .kv_store(Arc::new(InMemoryKeyValueStore::new()))
            .config(AsyncRequestConfig::default().with_dispatch_mode(DispatchMode::Broadcast))
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingComponent("message_bus"));
    }

    #[test]
    fn test_store_is_required() {
        let err = AsyncRequestService::builder()
            .processor(Arc::new(EchoProcessor))
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingComponent("kv_store"));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = AsyncRequestService::builder()
            .kv_store(Arc::new(InMemoryKeyValueStore::new()))
            .processor(Arc::new(EchoProcessor))
            .config(AsyncRequestConfig::default().with_channel(" "))
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[tokio::test]
    async fn test_submitter_without_processor_cannot_consume() {
        let service = AsyncRequestService::builder()
            .kv_store(Arc::new(InMemoryKeyValueStore::new()))
            .message_bus(Arc::new(InMemoryMessageBus::new()))
            .config(AsyncRequestConfig::default().with_dispatch_mode(DispatchMode::Broadcast))
            .build()
            .unwrap();

        assert!(service.worker_pool().is_none());
        assert_eq!(
            service.spawn_subscriber().await.unwrap_err(),
            ServiceError::Config(ConfigError::MissingComponent("processor"))
        );
        service.shutdown().await.unwrap();
    }
}
