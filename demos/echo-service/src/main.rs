//! Echo Service - async request/response over Redis
//!
//! Submits a handful of requests, lets an uppercasing processor handle them,
//! and polls until each one is finished.
//!
//! # Running the Example
//!
//! ```bash
//! docker run --rm -p 6379:6379 redis:7
//!
//! # In-process dispatch (default)
//! cargo run -p echo-service
//!
//! # Broadcast dispatch: this process both publishes and consumes
//! ASYNCREQ_DISPATCH_MODE=broadcast cargo run -p echo-service
//! ```
//!
//! Settings are read from the environment (and `.env`): `REDIS_URL` plus the
//! `ASYNCREQ_*` variables understood by `AsyncRequestConfig::from_env`.

#![allow(missing_docs)]

use asyncreq_core::api::SubmitRequest;
use asyncreq_core::processor::{ProcessOutcome, ProcessRequest, Processor};
use asyncreq_redis::{RedisKeyValueStore, RedisMessageBus};
use asyncreq_runtime::metrics::MetricsServer;
use asyncreq_runtime::{AsyncRequestConfig, AsyncRequestService, DispatchMode};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Uppercases the payload after a short pause; rejects empty payloads.
struct Uppercase;

impl Processor for Uppercase {
    fn process(
        &self,
        request: ProcessRequest,
    ) -> Pin<Box<dyn Future<Output = ProcessOutcome> + Send + '_>> {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            if request.payload.is_empty() {
                ProcessOutcome::failure("empty payload")
            } else {
                ProcessOutcome::success(request.payload.to_uppercase())
            }
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load .env and initialize tracing
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,asyncreq_runtime=debug,echo_service=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Echo Service");

    // 2. Install the metrics recorder
    let mut metrics = MetricsServer::new(([0, 0, 0, 0], 9000).into());
    metrics.start()?;

    // 3. Connect to Redis
    let config = AsyncRequestConfig::from_env()?;
    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

    let store = RedisKeyValueStore::connect(&redis_url)
        .await?
        .with_key_prefix("asyncreq:record:");
    let bus = RedisMessageBus::connect(&redis_url).await?;

    tracing::info!(redis_url = %redis_url, dispatch_mode = %config.dispatch_mode, "✓ Connected");

    // 4. Build the service
    let service = AsyncRequestService::builder()
        .kv_store(Arc::new(store))
        .message_bus(Arc::new(bus))
        .processor(Arc::new(Uppercase))
        .config(config.clone())
        .build()?;

    let consumer = if config.dispatch_mode == DispatchMode::Broadcast {
        Some(service.spawn_subscriber().await?)
    } else {
        None
    };

    // 5. Submit and poll
    let mut submitted = Vec::new();
    for payload in ["hello", "async", "", "world"] {
        let result = service.submit(SubmitRequest::new(payload)).await;
        if result.is_error {
            tracing::error!(error = %result.error_message, "Submission rejected");
            continue;
        }
        tracing::info!(request_id = %result.request_id, payload, "Submitted");
        submitted.push(result.id());
    }

    for id in &submitted {
        loop {
            let status = service.poll(id).await?;
            if status.is_request_finished {
                tracing::info!(
                    request_id = %id,
                    response = %status.response_payload,
                    is_error = status.is_response_error,
                    "Finished"
                );
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    if let Some(snapshot) = metrics.render() {
        tracing::debug!(%snapshot, "Metrics snapshot");
    }

    if let Some(pool) = service.worker_pool() {
        let health = pool.health();
        tracing::info!(status = %health.status, metadata = ?health.metadata, "Worker pool health");
    }

    // 6. Wait for Ctrl+C, then drain
    tracing::info!("Press Ctrl+C to exit");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, draining...");

    service.shutdown().await?;
    if let Some(consumer) = consumer {
        let dispatched = consumer.await?;
        tracing::info!(dispatched, "Subscriber stopped");
    }

    tracing::info!("✓ Clean shutdown complete");
    Ok(())
}
