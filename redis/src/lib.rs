//! Redis transport for the async request runtime.
//!
//! This crate provides the production collaborators behind the
//! [`KeyValueStore`](asyncreq_core::kv_store::KeyValueStore) and
//! [`MessageBus`](asyncreq_core::message_bus::MessageBus) traits:
//!
//! - [`RedisKeyValueStore`]: `SET key value PX ttl` / `GET key` over a
//!   multiplexed, auto-reconnecting [`ConnectionManager`](redis::aio::ConnectionManager)
//! - [`RedisMessageBus`]: `PUBLISH` on the shared connection, `SUBSCRIBE` on a
//!   dedicated pub/sub connection per subscription
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   SET PX    ┌─────────┐    GET     ┌──────────┐
//! │  Submitter   │────────────►│         │◄───────────│  Poller  │
//! └──────┬───────┘             │  Redis  │            └──────────┘
//!        │ PUBLISH             │         │
//!        └────────────────────►│         │
//!                              └────┬────┘
//!                                   │ SUBSCRIBE
//!                                   ▼
//!                          ┌────────────────┐  GET / SET PX
//!                          │    Worker      │──────────────► Redis
//!                          └────────────────┘
//! ```
//!
//! # Delivery Semantics
//!
//! Redis pub/sub is fire-and-forget: a message published while no worker is
//! subscribed is lost, and that request stays pending until its record
//! expires. Every live subscriber receives every message.
//!
//! # Example
//!
//! ```no_run
//! use asyncreq_redis::{RedisKeyValueStore, RedisMessageBus};
//! use asyncreq_core::kv_store::KeyValueStore;
//! use asyncreq_core::message_bus::MessageBus;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = RedisKeyValueStore::connect("redis://localhost:6379").await?;
//! store.set_with_ttl("k", "v".to_string(), Duration::from_secs(30)).await?;
//!
//! let bus = RedisMessageBus::connect("redis://localhost:6379").await?;
//! bus.publish("asyncreq:dispatch", "{}".to_string()).await?;
//! # Ok(())
//! # }
//! ```

mod kv_store;
mod message_bus;

pub use kv_store::RedisKeyValueStore;
pub use message_bus::{RedisMessageBus, RedisMessageBusBuilder};
