//! Redis-backed key-value store.

use asyncreq_core::kv_store::{KeyValueError, KeyValueStore};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Key-value store over a Redis [`ConnectionManager`].
///
/// Writes are `SET key value PX <ttl-ms>`, so value and expiry are replaced
/// atomically. Reads are plain `GET`; Redis drops expired keys itself.
///
/// Cheap to clone; clones share the multiplexed connection.
#[derive(Clone)]
pub struct RedisKeyValueStore {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisKeyValueStore {
    /// Connect to Redis at `url` (e.g. `redis://localhost:6379`).
    ///
    /// # Errors
    ///
    /// Returns [`KeyValueError::ConnectionFailed`] if the URL is invalid or
    /// the initial connection cannot be established.
    pub async fn connect(url: &str) -> Result<Self, KeyValueError> {
        let client = redis::Client::open(url)
            .map_err(|e| KeyValueError::ConnectionFailed(format!("Invalid Redis URL: {e}")))?;

        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| KeyValueError::ConnectionFailed(e.to_string()))?;

        tracing::info!("Connected to Redis key-value store");
        Ok(Self::from_connection(conn))
    }

    /// Wrap an existing connection manager.
    #[must_use]
    pub fn from_connection(conn: ConnectionManager) -> Self {
        Self {
            conn,
            key_prefix: String::new(),
        }
    }

    /// Namespace every key with `prefix` (e.g. `"asyncreq:record:"`).
    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{key}", self.key_prefix)
    }
}

/// Convert a TTL to whole milliseconds for `PX`, rounding sub-millisecond
/// values up so a non-zero TTL never becomes an immediate expiry.
fn ttl_millis(ttl: Duration) -> Result<u64, KeyValueError> {
    if ttl.is_zero() {
        return Err(KeyValueError::InvalidTtl(ttl));
    }
    let millis = u64::try_from(ttl.as_millis()).map_err(|_| KeyValueError::InvalidTtl(ttl))?;
    Ok(millis.max(1))
}

impl KeyValueStore for RedisKeyValueStore {
    fn set_with_ttl(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), KeyValueError>> + Send + '_>> {
        let key = self.full_key(key);
        Box::pin(async move {
            let millis = ttl_millis(ttl)?;
            let mut conn = self.conn.clone();

            let _: () = conn
                .pset_ex(&key, value, millis)
                .await
                .map_err(|e| KeyValueError::WriteFailed {
                    key: key.clone(),
                    reason: e.to_string(),
                })?;

            tracing::trace!(key = %key, ttl_ms = millis, "SET PX");
            Ok(())
        })
    }

    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, KeyValueError>> + Send + '_>> {
        let key = self.full_key(key);
        Box::pin(async move {
            let mut conn = self.conn.clone();

            let value: Option<String> =
                conn.get(&key)
                    .await
                    .map_err(|e| KeyValueError::ReadFailed {
                        key: key.clone(),
                        reason: e.to_string(),
                    })?;

            tracing::trace!(key = %key, hit = value.is_some(), "GET");
            Ok(value)
        })
    }
}

impl std::fmt::Debug for RedisKeyValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisKeyValueStore")
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}
