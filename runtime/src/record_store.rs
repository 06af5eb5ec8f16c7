//! Record store adapter.
//!
//! Wraps a [`KeyValueStore`] and owns serialization of [`CorrelationRecord`]s.
//! Every write is a whole-record overwrite carrying the configured TTL; there is
//! no partial-field update at this layer.

use crate::error::StoreError;
use asyncreq_core::kv_store::KeyValueStore;
use asyncreq_core::record::{CorrelationRecord, RequestId};
use std::sync::Arc;
use std::time::Duration;

/// Typed access to correlation records in the shared store.
///
/// Cheap to clone; clones share the underlying store.
///
/// # Example
///
/// ```ignore
/// let store = RecordStore::new(Arc::new(InMemoryKeyValueStore::new()), Duration::from_secs(30));
/// store.put(&record).await?;
/// let loaded = store.get(&record.request_id).await?;
/// assert_eq!(loaded, record);
/// ```
#[derive(Clone)]
pub struct RecordStore {
    kv: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl RecordStore {
    /// Create an adapter applying `ttl` to every write.
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    /// The TTL applied by [`put`](Self::put).
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Write `record` under its own identifier with the configured TTL.
    ///
    /// # Errors
    ///
    /// See [`put_with_ttl`](Self::put_with_ttl).
    pub async fn put(&self, record: &CorrelationRecord) -> Result<(), StoreError> {
        self.put_with_ttl(record, self.ttl).await
    }

    /// Write `record` under its own identifier, expiring after `ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] if the record cannot be encoded and
    /// [`StoreError::Transport`] if the store rejects the write.
    pub async fn put_with_ttl(
        &self,
        record: &CorrelationRecord,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let id = &record.request_id;
        let json = record
            .to_json()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        self.kv
            .set_with_ttl(id.as_str(), json, ttl)
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        tracing::trace!(
            request_id = %id,
            state = %record.state(),
            ttl_ms = ttl.as_millis(),
            "Record written"
        );
        Ok(())
    }

    /// Read the record stored under `id`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] if no live record exists (never issued or expired)
    /// - [`StoreError::Transport`] if the read fails
    /// - [`StoreError::Serialization`] if the stored value is not a valid record
    pub async fn get(&self, id: &RequestId) -> Result<CorrelationRecord, StoreError> {
        let raw = self
            .kv
            .get(id.as_str())
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        CorrelationRecord::from_json(&raw).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
