//! Poll handler.
//!
//! Polling is read-only and idempotent. A missing record, a failed read, and an
//! undecodable record are all errors, never a "not finished" result.

use crate::error::{PollError, StoreError};
use crate::metrics::PollMetrics;
use crate::record_store::RecordStore;
use asyncreq_core::api::PollResult;
use asyncreq_core::record::{CorrelationRecord, RequestId};

/// Reports the state of a submitted request.
#[derive(Debug, Clone)]
pub struct PollHandler {
    store: RecordStore,
}

impl PollHandler {
    /// Create a handler reading from `store`.
    #[must_use]
    pub const fn new(store: RecordStore) -> Self {
        Self { store }
    }

    /// Report whether `request_id` has finished, and its response if so.
    ///
    /// # Errors
    ///
    /// - [`PollError::NotFound`] if the identifier was never issued or its record expired
    /// - [`PollError::Store`] if the store read fails
    /// - [`PollError::Decode`] if the stored record is corrupt
    pub async fn poll(&self, request_id: &RequestId) -> Result<PollResult, PollError> {
        let record = self.inspect(request_id).await?;
        let result = PollResult::from(&record);

        PollMetrics::record(if result.is_request_finished {
            "finished"
        } else {
            "pending"
        });
        tracing::debug!(
            request_id = %request_id,
            finished = result.is_request_finished,
            "Poll"
        );

        Ok(result)
    }

    /// Read the full record for `request_id`.
    ///
    /// # Errors
    ///
    /// Same as [`poll`](Self::poll).
    pub async fn inspect(&self, request_id: &RequestId) -> Result<CorrelationRecord, PollError> {
        self.store.get(request_id).await.map_err(|e| {
            match &e {
                StoreError::NotFound(_) => {
                    PollMetrics::record("not_found");
                    tracing::debug!(request_id = %request_id, "Poll for unknown or expired request");
                }
                StoreError::Transport(_) | StoreError::Serialization(_) => {
                    PollMetrics::record("error");
                    tracing::warn!(request_id = %request_id, error = %e, "Poll failed");
                }
            }
            PollError::from(e)
        })
    }
}
