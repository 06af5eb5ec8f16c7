//! The correlation record and its identifier.
//!
//! A [`CorrelationRecord`] is the single entity persisted by the protocol. It is
//! written once in the *Pending* state at submission and overwritten once in the
//! *Finished* state after processing. Records are ephemeral: every write carries
//! a time-to-live and the store removes them once it elapses.
//!
//! # Wire Format
//!
//! Records are stored as JSON objects (field order irrelevant):
//!
//! ```text
//! {
//!   "request_id": "5f0c8e0e-...",
//!   "request_payload": "x",
//!   "response_payload": "",
//!   "created_at": 1735689600000,
//!   "is_response_finished": false,
//!   "is_response_error": false
//! }
//! ```
//!
//! # Example
//!
//! ```
//! use asyncreq_core::record::{CorrelationRecord, RecordState, RequestId};
//! use asyncreq_core::processor::ProcessOutcome;
//!
//! let pending = CorrelationRecord::pending(RequestId::generate(), "x", 1_735_689_600_000);
//! assert_eq!(pending.state(), RecordState::Pending);
//!
//! let finished = pending.finish(&ProcessOutcome::success("y"));
//! assert_eq!(finished.state(), RecordState::Succeeded);
//! assert_eq!(finished.request_payload, "x");
//! assert_eq!(finished.created_at, pending.created_at);
//! ```

use crate::processor::{ProcessOutcome, ProcessRequest};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Error types for record encoding and decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// Failed to serialize a record or dispatch message.
    #[error("Failed to serialize record: {0}")]
    SerializationError(String),

    /// Failed to deserialize a record or dispatch message.
    #[error("Failed to deserialize record: {0}")]
    DeserializationError(String),
}

/// Opaque correlation identifier handed to the caller at submission.
///
/// Generated identifiers are random (UUID v4), which keeps the collision
/// probability negligible across any realistic number of live records. The
/// identifier doubles as the store key for its record.
///
/// Identifiers received from callers are accepted verbatim: an identifier that
/// was never issued simply resolves to "not found" when polled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a fresh, unique identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap an identifier received from a caller.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string (also the store key).
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the identifier, returning the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl AsRef<str> for RequestId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Logical state of a record as observed by a poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordState {
    /// Submitted, processing has not finished yet.
    Pending,
    /// Finished, the processor reported success.
    Succeeded,
    /// Finished, the processor reported an error outcome.
    Failed,
}

impl RecordState {
    /// Whether this state is terminal (succeeded or failed).
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Succeeded => f.write_str("succeeded"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// The persisted correlation record.
///
/// `request_id`, `request_payload` and `created_at` are fixed at creation.
/// [`finish`](Self::finish) is the only transition and copies them verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationRecord {
    /// Correlation identifier, also the store key.
    pub request_id: RequestId,

    /// Payload supplied by the caller at submission.
    pub request_payload: String,

    /// Payload produced by the processor; empty while pending.
    #[serde(default)]
    pub response_payload: String,

    /// Creation time in milliseconds since the Unix epoch.
    pub created_at: i64,

    /// Set once processing has produced a terminal outcome.
    pub is_response_finished: bool,

    /// Set when the terminal outcome is an error.
    #[serde(default)]
    pub is_response_error: bool,
}

impl CorrelationRecord {
    /// Create a record in the *Pending* state.
    #[must_use]
    pub fn pending(request_id: RequestId, request_payload: impl Into<String>, created_at: i64) -> Self {
        Self {
            request_id,
            request_payload: request_payload.into(),
            response_payload: String::new(),
            created_at,
            is_response_finished: false,
            is_response_error: false,
        }
    }

    /// Build the *Finished* record from this one and a processing outcome.
    ///
    /// Identifier, request payload and creation time are reused verbatim.
    #[must_use]
    pub fn finish(&self, outcome: &ProcessOutcome) -> Self {
        Self {
            request_id: self.request_id.clone(),
            request_payload: self.request_payload.clone(),
            response_payload: outcome.payload.clone(),
            created_at: self.created_at,
            is_response_finished: true,
            is_response_error: outcome.is_error,
        }
    }

    /// Logical state of this record.
    #[must_use]
    pub const fn state(&self) -> RecordState {
        match (self.is_response_finished, self.is_response_error) {
            (false, _) => RecordState::Pending,
            (true, false) => RecordState::Succeeded,
            (true, true) => RecordState::Failed,
        }
    }

    /// Whether the record has reached a terminal state.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.is_response_finished
    }

    /// Encode to the JSON wire format.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::SerializationError`] if encoding fails.
    pub fn to_json(&self) -> Result<String, RecordError> {
        serde_json::to_string(self).map_err(|e| RecordError::SerializationError(e.to_string()))
    }

    /// Decode from the JSON wire format.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::DeserializationError`] if the input is not a
    /// well-formed record.
    pub fn from_json(json: &str) -> Result<Self, RecordError> {
        serde_json::from_str(json).map_err(|e| RecordError::DeserializationError(e.to_string()))
    }
}

/// Message broadcast to workers when dispatching across processes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchMessage {
    /// Correlation identifier of the submitted request.
    pub request_id: RequestId,

    /// Request payload as submitted.
    pub payload: String,
}

impl DispatchMessage {
    /// Create a new dispatch message.
    #[must_use]
    pub fn new(request_id: RequestId, payload: impl Into<String>) -> Self {
        Self {
            request_id,
            payload: payload.into(),
        }
    }

    /// Encode to JSON.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::SerializationError`] if encoding fails.
    pub fn to_json(&self) -> Result<String, RecordError> {
        serde_json::to_string(self).map_err(|e| RecordError::SerializationError(e.to_string()))
    }

    /// Decode from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::DeserializationError`] for malformed messages.
    pub fn from_json(json: &str) -> Result<Self, RecordError> {
        serde_json::from_str(json).map_err(|e| RecordError::DeserializationError(e.to_string()))
    }
}

impl From<DispatchMessage> for ProcessRequest {
    fn from(message: DispatchMessage) -> Self {
        Self::new(message.request_id, message.payload)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use proptest::prelude::*;

    fn sample() -> CorrelationRecord {
        CorrelationRecord::pending(RequestId::new("req-1"), "x", 1_735_689_600_000)
    }

    #[test]
    fn test_generated_ids_are_distinct() {
        let a = RequestId::generate();
        let b = RequestId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn test_pending_record_starts_empty() {
        let record = sample();
        assert_eq!(record.state(), RecordState::Pending);
        assert!(record.response_payload.is_empty());
        assert!(!record.is_response_error);
    }

    #[test]
    fn test_finish_preserves_immutable_fields() {
        let record = sample();
        let finished = record.finish(&ProcessOutcome::failure("boom"));

        assert_eq!(finished.request_id, record.request_id);
        assert_eq!(finished.request_payload, record.request_payload);
        assert_eq!(finished.created_at, record.created_at);
        assert_eq!(finished.response_payload, "boom");
        assert_eq!(finished.state(), RecordState::Failed);
        assert!(finished.state().is_finished());
    }

    #[test]
    fn test_json_uses_wire_field_names() {
        let json = sample().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["request_id"], "req-1");
        assert_eq!(value["request_payload"], "x");
        assert_eq!(value["response_payload"], "");
        assert_eq!(value["created_at"], 1_735_689_600_000_i64);
        assert_eq!(value["is_response_finished"], false);
        assert_eq!(value["is_response_error"], false);
    }

    #[test]
    fn test_decode_tolerates_missing_error_flag() {
        let json = r#"{"request_id":"a","request_payload":"p","response_payload":"r","created_at":1,"is_response_finished":true}"#;
        let record = CorrelationRecord::from_json(json).unwrap();
        assert_eq!(record.state(), RecordState::Succeeded);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = CorrelationRecord::from_json("not json").unwrap_err();
        assert!(matches!(err, RecordError::DeserializationError(_)));
    }

    #[test]
    fn test_dispatch_message_converts_to_request() {
        let message = DispatchMessage::new(RequestId::new("r"), "payload");
        let decoded = DispatchMessage::from_json(&message.to_json().unwrap()).unwrap();
        let request: ProcessRequest = decoded.into();
        assert_eq!(request.request_id.as_str(), "r");
        assert_eq!(request.payload, "payload");
    }

    proptest! {
        #[test]
        fn test_record_json_roundtrip(
            id in "[a-zA-Z0-9-]{1,40}",
            request in ".*",
            response in ".*",
            created_at in any::<i64>(),
            finished in any::<bool>(),
            error in any::<bool>(),
        ) {
            let record = CorrelationRecord {
                request_id: RequestId::new(id),
                request_payload: request,
                response_payload: response,
                created_at,
                is_response_finished: finished,
                is_response_error: error,
            };
            let decoded = CorrelationRecord::from_json(&record.to_json().unwrap()).unwrap();
            prop_assert_eq!(decoded, record);
        }
    }
}
