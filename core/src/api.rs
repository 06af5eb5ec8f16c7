//! Request and response shapes exposed to callers.
//!
//! These mirror the external Submission and Poll APIs and serialize to JSON with
//! the field names callers see on the wire.

use crate::record::{CorrelationRecord, RequestId};
use serde::{Deserialize, Serialize};

/// Input to a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRequest {
    /// Opaque payload handed to the processor.
    pub payload: String,
}

impl SubmitRequest {
    /// Create a new submission request.
    #[must_use]
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
        }
    }
}

/// Result of a submission.
///
/// When `is_error` is set the `request_id` is unusable: no record is guaranteed
/// to exist under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionResult {
    /// Whether the submission failed.
    pub is_error: bool,

    /// Failure detail; empty on success.
    pub error_message: String,

    /// Correlation identifier to poll with.
    pub request_id: String,
}

impl SubmissionResult {
    /// A successful submission.
    #[must_use]
    pub fn accepted(request_id: &RequestId) -> Self {
        Self {
            is_error: false,
            error_message: String::new(),
            request_id: request_id.to_string(),
        }
    }

    /// A failed submission carrying the failure detail.
    #[must_use]
    pub fn rejected(request_id: &RequestId, error_message: impl Into<String>) -> Self {
        Self {
            is_error: true,
            error_message: error_message.into(),
            request_id: request_id.to_string(),
        }
    }

    /// The correlation identifier as a typed value.
    #[must_use]
    pub fn id(&self) -> RequestId {
        RequestId::new(self.request_id.clone())
    }
}

/// Result of a successful poll.
///
/// Lookup misses and store failures are reported as errors by the poll handler,
/// never as a pending result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollResult {
    /// Whether processing has reached a terminal outcome.
    pub is_request_finished: bool,

    /// Response payload; empty while pending.
    pub response_payload: String,

    /// Whether the terminal outcome is an error; always `false` while pending.
    pub is_response_error: bool,
}

impl PollResult {
    /// The pending poll result.
    #[must_use]
    pub const fn pending() -> Self {
        Self {
            is_request_finished: false,
            response_payload: String::new(),
            is_response_error: false,
        }
    }
}

impl From<&CorrelationRecord> for PollResult {
    fn from(record: &CorrelationRecord) -> Self {
        if record.is_response_finished {
            Self {
                is_request_finished: true,
                response_payload: record.response_payload.clone(),
                is_response_error: record.is_response_error,
            }
        } else {
            Self::pending()
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::processor::ProcessOutcome;

    #[test]
    fn test_submission_result_wire_shape() {
        let result = SubmissionResult::accepted(&RequestId::new("R"));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "is_error": false, "error_message": "", "request_id": "R" })
        );
    }

    #[test]
    fn test_poll_result_hides_payload_while_pending() {
        let mut record = CorrelationRecord::pending(RequestId::new("R"), "x", 0);
        record.response_payload = "stale".to_string();
        assert_eq!(PollResult::from(&record), PollResult::pending());
    }

    #[test]
    fn test_poll_result_carries_error_flag() {
        let record = CorrelationRecord::pending(RequestId::new("R"), "x", 0)
            .finish(&ProcessOutcome::failure("nope"));
        let poll = PollResult::from(&record);
        assert!(poll.is_request_finished);
        assert!(poll.is_response_error);
        assert_eq!(poll.response_payload, "nope");
    }
}
