//! Envelope: one immutable unit of submitted work

use crate::error::{LaneError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::oneshot;

/// Session identifier, owned by the caller's domain and opaque to the queue
pub type SessionId = String;

/// Envelope identifier, assigned at submission
pub type EnvelopeId = String;

/// One unit of submitted work
///
/// Immutable once created. The payload and kind are opaque to the queue;
/// they are carried through to the handler verbatim.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    /// Globally unique identifier
    pub id: EnvelopeId,
    /// Owning session (the lane key)
    pub session_id: SessionId,
    /// Opaque tag describing the work type
    pub kind: String,
    /// Opaque caller data
    pub payload: serde_json::Value,
    /// Higher values dequeue first
    pub priority: i32,
    /// Maximum time between dispatch and completion
    #[serde(with = "crate::config::duration_serde")]
    pub timeout: Duration,
    /// Monotonic sequence number breaking priority ties
    pub arrival: u64,
    /// Submission timestamp
    pub submitted_at: DateTime<Utc>,
}

/// Handle through which the submitter receives the envelope's outcome
///
/// Returned immediately by `submit`; resolves asynchronously with the
/// handler's result, a timeout, or a cleared-lane rejection. The outcome
/// arrives exactly once.
pub struct OutcomeHandle {
    id: EnvelopeId,
    rx: oneshot::Receiver<Result<serde_json::Value>>,
}

impl OutcomeHandle {
    pub(crate) fn new(id: EnvelopeId, rx: oneshot::Receiver<Result<serde_json::Value>>) -> Self {
        Self { id, rx }
    }

    /// The envelope's identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the outcome
    ///
    /// Resolves with the handler's result passed through verbatim, or with
    /// the queue's own error (timeout, cleared lane).
    pub async fn wait(self) -> Result<serde_json::Value> {
        match self.rx.await {
            Ok(outcome) => outcome,
            // The sender is consumed exactly once on every path, so a closed
            // channel means the dispatch task was torn down mid-flight.
            Err(_) => Err(LaneError::Other(
                "outcome channel closed before resolution".to_string(),
            )),
        }
    }
}

impl std::fmt::Debug for OutcomeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutcomeHandle").field("id", &self.id).finish()
    }
}
