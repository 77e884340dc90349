//! Error types for the lane queue
//!
//! This module defines the error types used throughout the crate.
//! All errors implement the `std::error::Error` trait via `thiserror::Error`.
//!
//! # Error Handling
//!
//! The [`LaneError`] enum covers all possible error conditions:
//! - Submission errors (lane table full, shutdown in progress, bad policy)
//! - Per-envelope outcomes (timeout, handler failure, lane cleared)
//! - Lane management errors (lane not found)
//!
//! Submission errors are returned synchronously from `submit`; everything
//! else is delivered through the envelope's outcome handle.
//!
//! # Example
//!
//! ```rust,ignore
//! use session_lanes::{LaneGroup, LaneError};
//!
//! match group.submit("session-1", "chat", payload).await {
//!     Ok(outcome) => { /* await the outcome */ },
//!     Err(LaneError::LaneTableFull(limit)) => {
//!         eprintln!("lane limit {} reached, retry later", limit);
//!     },
//!     Err(e) => {
//!         eprintln!("submission rejected: {}", e);
//!     }
//! }
//! ```

use thiserror::Error;

/// Lane queue error type
///
/// Represents all possible errors that can occur in the lane queue.
///
/// # Variants
///
/// * `LaneTableFull` - Creating a new lane would exceed the configured limit
/// * `LaneNotFound` - The specified session has no lane
/// * `Config` - Invalid configuration (e.g., parallel policy with zero slots)
/// * `Timeout` - The envelope's timeout elapsed before the handler resolved
/// * `Handler` - The handler task failed outside its own error channel
/// * `LaneCleared` - The envelope was rejected while still pending
/// * `ShutdownInProgress` - The group is shutting down and rejects new work
/// * `Other` - Catch-all for unexpected errors
#[derive(Error, Debug)]
pub enum LaneError {
    /// Lane table is at capacity
    #[error("Lane table is full (limit: {0})")]
    LaneTableFull(usize),

    /// Lane not found
    #[error("Lane not found: {0}")]
    LaneNotFound(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Envelope timeout
    #[error("Envelope timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Handler failure reported by the dispatch machinery (e.g., a panic)
    #[error("Handler error: {0}")]
    Handler(String),

    /// Envelope rejected before dispatch
    #[error("Lane cleared: {0}")]
    LaneCleared(String),

    /// Shutdown in progress
    #[error("Lane group is shutting down, not accepting new envelopes")]
    ShutdownInProgress,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl LaneError {
    /// True when this error is the queue cancelling the caller's wait,
    /// as opposed to the handler's own rejection.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, LaneError::Timeout(_) | LaneError::LaneCleared(_))
    }
}

/// Result type alias using LaneError
///
/// Convenience type alias for `std::result::Result<T, LaneError>`.
/// Used throughout the library for consistent error handling.
pub type Result<T> = std::result::Result<T, LaneError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lane_table_full_error() {
        let error = LaneError::LaneTableFull(64);
        assert_eq!(error.to_string(), "Lane table is full (limit: 64)");
    }

    #[test]
    fn test_lane_not_found_error() {
        let error = LaneError::LaneNotFound("session-9".to_string());
        assert_eq!(error.to_string(), "Lane not found: session-9");
    }

    #[test]
    fn test_config_error() {
        let error = LaneError::Config("max_concurrent must be at least 1".to_string());
        assert_eq!(
            error.to_string(),
            "Configuration error: max_concurrent must be at least 1"
        );
    }

    #[test]
    fn test_timeout_error() {
        let error = LaneError::Timeout(std::time::Duration::from_secs(5));
        assert_eq!(error.to_string(), "Envelope timed out after 5s");
    }

    #[test]
    fn test_handler_error() {
        let error = LaneError::Handler("handler panicked".to_string());
        assert_eq!(error.to_string(), "Handler error: handler panicked");
    }

    #[test]
    fn test_lane_cleared_error() {
        let error = LaneError::LaneCleared("session teardown".to_string());
        assert_eq!(error.to_string(), "Lane cleared: session teardown");
    }

    #[test]
    fn test_shutdown_in_progress_error() {
        let error = LaneError::ShutdownInProgress;
        assert_eq!(
            error.to_string(),
            "Lane group is shutting down, not accepting new envelopes"
        );
    }

    #[test]
    fn test_other_error() {
        let error = LaneError::Other("unexpected error".to_string());
        assert_eq!(error.to_string(), "unexpected error");
    }

    #[test]
    fn test_is_cancellation() {
        assert!(LaneError::Timeout(std::time::Duration::from_secs(1)).is_cancellation());
        assert!(LaneError::LaneCleared("x".to_string()).is_cancellation());
        assert!(!LaneError::Handler("boom".to_string()).is_cancellation());
        assert!(!LaneError::LaneTableFull(8).is_cancellation());
    }

    #[test]
    fn test_error_debug() {
        let error = LaneError::LaneNotFound("test".to_string());
        let debug_str = format!("{:?}", error);
        assert!(debug_str.contains("LaneNotFound"));
    }
}
