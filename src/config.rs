//! Group and lane configuration types

use crate::error::{LaneError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Concurrency policy for a lane
///
/// A lane is either serial (one envelope in flight at a time, the default)
/// or parallel with an explicit bound. The policy is fixed by the first
/// submission that creates the lane; later submissions never change it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum LanePolicy {
    /// At most one envelope in flight
    Serial,
    /// Up to `max_concurrent` envelopes in flight
    Parallel { max_concurrent: usize },
}

impl Default for LanePolicy {
    fn default() -> Self {
        LanePolicy::Serial
    }
}

impl LanePolicy {
    /// Create a parallel policy with the given concurrency bound
    pub fn parallel(max_concurrent: usize) -> Self {
        LanePolicy::Parallel { max_concurrent }
    }

    /// The in-flight bound this policy enforces
    pub fn max_concurrent(&self) -> usize {
        match self {
            LanePolicy::Serial => 1,
            LanePolicy::Parallel { max_concurrent } => *max_concurrent,
        }
    }

    /// True for a serial lane
    pub fn is_serial(&self) -> bool {
        matches!(self, LanePolicy::Serial)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_concurrent() == 0 {
            return Err(LaneError::Config(
                "parallel policy requires max_concurrent >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Lane group configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupConfig {
    /// Maximum number of lanes the table may hold
    pub max_lanes: usize,
    /// Timeout applied to envelopes that do not set their own
    #[serde(with = "duration_serde")]
    pub default_timeout: Duration,
    /// Buffer size of the lifecycle event channel
    pub event_capacity: usize,
}

pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            max_lanes: 1024,
            default_timeout: Duration::from_secs(30),
            event_capacity: 256,
        }
    }
}

impl GroupConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the lane limit (builder pattern)
    pub fn with_max_lanes(mut self, max_lanes: usize) -> Self {
        self.max_lanes = max_lanes;
        self
    }

    /// Set the default envelope timeout (builder pattern)
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Set the event channel capacity (builder pattern)
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_lanes == 0 {
            return Err(LaneError::Config("max_lanes must be at least 1".to_string()));
        }
        if self.event_capacity == 0 {
            return Err(LaneError::Config(
                "event_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-envelope submission overrides
///
/// All fields are optional; `submit` uses `SubmitOptions::default()`.
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// Priority; higher values dequeue first (default 0)
    pub priority: i32,
    /// Timeout override; falls back to the group default
    pub timeout: Option<Duration>,
    /// Policy used only when this submission creates the lane
    pub policy: Option<LanePolicy>,
}

impl SubmitOptions {
    /// Create options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the priority (builder pattern)
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the timeout (builder pattern)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the lane-creation policy (builder pattern)
    pub fn with_policy(mut self, policy: LanePolicy) -> Self {
        self.policy = Some(policy);
        self
    }
}
