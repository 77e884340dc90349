//! # Session Lanes
//!
//! A per-session work queue for async task scheduling: work for one session
//! runs strictly one-at-a-time unless the caller opts into bounded
//! parallelism.
//!
//! ## Core
//!
//! - One lane per session, created lazily on first submission
//! - Serial lanes by default; explicit `Parallel { max_concurrent }` opt-in
//! - Priority scheduling within a lane, arrival order breaking ties
//! - Per-envelope timeouts measured from dispatch, not submission
//! - Lane clearing/removal, explicit idle sweeping, group shutdown
//! - Lifecycle events and a submitted/completed/failed metrics ledger
//!
//! The queue performs no work of its own: a caller-supplied [`Handler`] is
//! injected at group construction and receives every dispatched envelope.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use session_lanes::{Envelope, FnHandler, LaneGroup, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let group = LaneGroup::builder("chat")
//!         .with_handler(FnHandler::new(|session: String, envelope: Envelope| async move {
//!             Ok(serde_json::json!({"session": session, "echo": envelope.payload}))
//!         }))
//!         .build()?;
//!
//!     let outcome = group.submit("session-1", "chat", serde_json::json!({"text": "hi"})).await?;
//!     let result = outcome.wait().await?;
//!     println!("Result: {}", result);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod envelope;
pub mod error;
pub mod event;
pub mod group;
pub mod handler;
pub mod metrics;
pub mod queue;

pub use config::{GroupConfig, LanePolicy, SubmitOptions};
pub use envelope::{Envelope, EnvelopeId, OutcomeHandle, SessionId};
pub use error::{LaneError, Result};
pub use event::{events, EventEmitter, EventStream, LaneEvent};
pub use group::{GroupRegistry, LaneGroup, LaneGroupBuilder};
pub use handler::{FnHandler, Handler};
pub use metrics::{LedgerSnapshot, MetricsLedger, SessionCounters};
pub use queue::{LaneStatus, LaneTable};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Group statistics snapshot
///
/// Provides a point-in-time view of one lane group across all its lanes.
///
/// # Fields
///
/// * `total_pending` - Envelopes waiting to be dispatched across all lanes
/// * `total_active` - Envelopes currently in flight across all lanes
/// * `lanes` - Per-lane status (pending, active, policy)
///
/// # Example
///
/// ```rust,ignore
/// let stats = group.stats().await;
/// println!("{} pending, {} active", stats.total_pending, stats.total_active);
///
/// for (session_id, status) in &stats.lanes {
///     println!("{}: {} pending, {} active", session_id, status.pending, status.active);
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupStats {
    pub total_pending: usize,
    pub total_active: usize,
    pub lanes: HashMap<String, LaneStatus>,
}
