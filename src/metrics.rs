//! Metrics ledger for queue observability.
//!
//! Counters are aggregated globally and per session, scoped to one lane
//! group. The ledger lives as long as the group and is reset only by
//! explicit caller action.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Per-session counter triple
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCounters {
    /// Envelopes accepted into the lane
    pub submitted: u64,
    /// Envelopes whose handler resolved successfully
    pub completed: u64,
    /// Envelopes that failed, timed out, or were cleared
    pub failed: u64,
}

/// Point-in-time view of the ledger
///
/// For any drained group (no envelopes pending or active),
/// `submitted == completed + failed` holds both globally and per session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    /// Per-session breakdown mirroring the global counters
    pub sessions: HashMap<String, SessionCounters>,
}

/// Counter ledger scoped to one lane group
///
/// Global totals are derived from the per-session counters, so the two views
/// can never drift apart. Session entries outlive their lanes: removing a
/// lane does not erase its history.
#[derive(Debug, Default)]
pub struct MetricsLedger {
    sessions: RwLock<HashMap<String, SessionCounters>>,
}

impl MetricsLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted submission
    pub async fn record_submitted(&self, session_id: &str) {
        let mut sessions = self.sessions.write().await;
        sessions.entry(session_id.to_string()).or_default().submitted += 1;
    }

    /// Record a successful completion
    pub async fn record_completed(&self, session_id: &str) {
        let mut sessions = self.sessions.write().await;
        sessions.entry(session_id.to_string()).or_default().completed += 1;
    }

    /// Record a failure (handler error, timeout, or cleared envelope)
    pub async fn record_failed(&self, session_id: &str) {
        self.record_failed_many(session_id, 1).await;
    }

    /// Record `count` failures in one step (used when clearing a lane)
    pub async fn record_failed_many(&self, session_id: &str, count: u64) {
        if count == 0 {
            return;
        }
        let mut sessions = self.sessions.write().await;
        sessions.entry(session_id.to_string()).or_default().failed += count;
    }

    /// Export the ledger as a snapshot
    pub async fn snapshot(&self) -> LedgerSnapshot {
        let sessions = self.sessions.read().await;
        let mut snapshot = LedgerSnapshot {
            sessions: sessions.clone(),
            ..Default::default()
        };
        for counters in sessions.values() {
            snapshot.submitted += counters.submitted;
            snapshot.completed += counters.completed;
            snapshot.failed += counters.failed;
        }
        snapshot
    }

    /// Zero every counter (explicit caller action only)
    pub async fn reset(&self) {
        let mut sessions = self.sessions.write().await;
        sessions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ledger_starts_empty() {
        let ledger = MetricsLedger::new();
        let snapshot = ledger.snapshot().await;
        assert_eq!(snapshot.submitted, 0);
        assert_eq!(snapshot.completed, 0);
        assert_eq!(snapshot.failed, 0);
        assert!(snapshot.sessions.is_empty());
    }

    #[tokio::test]
    async fn test_ledger_records_per_session() {
        let ledger = MetricsLedger::new();

        ledger.record_submitted("a").await;
        ledger.record_submitted("a").await;
        ledger.record_submitted("b").await;
        ledger.record_completed("a").await;
        ledger.record_failed("b").await;

        let snapshot = ledger.snapshot().await;
        assert_eq!(snapshot.submitted, 3);
        assert_eq!(snapshot.completed, 1);
        assert_eq!(snapshot.failed, 1);

        let a = snapshot.sessions.get("a").unwrap();
        assert_eq!(a.submitted, 2);
        assert_eq!(a.completed, 1);
        assert_eq!(a.failed, 0);

        let b = snapshot.sessions.get("b").unwrap();
        assert_eq!(b.submitted, 1);
        assert_eq!(b.failed, 1);
    }

    #[tokio::test]
    async fn test_ledger_record_failed_many() {
        let ledger = MetricsLedger::new();

        ledger.record_failed_many("a", 4).await;
        ledger.record_failed_many("a", 0).await;

        let snapshot = ledger.snapshot().await;
        assert_eq!(snapshot.failed, 4);
        assert_eq!(snapshot.sessions.get("a").unwrap().failed, 4);
    }

    #[tokio::test]
    async fn test_ledger_totals_match_session_sums() {
        let ledger = MetricsLedger::new();

        for session in ["a", "b", "c"] {
            for _ in 0..5 {
                ledger.record_submitted(session).await;
            }
            for _ in 0..3 {
                ledger.record_completed(session).await;
            }
            for _ in 0..2 {
                ledger.record_failed(session).await;
            }
        }

        let snapshot = ledger.snapshot().await;
        assert_eq!(snapshot.submitted, 15);
        assert_eq!(snapshot.completed, 9);
        assert_eq!(snapshot.failed, 6);
        assert_eq!(snapshot.submitted, snapshot.completed + snapshot.failed);
    }

    #[tokio::test]
    async fn test_ledger_reset() {
        let ledger = MetricsLedger::new();

        ledger.record_submitted("a").await;
        ledger.record_completed("a").await;
        ledger.reset().await;

        let snapshot = ledger.snapshot().await;
        assert_eq!(snapshot, LedgerSnapshot::default());
    }

    #[test]
    fn test_snapshot_serialization() {
        let mut sessions = HashMap::new();
        sessions.insert(
            "a".to_string(),
            SessionCounters {
                submitted: 3,
                completed: 2,
                failed: 1,
            },
        );
        let snapshot = LedgerSnapshot {
            submitted: 3,
            completed: 2,
            failed: 1,
            sessions,
        };

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"submitted\":3"));

        let parsed: LedgerSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, snapshot);
    }

    #[test]
    fn test_session_counters_default() {
        let counters = SessionCounters::default();
        assert_eq!(counters.submitted, 0);
        assert_eq!(counters.completed, 0);
        assert_eq!(counters.failed, 0);
    }
}
