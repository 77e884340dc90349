//! Core queue implementation: lanes, the lane table, and the dispatch loop

use crate::config::{GroupConfig, LanePolicy, SubmitOptions};
use crate::envelope::{Envelope, OutcomeHandle, SessionId};
use crate::error::{LaneError, Result};
use crate::event::{events, EventEmitter, LaneEvent};
use crate::handler::Handler;
use crate::metrics::MetricsLedger;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Pending envelope plus its exclusively-owned outcome channel
struct QueuedEnvelope {
    envelope: Envelope,
    outcome_tx: oneshot::Sender<Result<serde_json::Value>>,
}

impl QueuedEnvelope {
    fn reject(self, error: LaneError) {
        let _ = self.outcome_tx.send(Err(error));
    }
}

// Heap order: highest priority first, earliest arrival among equals.
// Arrival numbers are unique within a table, so equality degenerates to
// the same envelope.
impl PartialEq for QueuedEnvelope {
    fn eq(&self, other: &Self) -> bool {
        self.envelope.arrival == other.envelope.arrival
    }
}

impl Eq for QueuedEnvelope {}

impl PartialOrd for QueuedEnvelope {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEnvelope {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.envelope
            .priority
            .cmp(&other.envelope.priority)
            .then_with(|| other.envelope.arrival.cmp(&self.envelope.arrival))
    }
}

/// Lane state behind the lane's mutex
struct LaneState {
    policy: LanePolicy,
    pending: BinaryHeap<QueuedEnvelope>,
    active: usize,
    last_activity: Instant,
}

impl LaneState {
    fn new(policy: LanePolicy) -> Self {
        Self {
            policy,
            pending: BinaryHeap::new(),
            active: 0,
            last_activity: Instant::now(),
        }
    }

    fn has_capacity(&self) -> bool {
        self.active < self.policy.max_concurrent()
    }
}

/// One session's work queue plus its concurrency policy
struct Lane {
    state: Mutex<LaneState>,
}

impl Lane {
    fn new(policy: LanePolicy) -> Self {
        Self {
            state: Mutex::new(LaneState::new(policy)),
        }
    }

    async fn enqueue(&self, queued: QueuedEnvelope) {
        let mut state = self.state.lock().await;
        state.last_activity = Instant::now();
        state.pending.push(queued);
    }

    /// Claim a dispatch slot and the best pending envelope, if both exist
    async fn try_dequeue(&self) -> Option<QueuedEnvelope> {
        let mut state = self.state.lock().await;
        if state.has_capacity() && !state.pending.is_empty() {
            state.active += 1;
            state.last_activity = Instant::now();
            state.pending.pop()
        } else {
            None
        }
    }

    /// Free a dispatch slot; returns true when the lane just went idle
    async fn release_slot(&self) -> bool {
        let mut state = self.state.lock().await;
        state.active = state.active.saturating_sub(1);
        state.last_activity = Instant::now();
        state.active == 0 && state.pending.is_empty()
    }

    /// Reject every pending envelope; in-flight envelopes are unaffected
    async fn reject_pending(&self, reason: &str) -> usize {
        let mut state = self.state.lock().await;
        let rejected = state.pending.len();
        for queued in state.pending.drain() {
            queued.reject(LaneError::LaneCleared(reason.to_string()));
        }
        rejected
    }

    async fn status(&self) -> LaneStatus {
        let state = self.state.lock().await;
        LaneStatus {
            pending: state.pending.len(),
            active: state.active,
            policy: state.policy,
        }
    }

    async fn is_idle_for(&self, max_idle: Duration) -> bool {
        let state = self.state.lock().await;
        state.active == 0 && state.pending.is_empty() && state.last_activity.elapsed() >= max_idle
    }
}

/// Lane status snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneStatus {
    pub pending: usize,
    pub active: usize,
    pub policy: LanePolicy,
}

struct TableInner {
    lanes: Mutex<HashMap<SessionId, Arc<Lane>>>,
    handler: Arc<dyn Handler>,
    events: EventEmitter,
    ledger: Arc<MetricsLedger>,
    config: GroupConfig,
    arrival_seq: AtomicU64,
    shutting_down: AtomicBool,
}

/// Owned collection of lanes for one lane group
///
/// The table is the single shared mutable structure; every mutation is
/// serialized behind its async mutex. Cloning is cheap and shares state.
#[derive(Clone)]
pub struct LaneTable {
    inner: Arc<TableInner>,
}

impl LaneTable {
    /// Create a lane table with the given handler and collaborators
    pub fn new(
        config: GroupConfig,
        handler: Arc<dyn Handler>,
        events: EventEmitter,
        ledger: Arc<MetricsLedger>,
    ) -> Self {
        Self {
            inner: Arc::new(TableInner {
                lanes: Mutex::new(HashMap::new()),
                handler,
                events,
                ledger,
                config,
                arrival_seq: AtomicU64::new(0),
                shutting_down: AtomicBool::new(false),
            }),
        }
    }

    /// The event emitter this table reports lifecycle events through
    pub fn events(&self) -> &EventEmitter {
        &self.inner.events
    }

    /// The metrics ledger this table records into
    pub fn ledger(&self) -> &Arc<MetricsLedger> {
        &self.inner.ledger
    }

    /// True once `shutdown` has run
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }

    /// Submit an envelope with default options
    pub async fn submit(
        &self,
        session_id: &str,
        kind: &str,
        payload: serde_json::Value,
    ) -> Result<OutcomeHandle> {
        self.submit_with(session_id, kind, payload, SubmitOptions::default())
            .await
    }

    /// Submit an envelope with per-envelope overrides
    ///
    /// Never blocks on the handler: the returned handle resolves
    /// asynchronously. The only synchronous failures are those detected
    /// before an envelope exists (full table, bad policy, shutdown).
    pub async fn submit_with(
        &self,
        session_id: &str,
        kind: &str,
        payload: serde_json::Value,
        options: SubmitOptions,
    ) -> Result<OutcomeHandle> {
        if self.is_shutting_down() {
            return Err(LaneError::ShutdownInProgress);
        }

        let (lane, created) = self.lane_or_create(session_id, options.policy).await?;
        if created {
            let policy = options.policy.unwrap_or_default();
            self.inner.events.emit(
                LaneEvent::new(events::LANE_CREATED)
                    .with("session_id", session_id)
                    .with("serial", policy.is_serial()),
            );
        }

        let (tx, rx) = oneshot::channel();
        let envelope = Envelope {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            kind: kind.to_string(),
            payload,
            priority: options.priority,
            timeout: options.timeout.unwrap_or(self.inner.config.default_timeout),
            arrival: self.inner.arrival_seq.fetch_add(1, Ordering::SeqCst),
            submitted_at: Utc::now(),
        };
        let envelope_id = envelope.id.clone();

        self.inner.ledger.record_submitted(session_id).await;
        self.inner.events.emit(
            LaneEvent::new(events::ENVELOPE_QUEUED)
                .with("session_id", session_id)
                .with("envelope_id", envelope_id.clone())
                .with("kind", kind)
                .with("priority", envelope.priority),
        );

        lane.enqueue(QueuedEnvelope {
            envelope,
            outcome_tx: tx,
        })
        .await;
        pump_lane(Arc::clone(&self.inner), lane);

        Ok(OutcomeHandle::new(envelope_id, rx))
    }

    async fn lane_or_create(
        &self,
        session_id: &str,
        policy: Option<LanePolicy>,
    ) -> Result<(Arc<Lane>, bool)> {
        let mut lanes = self.inner.lanes.lock().await;
        if let Some(lane) = lanes.get(session_id) {
            // Policy overrides only apply at creation time.
            return Ok((Arc::clone(lane), false));
        }
        if lanes.len() >= self.inner.config.max_lanes {
            return Err(LaneError::LaneTableFull(self.inner.config.max_lanes));
        }
        let policy = policy.unwrap_or_default();
        policy.validate()?;
        let lane = Arc::new(Lane::new(policy));
        lanes.insert(session_id.to_string(), Arc::clone(&lane));
        debug!(session_id, serial = policy.is_serial(), "lane created");
        Ok((lane, true))
    }

    /// Reject every pending envelope in a lane; in-flight work is unaffected
    ///
    /// Returns the number of rejected envelopes.
    pub async fn clear_lane(&self, session_id: &str, reason: &str) -> Result<usize> {
        let lane = {
            let lanes = self.inner.lanes.lock().await;
            lanes
                .get(session_id)
                .cloned()
                .ok_or_else(|| LaneError::LaneNotFound(session_id.to_string()))?
        };
        let rejected = lane.reject_pending(reason).await;
        self.inner
            .ledger
            .record_failed_many(session_id, rejected as u64)
            .await;
        info!(session_id, rejected, reason, "lane cleared");
        self.inner.events.emit(
            LaneEvent::new(events::LANE_CLEARED)
                .with("session_id", session_id)
                .with("rejected", rejected)
                .with("reason", reason),
        );
        Ok(rejected)
    }

    /// Clear a lane and delete it
    ///
    /// A later submission for the same session recreates a fresh lane with
    /// whatever policy that submission specifies.
    pub async fn remove_lane(&self, session_id: &str) -> Result<usize> {
        let lane = {
            let mut lanes = self.inner.lanes.lock().await;
            lanes
                .remove(session_id)
                .ok_or_else(|| LaneError::LaneNotFound(session_id.to_string()))?
        };
        let rejected = lane.reject_pending("lane removed").await;
        self.inner
            .ledger
            .record_failed_many(session_id, rejected as u64)
            .await;
        info!(session_id, rejected, "lane removed");
        self.inner.events.emit(
            LaneEvent::new(events::LANE_REMOVED)
                .with("session_id", session_id)
                .with("rejected", rejected),
        );
        Ok(rejected)
    }

    /// Remove lanes that are empty, inactive, and idle for at least `max_idle`
    ///
    /// Never runs automatically; the host process decides when to sweep.
    /// Returns the removed session ids.
    pub async fn sweep_idle(&self, max_idle: Duration) -> Vec<SessionId> {
        let mut removed = Vec::new();
        {
            let mut lanes = self.inner.lanes.lock().await;
            let candidates: Vec<(SessionId, Arc<Lane>)> = lanes
                .iter()
                .map(|(id, lane)| (id.clone(), Arc::clone(lane)))
                .collect();
            for (session_id, lane) in candidates {
                if lane.is_idle_for(max_idle).await {
                    lanes.remove(&session_id);
                    removed.push(session_id);
                }
            }
        }
        for session_id in &removed {
            debug!(session_id, "idle lane swept");
            self.inner.events.emit(
                LaneEvent::new(events::LANE_REMOVED)
                    .with("session_id", session_id.clone())
                    .with("swept", true),
            );
        }
        removed
    }

    /// Clear every lane and stop accepting new envelopes
    ///
    /// Does not wait for in-flight work; callers wanting a graceful stop
    /// should follow up with [`LaneTable::drain`]. Returns the total number
    /// of rejected envelopes.
    pub async fn shutdown(&self, reason: &str) -> usize {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        info!(reason, "lane table shutting down");

        let lanes: Vec<(SessionId, Arc<Lane>)> = {
            let lanes = self.inner.lanes.lock().await;
            lanes
                .iter()
                .map(|(id, lane)| (id.clone(), Arc::clone(lane)))
                .collect()
        };

        let mut total_rejected = 0;
        for (session_id, lane) in lanes {
            let rejected = lane.reject_pending(reason).await;
            if rejected > 0 {
                self.inner
                    .ledger
                    .record_failed_many(&session_id, rejected as u64)
                    .await;
                self.inner.events.emit(
                    LaneEvent::new(events::LANE_CLEARED)
                        .with("session_id", session_id)
                        .with("rejected", rejected)
                        .with("reason", reason),
                );
            }
            total_rejected += rejected;
        }

        self.inner.events.emit(
            LaneEvent::new(events::GROUP_SHUTDOWN)
                .with("reason", reason)
                .with("rejected", total_rejected),
        );
        total_rejected
    }

    /// Wait until every lane reports zero pending and zero active
    pub async fn drain(&self, timeout: Duration) -> Result<()> {
        let start = Instant::now();
        loop {
            let statuses = self.all_statuses().await;
            if statuses.values().all(|s| s.pending == 0 && s.active == 0) {
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(LaneError::Timeout(timeout));
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Status of one lane, if it exists
    pub async fn lane_status(&self, session_id: &str) -> Option<LaneStatus> {
        let lane = {
            let lanes = self.inner.lanes.lock().await;
            lanes.get(session_id).cloned()
        }?;
        Some(lane.status().await)
    }

    /// Status of every lane
    pub async fn all_statuses(&self) -> HashMap<SessionId, LaneStatus> {
        let lanes: Vec<(SessionId, Arc<Lane>)> = {
            let lanes = self.inner.lanes.lock().await;
            lanes
                .iter()
                .map(|(id, lane)| (id.clone(), Arc::clone(lane)))
                .collect()
        };
        let mut statuses = HashMap::new();
        for (session_id, lane) in lanes {
            statuses.insert(session_id, lane.status().await);
        }
        statuses
    }

    /// Number of lanes currently in the table
    pub async fn lane_count(&self) -> usize {
        self.inner.lanes.lock().await.len()
    }
}

/// Drain a lane's ready envelopes into dispatch tasks.
///
/// Re-entered after every submission and every slot release, so no idle
/// tick is needed: the next eligible envelope starts immediately.
fn pump_lane(inner: Arc<TableInner>, lane: Arc<Lane>) {
    tokio::spawn(async move {
        while let Some(queued) = lane.try_dequeue().await {
            run_envelope(Arc::clone(&inner), Arc::clone(&lane), queued);
        }
    });
}

/// Run one dispatched envelope to its outcome.
///
/// The timeout clock starts here, at dispatch, never at submission. A
/// timeout frees the lane slot but does not interrupt the handler; a late
/// result is logged and discarded.
fn run_envelope(inner: Arc<TableInner>, lane: Arc<Lane>, queued: QueuedEnvelope) {
    tokio::spawn(async move {
        let QueuedEnvelope {
            envelope,
            outcome_tx,
        } = queued;

        debug!(
            envelope_id = %envelope.id,
            session_id = %envelope.session_id,
            kind = %envelope.kind,
            "dispatching envelope"
        );
        inner.events.emit(
            LaneEvent::new(events::ENVELOPE_DISPATCHED)
                .with("session_id", envelope.session_id.clone())
                .with("envelope_id", envelope.id.clone())
                .with("kind", envelope.kind.clone()),
        );

        let handler = Arc::clone(&inner.handler);
        let handler_session = envelope.session_id.clone();
        let handler_envelope = envelope.clone();
        let mut work =
            tokio::spawn(async move { handler.handle(&handler_session, &handler_envelope).await });

        let outcome = match tokio::time::timeout(envelope.timeout, &mut work).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => {
                Err(LaneError::Handler(format!("handler panicked: {join_error}")))
            }
            Err(_) => {
                // The handler may still be running; let it finish on its own
                // and discard whatever it eventually produces.
                let envelope_id = envelope.id.clone();
                tokio::spawn(async move {
                    if let Ok(late) = work.await {
                        debug!(
                            envelope_id = %envelope_id,
                            late_ok = late.is_ok(),
                            "discarding late handler result after timeout"
                        );
                    }
                });
                Err(LaneError::Timeout(envelope.timeout))
            }
        };

        match &outcome {
            Ok(_) => {
                inner.ledger.record_completed(&envelope.session_id).await;
                inner.events.emit(
                    LaneEvent::new(events::ENVELOPE_COMPLETED)
                        .with("session_id", envelope.session_id.clone())
                        .with("envelope_id", envelope.id.clone()),
                );
            }
            Err(LaneError::Timeout(timeout)) => {
                inner.ledger.record_failed(&envelope.session_id).await;
                warn!(
                    envelope_id = %envelope.id,
                    session_id = %envelope.session_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "envelope timed out"
                );
                inner.events.emit(
                    LaneEvent::new(events::ENVELOPE_TIMED_OUT)
                        .with("session_id", envelope.session_id.clone())
                        .with("envelope_id", envelope.id.clone())
                        .with("timeout_ms", timeout.as_millis() as u64),
                );
            }
            Err(error) => {
                inner.ledger.record_failed(&envelope.session_id).await;
                inner.events.emit(
                    LaneEvent::new(events::ENVELOPE_FAILED)
                        .with("session_id", envelope.session_id.clone())
                        .with("envelope_id", envelope.id.clone())
                        .with("error", error.to_string()),
                );
            }
        }

        let _ = outcome_tx.send(outcome);

        if lane.release_slot().await {
            inner.events.emit(
                LaneEvent::new(events::LANE_IDLE).with("session_id", envelope.session_id.clone()),
            );
        }
        pump_lane(inner, lane);
    });
}
