//! Lane groups: named, isolated queue instances and their registry

use crate::config::{GroupConfig, LanePolicy, SubmitOptions};
use crate::envelope::{OutcomeHandle, SessionId};
use crate::error::{LaneError, Result};
use crate::event::{EventEmitter, EventStream, LaneEvent};
use crate::handler::Handler;
use crate::metrics::{LedgerSnapshot, MetricsLedger};
use crate::queue::{LaneStatus, LaneTable};
use crate::GroupStats;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// A named, independent collection of lanes
///
/// One group owns one lane table, one handler, one event channel, and one
/// metrics ledger. Unrelated subsystems (interactive chat vs. periodic
/// background jobs) should each get their own group so their queues stay
/// isolated.
pub struct LaneGroup {
    name: String,
    table: LaneTable,
}

impl LaneGroup {
    /// Start building a group
    pub fn builder(name: impl Into<String>) -> LaneGroupBuilder {
        LaneGroupBuilder::new(name)
    }

    /// The group's name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Submit work for a session with default options
    pub async fn submit(
        &self,
        session_id: &str,
        kind: &str,
        payload: serde_json::Value,
    ) -> Result<OutcomeHandle> {
        self.table.submit(session_id, kind, payload).await
    }

    /// Submit work with per-envelope overrides
    pub async fn submit_with(
        &self,
        session_id: &str,
        kind: &str,
        payload: serde_json::Value,
        options: SubmitOptions,
    ) -> Result<OutcomeHandle> {
        self.table
            .submit_with(session_id, kind, payload, options)
            .await
    }

    /// Submit work to a lane that allows `max_concurrent` overlapping envelopes
    ///
    /// Sugar for `submit_with` carrying a parallel policy; only effective
    /// when this submission creates the lane.
    pub async fn submit_parallel(
        &self,
        session_id: &str,
        kind: &str,
        payload: serde_json::Value,
        max_concurrent: usize,
    ) -> Result<OutcomeHandle> {
        self.table
            .submit_with(
                session_id,
                kind,
                payload,
                SubmitOptions::new().with_policy(LanePolicy::parallel(max_concurrent)),
            )
            .await
    }

    /// Status of one lane, if it exists
    pub async fn lane_status(&self, session_id: &str) -> Option<LaneStatus> {
        self.table.lane_status(session_id).await
    }

    /// Status of every lane
    pub async fn all_statuses(&self) -> HashMap<SessionId, LaneStatus> {
        self.table.all_statuses().await
    }

    /// Aggregated status across all lanes
    pub async fn stats(&self) -> GroupStats {
        let lanes = self.table.all_statuses().await;
        let mut total_pending = 0;
        let mut total_active = 0;
        for status in lanes.values() {
            total_pending += status.pending;
            total_active += status.active;
        }
        GroupStats {
            total_pending,
            total_active,
            lanes,
        }
    }

    /// Reject every pending envelope in a session's lane
    pub async fn clear_lane(&self, session_id: &str, reason: &str) -> Result<usize> {
        self.table.clear_lane(session_id, reason).await
    }

    /// Clear a session's lane and delete it
    pub async fn remove_lane(&self, session_id: &str) -> Result<usize> {
        self.table.remove_lane(session_id).await
    }

    /// Remove lanes idle for at least `max_idle`; explicit call only
    pub async fn sweep_idle(&self, max_idle: Duration) -> Vec<SessionId> {
        self.table.sweep_idle(max_idle).await
    }

    /// Metrics ledger snapshot
    pub async fn metrics(&self) -> LedgerSnapshot {
        self.table.ledger().snapshot().await
    }

    /// Zero the metrics ledger
    pub async fn reset_metrics(&self) {
        self.table.ledger().reset().await
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<LaneEvent> {
        self.table.events().subscribe()
    }

    /// Subscribe to filtered lifecycle events as a `Stream`
    pub fn subscribe_filtered(
        &self,
        filter: impl Fn(&LaneEvent) -> bool + Send + Sync + 'static,
    ) -> EventStream {
        self.table.events().subscribe_filtered(filter)
    }

    /// Subscribe to all lifecycle events as a `Stream`
    pub fn subscribe_stream(&self) -> EventStream {
        self.table.events().subscribe_stream()
    }

    /// Clear every lane and stop accepting new envelopes
    ///
    /// Does not wait for in-flight work; follow up with [`LaneGroup::drain`]
    /// for a graceful stop.
    pub async fn shutdown(&self, reason: &str) -> usize {
        self.table.shutdown(reason).await
    }

    /// Wait until every lane reports zero pending and zero active
    pub async fn drain(&self, timeout: Duration) -> Result<()> {
        self.table.drain(timeout).await
    }

    /// True once `shutdown` has run
    pub fn is_shutting_down(&self) -> bool {
        self.table.is_shutting_down()
    }
}

/// Builder for [`LaneGroup`]
pub struct LaneGroupBuilder {
    name: String,
    config: GroupConfig,
    handler: Option<Arc<dyn Handler>>,
}

impl LaneGroupBuilder {
    /// Create a builder for a group with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: GroupConfig::default(),
            handler: None,
        }
    }

    /// Set the handler (required)
    pub fn with_handler(mut self, handler: impl Handler + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Set the handler from an existing `Arc`
    pub fn with_handler_arc(mut self, handler: Arc<dyn Handler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: GroupConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the lane limit
    pub fn with_max_lanes(mut self, max_lanes: usize) -> Self {
        self.config.max_lanes = max_lanes;
        self
    }

    /// Set the default envelope timeout
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.config.default_timeout = timeout;
        self
    }

    /// Set the event channel capacity
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    /// Build the group
    pub fn build(self) -> Result<LaneGroup> {
        self.config.validate()?;
        let handler = self
            .handler
            .ok_or_else(|| LaneError::Config("lane group requires a handler".to_string()))?;
        let events = EventEmitter::new(self.config.event_capacity);
        let ledger = Arc::new(MetricsLedger::new());
        let table = LaneTable::new(self.config, handler, events, ledger);
        Ok(LaneGroup {
            name: self.name,
            table,
        })
    }
}

/// Registry mapping group names to groups
///
/// Lets a host process hand isolated queues to unrelated subsystems while
/// keeping one place to shut them all down.
#[derive(Default)]
pub struct GroupRegistry {
    groups: DashMap<String, Arc<LaneGroup>>,
}

impl GroupRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a group under its own name, replacing any previous entry
    pub fn register(&self, group: LaneGroup) -> Arc<LaneGroup> {
        let group = Arc::new(group);
        self.groups
            .insert(group.name().to_string(), Arc::clone(&group));
        group
    }

    /// Look up a group by name
    pub fn get(&self, name: &str) -> Option<Arc<LaneGroup>> {
        self.groups.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove a group from the registry
    ///
    /// Does not shut the group down; existing `Arc`s keep working.
    pub fn remove(&self, name: &str) -> Option<Arc<LaneGroup>> {
        self.groups.remove(name).map(|(_, group)| group)
    }

    /// Names of all registered groups
    pub fn names(&self) -> Vec<String> {
        self.groups.iter().map(|e| e.key().clone()).collect()
    }

    /// Number of registered groups
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// True when no groups are registered
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Shut down every registered group; returns total rejected envelopes
    pub async fn shutdown_all(&self, reason: &str) -> usize {
        let groups: Vec<Arc<LaneGroup>> = self
            .groups
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        let mut total = 0;
        for group in groups {
            total += group.shutdown(reason).await;
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Envelope;
    use crate::handler::FnHandler;

    fn echo_group(name: &str) -> LaneGroup {
        LaneGroup::builder(name)
            .with_handler(FnHandler::new(
                |_session: String, envelope: Envelope| async move { Ok(envelope.payload) },
            ))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_builder_requires_handler() {
        let result = LaneGroup::builder("chat").build();
        assert!(matches!(result, Err(LaneError::Config(_))));
    }

    #[tokio::test]
    async fn test_builder_rejects_invalid_config() {
        let result = LaneGroup::builder("chat")
            .with_handler(FnHandler::new(
                |_session: String, envelope: Envelope| async move { Ok(envelope.payload) },
            ))
            .with_max_lanes(0)
            .build();
        assert!(matches!(result, Err(LaneError::Config(_))));
    }

    #[tokio::test]
    async fn test_group_submit_round_trip() {
        let group = echo_group("chat");
        assert_eq!(group.name(), "chat");

        let handle = group
            .submit("session-1", "echo", serde_json::json!({"text": "hi"}))
            .await
            .unwrap();
        let result = tokio::time::timeout(Duration::from_secs(2), handle.wait())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result["text"], "hi");
    }

    #[tokio::test]
    async fn test_group_stats_aggregates_lanes() {
        let group = echo_group("chat");

        for session in ["a", "b", "c"] {
            let handle = group
                .submit(session, "echo", serde_json::json!({}))
                .await
                .unwrap();
            handle.wait().await.unwrap();
        }
        group.drain(Duration::from_secs(2)).await.unwrap();

        let stats = group.stats().await;
        assert_eq!(stats.total_pending, 0);
        assert_eq!(stats.total_active, 0);
        assert_eq!(stats.lanes.len(), 3);
    }

    #[tokio::test]
    async fn test_group_metrics_and_reset() {
        let group = echo_group("chat");

        let handle = group
            .submit("session-1", "echo", serde_json::json!({}))
            .await
            .unwrap();
        handle.wait().await.unwrap();
        group.drain(Duration::from_secs(2)).await.unwrap();

        let snapshot = group.metrics().await;
        assert_eq!(snapshot.submitted, 1);
        assert_eq!(snapshot.completed, 1);

        group.reset_metrics().await;
        let snapshot = group.metrics().await;
        assert_eq!(snapshot.submitted, 0);
    }

    #[tokio::test]
    async fn test_submit_parallel_creates_parallel_lane() {
        let group = echo_group("background");

        let handle = group
            .submit_parallel("session-1", "job", serde_json::json!({}), 4)
            .await
            .unwrap();
        handle.wait().await.unwrap();

        let status = group.lane_status("session-1").await.unwrap();
        assert_eq!(status.policy, LanePolicy::parallel(4));
    }

    #[tokio::test]
    async fn test_groups_are_isolated() {
        let chat = echo_group("chat");
        let jobs = echo_group("jobs");

        let handle = chat
            .submit("session-1", "echo", serde_json::json!({}))
            .await
            .unwrap();
        handle.wait().await.unwrap();
        chat.drain(Duration::from_secs(2)).await.unwrap();

        // Same session id in another group is a different lane.
        assert!(chat.lane_status("session-1").await.is_some());
        assert!(jobs.lane_status("session-1").await.is_none());
        assert_eq!(jobs.metrics().await.submitted, 0);
    }

    #[tokio::test]
    async fn test_registry_register_get_remove() {
        let registry = GroupRegistry::new();
        assert!(registry.is_empty());

        registry.register(echo_group("chat"));
        registry.register(echo_group("jobs"));
        assert_eq!(registry.len(), 2);

        let chat = registry.get("chat").unwrap();
        assert_eq!(chat.name(), "chat");
        assert!(registry.get("missing").is_none());

        let mut names = registry.names();
        names.sort();
        assert_eq!(names, vec!["chat".to_string(), "jobs".to_string()]);

        let removed = registry.remove("chat").unwrap();
        assert_eq!(removed.name(), "chat");
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_registry_shutdown_all() {
        let registry = GroupRegistry::new();
        let chat = registry.register(echo_group("chat"));
        let jobs = registry.register(echo_group("jobs"));

        registry.shutdown_all("host stopping").await;

        assert!(chat.is_shutting_down());
        assert!(jobs.is_shutting_down());
        assert!(matches!(
            chat.submit("s", "k", serde_json::json!({})).await,
            Err(LaneError::ShutdownInProgress)
        ));
    }
}
