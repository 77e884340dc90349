//! Session serialization example
//!
//! This example demonstrates the core guarantee of session-lanes:
//! 1. Work for one session runs strictly one-at-a-time
//! 2. A session can opt into bounded parallelism
//! 3. Priorities reorder queued work within a lane
//! 4. Different sessions never block each other

use async_trait::async_trait;
use session_lanes::{Envelope, Handler, LaneGroup, Result, SubmitOptions};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::{Duration, Instant};

/// Handler that tracks execution order and overlap
struct TrackedHandler {
    execution_order: Arc<AtomicU32>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

#[async_trait]
impl Handler for TrackedHandler {
    async fn handle(&self, session_id: &str, envelope: &Envelope) -> Result<serde_json::Value> {
        let order = self.execution_order.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let start = Instant::now();

        let duration_ms = envelope.payload["duration_ms"].as_u64().unwrap_or(50);
        println!(
            "[Order: {:2}] Executing {} (session: {}, priority: {}) - will take {}ms",
            order, envelope.kind, session_id, envelope.priority, duration_ms
        );

        tokio::time::sleep(Duration::from_millis(duration_ms)).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        println!(
            "[Order: {:2}] Completed {} in {:?}",
            order,
            envelope.kind,
            start.elapsed()
        );

        Ok(serde_json::json!({
            "kind": envelope.kind,
            "execution_order": order,
        }))
    }
}

fn tracked_group(name: &str) -> anyhow::Result<(LaneGroup, Arc<AtomicUsize>)> {
    let max_active = Arc::new(AtomicUsize::new(0));
    let group = LaneGroup::builder(name)
        .with_handler(TrackedHandler {
            execution_order: Arc::new(AtomicU32::new(0)),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::clone(&max_active),
        })
        .build()?;
    Ok((group, max_active))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    println!("=== Session Lanes: Serialization Test ===\n");

    test_serial_session().await?;
    test_parallel_session().await?;
    test_priority_within_lane().await?;

    println!("\n=== All Tests Completed ===");
    Ok(())
}

/// Test 1: A serial session never overlaps its own work
async fn test_serial_session() -> anyhow::Result<()> {
    println!("=== Test 1: Serial Session ===");
    println!("Expected: max overlap of 1 for 6 envelopes\n");

    let (group, max_active) = tracked_group("serial-demo")?;

    let mut outcomes = Vec::new();
    for i in 0..6 {
        outcomes.push(
            group
                .submit(
                    "user-42",
                    &format!("step-{i}"),
                    serde_json::json!({ "duration_ms": 30 }),
                )
                .await?,
        );
    }
    for outcome in outcomes {
        outcome.wait().await?;
    }

    println!("\nMax overlap observed: {}\n", max_active.load(Ordering::SeqCst));
    Ok(())
}

/// Test 2: A parallel session overlaps up to its bound, never beyond
async fn test_parallel_session() -> anyhow::Result<()> {
    println!("=== Test 2: Parallel Session (max_concurrent = 3) ===");
    println!("Expected: max overlap of 3 for 6 envelopes\n");

    let (group, max_active) = tracked_group("parallel-demo")?;

    let mut outcomes = Vec::new();
    for i in 0..6 {
        outcomes.push(
            group
                .submit_parallel(
                    "worker-7",
                    &format!("job-{i}"),
                    serde_json::json!({ "duration_ms": 60 }),
                    3,
                )
                .await?,
        );
    }
    for outcome in outcomes {
        outcome.wait().await?;
    }

    println!("\nMax overlap observed: {}\n", max_active.load(Ordering::SeqCst));
    Ok(())
}

/// Test 3: Higher priority envelopes jump the queue within a lane
async fn test_priority_within_lane() -> anyhow::Result<()> {
    println!("=== Test 3: Priority Within a Lane ===");
    println!("Expected: urgent work dispatches ahead of earlier low-priority work\n");

    let (group, _) = tracked_group("priority-demo")?;

    // The first envelope occupies the serial lane; the rest queue up.
    let mut outcomes = vec![
        group
            .submit("user-9", "blocker", serde_json::json!({ "duration_ms": 100 }))
            .await?,
    ];
    for i in 0..3 {
        outcomes.push(
            group
                .submit("user-9", &format!("routine-{i}"), serde_json::json!({}))
                .await?,
        );
    }
    outcomes.push(
        group
            .submit_with(
                "user-9",
                "urgent",
                serde_json::json!({}),
                SubmitOptions::new().with_priority(10),
            )
            .await?,
    );

    for outcome in outcomes {
        outcome.wait().await?;
    }

    println!();
    Ok(())
}
