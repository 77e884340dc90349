//! Basic usage example
//!
//! This example demonstrates the basic usage of session-lanes:
//! - Building a lane group with an injected handler
//! - Submitting work for several sessions
//! - Receiving outcomes and reading metrics

use async_trait::async_trait;
use session_lanes::{Envelope, Handler, LaneGroup, Result};

/// A handler that greets whoever the payload names
struct GreetHandler;

#[async_trait]
impl Handler for GreetHandler {
    async fn handle(&self, session_id: &str, envelope: &Envelope) -> Result<serde_json::Value> {
        // Simulate some work
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let name = envelope.payload["name"].as_str().unwrap_or("stranger");
        Ok(serde_json::json!({
            "greeting": format!("Hello, {}!", name),
            "session": session_id,
            "timestamp": chrono::Utc::now().to_rfc3339()
        }))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    println!("=== Session Lanes: Basic Usage Example ===\n");

    // Build a lane group with the handler injected up front
    let group = LaneGroup::builder("chat").with_handler(GreetHandler).build()?;
    println!("✓ Lane group created\n");

    // Submit work for a few sessions
    println!("Submitting work...");

    let names = vec!["Alice", "Bob", "Charlie"];
    let mut outcomes = Vec::new();

    for name in names {
        let outcome = group
            .submit(
                &format!("session-{}", name.to_lowercase()),
                "greet",
                serde_json::json!({ "name": name }),
            )
            .await?;
        outcomes.push((name, outcome));

        println!("  → Submitted greeting for {}", name);
    }

    println!("\nWaiting for outcomes...\n");

    for (name, outcome) in outcomes {
        match outcome.wait().await {
            Ok(result) => {
                println!("✓ Outcome for {}: {}", name, result);
            }
            Err(e) => {
                eprintln!("✗ Error for {}: {}", name, e);
            }
        }
    }

    // Read statistics and metrics
    println!("\n=== Group Statistics ===");
    let stats = group.stats().await;
    println!("Total pending: {}", stats.total_pending);
    println!("Total active: {}", stats.total_active);
    println!("Lanes: {}", stats.lanes.len());

    let metrics = group.metrics().await;
    println!(
        "Submitted: {}, completed: {}, failed: {}",
        metrics.submitted, metrics.completed, metrics.failed
    );

    // Shutdown: clears queued work, then wait for in-flight work to finish
    println!("\n=== Shutting Down ===");
    group.shutdown("example finished").await;
    group.drain(tokio::time::Duration::from_secs(5)).await?;
    println!("✓ Shutdown complete");

    Ok(())
}
