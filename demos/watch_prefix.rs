//! Example demonstrating prefix watching with re-reads on change.
//!
//! This example shows how to:
//! - Read typed values with fallbacks
//! - Register prefixes and start a watcher
//! - Re-read keys from the update callback
//! - Stop the watcher cleanly
//!
//! It runs against the in-memory store so no Consul agent is needed.
//!
//! Run with: cargo run --example watch_prefix

use consul_kv_config::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("consul_kv_config=debug")
        .init();

    println!("=== Prefix Watch Example ===\n");

    let store = Arc::new(MemoryStore::new());
    store.put("dev/max_connections", "100");
    store.put("dev/timeout", "1.5s");

    let client = KvClient::from_store(store.clone());
    print_settings(&client).await?;

    // The callback runs on the watch task, so hand the prefix to the main task.
    let (tx, mut rx) = mpsc::unbounded_channel();
    let watcher = client.watcher(move |prefix| {
        let _ = tx.send(prefix.to_string());
    });
    watcher.register("dev/")?;
    watcher.register("prod/")?;
    watcher.start()?;
    println!("Watching {:?}\n", watcher.prefixes());

    let writer = Arc::clone(&store);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        writer.put("dev/max_connections", "250");
        tokio::time::sleep(Duration::from_millis(200)).await;
        writer.put("prod/max_connections", "1000");
        tokio::time::sleep(Duration::from_millis(200)).await;
        writer.put("dev/timeout", "not-a-duration");
    });

    // The first event is the startup burst for the non-empty dev/ prefix.
    for _ in 0..4 {
        match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
            Ok(Some(prefix)) => {
                println!("--- {} changed ---", prefix);
                if prefix == "dev/" {
                    print_settings(&client).await?;
                }
            }
            _ => break,
        }
    }

    watcher.stop().await;
    println!("\nWatcher stopped at index {:?}", watcher.last_index("dev/"));
    Ok(())
}

async fn print_settings(client: &KvClient) -> Result<()> {
    let max_connections = match client.get("dev/max_connections").await {
        Ok(value) => value.i32_or(100),
        Err(e) if e.is_not_found() => 100,
        Err(e) => return Err(e),
    };
    let timeout = client
        .get("dev/timeout")
        .await?
        .duration_or(Duration::from_secs(1));

    println!("  max_connections: {}", max_connections);
    println!("  timeout: {:?}", timeout);
    Ok(())
}
