//! Dashboard feed example
//!
//! Subscribes to live metrics, asks for a health snapshot and tails a
//! streamed report, printing connection state changes along the way.
//!
//! Run with: cargo run --example dashboard_feed -- ws://127.0.0.1:8080/bus

use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use wirebus::client::LifecycleEvent;
use wirebus::{Client, ClientConfig};

#[derive(Debug, Deserialize)]
struct Health {
    status: String,
    #[serde(default)]
    uptime_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://127.0.0.1:8080/bus".to_string());

    let client = Client::builder(url)
        .config(ClientConfig {
            max_reconnect_attempts: 10,
            ..ClientConfig::from_env()?
        })
        .with_token_provider(|| std::env::var("WIREBUS_TOKEN").ok())
        .build()?;

    client.on_lifecycle(|event| match event {
        LifecycleEvent::StateChanged { from, to } => println!("[state] {} -> {}", from, to),
        LifecycleEvent::Error(e) => eprintln!("[error] {}", e),
    });

    // The first subscription opens the connection
    let metrics = client.subscribe("metrics_update", |data: Value| async move {
        println!("[metrics] {}", data);
    });
    client.wait_until_connected(Duration::from_secs(10)).await?;

    let health: Health = client
        .request("health", json!({}), Duration::from_secs(2))
        .await?;
    println!("[health] {} (up {}s)", health.status, health.uptime_secs);

    let mut report = client.stream("export_report", json!({"range": "1h"})).await?;
    let mut rows = 0;
    while let Some(chunk) = report.next().await {
        println!("[report] {}", chunk?);
        rows += 1;
        if rows == 20 {
            // Dropping the stream early tells the server to stop
            break;
        }
    }
    drop(report);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = tokio::time::sleep(Duration::from_secs(30)) => {}
    }

    metrics.unsubscribe();
    client.disconnect().await;
    Ok(())
}
