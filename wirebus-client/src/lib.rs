//! Reconnecting WebSocket event bus client
//!
//! This crate provides a client that keeps a persistent duplex connection
//! to an event bus server, recovers from disconnection on its own, routes
//! typed frames to subscribers, and correlates requests with their
//! responses, including streamed responses.
//!
//! # Core Features
//!
//! - **Lazy connection**: the socket opens on `connect()` or the first
//!   subscription
//! - **Auto-Reconnection**: exponential backoff with jitter and a retry
//!   budget, after which the client reports `Failed`
//! - **Pub/Sub**: ordered handlers per event type
//! - **Request-Response**: per-call timeouts, fail-fast on connection loss,
//!   explicit cancellation
//! - **Streaming**: chunked responses as a `futures::Stream`
//! - **Observability**: OpenTelemetry metrics and tracing
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use wirebus_client::Client;
//! use serde_json::{json, Value};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new("ws://localhost:8080/bus")?;
//!
//!     // Subscribing opens the connection
//!     let metrics = client.subscribe("metrics_update", |data| async move {
//!         println!("metrics: {}", data);
//!     });
//!
//!     client.wait_until_connected(Duration::from_secs(5)).await?;
//!     let health: Value = client.request("health", json!({}), Duration::from_secs(2)).await?;
//!     println!("health: {}", health);
//!
//!     metrics.unsubscribe();
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! # Streaming
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use serde_json::json;
//!
//! # async fn example(client: wirebus_client::Client) -> wirebus_core::Result<()> {
//! let mut chunks = client.stream("export_report", json!({"range": "24h"})).await?;
//! while let Some(chunk) = chunks.next().await {
//!     println!("{}", chunk?);
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod client_builder;
mod config;
mod connection;
mod connection_state;
mod endpoint;
pub mod global;
mod metrics;
mod reconnect;
mod registry;
mod request;
mod router;
mod stream;

pub use client::{Client, RequestHandle, Subscription};
pub use client_builder::ClientBuilder;
pub use config::ClientConfig;
pub use connection_state::{
    ConnectionManager, ConnectionState, LifecycleEvent, LifecycleObserver, ObserverId,
};
pub use endpoint::{validate_url, EndpointResolver, FnResolver, TokenProvider};
pub use metrics::ClientMetrics;
pub use reconnect::{ExponentialBackoff, NoReconnect, ReconnectionStrategy};
pub use registry::{HandlerFn, HandlerId, SubscriptionRegistry};
pub use request::{PendingRequest, RequestManager};
pub use stream::{CancelHook, ResponseStream, StreamTable};
