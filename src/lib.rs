//! wirebus - reconnecting WebSocket event bus client
//!
//! Convenience crate that re-exports the wirebus sub-crates so a single
//! dependency is enough.
//!
//! - **wirebus-core**: frame type, codec, error taxonomy, observability setup
//! - **wirebus-client**: the client, its connection lifecycle, subscriptions,
//!   request correlation and streaming
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use wirebus::Client;
//! use serde_json::{json, Value};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder("ws://localhost:8080/bus").connect().await?;
//!
//!     let _alerts = client.subscribe("alert", |data| async move {
//!         println!("alert: {}", data);
//!     });
//!
//!     let health: Value = client.request("health", json!({}), Duration::from_secs(2)).await?;
//!     println!("health: {}", health);
//!
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```

pub use wirebus_client as client;
pub use wirebus_core as core;

pub use wirebus_client::{Client, ClientBuilder, ClientConfig, ConnectionState};
pub use wirebus_core::{Error, Frame, Result};
