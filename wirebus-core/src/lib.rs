//! Core types for the wirebus real-time client
//!
//! This crate holds everything that is independent of the transport:
//!
//! - **Frame**: the typed wire unit (`{type, data, id?, done?}`)
//! - **Codec**: JSON encoding and lenient decoding of frames
//! - **Error**: the error taxonomy every client operation reports through
//! - **Observability**: tracing and OpenTelemetry bootstrap
//!
//! The `wirebus-client` crate builds the WebSocket client on top of it.
//!
//! # Example
//!
//! ```rust
//! use wirebus_core::{codec, Frame};
//! use serde_json::json;
//!
//! let frame = Frame::request("ping", json!({}), "a1b2-1");
//! let text = codec::encode(&frame).unwrap();
//!
//! let decoded = codec::decode(&text).unwrap();
//! assert_eq!(decoded.id.as_deref(), Some("a1b2-1"));
//! ```

pub mod codec;
pub mod error;
pub mod frame;
pub mod observability;

pub use error::{Error, Result};
pub use frame::{Frame, CANCEL_TYPE, COMPLETE_TYPE};
pub use observability::{
    init_logging, init_observability, shutdown_observability, ObservabilityConfig,
};
