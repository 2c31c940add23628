//! The wire unit exchanged with the bus server
//!
//! Every message in either direction is a single JSON object:
//!
//! ```text
//! {"type": "<string>", "data": <any>, "id"?: "<string>", "done"?: true}
//! ```
//!
//! - `type` selects routing: inbound frames are dispatched to the handlers
//!   subscribed to that type.
//! - `id` correlates a response (or a stream chunk) with the request that
//!   caused it. Frames without an id are plain events.
//! - `done` marks the last frame of a streamed response.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frame type the server uses to end a stream without a `done` flag
pub const COMPLETE_TYPE: &str = "complete";

/// Frame type the client sends to release a per-stream subscription
pub const CANCEL_TYPE: &str = "cancel";

/// A typed unit of data on the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Routing tag (`type` on the wire)
    #[serde(rename = "type")]
    pub kind: String,

    /// Payload; `null` when the sender omitted it
    #[serde(default)]
    pub data: Value,

    /// Correlation id, present on requests, responses and stream chunks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Set on the final frame of a streamed response
    #[serde(default, skip_serializing_if = "is_false")]
    pub done: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl Frame {
    /// Create an uncorrelated event frame
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
            id: None,
            done: false,
        }
    }

    /// Create a request frame carrying a correlation id
    pub fn request(kind: impl Into<String>, data: Value, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            data,
            id: Some(id.into()),
            done: false,
        }
    }

    /// Create a `complete` frame ending the stream `id`
    pub fn complete(id: impl Into<String>) -> Self {
        Self::request(COMPLETE_TYPE, Value::Null, id)
    }

    /// Create the `cancel` frame that releases the stream `id` server-side
    pub fn cancel(id: impl Into<String>) -> Self {
        Self::request(CANCEL_TYPE, Value::Null, id)
    }

    /// Mark this frame as the last of its stream
    pub fn with_done(mut self) -> Self {
        self.done = true;
        self
    }

    /// Whether this frame terminates a stream
    pub fn is_complete(&self) -> bool {
        self.done || self.kind == COMPLETE_TYPE
    }
}
