//! Codec for bus frame serialization and deserialization
//!
//! Encoding is plain serde. Decoding is deliberately lenient about the
//! optional fields and strict about routing:
//!
//! - The payload must be a JSON object with a string `type`, otherwise the
//!   frame is rejected with [`Error::MalformedFrame`].
//! - `data` defaults to `null`.
//! - `id` may arrive as a string or a number; numbers are normalised to
//!   their decimal string so they match ids generated locally.
//! - `done` defaults to `false`.
//!
//! # Examples
//!
//! ```rust
//! use wirebus_core::{codec, Frame};
//! use serde_json::json;
//!
//! let frame = Frame::new("health", json!({"ok": true}));
//! let text = codec::encode(&frame).unwrap();
//!
//! let decoded = codec::decode(&text).unwrap();
//! assert_eq!(decoded.kind, "health");
//! ```

use crate::error::{Error, Result};
use crate::frame::Frame;
use serde_json::Value;

/// Encode a frame to its JSON text form
pub fn encode(frame: &Frame) -> Result<String> {
    serde_json::to_string(frame).map_err(|e| Error::Serialization(e.to_string()))
}

/// Decode a text frame
///
/// # Errors
///
/// Returns `Error::MalformedFrame` when the text is not JSON, is not an
/// object, or has no string `type`.
pub fn decode(text: &str) -> Result<Frame> {
    // Parse to a generic value first so a missing `type` is reported as a
    // malformed frame rather than a generic serde error
    let value: Value = serde_json::from_str(text)
        .map_err(|e| Error::MalformedFrame(format!("invalid JSON: {}", e)))?;

    let Value::Object(mut object) = value else {
        return Err(Error::MalformedFrame("frame is not a JSON object".into()));
    };

    let kind = match object.remove("type") {
        Some(Value::String(kind)) => kind,
        Some(_) => return Err(Error::MalformedFrame("`type` is not a string".into())),
        None => return Err(Error::MalformedFrame("missing `type`".into())),
    };

    let id = match object.remove("id") {
        None | Some(Value::Null) => None,
        Some(Value::String(id)) => Some(id),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(_) => return Err(Error::MalformedFrame("`id` must be a string or number".into())),
    };

    let done = matches!(object.remove("done"), Some(Value::Bool(true)));
    let data = object.remove("data").unwrap_or(Value::Null);

    Ok(Frame {
        kind,
        data,
        id,
        done,
    })
}

/// Decode a binary frame carrying UTF-8 JSON
pub fn decode_binary(bytes: &[u8]) -> Result<Frame> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| Error::MalformedFrame("binary frame is not UTF-8".into()))?;
    decode(text)
}
