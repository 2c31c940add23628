//! Streaming responses
//!
//! A streaming request is an ordinary request frame whose reply arrives as
//! several frames sharing its `id`. The [`StreamTable`] routes those frames
//! into a per-stream unbounded queue, and [`ResponseStream`] exposes the
//! queue as a `futures::Stream`.
//!
//! A stream ends after a frame with `done: true` (whose non-null `data` is
//! the final chunk) or a `complete` frame. If the connection drops first,
//! the consumer sees one `Err(StreamAborted)` and then the end.
//!
//! Dropping a `ResponseStream` before it ended removes it from the table
//! and runs its cancel hook, which the client uses to send a `cancel`
//! frame so the server stops producing.
//!
//! Ids of ended streams are remembered for a while, so frames the server
//! sends after the end (or after a cancel) are recognised and dropped.

use crate::connection_state::lock;
use crate::request::{RecentIds, RECENT_ID_CAPACITY};
use futures::Stream;
use serde_json::Value;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use wirebus_core::{Error, Frame, Result};

/// What the router pushes into a stream's queue
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StreamEvent {
    Chunk(Value),
    End,
    Aborted,
}

/// Runs once when a stream is dropped before completion, given its id
pub type CancelHook = Box<dyn FnOnce(&str) + Send>;

struct Streams {
    active: HashMap<String, mpsc::UnboundedSender<StreamEvent>>,
    ended: RecentIds,
}

impl Streams {
    fn end(&mut self, id: &str) -> Option<mpsc::UnboundedSender<StreamEvent>> {
        let tx = self.active.remove(id)?;
        self.ended.insert(id);
        Some(tx)
    }
}

/// Active streams by request id
#[derive(Clone)]
pub struct StreamTable {
    streams: Arc<Mutex<Streams>>,
}

impl Default for StreamTable {
    fn default() -> Self {
        Self {
            streams: Arc::new(Mutex::new(Streams {
                active: HashMap::new(),
                ended: RecentIds::new(RECENT_ID_CAPACITY),
            })),
        }
    }
}

impl StreamTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `id`, returning a stream over its chunks
    pub fn open(&self, id: impl Into<String>, on_cancel: Option<CancelHook>) -> Result<ResponseStream> {
        let id = id.into();
        let (tx, rx) = mpsc::unbounded_channel();

        {
            let mut streams = lock(&self.streams);
            if streams.active.contains_key(&id) {
                return Err(Error::DuplicateRequestId(id));
            }
            streams.active.insert(id.clone(), tx);
        }

        Ok(ResponseStream {
            id,
            rx,
            table: self.clone(),
            on_cancel,
            finished: false,
        })
    }

    /// Offer an inbound frame; returns true if it belonged to a stream
    pub fn deliver(&self, frame: &Frame) -> bool {
        let Some(id) = frame.id.as_deref() else {
            return false;
        };

        let mut streams = lock(&self.streams);
        if frame.is_complete() {
            let Some(tx) = streams.end(id) else {
                return false;
            };
            drop(streams);
            if frame.done && !frame.data.is_null() {
                let _ = tx.send(StreamEvent::Chunk(frame.data.clone()));
            }
            let _ = tx.send(StreamEvent::End);
            return true;
        }

        match streams.active.get(id) {
            Some(tx) => {
                // A closed receiver means the consumer is mid-drop; harmless
                let _ = tx.send(StreamEvent::Chunk(frame.data.clone()));
                true
            }
            None => false,
        }
    }

    /// Abort every active stream, returning how many there were
    pub fn abort_all(&self) -> usize {
        let drained: Vec<_> = {
            let mut streams = lock(&self.streams);
            let drained: Vec<_> = streams.active.drain().collect();
            for (id, _) in &drained {
                streams.ended.insert(id);
            }
            drained
        };
        let count = drained.len();
        for (_, tx) in drained {
            let _ = tx.send(StreamEvent::Aborted);
        }
        count
    }

    /// Stop tracking `id`; returns false if it had already ended
    pub fn remove(&self, id: &str) -> bool {
        lock(&self.streams).end(id).is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        lock(&self.streams).active.contains_key(id)
    }

    /// Whether `id` names a stream that has recently ended
    pub fn has_ended(&self, id: &str) -> bool {
        lock(&self.streams).ended.contains(id)
    }

    /// Number of active streams
    pub fn len(&self) -> usize {
        lock(&self.streams).active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lazily pulled sequence of chunks for one streaming request
pub struct ResponseStream {
    id: String,
    rx: mpsc::UnboundedReceiver<StreamEvent>,
    table: StreamTable,
    on_cancel: Option<CancelHook>,
    finished: bool,
}

impl ResponseStream {
    /// The request id shared by every frame of this stream
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Stream for ResponseStream {
    type Item = Result<Value>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }

        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(StreamEvent::Chunk(value))) => Poll::Ready(Some(Ok(value))),
            Poll::Ready(Some(StreamEvent::End)) => {
                self.finished = true;
                Poll::Ready(None)
            }
            // Sender gone without an end marker counts as an abort too
            Poll::Ready(Some(StreamEvent::Aborted)) | Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(Some(Err(Error::StreamAborted)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for ResponseStream {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        // Only cancel if the server had not already finished the stream
        if self.table.remove(&self.id) {
            tracing::debug!(stream_id = %self.id, "Stream dropped before completion");
            if let Some(on_cancel) = self.on_cancel.take() {
                on_cancel(&self.id);
            }
        }
    }
}
