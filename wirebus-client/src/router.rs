//! Event router
//!
//! Receives the three connection signals (open, raw frame, close) and fans
//! frames out to whoever is waiting for them:
//!
//! 1. a frame whose `id` belongs to an active stream goes to that stream
//! 2. otherwise a frame whose `id` matches a pending request settles it
//! 3. a frame whose `id` belongs to a request or stream that has already
//!    settled is a stale response and is dropped
//! 4. anything else is dispatched to the subscription handlers for its
//!    `type`, one handler after another, in registration order
//!
//! The router is called from the single connection driver task, so frames
//! are processed strictly one at a time in arrival order.

use crate::connection_state::ConnectionState;
use crate::metrics::ClientMetrics;
use crate::registry::SubscriptionRegistry;
use crate::request::RequestManager;
use crate::stream::StreamTable;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::broadcast;
use wirebus_core::{codec, Error, Frame};

/// Capacity of the diagnostics channel; slow receivers see `Lagged`
pub(crate) const DIAGNOSTICS_CAPACITY: usize = 64;

/// Dispatches decoded frames to streams, pending requests and handlers
pub struct Router {
    registry: SubscriptionRegistry,
    requests: RequestManager,
    streams: StreamTable,
    diagnostics: broadcast::Sender<Error>,
    metrics: Option<Arc<ClientMetrics>>,
}

impl Router {
    pub fn new(
        registry: SubscriptionRegistry,
        requests: RequestManager,
        streams: StreamTable,
        metrics: Option<Arc<ClientMetrics>>,
    ) -> Self {
        let (diagnostics, _) = broadcast::channel(DIAGNOSTICS_CAPACITY);
        Self {
            registry,
            requests,
            streams,
            diagnostics,
            metrics,
        }
    }

    /// Receiver for malformed frames and handler failures
    pub fn diagnostics(&self) -> broadcast::Receiver<Error> {
        self.diagnostics.subscribe()
    }

    /// Connection reached `Connected`
    pub fn on_open(&self) {
        tracing::debug!(
            subscriptions = self.registry.event_types().len(),
            "Connection open, routing frames"
        );
    }

    /// Decode and route one raw text frame
    pub async fn on_frame(&self, raw: &str) {
        match codec::decode(raw) {
            Ok(frame) => self.route(frame).await,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed frame");
                self.report(e);
            }
        }
    }

    /// Decode and route one binary frame (UTF-8 JSON)
    pub async fn on_binary(&self, raw: &[u8]) {
        match codec::decode_binary(raw) {
            Ok(frame) => self.route(frame).await,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed binary frame");
                self.report(e);
            }
        }
    }

    /// Route an already decoded frame
    pub async fn route(&self, frame: Frame) {
        if let Some(ref m) = self.metrics {
            m.record_frame(&frame.kind);
        }

        if let Some(id) = frame.id.clone() {
            if self.streams.deliver(&frame) {
                if let Some(ref m) = self.metrics {
                    m.record_stream_chunk();
                }
                return;
            }
            if self.requests.is_pending(&id) {
                self.requests.complete(&id, frame);
                return;
            }
            if self.requests.is_settled(&id) || self.streams.has_ended(&id) {
                tracing::debug!(
                    id = %id,
                    event_type = %frame.kind,
                    "Ignoring frame for an already settled request"
                );
                return;
            }
        }

        let handlers = self.registry.handlers_for(&frame.kind);
        if handlers.is_empty() {
            tracing::trace!(event_type = %frame.kind, "No handlers for frame");
            return;
        }

        for handler in handlers {
            let data = frame.data.clone();
            let outcome = AssertUnwindSafe(async move { handler(data).await })
                .catch_unwind()
                .await;
            if outcome.is_err() {
                tracing::error!(event_type = %frame.kind, "Subscription handler panicked");
                self.report(Error::Internal(format!(
                    "handler for '{}' panicked",
                    frame.kind
                )));
            }
        }
    }

    /// Connection closed, for whatever reason
    ///
    /// Waiters are failed immediately rather than left to their timeouts.
    pub fn on_close(&self, reason: &str, next: &ConnectionState) {
        let requests = self.requests.fail_all(Error::ConnectionLost);
        let streams = self.streams.abort_all();
        tracing::debug!(
            reason,
            next_state = %next,
            failed_requests = requests,
            aborted_streams = streams,
            "Connection closed"
        );
    }

    fn report(&self, error: Error) {
        if let Some(ref m) = self.metrics {
            m.record_error(error.kind());
        }
        // No receivers is fine
        let _ = self.diagnostics.send(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use std::time::Duration;

    fn router() -> (Router, SubscriptionRegistry, RequestManager, StreamTable) {
        let registry = SubscriptionRegistry::new();
        let requests = RequestManager::new();
        let streams = StreamTable::new();
        let router = Router::new(registry.clone(), requests.clone(), streams.clone(), None);
        (router, registry, requests, streams)
    }

    fn collector(registry: &SubscriptionRegistry, event_type: &str) -> Arc<Mutex<Vec<Value>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        registry.register(event_type, move |data| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().push(data);
            }
        });
        seen
    }

    #[tokio::test]
    async fn test_frames_dispatched_in_order() {
        let (router, registry, _, _) = router();
        let seen = collector(&registry, "metrics_update");

        for value in [10, 20, 30] {
            let raw = format!(r#"{{"type":"metrics_update","data":{}}}"#, value);
            router.on_frame(&raw).await;
        }

        assert_eq!(*seen.lock().unwrap(), vec![json!(10), json!(20), json!(30)]);
    }

    #[tokio::test]
    async fn test_malformed_frames_reported_and_skipped() {
        let (router, registry, _, _) = router();
        let seen = collector(&registry, "health");
        let mut diagnostics = router.diagnostics();

        router.on_frame("not json").await;
        router.on_frame(r#"{"data": 1}"#).await;
        router.on_frame(r#"{"type":"health","data":"ok"}"#).await;

        assert!(matches!(diagnostics.recv().await, Ok(Error::MalformedFrame(_))));
        assert!(matches!(diagnostics.recv().await, Ok(Error::MalformedFrame(_))));
        assert_eq!(*seen.lock().unwrap(), vec![json!("ok")]);
    }

    #[tokio::test]
    async fn test_response_settles_request_not_handlers() {
        let (router, registry, requests, _) = router();
        let seen = collector(&registry, "ping");
        let pending = requests.register("c-1", Duration::from_secs(5)).unwrap();

        router.on_frame(r#"{"type":"ping","data":"pong","id":"c-1"}"#).await;

        assert_eq!(pending.wait().await.unwrap().data, json!("pong"));
        assert!(seen.lock().unwrap().is_empty());

        // A duplicate of a settled response is dropped
        router.on_frame(r#"{"type":"ping","data":"again","id":"c-1"}"#).await;
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_late_frames_for_settled_ids_dropped() {
        let (router, registry, requests, streams) = router();
        let seen = collector(&registry, "report");

        let expired = requests.register("c-1", Duration::from_millis(10)).unwrap();
        assert!(expired.wait().await.is_err());
        let cancelled = requests.register("c-2", Duration::from_secs(5)).unwrap();
        requests.cancel("c-2");
        drop(cancelled);
        let stream = streams.open("s-1", None).unwrap();
        router.on_frame(r#"{"type":"report","id":"s-1","done":true}"#).await;
        drop(stream);

        router.on_frame(r#"{"type":"report","data":"late","id":"c-1"}"#).await;
        router.on_frame(r#"{"type":"report","data":"late","id":"c-2"}"#).await;
        router.on_frame(r#"{"type":"report","data":"late","id":"s-1"}"#).await;
        assert!(seen.lock().unwrap().is_empty());

        // Uncorrelated and unknown ids still reach handlers
        router.on_frame(r#"{"type":"report","data":"event"}"#).await;
        router.on_frame(r#"{"type":"report","data":"server-id","id":"srv-9"}"#).await;
        assert_eq!(*seen.lock().unwrap(), vec![json!("event"), json!("server-id")]);
    }

    #[tokio::test]
    async fn test_stream_frames_go_to_stream() {
        let (router, _, _, streams) = router();
        let stream = streams.open("s-1", None).unwrap();

        router.on_frame(r#"{"type":"report","data":"a","id":"s-1"}"#).await;
        router.on_frame(r#"{"type":"report","data":"b","id":"s-1","done":true}"#).await;

        let items: Vec<Value> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(items, vec![json!("a"), json!("b")]);
    }

    #[tokio::test]
    async fn test_handler_panic_does_not_stop_dispatch() {
        let (router, registry, _, _) = router();
        let mut diagnostics = router.diagnostics();
        registry.register("alerts", |_| async { panic!("boom") });
        let seen = collector(&registry, "alerts");

        router.on_frame(r#"{"type":"alerts","data":1}"#).await;

        assert_eq!(*seen.lock().unwrap(), vec![json!(1)]);
        assert!(matches!(diagnostics.recv().await, Ok(Error::Internal(_))));
    }

    #[tokio::test]
    async fn test_close_fails_waiters() {
        let (router, _, requests, streams) = router();
        let pending = requests.register("c-1", Duration::from_secs(30)).unwrap();
        let mut stream = streams.open("s-1", None).unwrap();

        router.on_close("socket reset", &ConnectionState::Disconnected);

        assert_eq!(pending.wait().await.err(), Some(Error::ConnectionLost));
        assert_eq!(stream.next().await, Some(Err(Error::StreamAborted)));
        assert_eq!(stream.next().await, None);
    }
}
