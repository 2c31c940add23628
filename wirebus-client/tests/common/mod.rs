//! Common test utilities for wirebus-client integration tests
//!
//! This module provides a mock event bus server and frame helpers for
//! testing client behavior without a real server.

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

type Handler = Arc<dyn Fn(&str) -> Vec<String> + Send + Sync>;

#[derive(Clone, Debug)]
enum Control {
    Push(String),
    DropAll,
}

/// Mock WebSocket server for client testing
///
/// Records every text frame it receives, answers through a handler, can
/// push server-initiated frames and can drop live connections abruptly.
pub struct MockWsServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    control_tx: broadcast::Sender<Control>,
    message_rx: mpsc::Receiver<String>,
    connections: Arc<AtomicUsize>,
    authorization: Arc<Mutex<Vec<Option<String>>>>,
}

impl MockWsServer {
    /// Start a mock server that never answers
    pub async fn new() -> Self {
        Self::with_handler(|_| Vec::new()).await
    }

    /// Start a mock server with a custom frame handler
    ///
    /// The handler receives each inbound text frame and returns the frames
    /// to write back, in order.
    pub async fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&str) -> Vec<String> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handler: Handler = Arc::new(handler);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (msg_tx, message_rx) = mpsc::channel::<String>(100);
        let (control_tx, _) = broadcast::channel::<Control>(64);
        let connections = Arc::new(AtomicUsize::new(0));
        let authorization = Arc::new(Mutex::new(Vec::new()));

        let accept_control = control_tx.clone();
        let accept_connections = Arc::clone(&connections);
        let accept_authorization = Arc::clone(&authorization);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        let _ = accept_control.send(Control::DropAll);
                        break;
                    }
                    accept_result = listener.accept() => {
                        let Ok((stream, _)) = accept_result else { continue };

                        let handler = Arc::clone(&handler);
                        let msg_tx = msg_tx.clone();
                        // Subscribe before the handshake so no push is missed
                        let mut control_rx = accept_control.subscribe();
                        let connections = Arc::clone(&accept_connections);
                        let authorization = Arc::clone(&accept_authorization);

                        tokio::spawn(async move {
                            let record_auth = move |req: &Request,
                                                    resp: Response|
                                  -> Result<Response, ErrorResponse> {
                                let header = req
                                    .headers()
                                    .get("authorization")
                                    .and_then(|v| v.to_str().ok())
                                    .map(str::to_string);
                                authorization.lock().unwrap().push(header);
                                Ok(resp)
                            };

                            let Ok(ws_stream) = accept_hdr_async(stream, record_auth).await else {
                                return;
                            };
                            connections.fetch_add(1, Ordering::SeqCst);
                            let (mut write, mut read) = ws_stream.split();

                            loop {
                                tokio::select! {
                                    control = control_rx.recv() => match control {
                                        Ok(Control::Push(text)) => {
                                            let _ = write.send(Message::Text(text)).await;
                                        }
                                        // Drop the socket without a close handshake
                                        Ok(Control::DropAll) | Err(_) => break,
                                    },
                                    msg = read.next() => match msg {
                                        Some(Ok(Message::Text(text))) => {
                                            let _ = msg_tx.send(text.clone()).await;
                                            for reply in handler(&text) {
                                                let _ = write.send(Message::Text(reply)).await;
                                            }
                                        }
                                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                                        Some(Ok(_)) => {}
                                    },
                                }
                            }
                        });
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            control_tx,
            message_rx,
            connections,
            authorization,
        }
    }

    /// Get the WebSocket URL for connecting to this server
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Send a frame to every live connection
    pub fn push(&self, text: impl Into<String>) {
        let _ = self.control_tx.send(Control::Push(text.into()));
    }

    /// Abruptly drop every live connection, keep listening
    pub fn drop_connections(&self) {
        let _ = self.control_tx.send(Control::DropAll);
    }

    /// Number of successful handshakes so far
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// `Authorization` header of each handshake, in order
    pub fn authorization_headers(&self) -> Vec<Option<String>> {
        self.authorization.lock().unwrap().clone()
    }

    /// Wait for a frame to be received by the server
    ///
    /// Returns None if the timeout expires.
    pub async fn wait_for_message(&mut self) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(5), self.message_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Wait for the next received frame and parse it as JSON
    pub async fn wait_for_frame(&mut self) -> Option<Value> {
        let text = self.wait_for_message().await?;
        serde_json::from_str(&text).ok()
    }

    /// Stop accepting and drop every live connection
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Address on which nothing is listening
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Server-initiated event frame
pub fn event(event_type: &str, data: Value) -> String {
    json!({ "type": event_type, "data": data }).to_string()
}

/// Response frame for request `id`
pub fn reply(id: &str, event_type: &str, data: Value) -> String {
    json!({ "type": event_type, "data": data, "id": id }).to_string()
}

/// Final frame of a stream
pub fn done(id: &str, event_type: &str) -> String {
    json!({ "type": event_type, "data": null, "id": id, "done": true }).to_string()
}

/// Extract `type` and `id` from an inbound request frame
pub fn request_parts(text: &str) -> Option<(String, String)> {
    let value: Value = serde_json::from_str(text).ok()?;
    let kind = value.get("type")?.as_str()?.to_string();
    let id = value.get("id")?.as_str()?.to_string();
    Some((kind, id))
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn eventually<F: Fn() -> bool>(timeout: Duration, condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_server_creation() {
        let server = MockWsServer::new().await;
        assert!(server.url().starts_with("ws://127.0.0.1:"));
        assert_eq!(server.connection_count(), 0);
        server.shutdown().await;
    }

    #[test]
    fn test_frame_helpers() {
        let text = reply("c-1", "ping", json!("pong"));
        assert_eq!(request_parts(&text), Some(("ping".into(), "c-1".into())));
        assert!(request_parts(&event("health", json!({}))).is_none());
        assert!(done("s-1", "report").contains("\"done\":true"));
    }
}
