//! WebSocket connection and its driver task
//!
//! A [`Connection`] owns the physical socket. One background driver task
//! per open connection runs the whole lifecycle:
//!
//! 1. resolve the endpoint and token, perform the handshake
//! 2. read frames and hand them to the [`Router`] one at a time
//! 3. on an unplanned close, fail waiters and ask the reconnection
//!    strategy whether and when to try again
//!
//! The write half lives behind an async mutex so caller tasks can send
//! while the driver reads. An explicit [`close`](Connection::close) signals
//! the driver through a oneshot channel, which is never mistaken for a
//! dropped connection and therefore never triggers a retry.

use crate::connection_state::{lock, ConnectionManager, ConnectionState};
use crate::endpoint::{build_request, EndpointResolver, TokenProvider};
use crate::router::Router;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use wirebus_core::{codec, Error, Frame, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Handle to a running driver task
struct Driver {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Why the read loop stopped
enum ReadOutcome {
    Shutdown,
    Dropped(String),
}

/// The physical connection to the bus
pub struct Connection {
    endpoint: Arc<dyn EndpointResolver>,
    tokens: Option<Arc<dyn TokenProvider>>,
    state: Arc<ConnectionManager>,
    router: Arc<Router>,
    sink: tokio::sync::Mutex<Option<WsSink>>,
    driver: Mutex<Option<Driver>>,
}

impl Connection {
    pub fn new(
        endpoint: Arc<dyn EndpointResolver>,
        tokens: Option<Arc<dyn TokenProvider>>,
        state: Arc<ConnectionManager>,
        router: Arc<Router>,
    ) -> Self {
        Self {
            endpoint,
            tokens,
            state,
            router,
            sink: tokio::sync::Mutex::new(None),
            driver: Mutex::new(None),
        }
    }

    /// Start connecting in the background
    ///
    /// A no-op while a driver is live (connecting, connected or waiting to
    /// reconnect). From `Disconnected` or `Failed` the Reconnect Counter is
    /// reset and a fresh driver is started. Must be called from within a
    /// tokio runtime.
    pub fn open(self: &Arc<Self>) -> Result<()> {
        let mut driver = lock(&self.driver);
        // A driver that reported Failed is on its way out and touches no more state
        let live = driver.as_ref().is_some_and(|d| !d.handle.is_finished());
        if live && self.state.state() != ConnectionState::Failed {
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| Error::Internal("opening a connection requires a tokio runtime".into()))?;

        self.state.reset();
        // Visible before the task runs, so waiters never see a stale Failed
        self.state.connecting();
        let (shutdown, shutdown_rx) = oneshot::channel();
        let handle = runtime.spawn(Arc::clone(self).drive(shutdown_rx));
        *driver = Some(Driver { shutdown, handle });
        Ok(())
    }

    /// Whether a driver task is currently running
    pub fn is_open(&self) -> bool {
        lock(&self.driver)
            .as_ref()
            .is_some_and(|d| !d.handle.is_finished())
    }

    /// Serialize and write `frame`
    ///
    /// Fails with `NotConnected` unless the connection is `Connected`,
    /// including when the write itself fails on a dying socket.
    pub async fn send(&self, frame: &Frame) -> Result<()> {
        if self.state.state() != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }

        let text = codec::encode(frame)?;
        let mut sink = self.sink.lock().await;
        let ws = sink.as_mut().ok_or(Error::NotConnected)?;
        ws.send(Message::Text(text)).await.map_err(|e| {
            tracing::debug!(error = %e, frame_type = %frame.kind, "Write failed");
            Error::NotConnected
        })
    }

    /// Close gracefully and wait for the driver to stop
    ///
    /// Must not be awaited from inside a subscription handler, which runs
    /// on the driver task itself.
    pub async fn close(&self) {
        let driver = lock(&self.driver).take();
        let Some(driver) = driver else {
            // Nothing running; a Failed connection still ends up Disconnected
            self.state.disconnected();
            return;
        };

        self.state.closing();
        let _ = driver.shutdown.send(());
        if let Err(e) = driver.handle.await {
            tracing::error!(error = %e, "Connection driver ended abnormally");
        }
        self.state.disconnected();
    }

    /// Signal the driver to stop without waiting for it
    pub(crate) fn shutdown(&self) {
        if let Some(driver) = lock(&self.driver).take() {
            let _ = driver.shutdown.send(());
        }
    }

    async fn drive(self: Arc<Self>, mut shutdown: oneshot::Receiver<()>) {
        loop {
            self.state.connecting();

            let established = tokio::select! {
                _ = &mut shutdown => {
                    tracing::debug!("Shutdown requested while connecting");
                    self.state.disconnected();
                    return;
                }
                result = self.establish() => result,
            };

            match established {
                Ok(ws) => {
                    let (sink, stream) = ws.split();
                    *self.sink.lock().await = Some(sink);
                    self.state.connected();
                    self.router.on_open();
                    tracing::info!("Connected");

                    match self.read_until_closed(stream, &mut shutdown).await {
                        ReadOutcome::Shutdown => {
                            self.close_socket().await;
                            self.state.disconnected();
                            self.router.on_close("closed by client", &ConnectionState::Disconnected);
                            return;
                        }
                        ReadOutcome::Dropped(reason) => {
                            tracing::info!(reason = %reason, "Connection lost");
                            *self.sink.lock().await = None;
                            self.state.disconnected();
                            self.router.on_close(&reason, &ConnectionState::Disconnected);
                        }
                    }
                }
                Err(e) => {
                    let failures = self.state.record_failure();
                    tracing::warn!(error = %e, failures, "Connection attempt failed");
                    self.state.disconnected();
                }
            }

            let Some(delay) = self.state.next_reconnect_delay() else {
                tracing::error!(
                    failures = self.state.failures(),
                    "Reconnection abandoned (max attempts reached)"
                );
                return;
            };

            tracing::info!(delay_secs = delay.as_secs_f64(), state = %self.state.state(), "Reconnecting");
            tokio::select! {
                _ = &mut shutdown => {
                    self.state.disconnected();
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn establish(&self) -> std::result::Result<WsStream, String> {
        let request = build_request(&self.endpoint, self.tokens.as_ref()).map_err(|e| e.to_string())?;
        let (ws, _response) = connect_async(request).await.map_err(|e| e.to_string())?;
        Ok(ws)
    }

    async fn read_until_closed(
        &self,
        mut stream: futures::stream::SplitStream<WsStream>,
        shutdown: &mut oneshot::Receiver<()>,
    ) -> ReadOutcome {
        loop {
            tokio::select! {
                _ = &mut *shutdown => return ReadOutcome::Shutdown,
                message = stream.next() => match message {
                    Some(Ok(Message::Text(text))) => self.router.on_frame(&text).await,
                    Some(Ok(Message::Binary(bytes))) => self.router.on_binary(&bytes).await,
                    Some(Ok(Message::Close(_))) => {
                        return ReadOutcome::Dropped("closed by server".into());
                    }
                    // Ping/pong are answered by the transport
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return ReadOutcome::Dropped(e.to_string()),
                    None => return ReadOutcome::Dropped("stream ended".into()),
                }
            }
        }
    }

    async fn close_socket(&self) {
        if let Some(mut sink) = self.sink.lock().await.take() {
            if let Err(e) = sink.send(Message::Close(None)).await {
                tracing::debug!(error = %e, "Close frame not delivered");
            }
            let _ = sink.close().await;
        }
    }
}
