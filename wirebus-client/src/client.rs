//! Event bus client over WebSocket
//!
//! This module provides the main [`Client`] type, which ties together the
//! connection driver, the subscription registry, the request correlator
//! and the stream table.
//!
//! # Client Lifecycle
//!
//! 1. **Build**: `Client::builder(url)...build()` creates the client; no
//!    socket is opened yet
//! 2. **Connect**: explicitly via `connect()`, or lazily on the first
//!    `subscribe()`
//! 3. **Use**: subscribe, send, request, stream
//! 4. **Recover**: unplanned drops are retried per the reconnection strategy
//! 5. **Disconnect**: `disconnect()` closes without retrying; dropping the
//!    last clone stops the driver too
//!
//! # Cloning
//!
//! `Client` is cheaply cloneable using `Arc` internally. All clones share
//! the same connection, registry and pending requests.

use crate::client_builder::ClientBuilder;
use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::connection_state::{
    ConnectionManager, ConnectionState, LifecycleEvent, LifecycleObserver, ObserverId,
};
use crate::metrics::ClientMetrics;
use crate::registry::{HandlerId, SubscriptionRegistry};
use crate::request::{PendingRequest, RequestManager};
use crate::router::Router;
use crate::stream::{ResponseStream, StreamTable};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};
use wirebus_core::{Error, Frame, Result};

/// Real-time event bus client
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    pub(crate) connection: Arc<Connection>,
    pub(crate) state: Arc<ConnectionManager>,
    pub(crate) router: Arc<Router>,
    pub(crate) registry: SubscriptionRegistry,
    pub(crate) requests: RequestManager,
    pub(crate) streams: StreamTable,
    pub(crate) config: ClientConfig,
    pub(crate) metrics: Option<Arc<ClientMetrics>>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        // The driver task holds the connection, not the client
        self.connection.shutdown();
    }
}

impl Client {
    /// Start configuring a client for `url`
    pub fn builder(url: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(url)
    }

    /// Create a client with default settings; nothing is connected yet
    pub fn new(url: impl Into<String>) -> Result<Self> {
        ClientBuilder::new(url).build()
    }

    pub(crate) fn from_inner(inner: ClientInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Start connecting in the background
    ///
    /// Idempotent while connecting or connected. After `Failed` or an
    /// explicit disconnect it resets the reconnect counter and starts over.
    pub fn connect(&self) -> Result<()> {
        tracing::info!("Connecting to server");
        self.inner.connection.open()
    }

    /// Wait until the connection is up
    ///
    /// Fails with `MaxReconnectAttemptsExceeded` if the client gives up
    /// first, or `NotConnected` if `timeout` elapses.
    pub async fn wait_until_connected(&self, timeout: Duration) -> Result<()> {
        let mut rx = self.inner.state.subscribe();
        let reached = tokio::time::timeout(timeout, async {
            rx.wait_for(|s| matches!(s, ConnectionState::Connected | ConnectionState::Failed))
                .await
                .map(|s| s.clone())
        })
        .await;

        match reached {
            Ok(Ok(ConnectionState::Connected)) => Ok(()),
            Ok(Ok(_)) => Err(Error::MaxReconnectAttemptsExceeded {
                attempts: self.inner.state.failures(),
            }),
            Ok(Err(_)) | Err(_) => Err(Error::NotConnected),
        }
    }

    /// Close the connection without reconnecting
    ///
    /// Pending requests fail with `ConnectionLost` and active streams with
    /// `StreamAborted`. Do not await this from inside a subscription
    /// handler; spawn it instead.
    pub async fn disconnect(&self) {
        tracing::info!("Disconnecting");
        self.inner.connection.close().await;
    }

    /// Register `handler` for frames of `event_type`
    ///
    /// The first subscription on an idle client opens the connection.
    pub fn subscribe<F, Fut>(&self, event_type: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let event_type = event_type.into();
        let id = self.inner.registry.register(event_type.clone(), handler);
        tracing::debug!(event_type = %event_type, "Subscribed");

        if self.inner.state.state() == ConnectionState::Disconnected
            && !self.inner.connection.is_open()
        {
            if let Err(e) = self.inner.connection.open() {
                tracing::warn!(error = %e, "Lazy connect failed");
            }
        }

        Subscription {
            event_type,
            id,
            registry: self.inner.registry.clone(),
        }
    }

    /// Fire-and-forget send; fails with `NotConnected` when down
    pub async fn send<P: Serialize>(&self, event_type: &str, data: P) -> Result<()> {
        let frame = Frame::new(event_type, serde_json::to_value(data)?);
        self.inner.connection.send(&frame).await
    }

    /// Send a request and wait up to `timeout` for its response
    #[tracing::instrument(skip_all, fields(event_type = %event_type))]
    pub async fn request<P, R>(&self, event_type: &str, data: P, timeout: Duration) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        self.begin_request(event_type, data, timeout)
            .await?
            .response()
            .await
    }

    /// `request` with the configured default timeout
    pub async fn request_default<P, R>(&self, event_type: &str, data: P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        self.request(event_type, data, self.inner.config.default_request_timeout())
            .await
    }

    /// Send a request and return a handle to await or cancel it
    ///
    /// The deadline starts now, not when the response is awaited.
    pub async fn begin_request<P: Serialize>(
        &self,
        event_type: &str,
        data: P,
        timeout: Duration,
    ) -> Result<RequestHandle> {
        let started = Instant::now();
        let data = serde_json::to_value(data)?;
        let id = self.inner.requests.next_id();

        // Register before sending so a fast reply cannot be missed
        let pending = self.inner.requests.register(id.clone(), timeout)?;
        self.inner
            .connection
            .send(&Frame::request(event_type, data, id))
            .await?;

        tracing::debug!(request_id = %pending.id(), "Request sent, waiting for response");
        Ok(RequestHandle {
            pending,
            event_type: event_type.to_string(),
            started,
            metrics: self.inner.metrics.clone(),
        })
    }

    /// Cancel a pending request; its waiter receives `Cancelled`
    pub fn cancel_request(&self, id: &str) -> bool {
        self.inner.requests.cancel(id)
    }

    /// Start a streaming request
    ///
    /// Dropping the returned stream before it ends sends a `cancel` frame.
    pub async fn stream<P: Serialize>(&self, event_type: &str, data: P) -> Result<ResponseStream> {
        let data = serde_json::to_value(data)?;
        let id = self.inner.requests.next_id();

        let connection = Arc::clone(&self.inner.connection);
        let on_cancel = Box::new(move |id: &str| {
            let frame = Frame::cancel(id);
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(async move {
                        if let Err(e) = connection.send(&frame).await {
                            tracing::debug!(error = %e, "Cancel frame not sent");
                        }
                    });
                }
                Err(_) => tracing::debug!("No runtime to send cancel frame"),
            }
        });

        let stream = self.inner.streams.open(id.clone(), Some(on_cancel))?;
        if let Err(e) = self
            .inner
            .connection
            .send(&Frame::request(event_type, data, id.clone()))
            .await
        {
            // Never sent, so nothing to cancel on the server
            self.inner.streams.remove(&id);
            drop(stream);
            return Err(e);
        }

        tracing::debug!(stream_id = %id, event_type, "Stream opened");
        Ok(stream)
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.inner.state.state()
    }

    /// Whether the connection is `Connected`
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Receiver that observes every state change
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Register a lifecycle observer (state changes and terminal errors)
    pub fn on_lifecycle<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        let observer: LifecycleObserver = Arc::new(observer);
        self.inner.state.add_observer(observer)
    }

    /// Remove a lifecycle observer
    pub fn remove_lifecycle_observer(&self, id: ObserverId) -> bool {
        self.inner.state.remove_observer(id)
    }

    /// Receiver for malformed frames and handler failures
    pub fn diagnostics(&self) -> broadcast::Receiver<Error> {
        self.inner.router.diagnostics()
    }

    /// Consecutive failed connection attempts since the last connect
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.state.failures()
    }

    /// Number of requests awaiting a response
    pub fn pending_requests(&self) -> usize {
        self.inner.requests.pending_count()
    }

    /// Number of streams still receiving chunks
    pub fn active_streams(&self) -> usize {
        self.inner.streams.len()
    }

    /// Event types with at least one handler
    pub fn subscriptions(&self) -> Vec<String> {
        self.inner.registry.event_types()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }
}

/// A registered handler; call [`unsubscribe`](Subscription::unsubscribe)
/// to remove it
///
/// Dropping a `Subscription` leaves the handler registered.
pub struct Subscription {
    event_type: String,
    id: HandlerId,
    registry: SubscriptionRegistry,
}

impl Subscription {
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Remove exactly this registration
    pub fn unsubscribe(self) -> bool {
        let removed = self.registry.remove(&self.event_type, self.id);
        tracing::debug!(event_type = %self.event_type, removed, "Unsubscribed");
        removed
    }
}

/// An in-flight request
pub struct RequestHandle {
    pending: PendingRequest,
    event_type: String,
    started: Instant,
    metrics: Option<Arc<ClientMetrics>>,
}

impl RequestHandle {
    /// The correlation id, usable with `Client::cancel_request`
    pub fn id(&self) -> &str {
        self.pending.id()
    }

    /// Wait for the response and deserialize its `data`
    pub async fn response<R: DeserializeOwned>(self) -> Result<R> {
        let Self {
            pending,
            event_type,
            started,
            metrics,
        } = self;
        let id = pending.id().to_string();
        let outcome = pending.wait().await;
        let duration = started.elapsed().as_secs_f64();

        let frame = match outcome {
            Ok(frame) => frame,
            Err(e) => {
                if let Some(ref m) = metrics {
                    m.record_request(&event_type, e.kind(), duration);
                    m.record_error(e.kind());
                }
                tracing::debug!(request_id = %id, error = %e, "Request failed");
                return Err(e);
            }
        };

        if let Some(ref m) = metrics {
            m.record_request(&event_type, "ok", duration);
        }
        tracing::debug!(request_id = %id, duration_secs = duration, "Request completed");

        serde_json::from_value(frame.data).map_err(|e| Error::Serialization(e.to_string()))
    }
}
