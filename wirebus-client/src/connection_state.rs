//! Connection state management
//!
//! This module tracks the connection lifecycle, owns the Reconnect Counter
//! and consults the reconnection strategy after an unplanned close.
//!
//! # Connection States
//!
//! ```text
//! Disconnected → Connecting → Connected → Closing → Disconnected
//!      ↓  ↑           ↓
//!      ↓  └───── (attempt failed)
//!      ↓
//! Reconnecting{attempt} → Connecting → ...
//!      ↓
//!    Failed  (retry budget exhausted; terminal until reopened)
//! ```
//!
//! `Reconnecting` is only ever entered from `Disconnected`. Transitions are
//! serialized: the state is replaced and observers are notified under one
//! lock, so observers see every transition exactly once and in order.
//!
//! # Reconnect Counter
//!
//! Counts consecutive failed connection attempts since the last successful
//! connect. The next attempt number handed to the strategy is the counter
//! plus one; when the strategy declines, the client enters `Failed` and
//! every observer receives `MaxReconnectAttemptsExceeded`.

use crate::metrics::ClientMetrics;
use crate::reconnect::ReconnectionStrategy;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use wirebus_core::Error;

/// Connection state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected, no attempt in progress
    Disconnected,
    /// Handshake in progress
    Connecting,
    /// Socket open and routing frames
    Connected,
    /// Explicit close in progress
    Closing,
    /// Waiting out the backoff before attempt `attempt`
    Reconnecting { attempt: u32 },
    /// Retry budget exhausted
    Failed,
}

impl ConnectionState {
    /// Numeric encoding used by the connection state gauge
    pub fn as_gauge(&self) -> i64 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
            ConnectionState::Reconnecting { .. } => 3,
            ConnectionState::Failed => 4,
            ConnectionState::Closing => 5,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Closing => write!(f, "closing"),
            ConnectionState::Reconnecting { attempt } => write!(f, "reconnecting ({})", attempt),
            ConnectionState::Failed => write!(f, "failed"),
        }
    }
}

/// Event delivered to lifecycle observers
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    /// The connection moved from one state to another
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    /// A connection-level error (e.g. the retry budget ran out)
    Error(Error),
}

/// Callback registered with [`ConnectionManager::add_observer`]
///
/// Observers run synchronously inside the transition and must not call
/// back into the client's connect/disconnect methods.
pub type LifecycleObserver = Arc<dyn Fn(&LifecycleEvent) + Send + Sync>;

/// Handle identifying a registered observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Manages connection state and reconnection decisions
pub struct ConnectionManager {
    state: watch::Sender<ConnectionState>,
    // Held across replace + notify so transitions never interleave
    transition_lock: Mutex<()>,
    strategy: Mutex<Box<dyn ReconnectionStrategy>>,
    failures: AtomicU32,
    retrying: AtomicBool,
    observers: Mutex<Vec<(ObserverId, LifecycleObserver)>>,
    next_observer: AtomicU64,
    metrics: Option<Arc<ClientMetrics>>,
}

impl ConnectionManager {
    /// Create a manager in the `Disconnected` state
    pub fn new(strategy: Box<dyn ReconnectionStrategy>, metrics: Option<Arc<ClientMetrics>>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            state,
            transition_lock: Mutex::new(()),
            strategy: Mutex::new(strategy),
            failures: AtomicU32::new(0),
            retrying: AtomicBool::new(false),
            observers: Mutex::new(Vec::new()),
            next_observer: AtomicU64::new(1),
            metrics,
        }
    }

    /// Get the current connection state
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every state change
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Consecutive failed connection attempts since the last connect
    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    /// Register a lifecycle observer
    pub fn add_observer(&self, observer: LifecycleObserver) -> ObserverId {
        let id = ObserverId(self.next_observer.fetch_add(1, Ordering::Relaxed));
        lock(&self.observers).push((id, observer));
        id
    }

    /// Remove a lifecycle observer
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let mut observers = lock(&self.observers);
        let before = observers.len();
        observers.retain(|(oid, _)| *oid != id);
        observers.len() != before
    }

    /// Transition to `to`, notifying observers if the state changed
    pub fn transition(&self, to: ConnectionState) {
        let _serial = lock(&self.transition_lock);
        self.apply_transition(to);
    }

    /// Caller must hold `transition_lock`
    fn apply_transition(&self, to: ConnectionState) {
        let from = self.state.send_replace(to.clone());
        if from == to {
            return;
        }

        tracing::debug!(from = %from, to = %to, "Connection state changed");
        if let Some(ref m) = self.metrics {
            m.update_connection_state(to.as_gauge());
            if matches!(to, ConnectionState::Reconnecting { .. }) {
                m.record_reconnection_attempt();
            }
        }

        self.notify(&LifecycleEvent::StateChanged { from, to });
    }

    /// Broadcast a connection-level error to observers
    pub fn emit_error(&self, error: Error) {
        let _serial = lock(&self.transition_lock);
        self.apply_error(error);
    }

    /// Caller must hold `transition_lock`
    fn apply_error(&self, error: Error) {
        if let Some(ref m) = self.metrics {
            m.record_error(error.kind());
        }
        self.notify(&LifecycleEvent::Error(error));
    }

    /// Transition to connecting state
    pub fn connecting(&self) {
        self.transition(ConnectionState::Connecting);
    }

    /// Transition to connected state, resetting the counter and strategy
    pub fn connected(&self) {
        self.transition(ConnectionState::Connected);
        self.failures.store(0, Ordering::SeqCst);
        lock(&self.strategy).reset();
        if self.retrying.swap(false, Ordering::SeqCst) {
            if let Some(ref m) = self.metrics {
                m.record_reconnection_success();
            }
        }
    }

    /// Transition to closing state
    pub fn closing(&self) {
        self.transition(ConnectionState::Closing);
    }

    /// Transition to disconnected state
    pub fn disconnected(&self) {
        self.transition(ConnectionState::Disconnected);
    }

    /// Count one failed connection attempt
    pub fn record_failure(&self) -> u32 {
        self.failures.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Clear the counter before an explicit (re)open
    pub fn reset(&self) {
        self.failures.store(0, Ordering::SeqCst);
        self.retrying.store(false, Ordering::SeqCst);
        lock(&self.strategy).reset();
    }

    /// Decide whether to retry after an unplanned close
    ///
    /// Returns the delay to wait (state becomes `Reconnecting`), or `None`
    /// when the strategy gives up (state becomes `Failed` and observers
    /// receive `MaxReconnectAttemptsExceeded`).
    pub fn next_reconnect_delay(&self) -> Option<Duration> {
        let failures = self.failures();
        let attempt = failures + 1;
        let delay = lock(&self.strategy).next_delay(attempt);

        match delay {
            Some(delay) => {
                self.retrying.store(true, Ordering::SeqCst);
                self.transition(ConnectionState::Reconnecting { attempt });
                Some(delay)
            }
            None => {
                // Failed and its error are one step: a reopen waiting on the
                // lock cannot slip its Connecting in between
                let _serial = lock(&self.transition_lock);
                self.apply_transition(ConnectionState::Failed);
                self.apply_error(Error::MaxReconnectAttemptsExceeded { attempts: failures });
                None
            }
        }
    }

    fn notify(&self, event: &LifecycleEvent) {
        // Snapshot so observers may add/remove observers without deadlock
        let observers: Vec<LifecycleObserver> =
            lock(&self.observers).iter().map(|(_, o)| Arc::clone(o)).collect();
        for observer in observers {
            observer(event);
        }
    }
}

/// Lock a std mutex, recovering the data if a panicking holder poisoned it
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
