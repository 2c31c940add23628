//! Request tracking
//!
//! This module pairs outgoing requests with the response frame that
//! eventually carries the same `id`.
//!
//! # Request Lifecycle
//!
//! 1. **Generate ID**: `next_id()` yields `"<prefix>-<n>"`, the prefix being
//!    random per manager so ids from separate clients never collide
//! 2. **Register**: a oneshot channel and a deadline are stored under the id
//! 3. **Send**: the caller transmits the request frame
//! 4. **Wait**: the caller awaits [`PendingRequest::wait`]
//! 5. **Settle**: exactly one of response, timeout, cancellation or
//!    connection loss removes the entry and wakes the caller
//!
//! Settled ids are remembered for a while (see [`RecentIds`]), so a second
//! frame with the same id, or a reply that arrives after the timeout, is
//! recognised as a stale response and ignored rather than treated as an
//! event. Dropping a `PendingRequest` without waiting removes its entry too.

use crate::connection_state::lock;
use rand::Rng;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use wirebus_core::{Error, Frame, Result};

type Shared = Arc<Mutex<Table>>;

/// How many settled ids are remembered
pub(crate) const RECENT_ID_CAPACITY: usize = 1024;

/// Bounded FIFO memory of ids that were settled recently
///
/// Once full, the oldest id is forgotten first.
#[derive(Debug)]
pub(crate) struct RecentIds {
    order: VecDeque<String>,
    members: HashSet<String>,
    capacity: usize,
}

impl RecentIds {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    pub(crate) fn insert(&mut self, id: &str) {
        if self.capacity == 0 || self.members.contains(id) {
            return;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
        self.order.push_back(id.to_string());
        self.members.insert(id.to_string());
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }
}

/// Pending entries plus the ids settled recently
#[derive(Debug)]
struct Table {
    pending: HashMap<String, oneshot::Sender<Result<Frame>>>,
    settled: RecentIds,
}

/// Manager for tracking pending requests
#[derive(Clone)]
pub struct RequestManager {
    table: Shared,
    prefix: Arc<str>,
    counter: Arc<AtomicU64>,
}

impl RequestManager {
    /// Create a new request manager with a random id prefix
    pub fn new() -> Self {
        let prefix: u32 = rand::thread_rng().gen();
        Self::with_prefix(format!("{:08x}", prefix))
    }

    /// Create a manager whose ids start with `prefix`
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            table: Arc::new(Mutex::new(Table {
                pending: HashMap::new(),
                settled: RecentIds::new(RECENT_ID_CAPACITY),
            })),
            prefix: Arc::from(prefix.into()),
            counter: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Generate a new unique request ID
    pub fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.prefix, n)
    }

    /// Register a pending request that times out after `timeout`
    ///
    /// The deadline is fixed here, not when the caller starts waiting.
    pub fn register(&self, id: impl Into<String>, timeout: Duration) -> Result<PendingRequest> {
        let id = id.into();
        let (tx, rx) = oneshot::channel();

        {
            let mut table = lock(&self.table);
            if table.pending.contains_key(&id) {
                return Err(Error::DuplicateRequestId(id));
            }
            table.pending.insert(id.clone(), tx);
        }

        Ok(PendingRequest {
            id,
            rx,
            timeout,
            deadline: Instant::now() + timeout,
            table: Arc::clone(&self.table),
        })
    }

    /// Resolve the pending request `id` with `frame`
    ///
    /// Returns false when nothing was waiting (unknown, settled or duplicate).
    pub fn complete(&self, id: &str, frame: Frame) -> bool {
        match take(&self.table, id) {
            Some(tx) => {
                let _ = tx.send(Ok(frame));
                true
            }
            None => {
                tracing::debug!(request_id = %id, "Ignoring response with no pending request");
                false
            }
        }
    }

    /// Fail a pending request with an error
    pub fn fail(&self, id: &str, error: Error) -> bool {
        match take(&self.table, id) {
            Some(tx) => {
                let _ = tx.send(Err(error));
                true
            }
            None => false,
        }
    }

    /// Cancel a pending request; its waiter receives `Cancelled`
    pub fn cancel(&self, id: &str) -> bool {
        self.fail(id, Error::Cancelled)
    }

    /// Fail all pending requests, returning how many there were
    pub fn fail_all(&self, error: Error) -> usize {
        let drained: Vec<_> = {
            let mut table = lock(&self.table);
            let drained: Vec<_> = table.pending.drain().collect();
            for (id, _) in &drained {
                table.settled.insert(id);
            }
            drained
        };
        let count = drained.len();
        for (_, tx) in drained {
            let _ = tx.send(Err(error.clone()));
        }
        count
    }

    /// Whether `id` is still awaiting a response
    pub fn is_pending(&self, id: &str) -> bool {
        lock(&self.table).pending.contains_key(id)
    }

    /// Whether `id` belonged to a request that has already been settled
    ///
    /// Covers responses, timeouts, cancellations, connection loss and
    /// abandoned waiters, for the most recent ids only.
    pub fn is_settled(&self, id: &str) -> bool {
        lock(&self.table).settled.contains(id)
    }

    /// Get the number of pending requests
    pub fn pending_count(&self) -> usize {
        lock(&self.table).pending.len()
    }
}

/// Remove `id` from the pending map, remembering it as settled
fn take(table: &Mutex<Table>, id: &str) -> Option<oneshot::Sender<Result<Frame>>> {
    let mut table = lock(table);
    let tx = table.pending.remove(id)?;
    table.settled.insert(id);
    Some(tx)
}

impl Default for RequestManager {
    fn default() -> Self {
        Self::new()
    }
}

/// A registered request awaiting its response
pub struct PendingRequest {
    id: String,
    rx: oneshot::Receiver<Result<Frame>>,
    timeout: Duration,
    deadline: Instant,
    table: Shared,
}

impl PendingRequest {
    /// The correlation id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the response frame
    ///
    /// Fails with `RequestTimeout` once the deadline passes, or with
    /// whatever error the request was failed with (`ConnectionLost`,
    /// `Cancelled`).
    pub async fn wait(mut self) -> Result<Frame> {
        match tokio::time::timeout_at(self.deadline, &mut self.rx).await {
            Ok(Ok(result)) => result,
            // Sender dropped without settling: the manager went away
            Ok(Err(_)) => Err(Error::ConnectionLost),
            Err(_) => {
                take(&self.table, &self.id);
                // A response may have slipped in between the deadline and the removal
                match self.rx.try_recv() {
                    Ok(result) => result,
                    Err(_) => Err(Error::RequestTimeout {
                        id: self.id.clone(),
                        timeout: self.timeout,
                    }),
                }
            }
        }
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        take(&self.table, &self.id);
    }
}
