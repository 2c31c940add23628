//! Reconnection strategies for automatic reconnection
//!
//! After an unplanned close the connection driver asks the strategy how
//! long to wait before the next attempt, or whether to give up. The attempt
//! number passed in is the 1-based index of the attempt about to be made,
//! i.e. the Reconnect Counter (consecutive failures since the last
//! successful connect) plus one.
//!
//! An explicit `disconnect()` never consults the strategy.
//!
//! # Built-in Strategies
//!
//! - **ExponentialBackoff**: `base * 2^(attempt-1)`, capped, with ±20% jitter
//! - **NoReconnect**: never retry
//!
//! # Examples
//!
//! ```rust
//! use wirebus_client::{ExponentialBackoff, ReconnectionStrategy};
//! use std::time::Duration;
//!
//! let mut backoff = ExponentialBackoff::new(Duration::from_millis(500), Duration::from_secs(30))
//!     .with_max_attempts(5)
//!     .without_jitter();
//!
//! assert_eq!(backoff.next_delay(1), Some(Duration::from_millis(500)));
//! assert_eq!(backoff.next_delay(3), Some(Duration::from_millis(2000)));
//! assert_eq!(backoff.next_delay(6), None);
//! ```

use rand::Rng;
use std::time::Duration;

/// Fraction of the computed delay by which jitter may move it either way
const JITTER_RATIO: f64 = 0.2;

/// Decides whether and when to retry after an unplanned disconnect
pub trait ReconnectionStrategy: Send + Sync {
    /// Returns the delay before attempt number `attempt` (1-based)
    ///
    /// - `Some(duration)`: wait this long, then try to connect
    /// - `None`: give up; the client transitions to `Failed`
    fn next_delay(&mut self, attempt: u32) -> Option<Duration>;

    /// Reset any accumulated state after a successful connection
    fn reset(&mut self);
}

/// Exponential backoff with optional ±20% jitter
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base_delay: Duration,
    max_delay: Duration,
    max_attempts: Option<u32>,
    jitter: bool,
}

impl ExponentialBackoff {
    /// Create an unbounded backoff with jitter enabled
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            max_attempts: None,
            jitter: true,
        }
    }

    /// Give up once the attempt number exceeds `max_attempts`
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Disable jitter, making delays deterministic
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Configured attempt budget
    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Un-jittered delay for `attempt`, capped at the maximum delay
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        Duration::from_millis(base_ms.saturating_mul(factor).min(max_ms))
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30)).with_max_attempts(10)
    }
}

impl ReconnectionStrategy for ExponentialBackoff {
    fn next_delay(&mut self, attempt: u32) -> Option<Duration> {
        if let Some(max) = self.max_attempts {
            if attempt > max {
                return None;
            }
        }

        let delay = self.base_delay_for(attempt);
        if !self.jitter || delay.is_zero() {
            return Some(delay);
        }

        let factor = rand::thread_rng().gen_range((1.0 - JITTER_RATIO)..=(1.0 + JITTER_RATIO));
        Some(delay.mul_f64(factor))
    }

    // The delay is a pure function of the attempt number
    fn reset(&mut self) {}
}

/// Strategy that never reconnects
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReconnect;

impl ReconnectionStrategy for NoReconnect {
    fn next_delay(&mut self, _attempt: u32) -> Option<Duration> {
        None
    }

    fn reset(&mut self) {}
}
