//! Single-window quota enforcement.
//!
//! A [`SlidingWindowLimiter`] keeps the timestamps of recent calls, most recent
//! first, and answers how long the caller has to wait before one more call fits
//! into the quota.
//!
//! # Example
//!
//! ```rust
//! use std::time::{Duration, Instant};
//! use poe_trade_client::rate_limit::SlidingWindowLimiter;
//!
//! let mut limiter = SlidingWindowLimiter::new(Duration::from_secs(10), 2);
//! let now = Instant::now();
//!
//! assert_eq!(limiter.admit_at(now), Duration::ZERO);
//! limiter.record_at(now);
//! limiter.record_at(now);
//! assert!(limiter.admit_at(now) > Duration::ZERO);
//! ```

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::error::TradeError;
use crate::rate_limit::RateLimitPolicy;

/// A sliding window rate limiter for one quota.
///
/// Admission is read-only: [`admit_at`](Self::admit_at) never changes state,
/// only [`record_at`](Self::record_at) does.
#[derive(Debug, Clone)]
pub struct SlidingWindowLimiter {
    /// Call timestamps, most recent first
    calls: VecDeque<Instant>,
    /// Window duration
    window: Duration,
    /// Maximum calls per window
    capacity: u32,
}

impl SlidingWindowLimiter {
    /// Create a new limiter allowing `capacity` calls per `window`.
    ///
    /// A capacity of zero is treated as one.
    pub fn new(window: Duration, capacity: u32) -> Self {
        let capacity = capacity.max(1);
        Self {
            calls: VecDeque::with_capacity(capacity as usize),
            window,
            capacity,
        }
    }

    /// Create a limiter from a server policy, stretching its window by `margin`.
    ///
    /// Fails with [`TradeError::Configuration`] when the stretched window is
    /// not representable as a [`Duration`].
    pub fn from_policy(policy: &RateLimitPolicy, margin: f64) -> Result<Self, TradeError> {
        let seconds = policy.window_seconds as f64 * margin.max(1.0);
        let window = Duration::try_from_secs_f64(seconds).map_err(|err| {
            TradeError::Configuration(format!(
                "window of {}s with margin {margin} is out of range: {err}",
                policy.window_seconds
            ))
        })?;
        Ok(Self::new(window, policy.max_requests))
    }

    /// Record `count` calls as if they all happened at `now`.
    pub fn seed(&mut self, count: u32, now: Instant) {
        for _ in 0..count.min(self.capacity) {
            self.calls.push_front(now);
        }
    }

    /// Time to wait at `now` before one more call fits into the window.
    pub fn admit_at(&self, now: Instant) -> Duration {
        let Some(oldest_counted) = self.calls.get(self.capacity as usize - 1) else {
            return Duration::ZERO;
        };
        (*oldest_counted + self.window).saturating_duration_since(now)
    }

    /// Time to wait before one more call fits into the window.
    pub fn admit(&self) -> Duration {
        self.admit_at(Instant::now())
    }

    /// Record a call issued at `now`.
    pub fn record_at(&mut self, now: Instant) {
        self.calls.push_front(now);
        self.trim(now);
    }

    /// Record a call issued now.
    pub fn record(&mut self) {
        self.record_at(Instant::now());
    }

    /// Number of calls still counted at `now`.
    pub fn used_at(&self, now: Instant) -> u32 {
        self.calls
            .iter()
            .take_while(|ts| now.saturating_duration_since(**ts) < self.window)
            .count() as u32
    }

    /// Number of calls that fit into the window at `now`.
    pub fn remaining_at(&self, now: Instant) -> u32 {
        self.capacity.saturating_sub(self.used_at(now))
    }

    /// Number of retained timestamps.
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Check if no timestamps are retained.
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Maximum calls per window.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Effective window, margin included.
    pub fn window(&self) -> Duration {
        self.window
    }

    // Only the first `capacity` entries are ever inspected, and anything
    // older than the window no longer counts.
    fn trim(&mut self, now: Instant) {
        self.calls.truncate(self.capacity as usize);
        while self
            .calls
            .back()
            .is_some_and(|ts| now.saturating_duration_since(*ts) >= self.window)
        {
            self.calls.pop_back();
        }
    }
}
