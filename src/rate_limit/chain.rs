//! Conjunction of several quota windows.
//!
//! The server enforces a short, a medium and a long window at the same time.
//! A single request counts against all of them, so the chain charges every
//! member on each call and waits for the slowest one.

use std::time::{Duration, Instant};

use crate::error::TradeError;
use crate::rate_limit::{RateLimitPolicy, SlidingWindowLimiter};

/// A set of [`SlidingWindowLimiter`]s that must all admit a call.
#[derive(Debug, Clone, Default)]
pub struct LimiterChain {
    limiters: Vec<SlidingWindowLimiter>,
}

impl LimiterChain {
    /// Create a chain from already configured limiters.
    pub fn new(limiters: Vec<SlidingWindowLimiter>) -> Self {
        Self { limiters }
    }

    /// Build one limiter per policy, each pre-seeded at `now` with the
    /// calls the server reports as already used.
    pub fn from_policies(
        policies: &[RateLimitPolicy],
        window_margin: f64,
        now: Instant,
    ) -> Result<Self, TradeError> {
        let limiters = policies
            .iter()
            .map(|policy| {
                let mut limiter = SlidingWindowLimiter::from_policy(policy, window_margin)?;
                limiter.seed(policy.currently_used, now);
                Ok(limiter)
            })
            .collect::<Result<_, TradeError>>()?;
        Ok(Self { limiters })
    }

    /// Time to wait at `now` before the next call is admitted by every window.
    pub fn wait_before_next_at(&self, now: Instant) -> Duration {
        self.limiters
            .iter()
            .map(|limiter| limiter.admit_at(now))
            .max()
            .unwrap_or_default()
    }

    /// Time to wait before the next call is admitted by every window.
    pub fn wait_before_next(&self) -> Duration {
        self.wait_before_next_at(Instant::now())
    }

    /// Charge one call issued at `now` against every window.
    pub fn record_call_at(&mut self, now: Instant) {
        for limiter in &mut self.limiters {
            limiter.record_at(now);
        }
    }

    /// Charge one call issued now against every window.
    pub fn record_call(&mut self) {
        self.record_call_at(Instant::now());
    }

    /// The member limiters, in policy order.
    pub fn limiters(&self) -> &[SlidingWindowLimiter] {
        &self.limiters
    }

    /// Number of windows in the chain.
    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    /// Check if the chain has no windows.
    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> LimiterChain {
        LimiterChain::new(vec![
            SlidingWindowLimiter::new(Duration::from_secs(10), 2),
            SlidingWindowLimiter::new(Duration::from_secs(60), 3),
        ])
    }

    #[test]
    fn test_empty_chain_never_waits() {
        let chain = LimiterChain::default();
        assert!(chain.is_empty());
        assert_eq!(chain.wait_before_next(), Duration::ZERO);
    }

    #[test]
    fn test_wait_is_max_not_sum() {
        let mut chain = chain();
        let start = Instant::now();

        chain.record_call_at(start);
        chain.record_call_at(start);
        // Short window full, long window has one slot left.
        assert_eq!(chain.wait_before_next_at(start), Duration::from_secs(10));

        let later = start + Duration::from_secs(10);
        chain.record_call_at(later);
        // Short window has room again, long window is now the bottleneck.
        assert_eq!(chain.wait_before_next_at(later), Duration::from_secs(50));
    }

    #[test]
    fn test_record_charges_every_window() {
        let mut chain = chain();
        let now = Instant::now();
        chain.record_call_at(now);

        for limiter in chain.limiters() {
            assert_eq!(limiter.used_at(now), 1);
        }
    }

    #[test]
    fn test_wait_is_idempotent_until_recorded() {
        let mut chain = chain();
        let now = Instant::now();
        chain.record_call_at(now);
        chain.record_call_at(now);

        let later = now + Duration::from_secs(3);
        assert_eq!(chain.wait_before_next_at(later), chain.wait_before_next_at(later));
        assert_eq!(chain.wait_before_next_at(later), Duration::from_secs(7));
    }

    #[test]
    fn test_from_policies_seeds_used_quota() {
        let policies = [
            RateLimitPolicy {
                max_requests: 5,
                window_seconds: 10,
                currently_used: 5,
            },
            RateLimitPolicy {
                max_requests: 30,
                window_seconds: 300,
                currently_used: 1,
            },
        ];
        let now = Instant::now();
        let chain = LimiterChain::from_policies(&policies, 1.2, now).unwrap();

        assert_eq!(chain.len(), 2);
        assert_eq!(chain.limiters()[0].len(), 5);
        assert_eq!(chain.limiters()[1].len(), 1);
        assert_eq!(chain.wait_before_next_at(now), Duration::from_secs(12));
    }

    #[test]
    fn test_from_policies_fails_on_overflowing_window() {
        let policies = [RateLimitPolicy {
            max_requests: 5,
            window_seconds: 10,
            currently_used: 0,
        }];
        let err = LimiterChain::from_policies(&policies, f64::INFINITY, Instant::now()).unwrap_err();
        assert!(err.is_configuration());
    }
}
