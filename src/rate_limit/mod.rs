//! Adaptive rate limiting for the trade API.
//!
//! The trade API enforces several sliding windows at once (for example 8
//! requests per 10 seconds, 15 per minute and 60 per 5 minutes) and only
//! reveals them through response headers. Exceeding them gets the client
//! locked out, and repeated offences get it banned.
//!
//! ## Components
//!
//! - [`SlidingWindowLimiter`]: one quota over one window
//! - [`LimiterChain`]: all windows of one HTTP method, charged together
//! - [`build_chain`]: discovery of the chain from the first response
//! - [`RequestDispatcher`]: per-method state machine, admission waits and
//!   the single retry after a violation
//!
//! ## Example
//!
//! ```rust
//! use std::time::{Duration, Instant};
//! use poe_trade_client::rate_limit::{LimiterChain, parse_policies};
//!
//! let policies = parse_policies("8:10:60,15:60:120", "8:10:0,3:60:0").unwrap();
//! let now = Instant::now();
//! let chain = LimiterChain::from_policies(&policies, 1.2, now).unwrap();
//!
//! // The short window is already exhausted.
//! assert_eq!(chain.wait_before_next_at(now), Duration::from_secs(12));
//! ```

mod chain;
mod dispatcher;
mod policy;
mod window;

pub use chain::LimiterChain;
pub use dispatcher::{DispatchRequest, DispatcherState, HttpMethod, RequestDispatcher};
pub use policy::{
    RateLimitPolicy, RateLimitState, build_chain, discover_policies, has_state_headers,
    parse_policies, parse_states, violation_backoff,
};
pub use window::SlidingWindowLimiter;

use std::time::Duration;

/// Which quota family a rate limit header describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitScope {
    /// Limits tracked per client address.
    Ip,
    /// Limits tracked per logged-in account.
    Account,
}

impl RateLimitScope {
    /// Scope name as it appears in header names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ip => "Ip",
            Self::Account => "Account",
        }
    }

    /// Header advertising the quotas, e.g. `X-Rate-Limit-Account`.
    pub fn policy_header(&self) -> String {
        format!("{}{}", limits::HEADER_PREFIX, self.as_str())
    }

    /// Header reporting the current usage, e.g. `X-Rate-Limit-Account-State`.
    pub fn state_header(&self) -> String {
        format!("{}{}-State", limits::HEADER_PREFIX, self.as_str())
    }
}

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Scope whose policy builds the limiter chains.
    pub policy_scope: RateLimitScope,
    /// Scopes whose state headers are consulted after a violation.
    pub violation_scopes: Vec<RateLimitScope>,
    /// Factor applied to every advertised window.
    pub window_margin: f64,
    /// Added to the server's timeout before retrying.
    pub backoff_margin: Duration,
    /// Whether to enforce the discovered limits.
    pub enabled: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            policy_scope: RateLimitScope::Account,
            violation_scopes: vec![RateLimitScope::Ip, RateLimitScope::Account],
            window_margin: limits::WINDOW_MARGIN,
            backoff_margin: Duration::from_secs(limits::BACKOFF_MARGIN_SECS),
            enabled: true,
        }
    }
}

impl RateLimitConfig {
    /// Defaults for a client without a session.
    ///
    /// Anonymous responses only carry the `Ip` headers, so the chains are
    /// built from that scope.
    pub fn anonymous() -> Self {
        Self {
            policy_scope: RateLimitScope::Ip,
            violation_scopes: vec![RateLimitScope::Ip],
            ..Default::default()
        }
    }
}

/// Rate limit constants.
pub mod limits {
    /// Common prefix of the rate limit headers.
    pub const HEADER_PREFIX: &str = "X-Rate-Limit-";
    /// Windows are stretched by this factor to absorb clock skew.
    pub const WINDOW_MARGIN: f64 = 1.2;
    /// Seconds added to a server-imposed timeout before retrying.
    pub const BACKOFF_MARGIN_SECS: u64 = 10;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_header_names() {
        assert_eq!(RateLimitScope::Ip.policy_header(), "X-Rate-Limit-Ip");
        assert_eq!(
            RateLimitScope::Account.state_header(),
            "X-Rate-Limit-Account-State"
        );
    }

    #[test]
    fn test_anonymous_config_uses_ip_scope() {
        let config = RateLimitConfig::anonymous();
        assert_eq!(config.policy_scope, RateLimitScope::Ip);
        assert_eq!(config.violation_scopes, vec![RateLimitScope::Ip]);
        assert_eq!(config.window_margin, limits::WINDOW_MARGIN);
    }
}
