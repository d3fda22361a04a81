//! Rate limit discovery from response headers.
//!
//! The trade API does not document its quotas. Instead every response carries
//! them, one `a:b:c` triple per window, comma-joined:
//!
//! | Header                     | Triple                        |
//! |----------------------------|-------------------------------|
//! | `X-Rate-Limit-Account`     | `max_requests:window:penalty` |
//! | `X-Rate-Limit-Account-State` | `used:window:timeout`       |
//!
//! The same pair exists for the `Ip` scope. The first response of a session
//! is parsed into a [`LimiterChain`]; later violations are read with
//! [`violation_backoff`].

use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, RETRY_AFTER};

use crate::error::TradeError;
use crate::rate_limit::{LimiterChain, RateLimitConfig, RateLimitScope};

/// One server-advertised quota, combined with how much of it is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Maximum requests per window.
    pub max_requests: u32,
    /// Window length in seconds.
    pub window_seconds: u32,
    /// Requests already counted by the server in this window.
    pub currently_used: u32,
}

/// Current usage of one window, as reported by a `-State` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitState {
    /// Requests counted in the window.
    pub used: u32,
    /// Window length in seconds.
    pub window_seconds: u32,
    /// Seconds the client is locked out for, zero when not restricted.
    pub timeout_seconds: u32,
}

/// Parse a comma-joined list of `a:b:c` triples.
fn parse_triples(value: &str) -> Result<Vec<[u32; 3]>, TradeError> {
    value
        .split(',')
        .map(|triple| {
            let mut parts = triple.trim().split(':').map(str::parse::<u32>);
            match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(Ok(a)), Some(Ok(b)), Some(Ok(c)), None) => Ok([a, b, c]),
                _ => Err(TradeError::Configuration(format!(
                    "malformed rate limit triple {triple:?} in {value:?}"
                ))),
            }
        })
        .collect()
}

/// Parse a `-State` header value.
pub fn parse_states(value: &str) -> Result<Vec<RateLimitState>, TradeError> {
    Ok(parse_triples(value)?
        .into_iter()
        .map(|[used, window_seconds, timeout_seconds]| RateLimitState {
            used,
            window_seconds,
            timeout_seconds,
        })
        .collect())
}

/// Pair a policy header value with its state header value.
pub fn parse_policies(policy: &str, state: &str) -> Result<Vec<RateLimitPolicy>, TradeError> {
    let rules = parse_triples(policy)?;
    let states = parse_states(state)?;

    if rules.len() != states.len() {
        return Err(TradeError::Configuration(format!(
            "rate limit policy lists {} windows but state lists {}",
            rules.len(),
            states.len()
        )));
    }

    rules
        .into_iter()
        .zip(states)
        .map(|([max_requests, window_seconds, _penalty], state)| {
            if max_requests == 0 || window_seconds == 0 {
                return Err(TradeError::Configuration(format!(
                    "rate limit policy {max_requests}:{window_seconds} is not a usable quota"
                )));
            }
            Ok(RateLimitPolicy {
                max_requests,
                window_seconds,
                currently_used: state.used,
            })
        })
        .collect()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn required_header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, TradeError> {
    header_str(headers, name)
        .ok_or_else(|| TradeError::Configuration(format!("missing or unreadable {name} header")))
}

/// Read the policies of `scope` from a response.
pub fn discover_policies(
    headers: &HeaderMap,
    scope: RateLimitScope,
) -> Result<Vec<RateLimitPolicy>, TradeError> {
    let policy = required_header(headers, &scope.policy_header())?;
    let state = required_header(headers, &scope.state_header())?;
    parse_policies(policy, state)
}

/// Build the limiter chain for a method from its first response.
pub fn build_chain(headers: &HeaderMap, config: &RateLimitConfig) -> Result<LimiterChain, TradeError> {
    let policies = discover_policies(headers, config.policy_scope)?;
    tracing::debug!(
        scope = config.policy_scope.as_str(),
        ?policies,
        "discovered rate limit policies"
    );
    LimiterChain::from_policies(&policies, config.window_margin, Instant::now())
}

/// Check if a response carries any state header the dispatcher consults.
pub fn has_state_headers(headers: &HeaderMap, config: &RateLimitConfig) -> bool {
    config
        .violation_scopes
        .iter()
        .any(|scope| headers.contains_key(scope.state_header()))
}

/// How long to back off after a rejected request.
///
/// Returns `Ok(None)` when the response carries no state header, i.e. the
/// rejection is not a rate limit violation. Otherwise the delay is the largest
/// non-zero timeout across all consulted scopes (and `Retry-After`), plus the
/// configured margin, or zero when no window reports a timeout.
pub fn violation_backoff(
    headers: &HeaderMap,
    config: &RateLimitConfig,
) -> Result<Option<Duration>, TradeError> {
    if !has_state_headers(headers, config) {
        return Ok(None);
    }

    let mut timeout = 0u32;
    for scope in &config.violation_scopes {
        let Some(value) = header_str(headers, &scope.state_header()) else {
            continue;
        };
        for state in parse_states(value)? {
            if state.timeout_seconds != 0 {
                tracing::warn!(
                    scope = scope.as_str(),
                    used = state.used,
                    window = state.window_seconds,
                    timeout = state.timeout_seconds,
                    "rate limit window restricted"
                );
            }
            timeout = timeout.max(state.timeout_seconds);
        }
    }

    if let Some(retry_after) = header_str(headers, RETRY_AFTER.as_str())
        .and_then(|value| value.trim().parse::<u32>().ok())
    {
        timeout = timeout.max(retry_after);
    }

    if timeout == 0 {
        return Ok(Some(Duration::ZERO));
    }
    Ok(Some(Duration::from_secs(u64::from(timeout)) + config.backoff_margin))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(*value));
        }
        map
    }

    #[test]
    fn test_parse_policies_pairs_rule_with_state() {
        let policies = parse_policies("2000:10:4,30:600:0", "5:0:0,2:0:0").unwrap();
        assert_eq!(
            policies,
            vec![
                RateLimitPolicy {
                    max_requests: 2000,
                    window_seconds: 10,
                    currently_used: 5,
                },
                RateLimitPolicy {
                    max_requests: 30,
                    window_seconds: 600,
                    currently_used: 2,
                },
            ]
        );
    }

    #[test]
    fn test_build_chain_seeds_each_window() {
        let map = headers(&[
            ("x-rate-limit-account", "2000:10:4,30:600:0"),
            ("x-rate-limit-account-state", "5:0:0,2:0:0"),
        ]);
        let chain = build_chain(&map, &RateLimitConfig::default()).unwrap();

        assert_eq!(chain.len(), 2);
        assert_eq!(chain.limiters()[0].len(), 5);
        assert_eq!(chain.limiters()[1].len(), 2);
        assert_eq!(chain.limiters()[0].window(), Duration::from_secs(12));
        assert_eq!(chain.limiters()[1].window(), Duration::from_secs(720));
    }

    #[test]
    fn test_build_chain_uses_configured_scope() {
        let map = headers(&[
            ("x-rate-limit-ip", "8:10:60,15:60:120,60:300:1800"),
            ("x-rate-limit-ip-state", "1:10:0,1:60:0,1:300:0"),
        ]);
        let config = RateLimitConfig {
            policy_scope: RateLimitScope::Ip,
            ..Default::default()
        };
        let chain = build_chain(&map, &config).unwrap();
        assert_eq!(chain.len(), 3);

        let err = build_chain(&map, &RateLimitConfig::default()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_build_chain_rejects_unusable_margin() {
        let map = headers(&[
            ("x-rate-limit-account", "5:10:60"),
            ("x-rate-limit-account-state", "1:10:0"),
        ]);
        let config = RateLimitConfig {
            window_margin: f64::INFINITY,
            ..Default::default()
        };
        let err = build_chain(&map, &config).unwrap_err();
        assert!(err.is_configuration(), "{err:?}");
    }

    #[test]
    fn test_malformed_headers_are_configuration_errors() {
        for (policy, state) in [
            ("8:10", "1:10:0"),
            ("8:10:60", "x:10:0"),
            ("8:10:60,15:60:120", "1:10:0"),
            ("0:10:60", "0:10:0"),
            ("8:10:60:1", "1:10:0"),
            ("", ""),
        ] {
            let err = parse_policies(policy, state).unwrap_err();
            assert!(err.is_configuration(), "{policy} / {state}");
        }
    }

    #[test]
    fn test_backoff_uses_max_timeout_across_scopes() {
        let map = headers(&[
            ("x-rate-limit-ip-state", "9:10:0,16:60:60"),
            ("x-rate-limit-account-state", "3:10:20,3:600:0"),
        ]);
        let backoff = violation_backoff(&map, &RateLimitConfig::default()).unwrap();
        assert_eq!(backoff, Some(Duration::from_secs(70)));
    }

    #[test]
    fn test_backoff_respects_retry_after() {
        let map = headers(&[
            ("x-rate-limit-account-state", "3:10:5"),
            ("retry-after", "30"),
        ]);
        let backoff = violation_backoff(&map, &RateLimitConfig::default()).unwrap();
        assert_eq!(backoff, Some(Duration::from_secs(40)));
    }

    #[test]
    fn test_backoff_without_timeouts_is_immediate() {
        let map = headers(&[("x-rate-limit-account-state", "1:10:0")]);
        let backoff = violation_backoff(&map, &RateLimitConfig::default()).unwrap();
        assert_eq!(backoff, Some(Duration::ZERO));
    }

    #[test]
    fn test_no_state_headers_is_not_a_violation() {
        let map = headers(&[("content-type", "application/json")]);
        assert_eq!(violation_backoff(&map, &RateLimitConfig::default()).unwrap(), None);
    }
}
