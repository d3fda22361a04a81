//! Rate-limited request dispatch.
//!
//! Every HTTP method has its own [`DispatcherState`]. The first request of a
//! method goes out unthrottled because the quotas are unknown until its
//! response arrives; the headers of that response build the method's
//! [`LimiterChain`], and every later request waits for the chain to admit it.
//!
//! A rejected request that carries rate limit state headers is treated as a
//! limit violation: the dispatcher sleeps the server's timeout and retries
//! once. Any other rejection, or a second one, is returned to the caller as
//! [`TradeError::ConnectionFailure`].

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest_middleware::ClientWithMiddleware;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::TradeError;
use crate::rate_limit::{
    LimiterChain, RateLimitConfig, build_chain, has_state_headers, violation_backoff,
};

/// HTTP methods with independent rate limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// Item fetches.
    Get,
    /// Searches.
    Post,
}

impl HttpMethod {
    /// Method name as sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// A request to hand to the [`RequestDispatcher`].
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    /// HTTP method, which also selects the limiter chain.
    pub method: HttpMethod,
    /// Fully built URL.
    pub url: Url,
    /// JSON body for POST requests.
    pub body: Option<String>,
}

impl DispatchRequest {
    /// Create a GET request.
    pub fn get(url: Url) -> Self {
        Self {
            method: HttpMethod::Get,
            url,
            body: None,
        }
    }

    /// Create a POST request with a JSON body.
    pub fn post_json<T: serde::Serialize + ?Sized>(url: Url, body: &T) -> Result<Self, TradeError> {
        Ok(Self {
            method: HttpMethod::Post,
            url,
            body: Some(serde_json::to_string(body)?),
        })
    }
}

/// Limiter state of one HTTP method.
#[derive(Debug, Clone, Default)]
pub enum DispatcherState {
    /// No response seen yet, quotas unknown.
    #[default]
    Uninitialized,
    /// Quotas discovered, requests go through the chain.
    Active(LimiterChain),
}

impl DispatcherState {
    /// Check if the limiter chain has been discovered.
    pub fn is_initialized(&self) -> bool {
        matches!(self, Self::Active(_))
    }

    /// The discovered limiter chain.
    pub fn chain(&self) -> Option<&LimiterChain> {
        match self {
            Self::Active(chain) => Some(chain),
            Self::Uninitialized => None,
        }
    }
}

/// Sends requests while honoring the server's discovered rate limits.
///
/// Cloning is cheap and clones share the limiter state, so admission stays
/// serialized per method no matter how many handles exist.
#[derive(Clone)]
pub struct RequestDispatcher {
    http_client: ClientWithMiddleware,
    config: RateLimitConfig,
    get_state: Arc<Mutex<DispatcherState>>,
    post_state: Arc<Mutex<DispatcherState>>,
    cancel: CancellationToken,
}

impl RequestDispatcher {
    /// Create a dispatcher with both methods uninitialized.
    pub fn new(
        http_client: ClientWithMiddleware,
        config: RateLimitConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            http_client,
            config,
            get_state: Arc::new(Mutex::new(DispatcherState::Uninitialized)),
            post_state: Arc::new(Mutex::new(DispatcherState::Uninitialized)),
            cancel,
        }
    }

    /// Get the current configuration.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Token that aborts pending waits when cancelled.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Check if the limiter chain of `method` has been discovered.
    pub async fn is_initialized(&self, method: HttpMethod) -> bool {
        self.state(method).lock().await.is_initialized()
    }

    /// Time the next request of `method` would wait for admission.
    pub async fn wait_before_next(&self, method: HttpMethod) -> Duration {
        self.state(method)
            .lock()
            .await
            .chain()
            .map(LimiterChain::wait_before_next)
            .unwrap_or_default()
    }

    /// Send a request, retrying once after a rate limit violation.
    pub async fn send(&self, request: &DispatchRequest) -> Result<reqwest::Response, TradeError> {
        let mut retry = false;
        loop {
            if self.cancel.is_cancelled() {
                return Err(TradeError::Cancelled);
            }

            let response = self.send_limited(request).await?;
            let status = response.status();
            if !status.is_client_error() && !status.is_server_error() {
                return Ok(response);
            }
            if retry {
                return Err(Self::connection_failure(response).await);
            }

            let Some(backoff) = violation_backoff(response.headers(), &self.config)? else {
                return Err(Self::connection_failure(response).await);
            };
            tracing::warn!(
                method = request.method.as_str(),
                url = %request.url,
                status = status.as_u16(),
                backoff_secs = backoff.as_secs_f64(),
                "rate limit violated, backing off before retry"
            );
            self.sleep(backoff).await?;
            retry = true;
        }
    }

    /// Send one request through the state machine of its method.
    ///
    /// The state lock is held across the wait, the timestamp append and the
    /// network call.
    async fn send_limited(&self, request: &DispatchRequest) -> Result<reqwest::Response, TradeError> {
        let mut state = self.state(request.method).lock().await;

        if let DispatcherState::Active(chain) = &mut *state {
            if self.config.enabled {
                let wait = chain.wait_before_next();
                if !wait.is_zero() {
                    tracing::debug!(
                        method = request.method.as_str(),
                        wait_ms = wait.as_millis() as u64,
                        "waiting for rate limit admission"
                    );
                    self.sleep(wait).await?;
                }
            }
            chain.record_call();
            return self.execute(request).await;
        }

        let response = self.execute(request).await?;
        if response.status().is_success() || has_state_headers(response.headers(), &self.config) {
            let chain = build_chain(response.headers(), &self.config)?;
            tracing::debug!(
                method = request.method.as_str(),
                windows = chain.len(),
                "rate limiter initialized"
            );
            *state = DispatcherState::Active(chain);
        }
        Ok(response)
    }

    async fn execute(&self, request: &DispatchRequest) -> Result<reqwest::Response, TradeError> {
        let builder = match request.method {
            HttpMethod::Get => self.http_client.get(request.url.clone()),
            HttpMethod::Post => self
                .http_client
                .post(request.url.clone())
                .header(CONTENT_TYPE, "application/json")
                .body(request.body.clone().unwrap_or_default()),
        };
        Ok(builder.send().await?)
    }

    async fn sleep(&self, duration: Duration) -> Result<(), TradeError> {
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = self.cancel.cancelled() => Err(TradeError::Cancelled),
        }
    }

    async fn connection_failure(response: reqwest::Response) -> TradeError {
        let status = response.status().as_u16();
        match response.text().await {
            Ok(body) => TradeError::ConnectionFailure { status, body },
            Err(err) => TradeError::Http(err),
        }
    }

    fn state(&self, method: HttpMethod) -> &Mutex<DispatcherState> {
        match method {
            HttpMethod::Get => &*self.get_state,
            HttpMethod::Post => &*self.post_state,
        }
    }
}

impl std::fmt::Debug for RequestDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDispatcher")
            .field("config", &self.config)
            .finish()
    }
}
