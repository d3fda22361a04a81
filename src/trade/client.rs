//! Trade API client implementation.

use std::sync::Arc;

use futures_util::Stream;
use futures_util::stream;
use reqwest::header::{COOKIE, HeaderMap, HeaderValue, USER_AGENT};
use reqwest_middleware::ClientBuilder;
use reqwest_retry::{
    Retryable, RetryTransientMiddleware, RetryableStrategy, default_on_request_failure,
    policies::ExponentialBackoff,
};
use reqwest_tracing::TracingMiddleware;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::auth::SessionProvider;
use crate::error::TradeError;
use crate::rate_limit::{DispatchRequest, RateLimitConfig, RequestDispatcher};
use crate::trade::endpoints::{
    DEFAULT_LEAGUE, FETCH_BATCH_SIZE, FETCH_PATH, POE_BASE_URL, SEARCH_PATH,
};
use crate::trade::types::{FetchResponse, ItemRecord, SearchResult};

/// The trade API client.
///
/// All requests go through a [`RequestDispatcher`], so searches and fetches
/// are throttled to the limits the server advertises.
///
/// # Example
///
/// ```rust,no_run
/// use futures_util::TryStreamExt;
/// use poe_trade_client::trade::{SearchQuery, Stat, TradeClient};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = TradeClient::builder().league("Standard").build();
///     let query = SearchQuery::new()
///         .weight(Stat::Life, 1.0)
///         .category("armour.boots");
///
///     let items: Vec<_> = client.search(&query).try_collect().await?;
///     println!("fetched {} listings", items.len());
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct TradeClient {
    dispatcher: RequestDispatcher,
    base_url: String,
    league: String,
}

impl TradeClient {
    /// Create a new client with default settings and no session.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a new client builder.
    pub fn builder() -> TradeClientBuilder {
        TradeClientBuilder::new()
    }

    /// League searched by this client.
    pub fn league(&self) -> &str {
        &self.league
    }

    /// The dispatcher holding this client's rate limit state.
    pub fn dispatcher(&self) -> &RequestDispatcher {
        &self.dispatcher
    }

    /// Token that aborts pending rate limit waits when cancelled.
    pub fn cancellation_token(&self) -> &CancellationToken {
        self.dispatcher.cancellation_token()
    }

    /// Stream every listing matching `query`.
    ///
    /// Nothing is sent until the stream is first polled. The search is then
    /// submitted, and the returned ids are fetched in batches of
    /// [`FETCH_BATCH_SIZE`] as the stream is consumed, preserving the
    /// server's order. The stream ends after the first error.
    ///
    /// Every call submits a fresh search, so two calls may see different
    /// listings.
    pub fn search<'a, Q>(
        &'a self,
        query: &'a Q,
    ) -> impl Stream<Item = Result<ItemRecord, TradeError>> + 'a
    where
        Q: Serialize + ?Sized,
    {
        stream::try_unfold(Pages::Pending, move |pages| self.next_item(query, pages))
    }

    /// Advance the pagination state by one listing.
    async fn next_item<Q>(
        &self,
        query: &Q,
        mut pages: Pages,
    ) -> Result<Option<(ItemRecord, Pages)>, TradeError>
    where
        Q: Serialize + ?Sized,
    {
        loop {
            pages = match pages {
                Pages::Pending => Pages::from_search(self.search_ids(query).await?),
                Pages::Fetching {
                    search_id,
                    mut batches,
                    mut buffered,
                } => {
                    if let Some(item) = buffered.next() {
                        let rest = Pages::Fetching {
                            search_id,
                            batches,
                            buffered,
                        };
                        return Ok(Some((item, rest)));
                    }
                    let Some(batch) = batches.next() else {
                        return Ok(None);
                    };
                    let items = self.fetch_batch(&search_id, &batch).await?;
                    Pages::Fetching {
                        search_id,
                        batches,
                        buffered: items.into_iter(),
                    }
                }
            };
        }
    }

    /// Submit a search and return its result-set id and item ids.
    pub async fn search_ids<Q>(&self, query: &Q) -> Result<SearchResult, TradeError>
    where
        Q: Serialize + ?Sized,
    {
        let url = self.endpoint_url(&SEARCH_PATH, &self.league)?;
        let request = DispatchRequest::post_json(url, query)?;
        let response = self.dispatcher.send(&request).await?;
        let result: SearchResult = Self::parse_response(response).await?;
        tracing::debug!(
            search_id = %result.search_id,
            items = result.item_ids.len(),
            total = ?result.total,
            "search submitted"
        );
        Ok(result)
    }

    /// Fetch listings by id, in batches, preserving the order of `ids`.
    pub async fn fetch(
        &self,
        search_id: &str,
        ids: &[String],
    ) -> Result<Vec<ItemRecord>, TradeError> {
        let mut items = Vec::with_capacity(ids.len());
        for batch in ids.chunks(FETCH_BATCH_SIZE) {
            items.extend(self.fetch_batch(search_id, batch).await?);
        }
        Ok(items)
    }

    async fn fetch_batch(
        &self,
        search_id: &str,
        batch: &[String],
    ) -> Result<Vec<ItemRecord>, TradeError> {
        let mut url = self.endpoint_url(&FETCH_PATH, &batch.join(","))?;
        url.query_pairs_mut().append_pair("query", search_id);

        let response = self.dispatcher.send(&DispatchRequest::get(url)).await?;
        let fetched: FetchResponse = Self::parse_response(response).await?;
        Ok(fetched.result)
    }

    fn endpoint_url(&self, path: &[&str], last: &str) -> Result<Url, TradeError> {
        let mut url = Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| {
                TradeError::Configuration(format!("base URL {} cannot carry a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(path)
            .push(last);
        Ok(url)
    }

    async fn parse_response<T>(response: reqwest::Response) -> Result<T, TradeError>
    where
        T: serde::de::DeserializeOwned,
    {
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            TradeError::InvalidResponse(format!("Failed to parse response: {}. Body: {}", e, body))
        })
    }
}

impl Default for TradeClient {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TradeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradeClient")
            .field("base_url", &self.base_url)
            .field("league", &self.league)
            .finish()
    }
}

/// Pagination state of a [`TradeClient::search`] stream.
enum Pages {
    Pending,
    Fetching {
        search_id: String,
        batches: std::vec::IntoIter<Vec<String>>,
        buffered: std::vec::IntoIter<ItemRecord>,
    },
}

impl Pages {
    fn from_search(result: SearchResult) -> Self {
        let batches: Vec<Vec<String>> = result
            .item_ids
            .chunks(FETCH_BATCH_SIZE)
            .map(<[String]>::to_vec)
            .collect();
        Self::Fetching {
            search_id: result.search_id,
            batches: batches.into_iter(),
            buffered: Vec::new().into_iter(),
        }
    }
}

/// Retries transport failures only.
///
/// HTTP error responses, 429 included, are left to the dispatcher so a
/// limit violation is never retried twice.
struct TransportFailures;

impl RetryableStrategy for TransportFailures {
    fn handle(
        &self,
        res: &Result<reqwest::Response, reqwest_middleware::Error>,
    ) -> Option<Retryable> {
        match res {
            Ok(_) => None,
            Err(error) => default_on_request_failure(error),
        }
    }
}

/// Builder for [`TradeClient`].
pub struct TradeClientBuilder {
    base_url: String,
    league: String,
    session: Option<Arc<dyn SessionProvider>>,
    user_agent: Option<String>,
    rate_limit: Option<RateLimitConfig>,
    max_retries: u32,
    cancel: Option<CancellationToken>,
}

impl TradeClientBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            base_url: POE_BASE_URL.to_string(),
            league: DEFAULT_LEAGUE.to_string(),
            session: None,
            user_agent: None,
            rate_limit: None,
            max_retries: 3,
            cancel: None,
        }
    }

    /// Set the base URL (useful for testing with a mock server).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the league to search in.
    pub fn league(mut self, league: impl Into<String>) -> Self {
        self.league = league.into();
        self
    }

    /// Set the session provider whose cookie is sent with every request.
    pub fn session(mut self, session: Arc<dyn SessionProvider>) -> Self {
        self.session = Some(session);
        self
    }

    /// Set a custom user agent.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Set the rate limit configuration.
    ///
    /// Without one, the client uses [`RateLimitConfig::default`] when a
    /// session is set and [`RateLimitConfig::anonymous`] otherwise.
    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = Some(config);
        self
    }

    /// Set the maximum number of retries for transport failures.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Use an external token to cancel rate limit waits.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Build the client.
    pub fn build(self) -> TradeClient {
        let rate_limit = match (self.rate_limit, &self.session) {
            (Some(config), _) => config,
            (None, Some(_)) => RateLimitConfig::default(),
            (None, None) => RateLimitConfig::anonymous(),
        };

        // Build default headers.
        let mut headers = HeaderMap::new();
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("poe-trade-client/{}", env!("CARGO_PKG_VERSION")));
        let header_value = HeaderValue::from_str(&user_agent)
            .unwrap_or_else(|_| HeaderValue::from_static("poe-trade-client"));
        headers.insert(USER_AGENT, header_value);

        if let Some(session) = &self.session {
            match HeaderValue::from_str(&session.get_session().cookie_header()) {
                Ok(mut cookie) => {
                    cookie.set_sensitive(true);
                    headers.insert(COOKIE, cookie);
                }
                Err(_) => tracing::warn!("session id is not a valid header value, sending no cookie"),
            }
        }

        // Build the HTTP client with middleware.
        let reqwest_client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(self.max_retries);

        let client = ClientBuilder::new(reqwest_client)
            .with(TracingMiddleware::default())
            .with(RetryTransientMiddleware::new_with_policy_and_strategy(
                retry_policy,
                TransportFailures,
            ))
            .build();

        TradeClient {
            dispatcher: RequestDispatcher::new(
                client,
                rate_limit,
                self.cancel.unwrap_or_default(),
            ),
            base_url: self.base_url,
            league: self.league,
        }
    }
}

impl Default for TradeClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_urls() {
        let client = TradeClient::builder()
            .base_url("https://example.com")
            .league("Hardcore Settlers")
            .build();

        let search = client.endpoint_url(&SEARCH_PATH, client.league()).unwrap();
        assert_eq!(
            search.as_str(),
            "https://example.com/api/trade/search/Hardcore%20Settlers"
        );

        let mut fetch = client.endpoint_url(&FETCH_PATH, "a1,b2").unwrap();
        fetch.query_pairs_mut().append_pair("query", "Ab3LSL");
        assert_eq!(
            fetch.as_str(),
            "https://example.com/api/trade/fetch/a1,b2?query=Ab3LSL"
        );
    }

    #[test]
    fn test_pages_partition_preserves_order() {
        let ids: Vec<String> = (0..23).map(|i| format!("id{i}")).collect();
        let pages = Pages::from_search(SearchResult {
            search_id: "q".to_string(),
            item_ids: ids.clone(),
            total: None,
        });

        let Pages::Fetching { batches, .. } = pages else {
            panic!("expected fetching state");
        };
        let batches: Vec<Vec<String>> = batches.collect();
        assert_eq!(
            batches.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![10, 10, 3]
        );
        assert_eq!(batches.concat(), ids);
    }

    #[test]
    fn test_rate_limit_scope_follows_session() {
        use crate::auth::StaticSession;
        use crate::rate_limit::RateLimitScope;

        let anonymous = TradeClient::new();
        assert_eq!(
            anonymous.dispatcher().config().policy_scope,
            RateLimitScope::Ip
        );

        let logged_in = TradeClient::builder()
            .session(Arc::new(StaticSession::new("abc123")))
            .build();
        assert_eq!(
            logged_in.dispatcher().config().policy_scope,
            RateLimitScope::Account
        );

        let explicit = TradeClient::builder()
            .rate_limit(RateLimitConfig::default())
            .build();
        assert_eq!(
            explicit.dispatcher().config().policy_scope,
            RateLimitScope::Account
        );
    }
}
