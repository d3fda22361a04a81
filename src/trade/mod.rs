//! Trade search client.
//!
//! A trade search is a two-step exchange: a POST to the search endpoint
//! returns a result-set id and the ids of all matching listings, then the
//! listings themselves are fetched, at most [`FETCH_BATCH_SIZE`] per GET.
//! [`TradeClient::search`] wraps both steps in a lazy stream.
//!
//! ```rust,ignore
//! use futures_util::StreamExt;
//! use poe_trade_client::trade::{SearchQuery, Stat, TradeClient};
//!
//! let client = TradeClient::new();
//! let query = SearchQuery::new().weight(Stat::Life, 1.0);
//! let mut items = std::pin::pin!(client.search(&query));
//! while let Some(item) = items.next().await {
//!     println!("{}", item?["listing"]["price"]);
//! }
//! ```

mod client;
mod endpoints;
mod types;

pub use client::{TradeClient, TradeClientBuilder};
pub use endpoints::{DEFAULT_LEAGUE, FETCH_BATCH_SIZE, POE_BASE_URL};
pub use types::{FetchResponse, ItemRecord, SearchQuery, SearchResult, Stat};
