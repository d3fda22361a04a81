//! # PoE Trade Client
//!
//! An async Rust client for the Path of Exile trade API.
//!
//! ## Features
//!
//! - Lazy, paginated streaming of search results
//! - Rate limits discovered from response headers, enforced across every
//!   advertised window at once
//! - A single, bounded retry after a rate limit violation
//! - Cancellable waits through a `CancellationToken`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use futures_util::TryStreamExt;
//! use poe_trade_client::trade::{SearchQuery, Stat, TradeClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = TradeClient::builder().league("Standard").build();
//!     let query = SearchQuery::new()
//!         .weight(Stat::FireResistance, 1.0)
//!         .max_price(100)
//!         .category("armour.gloves");
//!     let items: Vec<_> = client.search(&query).try_collect().await?;
//!     println!("Found {} listings", items.len());
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod error;
pub mod rate_limit;
pub mod trade;

// Re-export commonly used types at crate root
pub use error::TradeError;
pub use trade::{SearchQuery, Stat, TradeClient};

/// Result type alias using TradeError
pub type Result<T> = std::result::Result<T, TradeError>;
