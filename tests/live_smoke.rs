use std::sync::Arc;

use futures_util::{StreamExt, TryStreamExt};

use poe_trade_client::auth::EnvSession;
use poe_trade_client::rate_limit::HttpMethod;
use poe_trade_client::trade::{SearchQuery, Stat, TradeClient};

fn live_tests_enabled() -> bool {
    std::env::var("POE_LIVE_TESTS").ok().as_deref() == Some("1")
}

#[tokio::test]
#[ignore]
async fn live_search_smoke() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenv::dotenv();
    if !live_tests_enabled() {
        return Ok(());
    }

    let session = match EnvSession::try_from_env() {
        Some(session) => session,
        None => return Ok(()),
    };
    let league = std::env::var("POE_LEAGUE").unwrap_or_else(|_| "Standard".to_string());
    let client = TradeClient::builder()
        .league(league)
        .session(Arc::new(session))
        .build();

    let query = SearchQuery::new()
        .weight(Stat::Life, 1.0)
        .max_price(10)
        .category("armour.boots");
    let items: Vec<_> = client.search(&query).take(12).try_collect().await?;

    assert!(items.len() <= 12);
    assert!(client.dispatcher().is_initialized(HttpMethod::Post).await);

    Ok(())
}
