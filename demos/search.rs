//! Example: Weighted search streamed page by page.
//!
//! Run with: POE_SESSION_ID=... cargo run --example search

use std::sync::Arc;

use futures_util::StreamExt;
use poe_trade_client::auth::EnvSession;
use poe_trade_client::trade::{SearchQuery, Stat, TradeClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut builder = TradeClient::builder().league("Standard");
    if let Some(session) = EnvSession::try_from_env() {
        builder = builder.session(Arc::new(session));
    }
    let client = builder.build();

    // Abort pending rate limit waits on Ctrl-C.
    let token = client.cancellation_token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    let weights = [
        (Stat::FireResistance, 1.0),
        (Stat::ColdResistance, 1.0),
        (Stat::LightningResistance, 1.0),
        (Stat::ChaosResistance, 4.0),
        (Stat::Life, 2.0),
        (Stat::MovementSpeed, 5.0),
        (Stat::SpellSuppression, 10.0),
    ];

    for category in ["armour.gloves", "armour.boots", "accessory.ring"] {
        let query = weights
            .iter()
            .fold(SearchQuery::new(), |query, (stat, weight)| {
                query.weight(*stat, *weight)
            })
            .max_price(100)
            .category(category);

        let mut items = std::pin::pin!(client.search(&query));
        let mut count = 0;
        while let Some(item) = items.next().await {
            let item = item?;
            count += 1;
            println!(
                "{category} #{count}: {} ({})",
                item["item"]["name"],
                item["listing"]["price"]
            );
        }
        println!("{category}: {count} listings");
    }

    Ok(())
}
