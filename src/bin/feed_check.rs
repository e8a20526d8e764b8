//! Binary to log in to the NorenOMS live feed and print index and holdings
//! quotes for a while, for inspecting live data and reconnect behaviour.
//!
//! # Usage
//!
//! ```sh
//! export NOREN_WS_KEY="websocket-session-key"
//! export NOREN_ACCOUNT_ID="AC123"
//! export NOREN_API_BASE="https://..."        # optional, subscribes team holdings
//! export NOREN_BEARER_TOKEN="bearer-token"   # optional, broker holdings instead
//! export NOREN_WS_URL="wss://..."            # optional
//! export FEED_CHECK_SECS=60                  # optional, default 30
//! cargo run --bin feed_check --features cli
//! ```

use std::env;
use std::time::Duration;

use noren_feed::{AuthSnapshot, FeedManagerBuilder, NorenClient};
use tokio::time;

#[tokio::main]
async fn main() -> noren_feed::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let ws_key = env::var("NOREN_WS_KEY").expect("set NOREN_WS_KEY env var before running");
    let account_id =
        env::var("NOREN_ACCOUNT_ID").expect("set NOREN_ACCOUNT_ID env var before running");
    let secs = env::var("FEED_CHECK_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(30u64);

    let mut builder = FeedManagerBuilder::new();
    if let Ok(url) = env::var("NOREN_WS_URL") {
        builder = builder.url(url);
    }
    let mut feed = builder.build();
    feed.start().await?;

    let quotes = feed.handle();
    let mut status = quotes.watch_status();

    println!("Logging in to {}…", feed.config().url);
    feed.set_auth(AuthSnapshot::authenticated(ws_key, account_id.clone()))
        .await?;

    let holdings = if let Ok(api_base) = env::var("NOREN_API_BASE") {
        Some(NorenClient::fetch_team_holdings(&api_base, &account_id).await)
    } else if let Ok(token) = env::var("NOREN_BEARER_TOKEN") {
        Some(NorenClient::new(token)?.get_holdings().await)
    } else {
        None
    };
    match holdings {
        Some(Ok(holdings)) => {
            println!("Subscribing {} holdings…", holdings.items().count());
            feed.holdings_changed(holdings).await?;
        }
        Some(Err(e)) => eprintln!("Could not load holdings: {e}"),
        None => {}
    }

    println!("Listening for {secs} seconds…");
    println!("(Note: prices only move during market hours 9:15–15:30 IST)\n");

    let deadline = time::sleep(Duration::from_secs(secs));
    tokio::pin!(deadline);
    let mut ticker = time::interval(Duration::from_secs(5));

    loop {
        tokio::select! {
            _ = &mut deadline => {
                println!("\n{secs} seconds elapsed, disconnecting...");
                break;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("status: {}", *status.borrow_and_update());
            }
            _ = ticker.tick() => {
                let mut snapshot: Vec<_> = quotes.snapshot().into_iter().collect();
                snapshot.sort_by(|a, b| a.0.cmp(&b.0));
                for (key, quote) in snapshot {
                    println!(
                        "{key:<16} {:>12} {:>8}%",
                        quote.last_price_or_zero(),
                        quote.percent_change_or_zero()
                    );
                }
                println!();
            }
        }
    }

    feed.shutdown().await?;
    println!("Done.");

    Ok(())
}
