//! # noren-feed
//!
//! Live market-data client for NorenOMS brokers: a reconnecting websocket
//! feed of index and holdings quotes, plus the REST calls that supply its
//! credentials and holdings.
//!
//! ## Quick Start
//!
//! ```no_run
//! use noren_feed::{AuthSnapshot, FeedManagerBuilder, NorenClient};
//!
//! #[tokio::main]
//! async fn main() -> noren_feed::Result<()> {
//!     let client = NorenClient::new("bearer-token")?;
//!
//!     let mut feed = FeedManagerBuilder::new().build();
//!     feed.start().await?;
//!     feed.set_auth(AuthSnapshot::authenticated("websocket-key", "AC123")).await?;
//!     feed.holdings_changed(client.get_holdings().await?).await?;
//!
//!     let quotes = feed.handle();
//!     for (key, quote) in quotes.snapshot() {
//!         println!("{key}: {} ({}%)", quote.last_price_or_zero(), quote.percent_change_or_zero());
//!     }
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod client;
pub mod constants;
pub mod error;
pub mod types;
pub mod ws;

/// Re-export the REST client at crate root for convenience.
pub use client::NorenClient;
/// Re-export the error type and Result alias.
pub use error::{FeedError, Result};
pub use types::{AuthSnapshot, Holdings, InstrumentKey};
pub use ws::manager::{FeedConfig, FeedHandle, FeedManager, FeedManagerBuilder};
pub use ws::session::FeedStatus;
pub use ws::tick_cache::Quote;
