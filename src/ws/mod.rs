//! Live market feed over the NorenOMS websocket.
//!
//! Streams last price and percent change for the index benchmarks and the
//! user's holdings as JSON frames. The pieces, bottom-up:
//!
//! - [`protocol`]: wire frames and inbound parsing
//! - [`backoff`]: exponential reconnect delays and the attempt cap
//! - [`subscription`]: which keys to subscribe, and when
//! - [`tick_cache`]: latest quote per instrument, shared with readers
//! - [`session`]: the connection state machine (no IO)
//! - [`manager`]: the Tokio driver and the consumer [`FeedHandle`](manager::FeedHandle)
//!
//! ## Reconnection
//!
//! Any close, a clean `1000` included, is retried with exponentially growing
//! delays until the attempt cap, after which the feed reports
//! [`FeedStatus::Failed`](session::FeedStatus::Failed) and waits for a manual
//! [`connect`](manager::FeedManager::connect). Only
//! [`disconnect`](manager::FeedManager::disconnect) and logout stop retries.

pub mod backoff;
pub mod manager;
pub mod protocol;
pub mod session;
pub mod subscription;
pub mod tick_cache;
