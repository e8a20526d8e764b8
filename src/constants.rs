//! Constants for the NorenOMS broker endpoints and the live feed protocol.
//!
//! Contains base URLs, the websocket endpoint, the index benchmarks that are
//! always subscribed, and the defaults used by
//! [`FeedConfig`](crate::ws::manager::FeedConfig).

// ---------------------------------------------------------------------------
// Base URLs
// ---------------------------------------------------------------------------

/// Base URL for the broker REST API (profile, holdings, order and trade books).
pub const BROKER_REST_BASE_URL: &str = "https://web.gopocket.in";

/// Path of the SSO callback on the back-office API.
pub const SSO_CALLBACK_PATH: &str = "/api/method/rms.sso.sso_callback";

/// Path of the team holdings lookup on the back-office API.
pub const TEAM_HOLDINGS_PATH: &str = "/api/method/rms.sso.fetch_team_holdings";

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

/// WebSocket endpoint for the live market feed (JSON frames).
pub const NOREN_WS_URL: &str = "wss://skypro.skybroking.com/NorenWSWEBCODIFI/";

/// Source tag sent in the login frame.
pub const DEFAULT_SOURCE: &str = "WEB";

/// Exchange preferred when a holding is listed on several exchanges.
pub const PRIMARY_EXCHANGE: &str = "NSE";

/// Index benchmarks subscribed once per authenticated session.
///
/// SENSEX, BANKEX, NIFTY FIN SERVICE, NIFTY 50 and NIFTY BANK.
pub const DEFAULT_INDEX_KEYS: [&str; 5] = [
    "BSE|1",
    "BSE|12",
    "NSE|26037",
    "NSE|26000",
    "NSE|26009",
];

/// Separator between exchange and token inside an instrument key.
pub const EXCHANGE_TOKEN_SEPARATOR: char = '|';

/// Separator between instrument keys inside a subscribe frame.
pub const KEY_LIST_SEPARATOR: char = '#';

/// Close code used for every locally initiated close.
pub const CLOSE_NORMAL: u16 = 1000;

// ---------------------------------------------------------------------------
// Feed defaults
// ---------------------------------------------------------------------------

/// Default tuning for the feed manager.
pub mod defaults {
    /// First reconnect delay, in milliseconds.
    pub const RECONNECT_BASE_DELAY_MS: u64 = 1_000;
    /// Multiplier applied to the delay on every consecutive failure.
    pub const RECONNECT_GROWTH_FACTOR: f64 = 2.0;
    /// Scheduled retries before the feed gives up.
    pub const RECONNECT_MAX_ATTEMPTS: u32 = 10;
    /// Interval between client heartbeats, in seconds.
    pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;
    /// Unacknowledged heartbeats tolerated before the socket is recycled.
    pub const MAX_MISSED_HEARTBEATS: u32 = 3;
    /// Timeout for the TCP/TLS/websocket handshake, in seconds.
    pub const CONNECT_TIMEOUT_SECS: u64 = 30;
    /// How long a locally closed socket may linger waiting for the close reply.
    pub const CLOSE_GRACE_MS: u64 = 2_000;
    /// Capacity of the command channel into the manager task.
    pub const COMMAND_CAPACITY: usize = 64;
}
