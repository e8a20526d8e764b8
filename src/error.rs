//! Error types for the `noren-feed` crate.
//!
//! All fallible operations in this crate return [`Result<T>`], which is an
//! alias for `std::result::Result<T, FeedError>`.
//!
//! [`FeedError`] covers:
//! - **API errors**: Envelopes whose `stat`/`status` is not `"Ok"`
//! - **HTTP status errors**: Unexpected status codes with response body
//! - **HTTP transport errors**: Network, TLS, timeout failures
//! - **JSON errors**: (De)serialization failures, including malformed feed frames
//! - **WebSocket errors**: Connection and protocol errors from the socket
//! - **Protocol errors**: Feed frames that parse as JSON but miss required fields
//! - **URL errors**: Malformed endpoint configuration
//! - **Invalid arguments**: Client-side validation errors
//! - **Manager stopped**: Commands sent to a feed manager that is not running
//!
//! Note that the live feed itself never surfaces these to callers from inside
//! socket handling: failures there become state transitions and log entries.

use std::fmt;

/// Error envelope returned by the broker REST endpoints.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ApiErrorBody {
    /// Status marker (anything other than `"Ok"` is an error).
    #[serde(default, alias = "stat")]
    pub status: Option<String>,
    /// Human-readable description of the error.
    #[serde(default, alias = "emsg")]
    pub message: Option<String>,
}

impl fmt::Display for ApiErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}",
            self.status.as_deref().unwrap_or("UNKNOWN"),
            self.message.as_deref().unwrap_or("No message"),
        )
    }
}

/// All possible errors produced by the `noren-feed` crate.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// An error envelope returned by a broker REST endpoint.
    #[error("API error: {0}")]
    Api(ApiErrorBody),

    /// The server returned an unexpected HTTP status code.
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        /// The HTTP status code.
        status: reqwest::StatusCode,
        /// The response body text.
        body: String,
    },

    /// A network or transport-level error from `reqwest`.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Failed to (de)serialize JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A WebSocket-level error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// A feed frame was valid JSON but not a usable message.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// An error building or parsing a URL.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// The caller provided an invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The feed manager is not running (never started, or shut down).
    #[error("feed manager is not running")]
    ManagerStopped,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FeedError>;
