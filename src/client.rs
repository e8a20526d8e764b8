//! HTTP client for the broker REST API.
//!
//! The [`NorenClient`] struct wraps [`reqwest::Client`] with the bearer token
//! obtained from the SSO callback. Endpoint methods are added to it via `impl`
//! blocks in the [`crate::api`] module.
//!
//! Every endpoint answers with the same envelope:
//!
//! ```json
//! { "status": "Ok", "message": "Success", "result": [ ... ] }
//! ```
//!
//! A `status` other than `"Ok"` is turned into [`FeedError::Api`].

use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::constants::BROKER_REST_BASE_URL;
use crate::error::{ApiErrorBody, FeedError, Result};

/// Response envelope shared by the broker REST endpoints.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    result: Option<T>,
}

/// HTTP client for the broker REST API.
///
/// The authorization header is built once at construction time.
///
/// # Example
///
/// ```no_run
/// use noren_feed::client::NorenClient;
///
/// # #[tokio::main]
/// # async fn main() -> noren_feed::error::Result<()> {
/// let client = NorenClient::new("bearer-token")?;
/// let holdings = client.get_holdings().await?;
/// println!("{} holdings", holdings.items().count());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct NorenClient {
    http: reqwest::Client,
    bearer_token: String,
    /// Base URL for REST requests (defaults to [`BROKER_REST_BASE_URL`]).
    base_url: String,
    auth_header: HeaderValue,
}

impl NorenClient {
    /// Create a client for the default broker base URL.
    pub fn new(bearer_token: impl Into<String>) -> Result<Self> {
        Self::with_base_url(bearer_token, BROKER_REST_BASE_URL)
    }

    /// Create a client pointing at a custom base URL.
    ///
    /// Useful for testing against a mock server.
    pub fn with_base_url(bearer_token: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .default_headers(Self::default_headers())
            .build()?;

        let bearer_token = bearer_token.into();
        let auth_header = Self::auth_header_value(&bearer_token)?;

        Ok(Self {
            http,
            bearer_token,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            auth_header,
        })
    }

    /// Returns a reference to the underlying `reqwest::Client`.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Returns the bearer token.
    pub fn bearer_token(&self) -> &str {
        &self.bearer_token
    }

    /// Replace the bearer token (e.g. after a new SSO login).
    pub fn set_bearer_token(&mut self, token: impl Into<String>) -> Result<()> {
        let token = token.into();
        self.auth_header = Self::auth_header_value(&token)?;
        self.bearer_token = token;
        Ok(())
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Perform an authenticated GET and unwrap the response envelope.
    pub async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        let url = self.url(path);
        tracing::debug!(%url, "GET");

        let resp = self
            .http
            .get(&url)
            .header(header::AUTHORIZATION, self.auth_header.clone())
            .send()
            .await?;

        let bytes = handle_response(resp).await?;
        unwrap_envelope(&bytes)
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn default_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers
    }

    fn auth_header_value(token: &str) -> Result<HeaderValue> {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
            FeedError::InvalidArgument("bearer token contains invalid header characters".into())
        })?;
        value.set_sensitive(true);
        Ok(value)
    }
}

/// Read the body of a response, mapping non-2xx statuses to errors.
pub(crate) async fn handle_response(resp: reqwest::Response) -> Result<Vec<u8>> {
    let status = resp.status();
    let bytes = resp.bytes().await?;

    if status.is_success() {
        Ok(bytes.to_vec())
    } else {
        let body = String::from_utf8_lossy(&bytes);
        Err(parse_error_body(status, &body))
    }
}

/// Deserialize an envelope and return its `result`.
pub(crate) fn unwrap_envelope<R: DeserializeOwned>(bytes: &[u8]) -> Result<R> {
    let envelope: Envelope<R> = serde_json::from_slice(bytes)?;
    let ok = envelope
        .status
        .as_deref()
        .is_some_and(|s| s.eq_ignore_ascii_case("ok"));
    match (ok, envelope.result) {
        (true, Some(result)) => Ok(result),
        (true, None) => Err(FeedError::Api(ApiErrorBody {
            status: envelope.status,
            message: Some(
                envelope
                    .message
                    .unwrap_or_else(|| "response without result".into()),
            ),
        })),
        (false, _) => Err(FeedError::Api(ApiErrorBody {
            status: envelope.status,
            message: envelope.message,
        })),
    }
}

/// Try to parse the API's JSON error structure; fall back to a raw HTTP
/// status error.
pub(crate) fn parse_error_body(status: reqwest::StatusCode, body: &str) -> FeedError {
    if let Ok(api_err) = serde_json::from_str::<ApiErrorBody>(body) {
        if api_err.status.is_some() || api_err.message.is_some() {
            return FeedError::Api(api_err);
        }
    }
    FeedError::HttpStatus {
        status,
        body: body.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_ok() {
        let items: Vec<u32> =
            unwrap_envelope(br#"{"status":"Ok","message":"Success","result":[1,2]}"#).unwrap();
        assert_eq!(items, vec![1, 2]);
    }

    #[test]
    fn test_envelope_not_ok() {
        let err = unwrap_envelope::<Vec<u32>>(br#"{"status":"Not_Ok","message":"Session Expired"}"#)
            .unwrap_err();
        let body = match err {
            FeedError::Api(body) => body,
            other => panic!("expected api error, got {other:?}"),
        };
        assert_eq!(body.message.as_deref(), Some("Session Expired"));
    }

    #[test]
    fn test_envelope_missing_result() {
        assert!(matches!(
            unwrap_envelope::<Vec<u32>>(br#"{"status":"Ok"}"#),
            Err(FeedError::Api(_))
        ));
    }

    #[test]
    fn test_error_body_fallback() {
        let err = parse_error_body(reqwest::StatusCode::BAD_GATEWAY, "<html>");
        assert!(matches!(err, FeedError::HttpStatus { .. }));
        let err = parse_error_body(
            reqwest::StatusCode::UNAUTHORIZED,
            r#"{"stat":"Not_Ok","emsg":"Invalid token"}"#,
        );
        assert!(matches!(err, FeedError::Api(_)));
    }

    #[test]
    fn test_invalid_token_rejected() {
        assert!(matches!(
            NorenClient::new("bad\ntoken"),
            Err(FeedError::InvalidArgument(_))
        ));
        let client = NorenClient::with_base_url("tok", "http://localhost:1/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:1");
        assert_eq!(client.url("x"), "http://localhost:1/x");
    }
}
