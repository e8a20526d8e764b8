//! Authentication types: SSO session and the auth snapshot the feed follows.

use serde::{Deserialize, Serialize};

/// Inner payload of the SSO callback response.
#[derive(Debug, Clone, Deserialize)]
pub struct SsoMessage {
    /// `"Ok"` on success.
    pub stat: String,
    /// Broker client code of the user.
    #[serde(default)]
    pub client_code: Option<String>,
    /// Bearer token for the broker REST API.
    #[serde(default)]
    pub bearer_token: Option<String>,
    /// Error text when `stat` is not `"Ok"`.
    #[serde(default)]
    pub emsg: Option<String>,
}

/// Envelope of the SSO callback response: `{ "message": { ... } }`.
#[derive(Debug, Clone, Deserialize)]
pub struct SsoCallbackResponse {
    /// The payload.
    pub message: SsoMessage,
}

/// Request body of the SSO callback.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SsoCallbackRequest {
    /// Authorization code handed back by the SSO redirect.
    pub auth_code: String,
    /// User id handed back by the SSO redirect.
    pub user_id: String,
}

/// A successfully established SSO session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsoSession {
    /// Broker client code.
    pub client_code: Option<String>,
    /// Bearer token for [`NorenClient`](crate::client::NorenClient).
    pub bearer_token: String,
}

/// What the feed needs to know from the auth provider.
///
/// Transitions of `is_authenticated` to `false` are treated by the feed as an
/// implicit disconnect (logout).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthSnapshot {
    /// Session credential for the websocket login frame (`susertoken`).
    pub websocket_key: Option<String>,
    /// Account identifier (`actid`/`uid`).
    pub account_id: Option<String>,
    /// Whether the user is logged in.
    pub is_authenticated: bool,
}

impl AuthSnapshot {
    /// A logged-in snapshot with both credentials present.
    pub fn authenticated(websocket_key: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            websocket_key: Some(websocket_key.into()),
            account_id: Some(account_id.into()),
            is_authenticated: true,
        }
    }

    /// The logged-out snapshot.
    pub fn logged_out() -> Self {
        Self::default()
    }
}
