//! SSO callback.
//!
//! Exchanges the `authCode`/`userId` pair handed back by the broker's SSO
//! redirect for a bearer token. This call hits the back-office API, not the
//! broker REST base URL, and needs no prior authentication.

use crate::client::{NorenClient, handle_response};
use crate::constants::SSO_CALLBACK_PATH;
use crate::error::{ApiErrorBody, FeedError, Result};
use crate::types::auth::{SsoCallbackRequest, SsoCallbackResponse, SsoSession};

impl NorenClient {
    /// Complete an SSO login.
    ///
    /// **Endpoint:** `POST {api_base}/api/method/rms.sso.sso_callback`
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use noren_feed::client::NorenClient;
    /// # #[tokio::main]
    /// # async fn main() -> noren_feed::error::Result<()> {
    /// let session = NorenClient::sso_callback("https://backoffice.example.com", "code", "AC123").await?;
    /// let client = NorenClient::new(session.bearer_token)?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn sso_callback(api_base: &str, auth_code: &str, user_id: &str) -> Result<SsoSession> {
        let url = format!("{}{}", api_base.trim_end_matches('/'), SSO_CALLBACK_PATH);
        tracing::debug!(%url, "POST sso_callback");

        let body = SsoCallbackRequest {
            auth_code: auth_code.to_owned(),
            user_id: user_id.to_owned(),
        };
        let resp = reqwest::Client::new().post(&url).json(&body).send().await?;
        let bytes = handle_response(resp).await?;
        let parsed: SsoCallbackResponse = serde_json::from_slice(&bytes)?;
        session_from_response(parsed)
    }
}

fn session_from_response(resp: SsoCallbackResponse) -> Result<SsoSession> {
    let message = resp.message;
    if !message.stat.eq_ignore_ascii_case("ok") {
        return Err(FeedError::Api(ApiErrorBody {
            status: Some(message.stat),
            message: message.emsg,
        }));
    }
    let bearer_token = message
        .bearer_token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| {
            FeedError::Api(ApiErrorBody {
                status: Some(message.stat.clone()),
                message: Some("SSO response without bearer token".into()),
            })
        })?;

    tracing::info!(client_code = ?message.client_code, "SSO login complete");
    Ok(SsoSession {
        client_code: message.client_code,
        bearer_token,
    })
}
