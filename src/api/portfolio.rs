//! Portfolio endpoints: broker holdings and back-office team holdings.

use crate::client::{NorenClient, handle_response};
use crate::constants::TEAM_HOLDINGS_PATH;
use crate::error::{ApiErrorBody, FeedError, Result};
use crate::types::portfolio::{Holdings, TeamHoldingsRequest, TeamHoldingsResponse};

impl NorenClient {
    /// Retrieve the holdings of every linked account.
    ///
    /// Pass the result to
    /// [`FeedManager::holdings_changed`](crate::ws::manager::FeedManager::holdings_changed)
    /// to subscribe the held instruments.
    ///
    /// **Endpoint:** `GET /ho-rest/api/holdings/`
    pub async fn get_holdings(&self) -> Result<Holdings> {
        self.get("/ho-rest/api/holdings/").await
    }

    /// Load the holdings of an account from the back-office API.
    ///
    /// This is the holdings source the feed normally follows. Like
    /// [`sso_callback`](Self::sso_callback) it needs no bearer token. Close
    /// prices arrive in paise and are converted to rupees.
    ///
    /// **Endpoint:** `POST {api_base}/api/method/rms.sso.fetch_team_holdings`
    pub async fn fetch_team_holdings(api_base: &str, actid: &str) -> Result<Holdings> {
        let url = format!("{}{}", api_base.trim_end_matches('/'), TEAM_HOLDINGS_PATH);
        tracing::debug!(%url, actid, "POST fetch_team_holdings");

        let body = TeamHoldingsRequest {
            actid: actid.to_owned(),
        };
        let resp = reqwest::Client::new().post(&url).json(&body).send().await?;
        let bytes = handle_response(resp).await?;
        let parsed: TeamHoldingsResponse = serde_json::from_slice(&bytes)?;
        holdings_from_response(parsed)
    }
}

fn holdings_from_response(resp: TeamHoldingsResponse) -> Result<Holdings> {
    let message = resp.message;
    match (message.stat.as_str(), message.data) {
        ("Ok", Some(data)) => {
            let holdings = Holdings::from(data);
            tracing::info!(
                accounts = holdings.accounts.len(),
                items = holdings.items().count(),
                "Team holdings loaded"
            );
            Ok(holdings)
        }
        ("Ok", None) => Err(FeedError::Api(ApiErrorBody {
            status: Some(message.stat),
            message: Some("team holdings response without data".into()),
        })),
        _ => Err(FeedError::Api(ApiErrorBody {
            status: Some(message.stat),
            message: message.emsg,
        })),
    }
}
