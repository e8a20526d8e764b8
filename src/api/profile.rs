//! Profile endpoint.

use crate::client::NorenClient;
use crate::error::{ApiErrorBody, FeedError, Result};
use crate::types::profile::ClientDetails;

impl NorenClient {
    /// Retrieve the logged-in user's client details.
    ///
    /// The broker wraps the details in a one-element `result` array; the
    /// first entry is returned.
    ///
    /// **Endpoint:** `GET /client-rest/profile/getclientdetails`
    pub async fn get_client_details(&self) -> Result<ClientDetails> {
        let details: Vec<ClientDetails> = self.get("/client-rest/profile/getclientdetails").await?;
        first_client_details(details)
    }
}

fn first_client_details(details: Vec<ClientDetails>) -> Result<ClientDetails> {
    details.into_iter().next().ok_or_else(|| {
        FeedError::Api(ApiErrorBody {
            status: Some("Ok".into()),
            message: Some("client details response with empty result".into()),
        })
    })
}
