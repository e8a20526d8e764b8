#![allow(missing_docs)]
//! Client profile types.

use serde::Deserialize;

/// Bank account linked to the trading account.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankDetail {
    pub bank_name: Option<String>,
    pub acc_number: Option<String>,
    pub ifsc: Option<String>,
}

/// Client details of the logged-in user.
///
/// `user_id` doubles as the account identifier in the feed login frame.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDetails {
    pub user_id: String,
    #[serde(default)]
    pub act_id: Option<String>,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub act_status: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub mob_no: Option<String>,
    #[serde(default)]
    pub broker_name: Option<String>,
    /// Exchanges enabled on the account.
    #[serde(default)]
    pub exchange: Vec<String>,
    #[serde(default)]
    pub products: Vec<String>,
    #[serde(default)]
    pub bankdetails: Vec<BankDetail>,
}
