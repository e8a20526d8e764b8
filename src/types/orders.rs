#![allow(missing_docs)]
//! Order book and trade book types.
//!
//! Every numeric field is a decimal string on the wire; nothing here is
//! interpreted by the feed.

use serde::Deserialize;

use crate::types::instrument::InstrumentKey;

// ---------------------------------------------------------------------------
// Order Book
// ---------------------------------------------------------------------------

/// A single entry of the day's order book.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBookItem {
    pub order_no: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub act_id: Option<String>,
    pub exchange: String,
    pub trading_symbol: String,
    pub token: String,
    #[serde(default)]
    pub qty: Option<String>,
    #[serde(default)]
    pub trans_type: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub avg_trade_price: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub price_type: Option<String>,
    #[serde(default)]
    pub order_status: Option<String>,
    #[serde(default)]
    pub fill_shares: Option<String>,
    #[serde(default)]
    pub rejected_reason: Option<String>,
    #[serde(default)]
    pub order_time: Option<String>,
}

impl OrderBookItem {
    /// Instrument key of the ordered security.
    pub fn instrument_key(&self) -> Option<InstrumentKey> {
        InstrumentKey::new(self.exchange.as_str(), self.token.as_str())
    }
}

// ---------------------------------------------------------------------------
// Trade Book
// ---------------------------------------------------------------------------

/// A single fill from the day's trade book.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeBookItem {
    pub order_no: String,
    pub exchange: String,
    pub trading_symbol: String,
    pub token: String,
    #[serde(default)]
    pub fill_id: Option<String>,
    #[serde(default)]
    pub fill_time: Option<String>,
    #[serde(default)]
    pub trans_type: Option<String>,
    #[serde(default)]
    pub fillqty: Option<String>,
    #[serde(default)]
    pub fillprc: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub exch_order_id: Option<String>,
}

impl TradeBookItem {
    /// Instrument key of the traded security.
    pub fn instrument_key(&self) -> Option<InstrumentKey> {
        InstrumentKey::new(self.exchange.as_str(), self.token.as_str())
    }
}
