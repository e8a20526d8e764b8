//! Order book and trade book endpoints.

use crate::client::NorenClient;
use crate::error::Result;
use crate::types::orders::{OrderBookItem, TradeBookItem};

impl NorenClient {
    /// Retrieve the day's orders.
    ///
    /// **Endpoint:** `GET /od-rest/api/info/orderbook`
    pub async fn get_order_book(&self) -> Result<Vec<OrderBookItem>> {
        self.get("/od-rest/api/info/orderbook").await
    }

    /// Retrieve the day's fills.
    ///
    /// **Endpoint:** `GET /od-rest/api/info/tradebook`
    pub async fn get_trade_book(&self) -> Result<Vec<TradeBookItem>> {
        self.get("/od-rest/api/info/tradebook").await
    }
}
