#![allow(missing_docs)]
//! Portfolio types: Holdings as returned by the broker holdings endpoint,
//! plus the raw back-office team holdings payload and its mapping.
//!
//! Quantities and prices arrive as decimal strings and are kept that way.

use serde::{Deserialize, Serialize};

use crate::types::instrument::InstrumentKey;
use crate::types::serde_util::opt_string_or_number;

// ---------------------------------------------------------------------------
// Holdings
// ---------------------------------------------------------------------------

/// One exchange listing of a held security.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingSymbol {
    pub exchange: String,
    pub token: String,
    #[serde(default)]
    pub trading_symbol: Option<String>,
    /// Previous day close.
    #[serde(default)]
    pub pdc: Option<String>,
    #[serde(default)]
    pub ltp: Option<String>,
}

impl HoldingSymbol {
    /// Shorthand for tests and callers that only know exchange and token.
    pub fn new(exchange: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            token: token.into(),
            ..Self::default()
        }
    }

    /// The instrument key of this listing, if exchange and token are usable.
    pub fn instrument_key(&self) -> Option<InstrumentKey> {
        InstrumentKey::new(self.exchange.as_str(), self.token.as_str())
    }
}

/// A single holding in the demat account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingItem {
    pub isin: String,
    #[serde(default)]
    pub net_qty: Option<String>,
    #[serde(default)]
    pub hold_qty: Option<String>,
    #[serde(default)]
    pub buy_price: Option<String>,
    #[serde(default)]
    pub sellable_qty: Option<String>,
    #[serde(default)]
    pub unrealized_pnl: Option<String>,
    #[serde(default)]
    pub close_price: Option<String>,
    /// Exchange listings of the security, in broker order.
    #[serde(default)]
    pub symbol: Vec<HoldingSymbol>,
}

impl HoldingItem {
    /// Shorthand for a holding with only its listings filled in.
    pub fn new(isin: impl Into<String>, symbol: Vec<HoldingSymbol>) -> Self {
        Self {
            isin: isin.into(),
            symbol,
            ..Self::default()
        }
    }
}

/// Holdings of one trading account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingAccount {
    #[serde(default)]
    pub act_id: Option<String>,
    #[serde(default)]
    pub poa: Option<bool>,
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub holdings: Vec<HoldingItem>,
}

/// The full holdings collection handed to the feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Holdings {
    pub accounts: Vec<HoldingAccount>,
}

impl Holdings {
    /// Wrap a flat list of holdings into a single anonymous account.
    pub fn from_items(items: Vec<HoldingItem>) -> Self {
        Self {
            accounts: vec![HoldingAccount {
                holdings: items,
                ..HoldingAccount::default()
            }],
        }
    }

    /// Iterate every holding across all accounts.
    pub fn items(&self) -> impl Iterator<Item = &HoldingItem> {
        self.accounts.iter().flat_map(|a| a.holdings.iter())
    }

    /// `true` when no account holds anything.
    pub fn is_empty(&self) -> bool {
        self.items().next().is_none()
    }
}

// ---------------------------------------------------------------------------
// Back-office team holdings
// ---------------------------------------------------------------------------

/// Request body of `rms.sso.fetch_team_holdings`.
#[derive(Debug, Clone, Serialize)]
pub struct TeamHoldingsRequest {
    pub actid: String,
}

/// `{ "message": { "stat": "Ok", "data": [ ... ] } }`
#[derive(Debug, Clone, Deserialize)]
pub struct TeamHoldingsResponse {
    pub message: TeamHoldingsMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamHoldingsMessage {
    pub stat: String,
    #[serde(default)]
    pub emsg: Option<String>,
    #[serde(default)]
    pub data: Option<Vec<TeamAccount>>,
}

/// One account in the back-office payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TeamAccount {
    #[serde(default)]
    pub actid: Option<String>,
    #[serde(default)]
    pub holdings: Vec<TeamHolding>,
}

/// One holding in the back-office payload. `close_prc` is in paise.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TeamHolding {
    #[serde(default)]
    pub isin: String,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub close_prc: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub upload_prc: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub npoadqty: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub hold_qty: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub benqty: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub usedqty: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub trdqty: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub sell_amt: Option<String>,
    #[serde(default)]
    pub exch_tsym: Vec<TeamListing>,
}

/// Exchange listing in the back-office payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TeamListing {
    #[serde(default)]
    pub exch: String,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub token: Option<String>,
    #[serde(default)]
    pub tsym: Option<String>,
}

fn parse_decimal(v: Option<&str>) -> Option<f64> {
    v.and_then(|s| s.parse::<f64>().ok()).filter(|f| f.is_finite())
}

impl From<TeamHolding> for HoldingItem {
    fn from(h: TeamHolding) -> Self {
        let ltp = parse_decimal(h.close_prc.as_deref()).map(|paise| paise / 100.0);
        let buy_price = parse_decimal(h.upload_prc.as_deref());
        // Free quantity first; a zero or missing value falls back to the held quantity.
        let qty = parse_decimal(h.npoadqty.as_deref())
            .filter(|q| *q != 0.0)
            .or_else(|| parse_decimal(h.hold_qty.as_deref()));
        let unrealized = match (ltp, buy_price, qty) {
            (Some(ltp), Some(buy), Some(qty)) => Some(((ltp - buy) * qty).to_string()),
            _ => None,
        };
        let ltp_text = ltp.map(|v| v.to_string());

        let symbol = h
            .exch_tsym
            .into_iter()
            .map(|l| HoldingSymbol {
                exchange: l.exch,
                token: l.token.unwrap_or_default(),
                trading_symbol: l.tsym,
                pdc: Some("0".into()),
                ltp: ltp_text.clone(),
            })
            .collect();

        Self {
            isin: h.isin,
            net_qty: qty.map(|q| q.to_string()),
            hold_qty: h.hold_qty,
            buy_price: h.upload_prc,
            sellable_qty: qty.map(|q| q.to_string()),
            unrealized_pnl: unrealized,
            close_price: ltp_text,
            symbol,
        }
    }
}

impl From<TeamAccount> for HoldingAccount {
    fn from(a: TeamAccount) -> Self {
        Self {
            act_id: a.actid,
            poa: Some(true),
            product: Some("CNC".into()),
            holdings: a.holdings.into_iter().map(HoldingItem::from).collect(),
        }
    }
}

impl From<Vec<TeamAccount>> for Holdings {
    fn from(accounts: Vec<TeamAccount>) -> Self {
        Self {
            accounts: accounts.into_iter().map(HoldingAccount::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_broker_payload() {
        let json = r#"[{
            "actId": "A1",
            "poa": true,
            "product": "CNC",
            "holdings": [{
                "isin": "INE002A01018",
                "netQty": "10",
                "symbol": [
                    {"exchange": "BSE", "token": "500325", "tradingSymbol": "RELIANCE"},
                    {"exchange": "NSE", "token": "2885", "tradingSymbol": "RELIANCE-EQ", "pdc": "0", "ltp": "2950.1"}
                ]
            }]
        }]"#;
        let holdings: Holdings = serde_json::from_str(json).unwrap();
        assert_eq!(holdings.accounts.len(), 1);
        let item = holdings.items().next().unwrap();
        assert_eq!(item.symbol.len(), 2);
        assert_eq!(item.symbol[1].ltp.as_deref(), Some("2950.1"));
        assert!(!holdings.is_empty());
    }

    #[test]
    fn test_team_holdings_mapping() {
        let json = r#"[{
            "actid": "AC1",
            "holdings": [{
                "isin": "INE040A01034",
                "close_prc": "165005",
                "upload_prc": "1500",
                "npoadqty": "0",
                "hold_qty": "10",
                "exch_tsym": [
                    {"exch": "BSE", "token": "500180", "tsym": "HDFCBANK"},
                    {"exch": "NSE", "token": 1333, "tsym": "HDFCBANK-EQ"}
                ]
            }]
        }]"#;
        let accounts: Vec<TeamAccount> = serde_json::from_str(json).unwrap();
        let holdings = Holdings::from(accounts);

        let account = &holdings.accounts[0];
        assert_eq!(account.act_id.as_deref(), Some("AC1"));
        assert_eq!(account.product.as_deref(), Some("CNC"));

        let item = holdings.items().next().unwrap();
        assert_eq!(item.close_price.as_deref(), Some("1650.05"));
        assert_eq!(item.net_qty.as_deref(), Some("10"));
        assert_eq!(item.buy_price.as_deref(), Some("1500"));
        let pnl: f64 = item.unrealized_pnl.as_deref().unwrap().parse().unwrap();
        assert!((pnl - 1500.5).abs() < 1e-6);

        assert_eq!(item.symbol.len(), 2);
        assert_eq!(item.symbol[1].exchange, "NSE");
        assert_eq!(item.symbol[1].token, "1333");
        assert_eq!(item.symbol[1].trading_symbol.as_deref(), Some("HDFCBANK-EQ"));
        assert_eq!(item.symbol[1].ltp.as_deref(), Some("1650.05"));
        assert_eq!(
            item.symbol[1].instrument_key(),
            InstrumentKey::new("NSE", "1333")
        );
    }

    #[test]
    fn test_team_holding_without_prices() {
        let item = HoldingItem::from(TeamHolding {
            isin: "INE002A01018".into(),
            npoadqty: Some("5".into()),
            ..TeamHolding::default()
        });
        assert_eq!(item.net_qty.as_deref(), Some("5"));
        assert!(item.close_price.is_none());
        assert!(item.unrealized_pnl.is_none());
        assert!(item.symbol.is_empty());
    }

    #[test]
    fn test_empty_accounts_are_empty() {
        let holdings = Holdings {
            accounts: vec![HoldingAccount::default()],
        };
        assert!(holdings.is_empty());
    }
}
