//! Subscription Manager.
//!
//! Turns the fixed index benchmarks and the user's current holdings into
//! subscribe frames, and remembers what the current session subscribed so
//! tick frames that omit the exchange can still be matched to a key.
//!
//! The manager is told when a session becomes authenticated
//! ([`begin_session`](SubscriptionManager::begin_session)) and when it ends
//! ([`end_session`](SubscriptionManager::end_session)); outside a session
//! every subscribe call is a silent no-op.

use std::collections::HashSet;

use crate::constants::PRIMARY_EXCHANGE;
use crate::types::instrument::InstrumentKey;
use crate::types::portfolio::{HoldingItem, HoldingSymbol, Holdings};
use crate::ws::protocol::OutboundFrame;

/// The listing a holding is subscribed through: the primary cash exchange if
/// listed there, otherwise the first listing.
pub fn preferred_symbol(holding: &HoldingItem) -> Option<&HoldingSymbol> {
    holding
        .symbol
        .iter()
        .find(|s| s.exchange == PRIMARY_EXCHANGE)
        .or_else(|| holding.symbol.first())
}

/// One key per holding, first occurrence wins, duplicates merged.
///
/// Holdings without any usable listing are skipped.
pub fn dynamic_keys<'a>(holdings: impl IntoIterator<Item = &'a HoldingItem>) -> Vec<InstrumentKey> {
    let mut seen = HashSet::new();
    holdings
        .into_iter()
        .filter_map(|h| {
            let key = preferred_symbol(h).and_then(HoldingSymbol::instrument_key);
            if key.is_none() {
                tracing::debug!(isin = %h.isin, "Holding has no subscribable listing");
            }
            key
        })
        .filter(|key| seen.insert(key.clone()))
        .collect()
}

/// Tracks the static and dynamic subscription sets of the current session.
#[derive(Debug, Clone)]
pub struct SubscriptionManager {
    static_keys: Vec<InstrumentKey>,
    dynamic_keys: Vec<InstrumentKey>,
    authenticated: bool,
    static_sent: bool,
}

impl SubscriptionManager {
    /// Create a manager with the given index benchmarks. Duplicates are merged.
    pub fn new(static_keys: Vec<InstrumentKey>) -> Self {
        let mut seen = HashSet::new();
        let static_keys = static_keys
            .into_iter()
            .filter(|k| seen.insert(k.clone()))
            .collect();
        Self {
            static_keys,
            dynamic_keys: Vec::new(),
            authenticated: false,
            static_sent: false,
        }
    }

    /// The login was acknowledged; subscriptions may now be sent.
    pub fn begin_session(&mut self) {
        self.authenticated = true;
        self.static_sent = false;
        self.dynamic_keys.clear();
    }

    /// The socket is gone; nothing is subscribed any more.
    pub fn end_session(&mut self) {
        self.authenticated = false;
        self.static_sent = false;
        self.dynamic_keys.clear();
    }

    /// Whether a session is active.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Subscribe frame for the index benchmarks, once per session.
    pub fn subscribe_static(&mut self) -> Option<OutboundFrame> {
        if !self.authenticated || self.static_sent || self.static_keys.is_empty() {
            return None;
        }
        self.static_sent = true;
        tracing::debug!(keys = self.static_keys.len(), "Subscribing index benchmarks");
        Some(OutboundFrame::subscribe(&self.static_keys))
    }

    /// Subscribe frame for the holdings-derived keys.
    ///
    /// Returns `None`, without error, before authentication or when no
    /// holding yields a key. Every call while authenticated re-sends the
    /// full set so newly added positions start ticking.
    pub fn subscribe_dynamic(&mut self, holdings: &Holdings) -> Option<OutboundFrame> {
        if !self.authenticated {
            tracing::debug!("Not authenticated, deferring holdings subscription");
            return None;
        }
        let keys = dynamic_keys(holdings.items());
        if keys.is_empty() {
            return None;
        }
        tracing::debug!(keys = keys.len(), "Subscribing holdings");
        let frame = OutboundFrame::subscribe(&keys);
        self.dynamic_keys = keys;
        Some(frame)
    }

    /// Index benchmark keys.
    pub fn static_keys(&self) -> &[InstrumentKey] {
        &self.static_keys
    }

    /// Holdings keys sent in this session.
    pub fn dynamic_keys(&self) -> &[InstrumentKey] {
        &self.dynamic_keys
    }

    /// Match a bare token against this session's subscriptions, static first.
    pub fn resolve_token(&self, token: &str) -> Option<&InstrumentKey> {
        let subscribed: &[InstrumentKey] = if self.static_sent {
            self.static_keys.as_slice()
        } else {
            &[]
        };
        subscribed
            .iter()
            .chain(self.dynamic_keys.iter())
            .find(|k| k.token() == token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> InstrumentKey {
        s.parse().unwrap()
    }

    fn holding(isin: &str, listings: &[(&str, &str)]) -> HoldingItem {
        HoldingItem::new(
            isin,
            listings
                .iter()
                .map(|(e, t)| HoldingSymbol::new(*e, *t))
                .collect(),
        )
    }

    #[test]
    fn test_prefers_primary_exchange() {
        let h = holding("A", &[("BSE", "500325"), ("NSE", "2885")]);
        assert_eq!(preferred_symbol(&h).unwrap().token, "2885");
    }

    #[test]
    fn test_falls_back_to_first_listing() {
        let h = holding("A", &[("BSE", "1")]);
        assert_eq!(dynamic_keys([&h]), vec![key("BSE|1")]);
    }

    #[test]
    fn test_skips_holdings_without_listings() {
        let empty = holding("A", &[]);
        let blank = holding("B", &[("NSE", "")]);
        let ok = holding("C", &[("NSE", "7")]);
        assert_eq!(dynamic_keys([&empty, &blank, &ok]), vec![key("NSE|7")]);
    }

    #[test]
    fn test_duplicate_keys_merged() {
        let a = holding("A", &[("NSE", "500")]);
        let b = holding("B", &[("BSE", "9"), ("NSE", "500")]);
        assert_eq!(dynamic_keys([&a, &b]), vec![key("NSE|500")]);
    }

    #[test]
    fn test_no_frames_outside_session() {
        let mut subs = SubscriptionManager::new(vec![key("NSE|26000")]);
        let holdings = Holdings::from_items(vec![holding("A", &[("NSE", "1")])]);
        assert!(subs.subscribe_static().is_none());
        assert!(subs.subscribe_dynamic(&holdings).is_none());

        subs.begin_session();
        assert!(subs.subscribe_static().is_some());
        assert!(subs.subscribe_static().is_none(), "static set is sent once per session");
        assert!(subs.subscribe_dynamic(&holdings).is_some());
        assert!(subs.subscribe_dynamic(&holdings).is_some(), "dynamic set is re-sent on change");

        subs.end_session();
        assert!(subs.subscribe_dynamic(&holdings).is_none());
        assert!(subs.dynamic_keys().is_empty());
    }

    #[test]
    fn test_empty_holdings_is_silent() {
        let mut subs = SubscriptionManager::new(Vec::new());
        subs.begin_session();
        assert!(subs.subscribe_static().is_none());
        assert!(subs.subscribe_dynamic(&Holdings::default()).is_none());
    }

    #[test]
    fn test_resolve_token() {
        let mut subs = SubscriptionManager::new(vec![key("NSE|26000"), key("NSE|26000")]);
        assert_eq!(subs.static_keys().len(), 1);
        subs.begin_session();
        assert!(subs.resolve_token("26000").is_none(), "nothing subscribed yet");
        subs.subscribe_static();
        subs.subscribe_dynamic(&Holdings::from_items(vec![holding("A", &[("BSE", "42")])]));
        assert_eq!(subs.resolve_token("26000"), Some(&key("NSE|26000")));
        assert_eq!(subs.resolve_token("42"), Some(&key("BSE|42")));
        assert!(subs.resolve_token("99").is_none());
    }
}
