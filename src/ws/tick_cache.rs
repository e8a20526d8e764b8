//! Tick Cache: latest price and percent change per instrument key.
//!
//! Written only by the feed's message handling, read by any number of
//! consumers. Reads hand out owned copies, so a consumer holding a
//! [`Quote`] never sees it change underneath it.
//!
//! Entries are never evicted; the cache is cleared on logout only.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::types::instrument::InstrumentKey;
use crate::ws::protocol::TickFrame;

/// Latest known values for one instrument, as the decimal strings the feed
/// sent. A field stays `None` until some frame has carried it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Quote {
    /// Last traded price.
    pub last_price: Option<String>,
    /// Percent change versus previous close.
    pub percent_change: Option<String>,
}

impl Quote {
    /// Last price, or `"0"` when not yet known.
    pub fn last_price_or_zero(&self) -> &str {
        self.last_price.as_deref().unwrap_or("0")
    }

    /// Percent change, or `"0"` when not yet known.
    pub fn percent_change_or_zero(&self) -> &str {
        self.percent_change.as_deref().unwrap_or("0")
    }

    /// Field-level merge: only the fields present in the update overwrite.
    fn merge(&mut self, last_price: Option<&str>, percent_change: Option<&str>) {
        if let Some(lp) = last_price {
            self.last_price = Some(lp.to_owned());
        }
        if let Some(pc) = percent_change {
            self.percent_change = Some(pc.to_owned());
        }
    }
}

type QuoteMap = HashMap<InstrumentKey, Quote>;

/// Shared, cloneable handle to the quote map. Clones share storage.
#[derive(Debug, Clone, Default)]
pub struct TickCache {
    inner: Arc<RwLock<QuoteMap>>,
}

impl TickCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a tick frame into the entry for `key`.
    ///
    /// A frame carrying neither price nor percent change is ignored and does
    /// not create an entry. Applying the same frame twice is the same as
    /// applying it once.
    pub fn apply_tick(&self, key: &InstrumentKey, frame: &TickFrame) {
        let last_price = frame.last_price.as_deref();
        let percent_change = frame.percent_change.as_deref();
        if last_price.is_none() && percent_change.is_none() {
            return;
        }
        let mut map = self.inner.write();
        match map.get_mut(key) {
            Some(quote) => quote.merge(last_price, percent_change),
            None => {
                let mut quote = Quote::default();
                quote.merge(last_price, percent_change);
                map.insert(key.clone(), quote);
            }
        }
    }

    /// Latest quote for `key`, or `None` if no data has arrived yet.
    pub fn read(&self, key: &InstrumentKey) -> Option<Quote> {
        self.inner.read().get(key).cloned()
    }

    /// Copy of the whole map.
    pub fn snapshot(&self) -> HashMap<InstrumentKey, Quote> {
        self.inner.read().clone()
    }

    /// Number of instruments with data.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// `true` if no instrument has data.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Drop every entry (logout).
    pub fn clear(&self) {
        self.inner.write().clear();
    }

    /// A read-only view sharing this cache's storage.
    pub fn reader(&self) -> QuoteReader {
        QuoteReader {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Read-only view of a [`TickCache`], handed to consumers.
#[derive(Debug, Clone)]
pub struct QuoteReader {
    inner: Arc<RwLock<QuoteMap>>,
}

impl QuoteReader {
    /// Latest quote for `key`, or `None` if no data has arrived yet.
    pub fn read(&self, key: &InstrumentKey) -> Option<Quote> {
        self.inner.read().get(key).cloned()
    }

    /// Copy of the whole map.
    pub fn snapshot(&self) -> HashMap<InstrumentKey, Quote> {
        self.inner.read().clone()
    }

    /// Number of instruments with data.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// `true` if no instrument has data.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
