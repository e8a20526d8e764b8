//! Instrument keys: the `"<EXCHANGE>|<TOKEN>"` identifiers used for
//! subscriptions and as Tick Cache keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::EXCHANGE_TOKEN_SEPARATOR;
use crate::error::FeedError;

/// Composite identifier of a tradable security on one exchange.
///
/// Serialized as the wire string `"NSE|26009"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstrumentKey {
    exchange: String,
    token: String,
}

impl InstrumentKey {
    /// Build a key from its parts.
    ///
    /// Returns `None` if either part is blank or contains a separator, since
    /// such a key could not be expressed on the wire.
    pub fn new(exchange: impl Into<String>, token: impl Into<String>) -> Option<Self> {
        let exchange = exchange.into().trim().to_owned();
        let token = token.into().trim().to_owned();
        let valid = |part: &str| {
            !part.is_empty() && !part.contains(EXCHANGE_TOKEN_SEPARATOR) && !part.contains('#')
        };
        (valid(&exchange) && valid(&token)).then_some(Self { exchange, token })
    }

    /// Exchange code (e.g. `"NSE"`).
    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Exchange token (e.g. `"26009"`).
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Display for InstrumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.exchange, EXCHANGE_TOKEN_SEPARATOR, self.token)
    }
}

impl FromStr for InstrumentKey {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (exchange, token) = s
            .split_once(EXCHANGE_TOKEN_SEPARATOR)
            .ok_or_else(|| FeedError::InvalidArgument(format!("instrument key without '|': {s:?}")))?;
        Self::new(exchange, token)
            .ok_or_else(|| FeedError::InvalidArgument(format!("invalid instrument key: {s:?}")))
    }
}

impl TryFrom<String> for InstrumentKey {
    type Error = FeedError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<InstrumentKey> for String {
    fn from(key: InstrumentKey) -> Self {
        key.to_string()
    }
}
