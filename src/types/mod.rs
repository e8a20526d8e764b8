//! Request and response types for the broker REST API and the live feed.
//!
//! ## Organization
//!
//! - [`instrument`]: `"<EXCHANGE>|<TOKEN>"` instrument keys
//! - [`portfolio`]: Holdings (the source of dynamic subscriptions)
//! - [`profile`]: Client details
//! - [`orders`]: Order book and trade book entries
//! - [`auth`]: SSO session types and the feed's [`AuthSnapshot`]

pub mod auth;
pub mod instrument;
pub mod orders;
pub mod portfolio;
pub mod profile;
pub(crate) mod serde_util;

pub use auth::AuthSnapshot;
pub use instrument::InstrumentKey;
pub use portfolio::{HoldingAccount, HoldingItem, HoldingSymbol, Holdings};
