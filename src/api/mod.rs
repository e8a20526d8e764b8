//! REST API endpoint implementations.
//!
//! Each sub-module adds `async` methods to
//! [`NorenClient`](crate::client::NorenClient) via `impl` blocks. They exist
//! to feed the live feed's auth and holdings inputs; the feed never calls
//! them itself.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use noren_feed::NorenClient;
//!
//! # #[tokio::main]
//! # async fn main() -> noren_feed::Result<()> {
//! let session = NorenClient::sso_callback("https://backoffice.example.com", "auth-code", "AC123").await?;
//! let client = NorenClient::new(session.bearer_token)?;
//! let details = client.get_client_details().await?;
//! let holdings = Arc::new(
//!     NorenClient::fetch_team_holdings("https://backoffice.example.com", &details.user_id).await?,
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! | Module | Endpoints | Description |
//! |---|---|---|
//! | [`auth`] | 1 | SSO callback (auth code → bearer token) |
//! | [`profile`] | 1 | Client details |
//! | [`portfolio`] | 2 | Broker holdings, back-office team holdings |
//! | [`orders`] | 2 | Order book, trade book |

pub mod auth;
pub mod orders;
pub mod portfolio;
pub mod profile;
