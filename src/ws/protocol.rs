#![allow(missing_docs)]
//! Wire frames of the NorenOMS live feed.
//!
//! Every frame is a JSON object discriminated by its `t` field:
//!
//! | Direction | `t` | Meaning |
//! |---|---|---|
//! | client → server | `c` | login (`susertoken`, `actid`, `uid`, `source`) |
//! | server → client | `ck` | login acknowledgement, `s: "OK"` on success |
//! | client → server | `t` | subscribe, `k: "NSE|26000#BSE|1"` |
//! | server → client | `tk` | subscription acknowledgement carrying the first tick |
//! | server → client | `tf` | incremental tick (fields optional) |
//! | client → server | `h` | heartbeat, `k: ""` |
//! | server → client | `hk` | heartbeat acknowledgement, `ft: <epoch secs>` |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::KEY_LIST_SEPARATOR;
use crate::error::{FeedError, Result};
use crate::types::instrument::InstrumentKey;
use crate::types::serde_util::opt_string_or_number;

// ---------------------------------------------------------------------------
// Outbound frames
// ---------------------------------------------------------------------------

/// Frames sent from the client to the feed server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "t")]
pub enum OutboundFrame {
    /// Login with the session credential.
    #[serde(rename = "c")]
    Login {
        susertoken: String,
        actid: String,
        uid: String,
        source: String,
    },
    /// Subscribe to touchline updates for a `#`-joined key list.
    #[serde(rename = "t")]
    Subscribe { k: String },
    /// Keep-alive.
    #[serde(rename = "h")]
    Heartbeat { k: String },
}

impl OutboundFrame {
    /// Login frame; the account id is sent as both `actid` and `uid`.
    pub fn login(websocket_key: &str, account_id: &str, source: &str) -> Self {
        Self::Login {
            susertoken: websocket_key.to_owned(),
            actid: account_id.to_owned(),
            uid: account_id.to_owned(),
            source: source.to_owned(),
        }
    }

    /// Subscribe frame for the given keys, in order.
    pub fn subscribe(keys: &[InstrumentKey]) -> Self {
        let separator = KEY_LIST_SEPARATOR.to_string();
        let k = keys
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(separator.as_str());
        Self::Subscribe { k }
    }

    /// Heartbeat frame.
    pub fn heartbeat() -> Self {
        Self::Heartbeat { k: String::new() }
    }

    /// Instrument keys carried by a subscribe frame (empty for other frames).
    pub fn subscribed_keys(&self) -> Vec<InstrumentKey> {
        match self {
            Self::Subscribe { k } => k
                .split(KEY_LIST_SEPARATOR)
                .filter_map(|part| part.parse().ok())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Serialize to the JSON text sent on the socket.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ---------------------------------------------------------------------------
// Inbound frames
// ---------------------------------------------------------------------------

/// Which tick frame type was received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickKind {
    /// `tk`: subscription acknowledgement with a full touchline.
    Acknowledgement,
    /// `tf`: incremental update; absent fields are unchanged.
    Update,
}

/// A price update for one token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickFrame {
    pub kind: TickKind,
    /// Exchange code (`e`), when the server includes it.
    pub exchange: Option<String>,
    /// Exchange token (`tk`).
    pub token: String,
    /// Last traded price (`lp`), as sent.
    pub last_price: Option<String>,
    /// Percent change (`pc`), as sent.
    pub percent_change: Option<String>,
}

/// A parsed frame from the feed server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Login acknowledgement. Only `s == "OK"`, exactly, is a success.
    AuthAck {
        ok: bool,
        status: Option<String>,
    },
    Tick(TickFrame),
    HeartbeatAck {
        server_time: Option<DateTime<Utc>>,
    },
    /// Any other frame type; carried for logging only.
    Other { kind: String },
}

/// Loose view of any inbound frame. Every field but `t` is optional.
#[derive(Debug, Deserialize)]
struct RawFrame {
    t: String,
    #[serde(default)]
    s: Option<String>,
    #[serde(default)]
    e: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    tk: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    lp: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pc: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    ft: Option<String>,
}

/// Parse one text frame from the feed server.
///
/// Non-JSON input yields [`FeedError::Json`]; a tick without a token yields
/// [`FeedError::Protocol`]. Unknown frame types are not errors.
pub fn parse_inbound(text: &str) -> Result<InboundFrame> {
    let raw: RawFrame = serde_json::from_str(text)?;

    let frame = match raw.t.as_str() {
        "ck" => InboundFrame::AuthAck {
            ok: raw.s.as_deref() == Some("OK"),
            status: raw.s,
        },
        "tk" | "tf" => {
            let token = raw.tk.ok_or_else(|| {
                FeedError::Protocol(format!("tick frame '{}' without token", raw.t))
            })?;
            InboundFrame::Tick(TickFrame {
                kind: if raw.t == "tk" {
                    TickKind::Acknowledgement
                } else {
                    TickKind::Update
                },
                exchange: raw.e.filter(|e| !e.trim().is_empty()),
                token,
                last_price: raw.lp,
                percent_change: raw.pc,
            })
        }
        "hk" => InboundFrame::HeartbeatAck {
            server_time: raw
                .ft
                .and_then(|ft| ft.parse::<i64>().ok())
                .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        },
        _ => InboundFrame::Other { kind: raw.t },
    };

    Ok(frame)
}
