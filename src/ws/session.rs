#![allow(missing_docs)]
//! Connection Manager state machine.
//!
//! [`FeedSession`] decides when a socket is opened, what is sent after login
//! and how long to wait before reconnecting, but performs no IO itself. It is
//! fed [`SessionEvent`]s and answers with [`SessionAction`]s for a driver to
//! execute (see [`FeedManager`](crate::ws::manager::FeedManager)).
//!
//! # Lifecycle
//!
//! ```text
//!  Idle ──connect──▶ Connecting ──open──▶ Authenticating ──ck OK──▶ Authenticated
//!                        ▲                     │ ck !OK / close / error   │ close / error
//!                        │                     ▼                          ▼
//!                        └──timer── ReconnectScheduled ◀────────── Closed(code, reason)
//!                                              │ attempts exhausted
//!                                              ▼
//!                                            Failed
//! ```
//!
//! Every close reschedules, including a clean 1000 close from the server.
//! Only [`SessionEvent::Disconnect`] (or logout) suppresses reconnection; the
//! close code is never used to infer intent.
//!
//! # Stale events
//!
//! Socket events carry the [`SocketId`] of the socket that produced them and
//! timer events carry a [`TimerId`]. Anything not addressed to the live
//! socket or the pending timer is dropped, which is what makes a late close
//! after `disconnect()` harmless and guarantees one retry per close.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::constants::CLOSE_NORMAL;
use crate::types::auth::AuthSnapshot;
use crate::types::instrument::InstrumentKey;
use crate::types::portfolio::Holdings;
use crate::ws::backoff::{RetryPolicy, RetryState};
use crate::ws::manager::FeedConfig;
use crate::ws::protocol::{InboundFrame, OutboundFrame, TickFrame};
use crate::ws::subscription::SubscriptionManager;
use crate::ws::tick_cache::TickCache;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Generation number of a socket opened by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketId(pub u64);

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Socket({})", self.0)
    }
}

/// Generation number of a reconnect timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Where the connection currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Authenticating,
    Authenticated,
    Closed { code: Option<u16>, reason: String },
    ReconnectScheduled { attempt: u32, delay: Duration },
    /// Retries exhausted; only a manual `connect()` leaves this state.
    Failed { attempts: u32 },
}

/// Connection status as shown to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    Idle,
    Connecting,
    Authenticating,
    Authenticated,
    Reconnecting { attempt: u32, max: u32 },
    Failed { attempts: u32 },
}

impl fmt::Display for FeedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Connecting => f.write_str("connecting"),
            Self::Authenticating => f.write_str("authenticating"),
            Self::Authenticated => f.write_str("live"),
            Self::Reconnecting { attempt, max } => write!(f, "reconnecting ({attempt}/{max})"),
            Self::Failed { attempts } => {
                write!(f, "disconnected after {attempts} retries, reconnect manually")
            }
        }
    }
}

/// Credentials for the login frame.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Credentials {
    websocket_key: String,
    account_id: String,
}

// ---------------------------------------------------------------------------
// Events and actions
// ---------------------------------------------------------------------------

/// Inputs to the state machine.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Manual or provider-triggered connect.
    Connect,
    /// User-initiated disconnect.
    Disconnect,
    AuthChanged(AuthSnapshot),
    HoldingsChanged(Arc<Holdings>),
    SocketOpened(SocketId),
    FrameReceived(SocketId, InboundFrame),
    SocketClosed {
        socket: SocketId,
        code: Option<u16>,
        reason: String,
    },
    SocketError {
        socket: SocketId,
        message: String,
    },
    ReconnectDue(TimerId),
    HeartbeatDue,
}

/// Outputs for the driver to execute, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    OpenSocket(SocketId),
    Send(SocketId, OutboundFrame),
    CloseSocket {
        socket: SocketId,
        code: u16,
        reason: String,
    },
    ScheduleReconnect {
        timer: TimerId,
        attempt: u32,
        delay: Duration,
    },
    CancelReconnect(TimerId),
}

// ---------------------------------------------------------------------------
// FeedSession
// ---------------------------------------------------------------------------

/// The IO-free connection, subscription and cache-writing core of the feed.
#[derive(Debug)]
pub struct FeedSession {
    source: String,
    retry_policy: RetryPolicy,
    max_missed_heartbeats: u32,

    state: ConnectionState,
    retry: RetryState,
    user_disconnected: bool,
    credentials: Option<Credentials>,
    socket: Option<SocketId>,
    pending_timer: Option<TimerId>,
    next_socket: u64,
    next_timer: u64,
    missed_heartbeats: u32,

    subscriptions: SubscriptionManager,
    holdings: Option<Arc<Holdings>>,
    cache: TickCache,
}

impl FeedSession {
    /// Create an idle session writing into `cache`.
    pub fn new(config: &FeedConfig, cache: TickCache) -> Self {
        Self {
            source: config.source.clone(),
            retry_policy: config.retry,
            max_missed_heartbeats: config.max_missed_heartbeats,
            state: ConnectionState::Idle,
            retry: RetryState::default(),
            user_disconnected: false,
            credentials: None,
            socket: None,
            pending_timer: None,
            next_socket: 0,
            next_timer: 0,
            missed_heartbeats: 0,
            subscriptions: SubscriptionManager::new(config.index_keys.clone()),
            holdings: None,
            cache,
        }
    }

    /// Feed one event through the state machine.
    pub fn handle(&mut self, event: SessionEvent) -> Vec<SessionAction> {
        let mut actions = Vec::new();
        match event {
            SessionEvent::Connect => self.connect(&mut actions),
            SessionEvent::Disconnect => self.disconnect(&mut actions),
            SessionEvent::AuthChanged(auth) => self.on_auth_changed(auth, &mut actions),
            SessionEvent::HoldingsChanged(holdings) => {
                self.on_holdings_changed(holdings, &mut actions)
            }
            SessionEvent::SocketOpened(socket) => self.on_opened(socket, &mut actions),
            SessionEvent::FrameReceived(socket, frame) => {
                self.on_frame(socket, frame, &mut actions)
            }
            SessionEvent::SocketClosed {
                socket,
                code,
                reason,
            } => self.on_closed(socket, code, reason, &mut actions),
            SessionEvent::SocketError { socket, message } => {
                self.on_error(socket, message, &mut actions)
            }
            SessionEvent::ReconnectDue(timer) => self.on_reconnect_due(timer, &mut actions),
            SessionEvent::HeartbeatDue => self.on_heartbeat_due(&mut actions),
        }
        actions
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// User-facing status derived from the state.
    pub fn status(&self) -> FeedStatus {
        match &self.state {
            ConnectionState::Idle | ConnectionState::Closed { .. } => FeedStatus::Idle,
            ConnectionState::Connecting => FeedStatus::Connecting,
            ConnectionState::Authenticating => FeedStatus::Authenticating,
            ConnectionState::Authenticated => FeedStatus::Authenticated,
            ConnectionState::ReconnectScheduled { attempt, .. } => FeedStatus::Reconnecting {
                attempt: *attempt,
                max: self.retry_policy.max_attempts,
            },
            ConnectionState::Failed { attempts } => FeedStatus::Failed {
                attempts: *attempts,
            },
        }
    }

    /// `true` once the login has been acknowledged on the live socket.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Authenticated
    }

    /// Retries scheduled since the last successful login.
    pub fn retry_attempt(&self) -> u32 {
        self.retry.attempt()
    }

    pub fn is_user_disconnected(&self) -> bool {
        self.user_disconnected
    }

    /// The socket the session is currently talking to.
    pub fn socket(&self) -> Option<SocketId> {
        self.socket
    }

    /// The reconnect timer the session is waiting on.
    pub fn pending_timer(&self) -> Option<TimerId> {
        self.pending_timer
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    pub fn cache(&self) -> &TickCache {
        &self.cache
    }

    // -----------------------------------------------------------------------
    // User and provider events
    // -----------------------------------------------------------------------

    fn connect(&mut self, actions: &mut Vec<SessionAction>) {
        if self.socket.is_some() {
            tracing::debug!(state = ?self.state, "connect: socket already open or in progress");
            return;
        }
        if self.credentials.is_none() {
            tracing::debug!("connect: no websocket key or account id yet");
            return;
        }

        self.user_disconnected = false;
        if let Some(timer) = self.pending_timer.take() {
            actions.push(SessionAction::CancelReconnect(timer));
        }
        if matches!(self.state, ConnectionState::Failed { .. }) {
            self.retry.reset();
        }
        self.open_socket(actions);
    }

    fn disconnect(&mut self, actions: &mut Vec<SessionAction>) {
        self.user_disconnected = true;
        if let Some(timer) = self.pending_timer.take() {
            actions.push(SessionAction::CancelReconnect(timer));
        }
        if let Some(socket) = self.socket.take() {
            actions.push(SessionAction::CloseSocket {
                socket,
                code: CLOSE_NORMAL,
                reason: "client disconnect".into(),
            });
        }
        self.subscriptions.end_session();
        self.missed_heartbeats = 0;
        self.retry.reset();

        if !matches!(
            self.state,
            ConnectionState::Idle | ConnectionState::Closed { .. }
        ) {
            tracing::info!("Feed disconnected by user");
            self.state = ConnectionState::Closed {
                code: Some(CLOSE_NORMAL),
                reason: "client disconnect".into(),
            };
        }
    }

    fn on_auth_changed(&mut self, auth: AuthSnapshot, actions: &mut Vec<SessionAction>) {
        if !auth.is_authenticated {
            tracing::info!("Logged out, tearing down feed");
            self.credentials = None;
            self.disconnect(actions);
            self.holdings = None;
            self.cache.clear();
            return;
        }

        let non_blank = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        match (non_blank(auth.websocket_key), non_blank(auth.account_id)) {
            (Some(websocket_key), Some(account_id)) => {
                self.credentials = Some(Credentials {
                    websocket_key,
                    account_id,
                });
                self.connect(actions);
            }
            _ => {
                tracing::info!("Websocket credentials withdrawn, feed goes down");
                self.credentials = None;
                self.disconnect(actions);
            }
        }
    }

    fn on_holdings_changed(&mut self, holdings: Arc<Holdings>, actions: &mut Vec<SessionAction>) {
        let frame = self.subscriptions.subscribe_dynamic(&holdings);
        self.holdings = Some(holdings);
        if let (Some(frame), Some(socket)) = (frame, self.socket) {
            actions.push(SessionAction::Send(socket, frame));
        }
    }

    // -----------------------------------------------------------------------
    // Socket events
    // -----------------------------------------------------------------------

    fn is_live(&self, socket: SocketId) -> bool {
        if self.socket == Some(socket) {
            return true;
        }
        tracing::debug!(socket = %socket, live = ?self.socket, "Ignoring event for stale socket");
        false
    }

    fn on_opened(&mut self, socket: SocketId, actions: &mut Vec<SessionAction>) {
        if !self.is_live(socket) {
            return;
        }
        let Some(credentials) = &self.credentials else {
            self.close_locally(socket, "credentials withdrawn", actions);
            return;
        };

        tracing::info!(socket = %socket, "Feed socket open, logging in");
        actions.push(SessionAction::Send(
            socket,
            OutboundFrame::login(
                &credentials.websocket_key,
                &credentials.account_id,
                &self.source,
            ),
        ));
        self.missed_heartbeats = 0;
        self.state = ConnectionState::Authenticating;
    }

    fn on_frame(&mut self, socket: SocketId, frame: InboundFrame, actions: &mut Vec<SessionAction>) {
        if !self.is_live(socket) {
            return;
        }
        match frame {
            InboundFrame::AuthAck { ok: true, .. } => self.on_authenticated(socket, actions),
            InboundFrame::AuthAck { ok: false, status } => {
                tracing::warn!(socket = %socket, status = ?status, "Feed login rejected");
                self.close_locally(socket, "authentication rejected", actions);
            }
            InboundFrame::Tick(tick) => self.on_tick(tick),
            InboundFrame::HeartbeatAck { server_time } => {
                tracing::trace!(socket = %socket, ?server_time, "Heartbeat acknowledged");
                self.missed_heartbeats = 0;
            }
            InboundFrame::Other { kind } => {
                tracing::trace!(socket = %socket, kind = %kind, "Ignoring frame");
            }
        }
    }

    fn on_authenticated(&mut self, socket: SocketId, actions: &mut Vec<SessionAction>) {
        if self.state != ConnectionState::Authenticating {
            tracing::debug!(socket = %socket, state = ?self.state, "Duplicate login acknowledgement");
            return;
        }
        tracing::info!(socket = %socket, "Feed login acknowledged");
        self.state = ConnectionState::Authenticated;
        self.retry.reset();
        self.subscriptions.begin_session();

        if let Some(frame) = self.subscriptions.subscribe_static() {
            actions.push(SessionAction::Send(socket, frame));
        }
        if let Some(holdings) = &self.holdings {
            if let Some(frame) = self.subscriptions.subscribe_dynamic(holdings) {
                actions.push(SessionAction::Send(socket, frame));
            }
        }
    }

    fn on_tick(&mut self, tick: TickFrame) {
        let key = match &tick.exchange {
            Some(exchange) => InstrumentKey::new(exchange.as_str(), tick.token.as_str()),
            None => self.subscriptions.resolve_token(&tick.token).cloned(),
        };
        match key {
            Some(key) => self.cache.apply_tick(&key, &tick),
            None => tracing::debug!(token = %tick.token, "Tick for unsubscribed token dropped"),
        }
    }

    fn on_closed(
        &mut self,
        socket: SocketId,
        code: Option<u16>,
        reason: String,
        actions: &mut Vec<SessionAction>,
    ) {
        if !self.is_live(socket) {
            return;
        }
        tracing::info!(socket = %socket, code = ?code, reason = %reason, "Feed socket closed");
        self.socket = None;
        self.socket_down(code, reason, actions);
    }

    fn on_error(&mut self, socket: SocketId, message: String, actions: &mut Vec<SessionAction>) {
        if !self.is_live(socket) {
            return;
        }
        tracing::warn!(socket = %socket, error = %message, "Feed socket error");
        self.close_locally(socket, &message, actions);
    }

    fn on_reconnect_due(&mut self, timer: TimerId, actions: &mut Vec<SessionAction>) {
        if self.pending_timer != Some(timer) {
            tracing::debug!(timer = timer.0, "Ignoring stale reconnect timer");
            return;
        }
        self.pending_timer = None;
        if self.credentials.is_none() {
            tracing::debug!("Reconnect due but credentials are gone");
            self.state = ConnectionState::Idle;
            return;
        }
        tracing::info!(attempt = self.retry.attempt(), "Reconnecting feed");
        self.open_socket(actions);
    }

    fn on_heartbeat_due(&mut self, actions: &mut Vec<SessionAction>) {
        let Some(socket) = self.socket else {
            return;
        };
        if !matches!(
            self.state,
            ConnectionState::Authenticating | ConnectionState::Authenticated
        ) {
            return;
        }
        if self.missed_heartbeats >= self.max_missed_heartbeats {
            tracing::warn!(
                socket = %socket,
                missed = self.missed_heartbeats,
                "Heartbeat timeout"
            );
            self.close_locally(socket, "heartbeat timeout", actions);
            return;
        }
        self.missed_heartbeats += 1;
        actions.push(SessionAction::Send(socket, OutboundFrame::heartbeat()));
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn open_socket(&mut self, actions: &mut Vec<SessionAction>) {
        self.next_socket += 1;
        let socket = SocketId(self.next_socket);
        self.socket = Some(socket);
        self.state = ConnectionState::Connecting;
        actions.push(SessionAction::OpenSocket(socket));
    }

    /// Close the live socket ourselves and take the reconnection path. The
    /// close event that follows is for a dead socket id and is ignored.
    fn close_locally(&mut self, socket: SocketId, reason: &str, actions: &mut Vec<SessionAction>) {
        actions.push(SessionAction::CloseSocket {
            socket,
            code: CLOSE_NORMAL,
            reason: reason.to_owned(),
        });
        self.socket = None;
        self.socket_down(Some(CLOSE_NORMAL), reason.to_owned(), actions);
    }

    fn socket_down(&mut self, code: Option<u16>, reason: String, actions: &mut Vec<SessionAction>) {
        self.subscriptions.end_session();
        self.missed_heartbeats = 0;
        self.state = ConnectionState::Closed { code, reason };

        if self.user_disconnected {
            tracing::info!("Not reconnecting: disconnected by user");
            return;
        }
        self.schedule_reconnect(actions);
    }

    fn schedule_reconnect(&mut self, actions: &mut Vec<SessionAction>) {
        match self.retry.next_retry(&self.retry_policy) {
            Some((attempt, delay)) => {
                self.next_timer += 1;
                let timer = TimerId(self.next_timer);
                self.pending_timer = Some(timer);
                self.state = ConnectionState::ReconnectScheduled { attempt, delay };
                tracing::info!(
                    attempt,
                    max = self.retry_policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling feed reconnect"
                );
                actions.push(SessionAction::ScheduleReconnect {
                    timer,
                    attempt,
                    delay,
                });
            }
            None => {
                let attempts = self.retry.attempt();
                tracing::error!(attempts, "Feed reconnect attempts exhausted, giving up");
                self.state = ConnectionState::Failed { attempts };
            }
        }
    }
}
