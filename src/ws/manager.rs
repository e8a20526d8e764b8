#![allow(missing_docs)]
//! Live feed manager for the NorenOMS websocket.
//!
//! Runs a [`FeedSession`] inside a background Tokio task and carries out its
//! actions against real sockets: one task per socket, a reconnect timer, and
//! a heartbeat interval. Consumers read quotes and connection status through
//! a cloneable [`FeedHandle`].
//!
//! # Architecture
//!
//! ```text
//!   FeedManager ──commands──▶ driver task ──────▶ FeedSession
//!   (connect, auth,            │  ▲   timers        (state machine)
//!    holdings, shutdown)       │  │                      │
//!                              ▼  │ socket events        ▼ writes
//!                          socket task(s)              TickCache ──▶ FeedHandle
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use noren_feed::types::auth::AuthSnapshot;
//! use noren_feed::ws::manager::FeedManagerBuilder;
//!
//! # #[tokio::main]
//! # async fn main() -> noren_feed::error::Result<()> {
//! let mut manager = FeedManagerBuilder::new()
//!     .heartbeat_interval(std::time::Duration::from_secs(20))
//!     .build();
//! manager.start().await?;
//!
//! // Logging in provides the credentials and opens the socket.
//! manager
//!     .set_auth(AuthSnapshot::authenticated("websocket-key", "AC123"))
//!     .await?;
//!
//! let feed = manager.handle();
//! let nifty = "NSE|26000".parse()?;
//! if let Some(quote) = feed.read(&nifty) {
//!     println!("NIFTY {} ({}%)", quote.last_price_or_zero(), quote.percent_change_or_zero());
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use crate::constants::{CLOSE_NORMAL, DEFAULT_INDEX_KEYS, DEFAULT_SOURCE, NOREN_WS_URL, defaults};
use crate::error::{FeedError, Result};
use crate::types::auth::AuthSnapshot;
use crate::types::instrument::InstrumentKey;
use crate::types::portfolio::Holdings;
use crate::ws::backoff::RetryPolicy;
use crate::ws::protocol::{OutboundFrame, parse_inbound};
use crate::ws::session::{FeedSession, FeedStatus, SessionAction, SessionEvent, SocketId, TimerId};
use crate::ws::tick_cache::{Quote, QuoteReader, TickCache};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the [`FeedManager`].
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Websocket endpoint (`ws://` or `wss://`).
    pub url: String,
    /// Source tag sent in the login frame.
    pub source: String,
    /// Index benchmarks subscribed once per authenticated session.
    pub index_keys: Vec<InstrumentKey>,
    /// Reconnect backoff.
    pub retry: RetryPolicy,
    /// Interval between client heartbeats.
    pub heartbeat_interval: Duration,
    /// Unacknowledged heartbeats tolerated before the socket is recycled.
    pub max_missed_heartbeats: u32,
    /// Timeout for opening a socket, handshake included.
    pub connect_timeout: Duration,
    /// Capacity of the command channel into the driver task.
    pub command_capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: NOREN_WS_URL.to_owned(),
            source: DEFAULT_SOURCE.to_owned(),
            index_keys: DEFAULT_INDEX_KEYS
                .iter()
                .filter_map(|k| k.parse().ok())
                .collect(),
            retry: RetryPolicy::default(),
            heartbeat_interval: Duration::from_secs(defaults::HEARTBEAT_INTERVAL_SECS),
            max_missed_heartbeats: defaults::MAX_MISSED_HEARTBEATS,
            connect_timeout: Duration::from_secs(defaults::CONNECT_TIMEOUT_SECS),
            command_capacity: defaults::COMMAND_CAPACITY,
        }
    }
}

impl FeedConfig {
    /// Check the configuration before any task is spawned.
    pub fn validate(&self) -> Result<()> {
        self.retry.validate()?;

        let url = Url::parse(&self.url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(FeedError::InvalidArgument(format!(
                "feed url must use ws or wss, got '{}'",
                url.scheme()
            )));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(FeedError::InvalidArgument(
                "heartbeat interval must be non-zero".into(),
            ));
        }
        if self.max_missed_heartbeats == 0 {
            return Err(FeedError::InvalidArgument(
                "max missed heartbeats must be at least 1".into(),
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(FeedError::InvalidArgument(
                "connect timeout must be non-zero".into(),
            ));
        }
        if self.command_capacity == 0 {
            return Err(FeedError::InvalidArgument(
                "command capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`FeedManager`] with custom configuration.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use noren_feed::ws::manager::FeedManagerBuilder;
///
/// let manager = FeedManagerBuilder::new()
///     .url("wss://feed.example.com/NorenWS/")
///     .max_attempts(5)
///     .base_delay(Duration::from_millis(500))
///     .build();
/// ```
#[derive(Debug, Clone, Default)]
pub struct FeedManagerBuilder {
    config: FeedConfig,
}

impl FeedManagerBuilder {
    /// Start from [`FeedConfig::default`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the websocket endpoint. Default: [`NOREN_WS_URL`].
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    /// Set the login source tag. Default: `"WEB"`.
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.config.source = source.into();
        self
    }

    /// Replace the index benchmarks. Default: [`DEFAULT_INDEX_KEYS`].
    pub fn index_keys(mut self, keys: impl IntoIterator<Item = InstrumentKey>) -> Self {
        self.config.index_keys = keys.into_iter().collect();
        self
    }

    /// Replace the whole retry policy.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// Delay before the first retry. Default: 1 s.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.retry.base_delay = delay;
        self
    }

    /// Backoff multiplier. Default: 2.0.
    pub fn growth_factor(mut self, factor: f64) -> Self {
        self.config.retry.growth_factor = factor;
        self
    }

    /// Retries before giving up. Default: 10.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.retry.max_attempts = attempts;
        self
    }

    /// Heartbeat interval. Default: 30 s.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    /// Missed heartbeats tolerated. Default: 3.
    pub fn max_missed_heartbeats(mut self, n: u32) -> Self {
        self.config.max_missed_heartbeats = n;
        self
    }

    /// Socket open timeout. Default: 30 s.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Command channel capacity. Default: 64.
    pub fn command_capacity(mut self, capacity: usize) -> Self {
        self.config.command_capacity = capacity;
        self
    }

    /// Build the [`FeedManager`]. Configuration is validated by
    /// [`FeedManager::start`].
    pub fn build(self) -> FeedManager {
        FeedManager::new(self.config)
    }
}

// ---------------------------------------------------------------------------
// Consumer handle
// ---------------------------------------------------------------------------

/// Read-only view of the feed: quotes and connection status.
///
/// Cheap to clone; every clone observes the same feed. Reads return owned
/// copies.
#[derive(Debug, Clone)]
pub struct FeedHandle {
    quotes: QuoteReader,
    status: watch::Receiver<FeedStatus>,
}

impl FeedHandle {
    /// `true` only while logged in on a live socket.
    pub fn is_connected(&self) -> bool {
        self.status() == FeedStatus::Authenticated
    }

    /// Current connection status.
    pub fn status(&self) -> FeedStatus {
        *self.status.borrow()
    }

    /// A receiver that is notified on every status change.
    pub fn watch_status(&self) -> watch::Receiver<FeedStatus> {
        self.status.clone()
    }

    /// Latest quote for `key`, or `None` if no data has arrived yet.
    pub fn read(&self, key: &InstrumentKey) -> Option<Quote> {
        self.quotes.read(key)
    }

    /// Copy of every quote received so far.
    pub fn snapshot(&self) -> HashMap<InstrumentKey, Quote> {
        self.quotes.snapshot()
    }
}

// ---------------------------------------------------------------------------
// FeedManager
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Command {
    Event(SessionEvent),
    Shutdown,
}

/// Owner of the live feed.
///
/// Use [`FeedManagerBuilder`] for ergonomic construction.
pub struct FeedManager {
    config: FeedConfig,
    cache: TickCache,
    status_tx: Arc<watch::Sender<FeedStatus>>,
    status_rx: watch::Receiver<FeedStatus>,
    commands: Option<mpsc::Sender<Command>>,
    task: Option<JoinHandle<()>>,
    followers: Vec<JoinHandle<()>>,
}

impl FeedManager {
    /// Create a manager with explicit configuration. Nothing runs until
    /// [`start`](Self::start).
    pub fn new(config: FeedConfig) -> Self {
        let (status_tx, status_rx) = watch::channel(FeedStatus::Idle);
        Self {
            config,
            cache: TickCache::new(),
            status_tx: Arc::new(status_tx),
            status_rx,
            commands: None,
            task: None,
            followers: Vec::new(),
        }
    }

    /// Validate the configuration and spawn the driver task.
    ///
    /// The feed stays idle until credentials arrive via
    /// [`set_auth`](Self::set_auth).
    pub async fn start(&mut self) -> Result<()> {
        if self.commands.is_some() {
            return Err(FeedError::InvalidArgument("manager already started".into()));
        }
        self.config.validate()?;

        let (cmd_tx, cmd_rx) = mpsc::channel(self.config.command_capacity);
        let driver = Driver::new(
            self.config.clone(),
            self.cache.clone(),
            Arc::clone(&self.status_tx),
        );
        self.task = Some(tokio::spawn(driver.run(cmd_rx)));
        self.commands = Some(cmd_tx);

        tracing::info!(url = %self.config.url, "FeedManager started");
        Ok(())
    }

    /// Connect now. From a scheduled retry this skips the wait; from the
    /// failed state it starts a fresh series of retries.
    pub async fn connect(&self) -> Result<()> {
        self.send(SessionEvent::Connect).await
    }

    /// Close the socket and stop reconnecting until the next
    /// [`connect`](Self::connect). Idempotent.
    pub async fn disconnect(&self) -> Result<()> {
        self.send(SessionEvent::Disconnect).await
    }

    /// Forward a change in authentication. Logging in connects; logging out
    /// disconnects and clears the quote cache.
    pub async fn set_auth(&self, auth: AuthSnapshot) -> Result<()> {
        self.send(SessionEvent::AuthChanged(auth)).await
    }

    /// Forward a new holdings snapshot. Subscribed immediately when logged
    /// in, otherwise after the next successful login.
    pub async fn holdings_changed(&self, holdings: impl Into<Arc<Holdings>>) -> Result<()> {
        self.send(SessionEvent::HoldingsChanged(holdings.into()))
            .await
    }

    /// Forward every holdings snapshot published on `rx`, starting with the
    /// current one. Stops when the sender is dropped or the manager shuts
    /// down.
    pub fn follow_holdings(&mut self, mut rx: watch::Receiver<Option<Arc<Holdings>>>) -> Result<()> {
        let commands = self.commands.clone().ok_or_else(not_started)?;

        let task = tokio::spawn(async move {
            loop {
                let current = rx.borrow_and_update().clone();
                if let Some(holdings) = current {
                    let event = SessionEvent::HoldingsChanged(holdings);
                    if commands.send(Command::Event(event)).await.is_err() {
                        break;
                    }
                }
                if rx.changed().await.is_err() {
                    break;
                }
            }
            tracing::debug!("Holdings follower finished");
        });
        self.followers.push(task);
        Ok(())
    }

    /// A read-only handle for consumers. Valid before and after `start`.
    pub fn handle(&self) -> FeedHandle {
        FeedHandle {
            quotes: self.cache.reader(),
            status: self.status_rx.clone(),
        }
    }

    /// Current connection status.
    pub fn status(&self) -> FeedStatus {
        *self.status_rx.borrow()
    }

    /// `true` only while logged in on a live socket.
    pub fn is_connected(&self) -> bool {
        self.status() == FeedStatus::Authenticated
    }

    /// Get the configuration.
    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Disconnect, stop the driver task and wait for it to finish.
    ///
    /// The manager can be started again afterwards.
    pub async fn shutdown(&mut self) -> Result<()> {
        for follower in self.followers.drain(..) {
            follower.abort();
        }
        if let Some(commands) = self.commands.take() {
            let _ = commands.send(Command::Shutdown).await;
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Feed driver task ended abnormally");
            }
        }

        tracing::info!("FeedManager shut down");
        Ok(())
    }

    async fn send(&self, event: SessionEvent) -> Result<()> {
        let commands = self.commands.as_ref().ok_or_else(not_started)?;
        commands
            .send(Command::Event(event))
            .await
            .map_err(|_| FeedError::ManagerStopped)
    }
}

impl Drop for FeedManager {
    fn drop(&mut self) {
        for follower in &self.followers {
            follower.abort();
        }
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

fn not_started() -> FeedError {
    FeedError::InvalidArgument("manager not started, call start() first".into())
}

// ---------------------------------------------------------------------------
// Driver task
// ---------------------------------------------------------------------------

/// Instructions from the driver to a socket task.
#[derive(Debug)]
enum Outbound {
    Frame(OutboundFrame),
    Close { code: u16, reason: String },
}

struct Driver {
    config: FeedConfig,
    session: FeedSession,
    status_tx: Arc<watch::Sender<FeedStatus>>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    sockets: HashMap<SocketId, mpsc::UnboundedSender<Outbound>>,
    reconnect_timer: Option<TimerId>,
}

impl Driver {
    fn new(config: FeedConfig, cache: TickCache, status_tx: Arc<watch::Sender<FeedStatus>>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            session: FeedSession::new(&config, cache),
            config,
            status_tx,
            events_tx,
            events_rx,
            sockets: HashMap::new(),
            reconnect_timer: None,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let interval = self.config.heartbeat_interval;
        let mut heartbeat = tokio::time::interval_at(Instant::now() + interval, interval);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let reconnect_sleep = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(reconnect_sleep);

        loop {
            let event = tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(Command::Event(event)) => event,
                    Some(Command::Shutdown) | None => break,
                },
                Some(event) = self.events_rx.recv() => event,
                () = &mut reconnect_sleep, if self.reconnect_timer.is_some() => {
                    match self.reconnect_timer.take() {
                        Some(timer) => SessionEvent::ReconnectDue(timer),
                        None => continue,
                    }
                }
                _ = heartbeat.tick() => SessionEvent::HeartbeatDue,
            };

            if let SessionEvent::SocketClosed { socket, .. } | SessionEvent::SocketError { socket, .. } =
                &event
            {
                self.sockets.remove(socket);
            }

            for action in self.session.handle(event) {
                match action {
                    SessionAction::ScheduleReconnect { timer, delay, .. } => {
                        self.reconnect_timer = Some(timer);
                        reconnect_sleep.as_mut().reset(deadline_after(delay));
                    }
                    SessionAction::CancelReconnect(timer) => {
                        if self.reconnect_timer == Some(timer) {
                            self.reconnect_timer = None;
                        }
                    }
                    other => self.execute(other),
                }
            }
            self.publish_status();
        }

        for action in self.session.handle(SessionEvent::Disconnect) {
            self.execute(action);
        }
        self.publish_status();
        tracing::debug!("Feed driver stopped");
    }

    fn execute(&mut self, action: SessionAction) {
        match action {
            SessionAction::OpenSocket(socket) => {
                let (tx, rx) = mpsc::unbounded_channel();
                self.sockets.insert(socket, tx);
                tokio::spawn(socket_task(
                    socket,
                    self.config.url.clone(),
                    self.config.connect_timeout,
                    rx,
                    self.events_tx.clone(),
                ));
            }
            SessionAction::Send(socket, frame) => match self.sockets.get(&socket) {
                Some(tx) => {
                    let _ = tx.send(Outbound::Frame(frame));
                }
                None => tracing::debug!(socket = %socket, "Dropping frame for closed socket"),
            },
            SessionAction::CloseSocket {
                socket,
                code,
                reason,
            } => {
                if let Some(tx) = self.sockets.remove(&socket) {
                    let _ = tx.send(Outbound::Close { code, reason });
                }
            }
            SessionAction::ScheduleReconnect { .. } | SessionAction::CancelReconnect(_) => {}
        }
    }

    fn publish_status(&self) {
        let status = self.session.status();
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            tracing::debug!(from = %current, to = %status, "Feed status changed");
            *current = status;
            true
        });
    }
}

fn deadline_after(delay: Duration) -> Instant {
    let now = Instant::now();
    // Far enough to never fire, small enough not to overflow.
    now.checked_add(delay)
        .unwrap_or_else(|| now + Duration::from_secs(86_400 * 365))
}

// ---------------------------------------------------------------------------
// Socket task
// ---------------------------------------------------------------------------

/// Own one websocket from open to close and report its lifecycle as
/// session events tagged with `socket`.
///
/// Emits at most one of `SocketClosed` / `SocketError`. A close requested by
/// the driver is reported by nobody: the session has already moved on.
async fn socket_task(
    socket: SocketId,
    url: String,
    connect_timeout: Duration,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<SessionEvent>,
) {
    tracing::info!(socket = %socket, url = %url, "Opening feed socket");

    let opened = tokio::select! {
        res = tokio::time::timeout(connect_timeout, connect_async(url.as_str())) => res,
        () = abandoned(&mut outbound) => {
            tracing::debug!(socket = %socket, "Socket abandoned before it opened");
            return;
        }
    };
    let ws = match opened {
        Ok(Ok((ws, _response))) => ws,
        Ok(Err(e)) => {
            let _ = events.send(socket_error(socket, e.into()));
            return;
        }
        Err(_) => {
            let _ = events.send(SessionEvent::SocketError {
                socket,
                message: format!("connect timed out after {connect_timeout:?}"),
            });
            return;
        }
    };

    let (mut sink, mut stream) = ws.split();
    let _ = events.send(SessionEvent::SocketOpened(socket));

    loop {
        tokio::select! {
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => match parse_inbound(text.as_str()) {
                    Ok(frame) => {
                        let _ = events.send(SessionEvent::FrameReceived(socket, frame));
                    }
                    Err(e) => {
                        tracing::warn!(socket = %socket, error = %e, "Failed to parse feed frame");
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = extract_close(frame.as_ref());
                    let _ = events.send(SessionEvent::SocketClosed {
                        socket,
                        code: Some(code),
                        reason,
                    });
                    return;
                }
                Some(Ok(_)) => {} // Binary, Ping, Pong, Frame
                Some(Err(e)) => {
                    let _ = events.send(socket_error(socket, e.into()));
                    return;
                }
                None => {
                    let _ = events.send(SessionEvent::SocketClosed {
                        socket,
                        code: None,
                        reason: "stream ended".into(),
                    });
                    return;
                }
            },

            out = outbound.recv() => match out {
                Some(Outbound::Frame(frame)) => {
                    let json = match frame.to_json() {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::error!(socket = %socket, error = %e, "Failed to encode frame");
                            continue;
                        }
                    };
                    tracing::trace!(socket = %socket, frame = %json, "Sending");
                    if let Err(e) = sink.send(Message::Text(json.into())).await {
                        let _ = events.send(socket_error(socket, e.into()));
                        return;
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    close_gracefully(socket, sink, stream, code, reason).await;
                    return;
                }
                None => {
                    close_gracefully(socket, sink, stream, CLOSE_NORMAL, "feed stopped".into()).await;
                    return;
                }
            },
        }
    }
}

fn socket_error(socket: SocketId, err: FeedError) -> SessionEvent {
    SessionEvent::SocketError {
        socket,
        message: err.to_string(),
    }
}

/// Resolves once the driver asks for a close or drops the socket.
async fn abandoned(outbound: &mut mpsc::UnboundedReceiver<Outbound>) {
    while let Some(msg) = outbound.recv().await {
        if let Outbound::Close { .. } = msg {
            return;
        }
    }
}

/// Send a close frame and wait briefly for the peer's reply.
async fn close_gracefully(
    socket: SocketId,
    mut sink: futures_util::stream::SplitSink<WsStream, Message>,
    mut stream: futures_util::stream::SplitStream<WsStream>,
    code: u16,
    reason: String,
) {
    tracing::debug!(socket = %socket, code, reason = %reason, "Closing feed socket");
    let frame = CloseFrame {
        code: CloseCode::from(code),
        reason: reason.into(),
    };
    if sink.send(Message::Close(Some(frame))).await.is_err() {
        return;
    }
    let grace = Duration::from_millis(defaults::CLOSE_GRACE_MS);
    let _ = tokio::time::timeout(grace, async {
        while let Some(Ok(msg)) = stream.next().await {
            if msg.is_close() {
                break;
            }
        }
    })
    .await;
}

/// Close code and reason from an optional close frame.
fn extract_close(frame: Option<&CloseFrame>) -> (u16, String) {
    match frame {
        Some(f) => (f.code.into(), f.reason.to_string()),
        None => (1005, "no close frame".into()),
    }
}
