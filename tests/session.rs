//! Connection state machine scenarios.
//!
//! Drives [`FeedSession`] with scripted socket lifecycles and checks the
//! actions it asks for: reconnect scheduling, subscribe ordering, stale-event
//! handling and retry resets. No sockets or timers are involved.

use std::sync::Arc;
use std::time::Duration;

use noren_feed::types::auth::AuthSnapshot;
use noren_feed::types::instrument::InstrumentKey;
use noren_feed::types::portfolio::{HoldingItem, HoldingSymbol, Holdings};
use noren_feed::ws::backoff::RetryPolicy;
use noren_feed::ws::manager::FeedConfig;
use noren_feed::ws::protocol::{InboundFrame, OutboundFrame, TickFrame, TickKind};
use noren_feed::ws::session::{
    ConnectionState, FeedSession, FeedStatus, SessionAction, SessionEvent, SocketId, TimerId,
};
use noren_feed::ws::tick_cache::TickCache;

const MAX_ATTEMPTS: u32 = 4;

fn key(s: &str) -> InstrumentKey {
    s.parse().unwrap()
}

fn config() -> FeedConfig {
    FeedConfig {
        index_keys: vec![key("NSE|26000"), key("BSE|1")],
        retry: RetryPolicy {
            base_delay: Duration::from_millis(100),
            growth_factor: 2.0,
            max_attempts: MAX_ATTEMPTS,
        },
        ..FeedConfig::default()
    }
}

fn new_session() -> FeedSession {
    FeedSession::new(&config(), TickCache::new())
}

fn holdings(listings: &[(&str, &[(&str, &str)])]) -> Arc<Holdings> {
    let items = listings
        .iter()
        .map(|(isin, symbols)| {
            HoldingItem::new(
                *isin,
                symbols.iter().map(|(e, t)| HoldingSymbol::new(*e, *t)).collect(),
            )
        })
        .collect();
    Arc::new(Holdings::from_items(items))
}

fn ack(ok: bool) -> InboundFrame {
    InboundFrame::AuthAck {
        ok,
        status: Some(if ok { "OK" } else { "NOT_OK" }.into()),
    }
}

fn closed(socket: SocketId, code: u16) -> SessionEvent {
    SessionEvent::SocketClosed {
        socket,
        code: Some(code),
        reason: String::new(),
    }
}

/// Log in and return the socket opened for it.
fn logged_in_socket(session: &mut FeedSession) -> SocketId {
    let actions = session.handle(SessionEvent::AuthChanged(AuthSnapshot::authenticated(
        "key", "AC1",
    )));
    open_and_ack(session, actions)
}

/// Given the actions that opened a socket, open it and acknowledge login.
fn open_and_ack(session: &mut FeedSession, actions: Vec<SessionAction>) -> SocketId {
    let socket = actions
        .iter()
        .find_map(|a| match a {
            SessionAction::OpenSocket(id) => Some(*id),
            _ => None,
        })
        .expect("expected OpenSocket");
    session.handle(SessionEvent::SocketOpened(socket));
    session.handle(SessionEvent::FrameReceived(socket, ack(true)));
    assert!(session.is_connected());
    socket
}

fn scheduled(actions: &[SessionAction]) -> Vec<(TimerId, u32, Duration)> {
    actions
        .iter()
        .filter_map(|a| match a {
            SessionAction::ScheduleReconnect {
                timer,
                attempt,
                delay,
            } => Some((*timer, *attempt, *delay)),
            _ => None,
        })
        .collect()
}

fn sent_frames(actions: &[SessionAction]) -> Vec<OutboundFrame> {
    actions
        .iter()
        .filter_map(|a| match a {
            SessionAction::Send(_, frame) => Some(frame.clone()),
            _ => None,
        })
        .collect()
}

/// Let the pending timer fire and return the socket it opens.
fn fire_timer(session: &mut FeedSession, timer: TimerId) -> SocketId {
    let actions = session.handle(SessionEvent::ReconnectDue(timer));
    match actions.as_slice() {
        [SessionAction::OpenSocket(socket)] => *socket,
        other => panic!("expected a single OpenSocket, got {other:?}"),
    }
}

// ===================================================================
// Reconnection
// ===================================================================

#[test]
fn test_every_close_schedules_exactly_one_retry_with_growing_delay() {
    let mut session = new_session();
    let mut socket = logged_in_socket(&mut session);
    let mut delays = Vec::new();

    // Alternate clean and abnormal closes; none is user initiated.
    for (i, code) in [1000u16, 1006, 1000, 1011].into_iter().enumerate() {
        let actions = session.handle(closed(socket, code));
        let retries = scheduled(&actions);
        assert_eq!(retries.len(), 1, "close #{i} must schedule one retry");
        let (timer, attempt, delay) = retries[0];
        assert_eq!(attempt, i as u32 + 1);
        delays.push(delay);

        // A duplicate close for the same socket schedules nothing more.
        assert!(session.handle(closed(socket, code)).is_empty());

        socket = fire_timer(&mut session, timer);
        session.handle(SessionEvent::SocketOpened(socket));
    }

    assert!(delays.windows(2).all(|w| w[0] < w[1]), "{delays:?}");
    assert_eq!(delays[0], Duration::from_millis(100));
    assert_eq!(delays[3], Duration::from_millis(800));

    // Cap reached: the next close gives up.
    let actions = session.handle(closed(socket, 1006));
    assert!(scheduled(&actions).is_empty());
    assert_eq!(
        session.state(),
        &ConnectionState::Failed {
            attempts: MAX_ATTEMPTS
        }
    );
    assert_eq!(
        session.status(),
        FeedStatus::Failed {
            attempts: MAX_ATTEMPTS
        }
    );
}

#[test]
fn test_status_reports_attempt_and_max() {
    let mut session = new_session();
    let socket = logged_in_socket(&mut session);
    session.handle(closed(socket, 1006));
    assert_eq!(
        session.status(),
        FeedStatus::Reconnecting {
            attempt: 1,
            max: MAX_ATTEMPTS
        }
    );
}

#[test]
fn test_socket_error_is_treated_like_close() {
    let mut session = new_session();
    let socket = logged_in_socket(&mut session);

    let actions = session.handle(SessionEvent::SocketError {
        socket,
        message: "connection reset".into(),
    });
    assert!(matches!(
        actions[0],
        SessionAction::CloseSocket { socket: s, code: 1000, .. } if s == socket
    ));
    assert_eq!(scheduled(&actions).len(), 1);

    // The close that follows the error is for a dead socket.
    assert!(session.handle(closed(socket, 1006)).is_empty());
}

#[test]
fn test_auth_rejection_closes_and_retries() {
    let mut session = new_session();
    session.handle(SessionEvent::AuthChanged(AuthSnapshot::authenticated(
        "key", "AC1",
    )));
    let socket = session.socket().unwrap();
    session.handle(SessionEvent::SocketOpened(socket));
    let actions = session.handle(SessionEvent::FrameReceived(socket, ack(false)));

    assert!(matches!(actions[0], SessionAction::CloseSocket { code: 1000, .. }));
    assert_eq!(scheduled(&actions).len(), 1);
    assert!(!session.is_connected());
    assert!(sent_frames(&actions).is_empty(), "nothing is subscribed on a rejected login");
}

#[test]
fn test_attempt_counter_resets_after_successful_reauthentication() {
    let mut session = new_session();
    let socket = logged_in_socket(&mut session);

    let (timer, _, _) = scheduled(&session.handle(closed(socket, 1006)))[0];
    let socket = fire_timer(&mut session, timer);
    let (timer, attempt, _) = scheduled(&session.handle(closed(socket, 1006)))[0];
    assert_eq!(attempt, 2);
    assert_eq!(session.retry_attempt(), 2);

    let socket = fire_timer(&mut session, timer);
    session.handle(SessionEvent::SocketOpened(socket));
    session.handle(SessionEvent::FrameReceived(socket, ack(true)));
    assert_eq!(session.retry_attempt(), 0);

    let (_, attempt, delay) = scheduled(&session.handle(closed(socket, 1000)))[0];
    assert_eq!(attempt, 1);
    assert_eq!(delay, Duration::from_millis(100));
}

#[test]
fn test_manual_connect_from_failed_starts_fresh() {
    let mut session = FeedSession::new(
        &FeedConfig {
            retry: RetryPolicy {
                max_attempts: 1,
                ..config().retry
            },
            ..config()
        },
        TickCache::new(),
    );
    let socket = logged_in_socket(&mut session);
    let (timer, _, _) = scheduled(&session.handle(closed(socket, 1006)))[0];
    let socket = fire_timer(&mut session, timer);
    session.handle(closed(socket, 1006));
    assert!(matches!(session.state(), ConnectionState::Failed { .. }));

    let actions = session.handle(SessionEvent::Connect);
    assert!(matches!(actions.as_slice(), [SessionAction::OpenSocket(_)]));
    assert_eq!(session.retry_attempt(), 0);
}

#[test]
fn test_connect_while_reconnect_pending_skips_the_wait() {
    let mut session = new_session();
    let socket = logged_in_socket(&mut session);
    let (timer, _, _) = scheduled(&session.handle(closed(socket, 1006)))[0];

    let actions = session.handle(SessionEvent::Connect);
    assert_eq!(actions[0], SessionAction::CancelReconnect(timer));
    assert!(matches!(actions[1], SessionAction::OpenSocket(_)));

    // The cancelled timer firing late does nothing.
    assert!(session.handle(SessionEvent::ReconnectDue(timer)).is_empty());
    assert_eq!(session.state(), &ConnectionState::Connecting);
}

#[test]
fn test_connect_is_noop_while_connecting_or_authenticating() {
    let mut session = new_session();
    session.handle(SessionEvent::AuthChanged(AuthSnapshot::authenticated(
        "key", "AC1",
    )));
    assert!(session.handle(SessionEvent::Connect).is_empty());

    let socket = session.socket().unwrap();
    session.handle(SessionEvent::SocketOpened(socket));
    assert_eq!(session.state(), &ConnectionState::Authenticating);
    assert!(session.handle(SessionEvent::Connect).is_empty());
}

#[test]
fn test_missing_credentials_never_connect() {
    let mut session = new_session();
    let partial = AuthSnapshot {
        websocket_key: Some("key".into()),
        account_id: Some("  ".into()),
        is_authenticated: true,
    };
    assert!(session.handle(SessionEvent::AuthChanged(partial)).is_empty());
    assert!(session.handle(SessionEvent::Connect).is_empty());
    assert_eq!(session.state(), &ConnectionState::Idle);
}

// ===================================================================
// Disconnect
// ===================================================================

#[test]
fn test_disconnect_suppresses_reconnect_even_for_stale_close() {
    let mut session = new_session();
    let socket = logged_in_socket(&mut session);

    let actions = session.handle(SessionEvent::Disconnect);
    assert_eq!(
        actions,
        vec![SessionAction::CloseSocket {
            socket,
            code: 1000,
            reason: "client disconnect".into(),
        }]
    );
    assert!(session.is_user_disconnected());

    // The server's close reply arrives afterwards.
    assert!(session.handle(closed(socket, 1000)).is_empty());
    assert!(session.handle(closed(socket, 1006)).is_empty());
    assert!(session.pending_timer().is_none());
    assert_eq!(session.status(), FeedStatus::Idle);
}

#[test]
fn test_disconnect_cancels_pending_timer_and_is_idempotent() {
    let mut session = new_session();
    let socket = logged_in_socket(&mut session);
    let (timer, _, _) = scheduled(&session.handle(closed(socket, 1006)))[0];

    let actions = session.handle(SessionEvent::Disconnect);
    assert_eq!(actions, vec![SessionAction::CancelReconnect(timer)]);
    assert_eq!(session.retry_attempt(), 0);

    assert!(session.handle(SessionEvent::ReconnectDue(timer)).is_empty());
    assert!(session.handle(SessionEvent::Disconnect).is_empty());
    assert!(session.handle(SessionEvent::Disconnect).is_empty());
}

#[test]
fn test_connect_after_disconnect_resumes_auto_reconnect() {
    let mut session = new_session();
    let socket = logged_in_socket(&mut session);
    session.handle(SessionEvent::Disconnect);

    let actions = session.handle(SessionEvent::Connect);
    assert!(!session.is_user_disconnected());
    let socket2 = open_and_ack(&mut session, actions);
    assert_ne!(socket, socket2);

    assert_eq!(scheduled(&session.handle(closed(socket2, 1000))).len(), 1);
}

#[test]
fn test_logout_disconnects_and_clears_cache() {
    let mut session = new_session();
    let socket = logged_in_socket(&mut session);
    session.handle(SessionEvent::FrameReceived(
        socket,
        InboundFrame::Tick(TickFrame {
            kind: TickKind::Acknowledgement,
            exchange: Some("NSE".into()),
            token: "26000".into(),
            last_price: Some("22000.5".into()),
            percent_change: Some("0.4".into()),
        }),
    ));
    assert_eq!(session.cache().len(), 1);

    let actions = session.handle(SessionEvent::AuthChanged(AuthSnapshot::logged_out()));
    assert!(matches!(actions[0], SessionAction::CloseSocket { .. }));
    assert!(session.cache().is_empty());
    assert!(session.handle(closed(socket, 1000)).is_empty());

    // Without credentials a manual connect is a no-op.
    assert!(session.handle(SessionEvent::Connect).is_empty());
}

#[test]
fn test_withdrawn_credentials_take_feed_down_but_keep_quotes() {
    let mut session = new_session();
    let socket = logged_in_socket(&mut session);
    session.handle(SessionEvent::FrameReceived(
        socket,
        InboundFrame::Tick(TickFrame {
            kind: TickKind::Acknowledgement,
            exchange: Some("BSE".into()),
            token: "1".into(),
            last_price: Some("73000.1".into()),
            percent_change: None,
        }),
    ));

    let actions = session.handle(SessionEvent::AuthChanged(AuthSnapshot {
        websocket_key: None,
        account_id: Some("AC1".into()),
        is_authenticated: true,
    }));
    assert_eq!(
        actions,
        vec![SessionAction::CloseSocket {
            socket,
            code: 1000,
            reason: "client disconnect".into(),
        }]
    );
    assert!(!session.is_connected());
    assert!(session.socket().is_none());
    assert_eq!(session.cache().len(), 1);

    // The close reply schedules nothing.
    assert!(session.handle(closed(socket, 1000)).is_empty());
    assert_eq!(session.retry_attempt(), 0);
    assert_eq!(session.status(), FeedStatus::Idle);

    // Credentials coming back bring the feed up again.
    let actions = session.handle(SessionEvent::AuthChanged(AuthSnapshot::authenticated(
        "key2", "AC1",
    )));
    let socket2 = open_and_ack(&mut session, actions);
    assert_ne!(socket, socket2);
    assert!(!session.is_user_disconnected());
}

// ===================================================================
// Subscriptions
// ===================================================================

#[test]
fn test_static_subscribe_precedes_dynamic() {
    let mut session = new_session();
    session.handle(SessionEvent::HoldingsChanged(holdings(&[(
        "INE002A01018",
        &[("BSE", "500325"), ("NSE", "2885")],
    )])));
    session.handle(SessionEvent::AuthChanged(AuthSnapshot::authenticated(
        "key", "AC1",
    )));
    let socket = session.socket().unwrap();

    let actions = session.handle(SessionEvent::SocketOpened(socket));
    assert_eq!(
        sent_frames(&actions),
        vec![OutboundFrame::login("key", "AC1", "WEB")]
    );

    let actions = session.handle(SessionEvent::FrameReceived(socket, ack(true)));
    assert_eq!(
        sent_frames(&actions),
        vec![
            OutboundFrame::Subscribe {
                k: "NSE|26000#BSE|1".into()
            },
            OutboundFrame::Subscribe {
                k: "NSE|2885".into()
            },
        ]
    );
}

#[test]
fn test_nothing_subscribed_before_ack() {
    let mut session = new_session();
    session.handle(SessionEvent::AuthChanged(AuthSnapshot::authenticated(
        "key", "AC1",
    )));
    let socket = session.socket().unwrap();
    session.handle(SessionEvent::SocketOpened(socket));

    let actions = session.handle(SessionEvent::HoldingsChanged(holdings(&[(
        "A",
        &[("NSE", "1")],
    )])));
    assert!(actions.is_empty());
}

#[test]
fn test_holdings_change_while_live_resubscribes() {
    let mut session = new_session();
    let socket = logged_in_socket(&mut session);

    let actions = session.handle(SessionEvent::HoldingsChanged(holdings(&[
        ("A", &[("BSE", "1")]),
        ("B", &[("NSE", "500")]),
        ("C", &[("NSE", "500")]),
        ("D", &[]),
    ])));
    assert_eq!(
        actions,
        vec![SessionAction::Send(
            socket,
            OutboundFrame::Subscribe {
                k: "BSE|1#NSE|500".into()
            }
        )]
    );

    let actions = session.handle(SessionEvent::HoldingsChanged(holdings(&[])));
    assert!(actions.is_empty(), "empty holdings are a silent no-op");
}

#[test]
fn test_resubscribes_everything_after_reconnect() {
    let mut session = new_session();
    session.handle(SessionEvent::HoldingsChanged(holdings(&[(
        "A",
        &[("NSE", "11")],
    )])));
    let socket = logged_in_socket(&mut session);
    let (timer, _, _) = scheduled(&session.handle(closed(socket, 1006)))[0];

    let socket = fire_timer(&mut session, timer);
    session.handle(SessionEvent::SocketOpened(socket));
    let actions = session.handle(SessionEvent::FrameReceived(socket, ack(true)));
    assert_eq!(sent_frames(&actions).len(), 2);
}

// ===================================================================
// Ticks
// ===================================================================

#[test]
fn test_ticks_from_stale_socket_are_ignored() {
    let mut session = new_session();
    let old = logged_in_socket(&mut session);
    let (timer, _, _) = scheduled(&session.handle(closed(old, 1006)))[0];
    let _new = fire_timer(&mut session, timer);

    session.handle(SessionEvent::FrameReceived(
        old,
        InboundFrame::Tick(TickFrame {
            kind: TickKind::Update,
            exchange: Some("NSE".into()),
            token: "26000".into(),
            last_price: Some("1".into()),
            percent_change: None,
        }),
    ));
    assert!(session.cache().is_empty());
}

#[test]
fn test_tick_for_unknown_bare_token_is_dropped() {
    let mut session = new_session();
    let socket = logged_in_socket(&mut session);
    session.handle(SessionEvent::FrameReceived(
        socket,
        InboundFrame::Tick(TickFrame {
            kind: TickKind::Update,
            exchange: None,
            token: "99999".into(),
            last_price: Some("1".into()),
            percent_change: None,
        }),
    ));
    assert!(session.cache().is_empty());
}

#[test]
fn test_cache_survives_reconnection() {
    let mut session = new_session();
    let socket = logged_in_socket(&mut session);
    session.handle(SessionEvent::FrameReceived(
        socket,
        InboundFrame::Tick(TickFrame {
            kind: TickKind::Update,
            exchange: Some("BSE".into()),
            token: "1".into(),
            last_price: Some("73000".into()),
            percent_change: None,
        }),
    ));
    session.handle(closed(socket, 1006));
    assert_eq!(
        session.cache().read(&key("BSE|1")).unwrap().last_price_or_zero(),
        "73000"
    );
}
