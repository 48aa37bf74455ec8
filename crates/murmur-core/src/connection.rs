//! Connection lifecycle state machine.
//!
//! [`ConnectionManager`] owns one logical chat connection: its state, the
//! identity it is bound to, and the reconnect policy. It performs no I/O.
//! Socket and timer events are fed in through [`ConnectionManager::handle`]
//! and the returned [`ConnectionAction`]s tell the driver what to do.
//!
//! ## Transition table
//!
//! ```text
//! state          event                 next           actions
//! ─────────────  ────────────────────  ─────────────  ──────────────────────────
//! Disconnected   Connect               Connecting     Open
//! Reconnecting   Connect               Connecting     CancelReconnect, Open
//! Connecting     Connect               Connecting     -
//! Connected      Connect               Connected      -
//! Connecting     Opened                Connected      Notify(Connected)
//! any            FrameReceived         unchanged      Deliver
//! any            TransportError        Disconnected   Notify(StatusChanged)
//! any            Closed                Reconnecting   CancelReconnect?, ScheduleReconnect
//! any            Closed (intentional)  Disconnected   Notify(StatusChanged)
//! Reconnecting   ReconnectTimerFired   Connecting     Open
//! any            Disconnect            Disconnected   CancelReconnect?, Close
//! ```
//!
//! ## Invariants
//!
//! - At most one socket is live. Every `Open` carries a fresh attempt number
//!   and socket events tagged with an older attempt are dropped.
//! - At most one reconnect timer is pending. Scheduling always cancels the
//!   previous timer first, and a firing whose id is not the pending one is
//!   ignored.
//! - A reconnect never fires before its deadline.
//! - There is no terminal state.

use std::{fmt, time::Duration};

use tracing::{debug, info, warn};

use crate::{env::Timestamp, error::ConnectionError, event::Notification};

/// Delay between a close and the next connection attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(1000);

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No socket and no reconnect pending.
    #[default]
    Disconnected,

    /// Socket opening.
    Connecting,

    /// Socket open; sends are transmitted.
    Connected,

    /// Socket closed; a reconnect is pending.
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        };
        f.write_str(label)
    }
}

/// Identifier of one scheduled reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// Connection configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Scheme, host and port of the chat server, e.g. `ws://localhost:8080`.
    pub server_url: String,
    /// Path prefix the escaped identity is appended to.
    pub chat_path: String,
    /// Delay between a close and the next attempt.
    pub reconnect_delay: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:8080".to_string(),
            chat_path: "/chat/".to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl ConnectionConfig {
    /// Connection address for an identity.
    ///
    /// The identity is percent-encoded and becomes the final path segment.
    pub fn connection_url(&self, identity: &str) -> String {
        let base = self.server_url.trim_end_matches('/');
        let path = self.chat_path.trim_matches('/');
        let identity = urlencoding::encode(identity);
        if path.is_empty() {
            format!("{base}/{identity}")
        } else {
            format!("{base}/{path}/{identity}")
        }
    }
}

/// Events fed into the connection state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Request a connection for `identity`.
    Connect {
        /// Identity embedded in the connection address.
        identity: String,
    },

    /// Socket for `attempt` completed its handshake.
    Opened {
        /// Attempt number from the `Open` action.
        attempt: u64,
    },

    /// Text frame received on socket `attempt`.
    FrameReceived {
        /// Attempt number from the `Open` action.
        attempt: u64,
        /// Raw frame text.
        text: String,
    },

    /// Socket `attempt` reported a transport-level error.
    TransportError {
        /// Attempt number from the `Open` action.
        attempt: u64,
        /// Error description.
        reason: String,
    },

    /// Socket `attempt` closed, cleanly or not.
    Closed {
        /// Attempt number from the `Open` action.
        attempt: u64,
        /// Close description.
        reason: String,
    },

    /// Reconnect timer fired.
    ReconnectTimerFired {
        /// Id from the `ScheduleReconnect` action.
        timer: TimerId,
    },

    /// Deliberate disconnect; auto-reconnect stays off until the next
    /// `Connect`.
    Disconnect,
}

/// Actions produced by the connection state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Open a socket to `url`, tagging its events with `attempt`.
    Open {
        /// Attempt number for this socket.
        attempt: u64,
        /// Connection address.
        url: String,
    },

    /// Transmit text on the live socket.
    SendText(String),

    /// Close socket `attempt`.
    Close {
        /// Attempt number of the socket to close.
        attempt: u64,
    },

    /// Fire `ReconnectTimerFired { timer }` after `delay`.
    ScheduleReconnect {
        /// Timer id.
        timer: TimerId,
        /// Delay before firing.
        delay: Duration,
    },

    /// Cancel a previously scheduled reconnect.
    CancelReconnect {
        /// Timer id.
        timer: TimerId,
    },

    /// Hand an inbound line to the presentation layer unmodified.
    Deliver(String),

    /// Local notification for the presentation layer.
    Notify(Notification),
}

#[derive(Debug, Clone, Copy)]
struct PendingReconnect<I> {
    timer: TimerId,
    deadline: I,
}

/// Connection state machine.
///
/// # Type Parameters
///
/// - `I`: Instant type, so simulations can drive time
#[derive(Debug)]
pub struct ConnectionManager<I> {
    config: ConnectionConfig,
    state: ConnectionState,
    identity: Option<String>,
    /// Attempt number of the most recent socket.
    attempt: u64,
    /// Whether socket `attempt` is still live from our point of view.
    socket_live: bool,
    pending: Option<PendingReconnect<I>>,
    next_timer: u64,
    /// Set by `Disconnect`; suppresses the reconnect loop.
    intentional_close: bool,
}

impl<I: Timestamp> ConnectionManager<I> {
    /// Create a disconnected manager.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Disconnected,
            identity: None,
            attempt: 0,
            socket_live: false,
            pending: None,
            next_timer: 0,
            intentional_close: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// True iff the connection is open.
    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Identity captured at first connect.
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Attempt number of the most recent socket (0 before the first open).
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// Id of the pending reconnect timer.
    pub fn pending_reconnect(&self) -> Option<TimerId> {
        self.pending.map(|p| p.timer)
    }

    /// Configuration this manager was built with.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Transmit `text` if the connection is open.
    ///
    /// Nothing is queued: when not ready the text is dropped and
    /// [`ConnectionError::NotReady`] is returned.
    pub fn send(&self, text: String) -> Result<ConnectionAction, ConnectionError> {
        if !self.is_ready() {
            debug!(state = %self.state, "dropping send on closed connection");
            return Err(ConnectionError::NotReady);
        }
        Ok(ConnectionAction::SendText(text))
    }

    /// Close the connection on request and suppress the reconnect loop.
    ///
    /// Infallible shorthand for [`ConnectionEvent::Disconnect`].
    pub fn disconnect(&mut self) -> Vec<ConnectionAction> {
        self.handle_disconnect()
    }

    /// Process an event and return resulting actions.
    ///
    /// # Errors
    ///
    /// Only `Connect` can fail, with an empty or mismatched identity. The
    /// state is unchanged on error.
    pub fn handle(
        &mut self,
        event: ConnectionEvent,
        now: I,
    ) -> Result<Vec<ConnectionAction>, ConnectionError> {
        match event {
            ConnectionEvent::Connect { identity } => self.handle_connect(identity),
            ConnectionEvent::Opened { attempt } => Ok(self.handle_opened(attempt)),
            ConnectionEvent::FrameReceived { attempt, text } => {
                Ok(self.handle_frame(attempt, text))
            },
            ConnectionEvent::TransportError { attempt, reason } => {
                Ok(self.handle_transport_error(attempt, &reason))
            },
            ConnectionEvent::Closed { attempt, reason } => {
                Ok(self.handle_closed(attempt, reason, now))
            },
            ConnectionEvent::ReconnectTimerFired { timer } => Ok(self.handle_timer(timer, now)),
            ConnectionEvent::Disconnect => Ok(self.handle_disconnect()),
        }
    }

    fn handle_connect(&mut self, identity: String) -> Result<Vec<ConnectionAction>, ConnectionError> {
        if identity.is_empty() {
            return Err(ConnectionError::EmptyIdentity);
        }
        if let Some(bound) = &self.identity {
            if *bound != identity {
                return Err(ConnectionError::IdentityMismatch {
                    bound: bound.clone(),
                    requested: identity,
                });
            }
        } else {
            self.identity = Some(identity);
        }
        self.intentional_close = false;

        match self.state {
            ConnectionState::Connected | ConnectionState::Connecting => {
                debug!(state = %self.state, "connect ignored, socket already live");
                Ok(vec![])
            },
            ConnectionState::Disconnected | ConnectionState::Reconnecting => {
                let mut actions = Vec::new();
                self.cancel_pending(&mut actions);
                // An errored socket can still be waiting for its close event.
                if self.socket_live {
                    actions.push(ConnectionAction::Close { attempt: self.attempt });
                    self.socket_live = false;
                }
                self.open(&mut actions);
                Ok(actions)
            },
        }
    }

    fn handle_opened(&mut self, attempt: u64) -> Vec<ConnectionAction> {
        if !self.is_current(attempt) {
            warn!(attempt, current = self.attempt, "ignoring open from stale socket");
            return vec![];
        }
        if self.state != ConnectionState::Connecting {
            warn!(attempt, state = %self.state, "unexpected open");
            return vec![];
        }

        self.state = ConnectionState::Connected;
        let identity = self.identity.clone().unwrap_or_default();
        info!(%identity, attempt, "connected");

        vec![
            ConnectionAction::Notify(Notification::StatusChanged(self.state)),
            ConnectionAction::Notify(Notification::Connected { identity }),
        ]
    }

    fn handle_frame(&self, attempt: u64, text: String) -> Vec<ConnectionAction> {
        if !self.is_current(attempt) {
            debug!(attempt, current = self.attempt, "dropping frame from stale socket");
            return vec![];
        }
        vec![ConnectionAction::Deliver(text)]
    }

    fn handle_transport_error(&mut self, attempt: u64, reason: &str) -> Vec<ConnectionAction> {
        if !self.is_current(attempt) {
            debug!(attempt, current = self.attempt, "dropping error from stale socket");
            return vec![];
        }
        warn!(attempt, reason, "transport error");

        // The close event that follows drives the reconnect.
        if self.state == ConnectionState::Disconnected {
            return vec![];
        }
        self.state = ConnectionState::Disconnected;
        vec![ConnectionAction::Notify(Notification::StatusChanged(self.state))]
    }

    fn handle_closed(&mut self, attempt: u64, reason: String, now: I) -> Vec<ConnectionAction> {
        if attempt != self.attempt || attempt == 0 {
            debug!(attempt, current = self.attempt, "dropping close from stale socket");
            return vec![];
        }
        self.socket_live = false;

        let mut actions = Vec::new();
        if self.intentional_close {
            if self.state != ConnectionState::Disconnected {
                self.state = ConnectionState::Disconnected;
                actions.push(ConnectionAction::Notify(Notification::StatusChanged(self.state)));
            }
            actions.push(ConnectionAction::Notify(Notification::Disconnected {
                reason,
                retry_in: None,
            }));
            return actions;
        }

        self.cancel_pending(&mut actions);

        let delay = self.config.reconnect_delay;
        let timer = TimerId(self.next_timer);
        self.next_timer += 1;
        self.pending = Some(PendingReconnect { timer, deadline: now + delay });
        self.state = ConnectionState::Reconnecting;
        info!(attempt, %reason, ?delay, "connection closed, reconnect scheduled");

        actions.push(ConnectionAction::ScheduleReconnect { timer, delay });
        actions.push(ConnectionAction::Notify(Notification::StatusChanged(self.state)));
        actions.push(ConnectionAction::Notify(Notification::Disconnected {
            reason,
            retry_in: Some(delay),
        }));
        actions
    }

    fn handle_timer(&mut self, timer: TimerId, now: I) -> Vec<ConnectionAction> {
        let Some(pending) = self.pending else {
            debug!(?timer, "reconnect timer fired with nothing pending");
            return vec![];
        };
        if pending.timer != timer {
            debug!(?timer, pending = ?pending.timer, "ignoring cancelled reconnect timer");
            return vec![];
        }
        if now < pending.deadline {
            let remaining = pending.deadline - now;
            warn!(?timer, ?remaining, "reconnect timer fired early, rescheduling");
            return vec![ConnectionAction::ScheduleReconnect { timer, delay: remaining }];
        }

        self.pending = None;
        let mut actions = Vec::new();
        self.open(&mut actions);
        actions
    }

    fn handle_disconnect(&mut self) -> Vec<ConnectionAction> {
        self.intentional_close = true;

        let mut actions = Vec::new();
        self.cancel_pending(&mut actions);
        if self.socket_live {
            actions.push(ConnectionAction::Close { attempt: self.attempt });
            self.socket_live = false;
        }
        if self.state != ConnectionState::Disconnected {
            self.state = ConnectionState::Disconnected;
            actions.push(ConnectionAction::Notify(Notification::StatusChanged(self.state)));
        }
        info!("disconnected by request");
        actions
    }

    /// Emit `Open` for a fresh attempt.
    fn open(&mut self, actions: &mut Vec<ConnectionAction>) {
        let Some(identity) = self.identity.as_deref() else {
            return;
        };
        let url = self.config.connection_url(identity);
        self.attempt += 1;
        self.socket_live = true;
        self.state = ConnectionState::Connecting;
        debug!(attempt = self.attempt, %url, "opening connection");

        actions.push(ConnectionAction::Open { attempt: self.attempt, url });
        actions.push(ConnectionAction::Notify(Notification::StatusChanged(self.state)));
    }

    fn cancel_pending(&mut self, actions: &mut Vec<ConnectionAction>) {
        if let Some(pending) = self.pending.take() {
            actions.push(ConnectionAction::CancelReconnect { timer: pending.timer });
        }
    }

    fn is_current(&self, attempt: u64) -> bool {
        self.socket_live && attempt == self.attempt
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::ops::{Add, Sub};

    use proptest::prelude::*;

    use super::*;

    /// Milliseconds since an arbitrary origin.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    struct TestInstant(u64);

    impl Add<Duration> for TestInstant {
        type Output = Self;

        fn add(self, rhs: Duration) -> Self {
            Self(self.0 + rhs.as_millis() as u64)
        }
    }

    impl Sub for TestInstant {
        type Output = Duration;

        fn sub(self, rhs: Self) -> Duration {
            Duration::from_millis(self.0.saturating_sub(rhs.0))
        }
    }

    fn manager() -> ConnectionManager<TestInstant> {
        ConnectionManager::new(ConnectionConfig::default())
    }

    fn connect(name: &str) -> ConnectionEvent {
        ConnectionEvent::Connect { identity: name.to_string() }
    }

    fn closed(attempt: u64) -> ConnectionEvent {
        ConnectionEvent::Closed { attempt, reason: "gone".to_string() }
    }

    fn opens(actions: &[ConnectionAction]) -> usize {
        actions.iter().filter(|a| matches!(a, ConnectionAction::Open { .. })).count()
    }

    fn scheduled(actions: &[ConnectionAction]) -> Option<(TimerId, Duration)> {
        actions.iter().find_map(|a| match a {
            ConnectionAction::ScheduleReconnect { timer, delay } => Some((*timer, *delay)),
            _ => None,
        })
    }

    fn connected(manager: &mut ConnectionManager<TestInstant>, name: &str) {
        manager.handle(connect(name), TestInstant(0)).unwrap();
        let attempt = manager.attempt();
        manager.handle(ConnectionEvent::Opened { attempt }, TestInstant(0)).unwrap();
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[test]
    fn connect_embeds_escaped_identity() {
        let mut manager = manager();
        let actions = manager.handle(connect("bob smith/ü"), TestInstant(0)).unwrap();

        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert_eq!(
            actions[0],
            ConnectionAction::Open {
                attempt: 1,
                url: "ws://localhost:8080/chat/bob%20smith%2F%C3%BC".to_string()
            }
        );
    }

    #[test]
    fn connection_url_normalises_slashes() {
        let config = ConnectionConfig {
            server_url: "ws://example.test:9000/".to_string(),
            chat_path: "chat".to_string(),
            ..ConnectionConfig::default()
        };
        assert_eq!(config.connection_url("amy"), "ws://example.test:9000/chat/amy");
    }

    #[test]
    fn open_notifies_with_identity() {
        let mut manager = manager();
        manager.handle(connect("alice"), TestInstant(0)).unwrap();
        let actions = manager.handle(ConnectionEvent::Opened { attempt: 1 }, TestInstant(5)).unwrap();

        assert!(manager.is_ready());
        assert!(actions.contains(&ConnectionAction::Notify(Notification::Connected {
            identity: "alice".to_string()
        })));
    }

    #[test]
    fn connect_is_idempotent_when_connected() {
        let mut manager = manager();
        connected(&mut manager, "alice");

        let first = manager.handle(connect("alice"), TestInstant(1)).unwrap();
        let second = manager.handle(connect("alice"), TestInstant(2)).unwrap();

        assert!(first.is_empty());
        assert!(second.is_empty());
        assert_eq!(manager.attempt(), 1);
    }

    #[test]
    fn connect_while_connecting_opens_nothing() {
        let mut manager = manager();
        let first = manager.handle(connect("alice"), TestInstant(0)).unwrap();
        let second = manager.handle(connect("alice"), TestInstant(0)).unwrap();

        assert_eq!(opens(&first), 1);
        assert_eq!(opens(&second), 0);
    }

    #[test]
    fn connect_rejects_other_identity() {
        let mut manager = manager();
        connected(&mut manager, "alice");

        let result = manager.handle(connect("mallory"), TestInstant(0));
        assert!(matches!(result, Err(ConnectionError::IdentityMismatch { .. })));
        assert_eq!(manager.identity(), Some("alice"));
    }

    #[test]
    fn connect_rejects_empty_identity() {
        let mut manager = manager();
        assert_eq!(manager.handle(connect(""), TestInstant(0)), Err(ConnectionError::EmptyIdentity));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn frames_pass_through_unmodified() {
        let mut manager = manager();
        connected(&mut manager, "alice");

        let text = "[PM from bob]: @alice hi".to_string();
        let actions = manager
            .handle(ConnectionEvent::FrameReceived { attempt: 1, text: text.clone() }, TestInstant(0))
            .unwrap();
        assert_eq!(actions, vec![ConnectionAction::Deliver(text)]);
    }

    #[test]
    fn close_schedules_one_reconnect_after_delay() {
        let mut manager = manager();
        connected(&mut manager, "alice");

        let actions = manager.handle(closed(1), TestInstant(100)).unwrap();

        assert_eq!(manager.state(), ConnectionState::Reconnecting);
        assert_eq!(scheduled(&actions), Some((TimerId(0), DEFAULT_RECONNECT_DELAY)));
        assert!(actions.iter().any(|a| matches!(
            a,
            ConnectionAction::Notify(Notification::Disconnected { retry_in: Some(_), .. })
        )));
    }

    #[test]
    fn second_close_cancels_and_reschedules() {
        let mut manager = manager();
        connected(&mut manager, "alice");

        manager.handle(closed(1), TestInstant(0)).unwrap();
        let actions = manager.handle(closed(1), TestInstant(300)).unwrap();

        assert_eq!(actions[0], ConnectionAction::CancelReconnect { timer: TimerId(0) });
        assert_eq!(scheduled(&actions), Some((TimerId(1), DEFAULT_RECONNECT_DELAY)));
        assert_eq!(manager.pending_reconnect(), Some(TimerId(1)));
    }

    #[test]
    fn cancelled_timer_firing_is_ignored() {
        let mut manager = manager();
        connected(&mut manager, "alice");
        manager.handle(closed(1), TestInstant(0)).unwrap();
        manager.handle(closed(1), TestInstant(300)).unwrap();

        let actions = manager
            .handle(ConnectionEvent::ReconnectTimerFired { timer: TimerId(0) }, TestInstant(1000))
            .unwrap();
        assert!(actions.is_empty());
        assert_eq!(manager.state(), ConnectionState::Reconnecting);
    }

    #[test]
    fn timer_reopens_with_original_identity() {
        let mut manager = manager();
        connected(&mut manager, "alice");
        manager.handle(closed(1), TestInstant(0)).unwrap();

        let actions = manager
            .handle(ConnectionEvent::ReconnectTimerFired { timer: TimerId(0) }, TestInstant(1000))
            .unwrap();

        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert_eq!(
            actions[0],
            ConnectionAction::Open { attempt: 2, url: "ws://localhost:8080/chat/alice".to_string() }
        );
        assert_eq!(manager.pending_reconnect(), None);
    }

    #[test]
    fn early_timer_is_rescheduled_for_remaining_time() {
        let mut manager = manager();
        connected(&mut manager, "alice");
        manager.handle(closed(1), TestInstant(0)).unwrap();

        let actions = manager
            .handle(ConnectionEvent::ReconnectTimerFired { timer: TimerId(0) }, TestInstant(400))
            .unwrap();

        assert_eq!(
            actions,
            vec![ConnectionAction::ScheduleReconnect {
                timer: TimerId(0),
                delay: Duration::from_millis(600)
            }]
        );
        assert_eq!(manager.state(), ConnectionState::Reconnecting);
    }

    #[test]
    fn error_marks_disconnected_without_scheduling() {
        let mut manager = manager();
        connected(&mut manager, "alice");

        let actions = manager
            .handle(
                ConnectionEvent::TransportError { attempt: 1, reason: "reset".to_string() },
                TestInstant(0),
            )
            .unwrap();

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(scheduled(&actions), None);
        assert!(!manager.is_ready());

        let actions = manager.handle(closed(1), TestInstant(10)).unwrap();
        assert!(scheduled(&actions).is_some());
        assert_eq!(manager.state(), ConnectionState::Reconnecting);
    }

    #[test]
    fn stale_socket_events_are_dropped() {
        let mut manager = manager();
        connected(&mut manager, "alice");
        manager.handle(closed(1), TestInstant(0)).unwrap();
        manager
            .handle(ConnectionEvent::ReconnectTimerFired { timer: TimerId(0) }, TestInstant(1000))
            .unwrap();

        // Socket 2 is opening; a late close from socket 1 must not reschedule.
        let actions = manager.handle(closed(1), TestInstant(1001)).unwrap();
        assert!(actions.is_empty());
        assert_eq!(manager.state(), ConnectionState::Connecting);

        let actions = manager.handle(ConnectionEvent::Opened { attempt: 1 }, TestInstant(1002)).unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn connect_during_reconnect_cancels_timer() {
        let mut manager = manager();
        connected(&mut manager, "alice");
        manager.handle(closed(1), TestInstant(0)).unwrap();

        let actions = manager.handle(connect("alice"), TestInstant(10)).unwrap();
        assert_eq!(actions[0], ConnectionAction::CancelReconnect { timer: TimerId(0) });
        assert_eq!(opens(&actions), 1);
        assert_eq!(manager.pending_reconnect(), None);
    }

    #[test]
    fn connect_after_error_closes_errored_socket_first() {
        let mut manager = manager();
        connected(&mut manager, "alice");
        manager
            .handle(
                ConnectionEvent::TransportError { attempt: 1, reason: "reset".to_string() },
                TestInstant(0),
            )
            .unwrap();

        let actions = manager.handle(connect("alice"), TestInstant(1)).unwrap();
        assert_eq!(actions[0], ConnectionAction::Close { attempt: 1 });
        assert_eq!(opens(&actions), 1);
        assert_eq!(manager.attempt(), 2);
    }

    #[test]
    fn send_only_when_connected() {
        let mut manager = manager();
        assert_eq!(manager.send("hi".to_string()), Err(ConnectionError::NotReady));

        connected(&mut manager, "alice");
        assert_eq!(manager.send("hi".to_string()), Ok(ConnectionAction::SendText("hi".to_string())));
    }

    #[test]
    fn disconnect_suppresses_reconnect() {
        let mut manager = manager();
        connected(&mut manager, "alice");

        let actions = manager.handle(ConnectionEvent::Disconnect, TestInstant(0)).unwrap();
        assert_eq!(actions[0], ConnectionAction::Close { attempt: 1 });
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        let actions = manager.handle(closed(1), TestInstant(5)).unwrap();
        assert_eq!(scheduled(&actions), None);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn disconnect_cancels_pending_reconnect() {
        let mut manager = manager();
        connected(&mut manager, "alice");
        manager.handle(closed(1), TestInstant(0)).unwrap();

        let actions = manager.disconnect();
        assert_eq!(actions[0], ConnectionAction::CancelReconnect { timer: TimerId(0) });
        assert_eq!(manager.pending_reconnect(), None);
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        // Repeating it has nothing left to cancel or close.
        assert!(manager.disconnect().is_empty());
    }

    #[test]
    fn connect_after_disconnect_resumes_loop() {
        let mut manager = manager();
        connected(&mut manager, "alice");
        manager.handle(ConnectionEvent::Disconnect, TestInstant(0)).unwrap();
        manager.handle(closed(1), TestInstant(1)).unwrap();

        let actions = manager.handle(connect("alice"), TestInstant(2)).unwrap();
        assert_eq!(opens(&actions), 1);
        manager.handle(ConnectionEvent::Opened { attempt: 2 }, TestInstant(3)).unwrap();

        let actions = manager.handle(closed(2), TestInstant(4)).unwrap();
        assert!(scheduled(&actions).is_some());
    }

    #[derive(Debug, Clone)]
    enum Step {
        Connect,
        Open,
        Close,
        Error,
        Fire,
        Advance(u16),
        Disconnect,
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            Just(Step::Connect),
            Just(Step::Open),
            Just(Step::Close),
            Just(Step::Error),
            Just(Step::Fire),
            (0u16..2000).prop_map(Step::Advance),
            Just(Step::Disconnect),
        ]
    }

    proptest! {
        #[test]
        fn never_more_than_one_pending_timer(steps in prop::collection::vec(step(), 0..64)) {
            let mut manager = manager();
            let mut now = TestInstant(0);
            // Driver-side bookkeeping: live timers and their deadlines.
            let mut timers: Vec<(TimerId, TestInstant)> = Vec::new();
            let mut open_sockets: Vec<u64> = Vec::new();

            for step in steps {
                let event = match step {
                    Step::Connect => connect("alice"),
                    Step::Open => ConnectionEvent::Opened { attempt: manager.attempt() },
                    Step::Close => closed(manager.attempt()),
                    Step::Error => ConnectionEvent::TransportError {
                        attempt: manager.attempt(),
                        reason: "boom".to_string(),
                    },
                    Step::Fire => match timers.first() {
                        Some(&(timer, deadline)) => {
                            now = now.max(deadline);
                            ConnectionEvent::ReconnectTimerFired { timer }
                        },
                        None => continue,
                    },
                    Step::Advance(ms) => {
                        now = now + Duration::from_millis(u64::from(ms));
                        continue;
                    },
                    Step::Disconnect => ConnectionEvent::Disconnect,
                };
                let fired = match &event {
                    ConnectionEvent::ReconnectTimerFired { timer } => Some(*timer),
                    _ => None,
                };
                let closing = match &event {
                    ConnectionEvent::Closed { attempt, .. } => Some(*attempt),
                    _ => None,
                };

                if let Some(timer) = fired {
                    timers.retain(|(t, _)| *t != timer);
                }
                if let Some(attempt) = closing {
                    open_sockets.retain(|a| *a != attempt);
                }

                for action in manager.handle(event, now).unwrap() {
                    match action {
                        ConnectionAction::ScheduleReconnect { timer, delay } => {
                            prop_assert!(delay > Duration::ZERO);
                            timers.retain(|(t, _)| *t != timer);
                            timers.push((timer, now + delay));
                        },
                        ConnectionAction::CancelReconnect { timer } => {
                            timers.retain(|(t, _)| *t != timer);
                        },
                        ConnectionAction::Open { attempt, .. } => open_sockets.push(attempt),
                        ConnectionAction::Close { attempt } => {
                            open_sockets.retain(|a| *a != attempt);
                        },
                        _ => {},
                    }
                }

                prop_assert!(timers.len() <= 1, "pending timers: {:?}", timers);
                prop_assert!(open_sockets.len() <= 1, "live sockets: {:?}", open_sockets);
                prop_assert_eq!(timers.first().map(|(t, _)| *t), manager.pending_reconnect());
                if manager.pending_reconnect().is_some() {
                    prop_assert_eq!(manager.state(), ConnectionState::Reconnecting);
                }
            }
        }
    }
}
