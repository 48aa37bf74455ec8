//! Session controller.
//!
//! A [`Session`] binds one identity to one [`ConnectionManager`] and one
//! [`RosterPoller`] and is the only surface the presentation layer talks to.
//! Like the components it wraps it is a pure state machine: feed a
//! [`SessionEvent`], execute the returned [`SessionAction`]s.

use tracing::{debug, warn};

use crate::{
    codec::OutboundMessage,
    connection::{ConnectionConfig, ConnectionEvent, ConnectionManager, ConnectionState},
    env::Environment,
    error::SessionError,
    event::{Notification, SessionAction, SessionEvent},
    roster::{PollerConfig, Roster, RosterAction, RosterPoller, StatusReport},
};

/// Session configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionConfig {
    /// Connection address and reconnect policy.
    pub connection: ConnectionConfig,
    /// Roster polling period.
    pub poller: PollerConfig,
}

/// Session state machine.
///
/// # Type Parameters
///
/// - `E`: Environment implementation for time
pub struct Session<E: Environment> {
    /// Fixed at first successful login.
    identity: Option<String>,

    connection: ConnectionManager<E::Instant>,

    poller: RosterPoller,

    env: E,
}

impl<E: Environment> Session<E> {
    /// Create a session with no identity.
    pub fn new(env: E, config: SessionConfig) -> Self {
        Self {
            identity: None,
            connection: ConnectionManager::new(config.connection),
            poller: RosterPoller::new(config.poller),
            env,
        }
    }

    /// Identity bound to this session.
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Connection state.
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// True iff sends will be transmitted.
    pub fn is_ready(&self) -> bool {
        self.connection.is_ready()
    }

    /// Current roster.
    pub fn roster(&self) -> &Roster {
        self.poller.roster()
    }

    /// Most recent status report.
    pub fn status(&self) -> &StatusReport {
        self.poller.latest()
    }

    /// Roster minus our own identity.
    pub fn direct_targets(&self) -> impl Iterator<Item = &str> {
        self.poller.roster().direct_targets(self.identity())
    }

    /// The connection state machine, read-only.
    pub fn connection(&self) -> &ConnectionManager<E::Instant> {
        &self.connection
    }

    /// The roster poller, read-only.
    pub fn poller(&self) -> &RosterPoller {
        &self.poller
    }

    /// Process an event and return resulting actions.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` when a presentation request is rejected
    /// locally (invalid name, empty message). Transport and roster events
    /// never fail. Sending while disconnected is not an error; it yields
    /// a [`Notification::NotConnected`].
    pub fn handle(&mut self, event: SessionEvent) -> Result<Vec<SessionAction>, SessionError> {
        match event {
            SessionEvent::Login { name } => self.handle_login(&name),
            SessionEvent::SendDirect { target, body } => {
                let message = OutboundMessage::direct(&target, &body)?;
                Ok(self.handle_send(message))
            },
            SessionEvent::SendBroadcast { body } => {
                let message = OutboundMessage::broadcast(&body)?;
                Ok(self.handle_send(message))
            },
            SessionEvent::RefreshRoster => Ok(convert(self.poller.refresh())),
            SessionEvent::Logout => Ok(self.handle_logout()),
            SessionEvent::SocketOpened { attempt } => {
                self.connection_event(ConnectionEvent::Opened { attempt })
            },
            SessionEvent::SocketFrame { attempt, text } => {
                self.connection_event(ConnectionEvent::FrameReceived { attempt, text })
            },
            SessionEvent::SocketError { attempt, reason } => {
                self.connection_event(ConnectionEvent::TransportError { attempt, reason })
            },
            SessionEvent::SocketClosed { attempt, reason } => {
                self.connection_event(ConnectionEvent::Closed { attempt, reason })
            },
            SessionEvent::ReconnectTimerFired { timer } => {
                self.connection_event(ConnectionEvent::ReconnectTimerFired { timer })
            },
            SessionEvent::PollTick { generation } => Ok(convert(self.poller.tick(generation))),
            SessionEvent::RosterFetched { generation, body } => {
                Ok(convert(self.poller.handle_response(generation, &body)))
            },
            SessionEvent::RosterFetchFailed { generation, reason } => {
                Ok(convert(self.poller.handle_failure(generation, &reason)))
            },
        }
    }

    fn handle_login(&mut self, name: &str) -> Result<Vec<SessionAction>, SessionError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::InvalidIdentity);
        }
        match &self.identity {
            Some(current) if current != name => {
                return Err(SessionError::IdentityAlreadySet { current: current.clone() });
            },
            Some(_) => debug!(identity = name, "repeated login"),
            None => self.identity = Some(name.to_string()),
        }

        let mut actions =
            self.connection_event(ConnectionEvent::Connect { identity: name.to_string() })?;
        actions.extend(convert(self.poller.start()));
        Ok(actions)
    }

    fn handle_send(&self, message: OutboundMessage) -> Vec<SessionAction> {
        let Ok(send) = self.connection.send(message.encode()) else {
            return vec![SessionAction::Notify(Notification::NotConnected)];
        };

        let mut actions = vec![SessionAction::from(send)];
        if message.is_ambiguous() {
            warn!(body = message.body(), "broadcast starts with '@' and may be read as directed");
            actions.push(SessionAction::Notify(Notification::AmbiguousBroadcast {
                body: message.body().to_string(),
            }));
        }
        actions.push(SessionAction::Notify(Notification::Sent(message)));
        actions
    }

    fn handle_logout(&mut self) -> Vec<SessionAction> {
        let mut actions = convert(self.connection.disconnect());
        actions.extend(convert(self.poller.stop()));
        actions
    }

    fn connection_event(
        &mut self,
        event: ConnectionEvent,
    ) -> Result<Vec<SessionAction>, SessionError> {
        let now = self.env.now();
        let actions = self.connection.handle(event, now)?;
        Ok(convert(actions))
    }
}

/// Flatten component actions into session actions.
fn convert<A: Into<SessionAction>>(actions: Vec<A>) -> Vec<SessionAction> {
    actions.into_iter().map(Into::into).collect()
}
