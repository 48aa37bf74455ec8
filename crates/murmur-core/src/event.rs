//! Session events, actions and notifications.

use std::{fmt, time::Duration};

use crate::{
    codec::OutboundMessage,
    connection::{ConnectionAction, ConnectionState, TimerId},
    roster::{RosterAction, StatusReport},
};

/// Local notice for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Connection opened.
    Connected {
        /// Identity the connection is bound to.
        identity: String,
    },

    /// Connection closed.
    Disconnected {
        /// Close description.
        reason: String,
        /// Delay until the next attempt; `None` when reconnect is suppressed.
        retry_in: Option<Duration>,
    },

    /// Connection state changed; drives the status indicator.
    StatusChanged(ConnectionState),

    /// A send was dropped because the connection is not open.
    NotConnected,

    /// A message was handed to the transport.
    Sent(OutboundMessage),

    /// A broadcast starting with `@` was sent and may be read as directed.
    AmbiguousBroadcast {
        /// Body as sent.
        body: String,
    },
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected { identity } => write!(f, "connected as {identity}"),
            Self::Disconnected { reason, retry_in: Some(delay) } => {
                write!(f, "connection closed ({reason}), retrying in {delay:?}")
            },
            Self::Disconnected { reason, retry_in: None } => {
                write!(f, "connection closed ({reason})")
            },
            Self::StatusChanged(state) => write!(f, "status: {state}"),
            Self::NotConnected => f.write_str("not connected, message dropped"),
            Self::Sent(message) => write!(f, "{message}"),
            Self::AmbiguousBroadcast { body } => {
                write!(f, "warning: {body:?} starts with '@' and may be delivered as a direct message")
            },
        }
    }
}

/// Events fed into the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// User chose a name.
    Login {
        /// Requested identity, trimmed before use.
        name: String,
    },

    /// Send a message to one user.
    SendDirect {
        /// Recipient.
        target: String,
        /// Message text.
        body: String,
    },

    /// Send a message to everyone.
    SendBroadcast {
        /// Message text.
        body: String,
    },

    /// Poll the status endpoint now.
    RefreshRoster,

    /// Disconnect and stop polling.
    Logout,

    /// Socket `attempt` completed its handshake.
    SocketOpened {
        /// Attempt number.
        attempt: u64,
    },

    /// Text frame arrived on socket `attempt`.
    SocketFrame {
        /// Attempt number.
        attempt: u64,
        /// Raw frame text.
        text: String,
    },

    /// Socket `attempt` reported an error.
    SocketError {
        /// Attempt number.
        attempt: u64,
        /// Error description.
        reason: String,
    },

    /// Socket `attempt` closed.
    SocketClosed {
        /// Attempt number.
        attempt: u64,
        /// Close description.
        reason: String,
    },

    /// Reconnect timer fired.
    ReconnectTimerFired {
        /// Timer id.
        timer: TimerId,
    },

    /// Repeating poll timer ticked.
    PollTick {
        /// Poll generation the timer was started for.
        generation: u64,
    },

    /// Status endpoint answered.
    RosterFetched {
        /// Poll generation the request was issued under.
        generation: u64,
        /// Response body.
        body: String,
    },

    /// Status request failed.
    RosterFetchFailed {
        /// Poll generation the request was issued under.
        generation: u64,
        /// Failure description.
        reason: String,
    },
}

/// Actions produced by the session for the driver to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Open a socket to `url`, tagging its events with `attempt`.
    OpenSocket {
        /// Attempt number.
        attempt: u64,
        /// Connection address.
        url: String,
    },

    /// Transmit text on the live socket.
    SendText(String),

    /// Close socket `attempt`.
    CloseSocket {
        /// Attempt number.
        attempt: u64,
    },

    /// Fire `ReconnectTimerFired { timer }` after `delay`.
    ScheduleReconnect {
        /// Timer id.
        timer: TimerId,
        /// Delay before firing.
        delay: Duration,
    },

    /// Cancel a scheduled reconnect.
    CancelReconnect {
        /// Timer id.
        timer: TimerId,
    },

    /// Issue one request to the status endpoint.
    FetchRoster {
        /// Generation to echo back in the response event.
        generation: u64,
    },

    /// Start a repeating timer emitting `PollTick { generation }` every
    /// `period`, first tick one period from now.
    StartPollTimer {
        /// Generation to echo back in tick events.
        generation: u64,
        /// Tick period.
        period: Duration,
    },

    /// Cancel the repeating timer for `generation`.
    CancelPollTimer {
        /// Generation of the timer to cancel.
        generation: u64,
    },

    /// Replace the published roster.
    PublishRoster(StatusReport),

    /// Hand an inbound line to the presentation layer unmodified.
    Deliver(String),

    /// Local notification for the presentation layer.
    Notify(Notification),
}

impl From<ConnectionAction> for SessionAction {
    fn from(action: ConnectionAction) -> Self {
        match action {
            ConnectionAction::Open { attempt, url } => Self::OpenSocket { attempt, url },
            ConnectionAction::SendText(text) => Self::SendText(text),
            ConnectionAction::Close { attempt } => Self::CloseSocket { attempt },
            ConnectionAction::ScheduleReconnect { timer, delay } => {
                Self::ScheduleReconnect { timer, delay }
            },
            ConnectionAction::CancelReconnect { timer } => Self::CancelReconnect { timer },
            ConnectionAction::Deliver(text) => Self::Deliver(text),
            ConnectionAction::Notify(notification) => Self::Notify(notification),
        }
    }
}

impl From<RosterAction> for SessionAction {
    fn from(action: RosterAction) -> Self {
        match action {
            RosterAction::Fetch { generation } => Self::FetchRoster { generation },
            RosterAction::StartTimer { generation, period } => {
                Self::StartPollTimer { generation, period }
            },
            RosterAction::CancelTimer { generation } => Self::CancelPollTimer { generation },
            RosterAction::Publish(report) => Self::PublishRoster(report),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnect_notice_mentions_retry() {
        let notice = Notification::Disconnected {
            reason: "reset".to_string(),
            retry_in: Some(Duration::from_millis(1000)),
        };
        assert_eq!(notice.to_string(), "connection closed (reset), retrying in 1s");
    }

    #[test]
    fn status_notice() {
        let notice = Notification::StatusChanged(ConnectionState::Reconnecting);
        assert_eq!(notice.to_string(), "status: reconnecting");
    }

    #[test]
    fn connection_actions_flatten() {
        let action = SessionAction::from(ConnectionAction::Close { attempt: 3 });
        assert_eq!(action, SessionAction::CloseSocket { attempt: 3 });
    }
}
