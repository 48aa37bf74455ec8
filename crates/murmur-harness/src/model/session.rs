//! Reference session model.
//!
//! Tracks the same observable state as the real session with plain fields
//! and no action plumbing: no attempt numbers, no timer ids, no poll
//! generations. If the real session and this model disagree, the real
//! session is wrong.

use std::time::Duration;

use murmur_core::{ConnectionState, DEFAULT_RECONNECT_DELAY};

use super::operation::{Operation, OperationError, OperationResult, users_in};

/// Observable state for oracle comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservableState {
    /// Bound identity.
    pub identity: Option<String>,
    /// Connection state.
    pub state: ConnectionState,
    /// Roster, sorted.
    pub roster: Vec<String>,
    /// Wire lines handed to the socket, in order.
    pub sent: Vec<String>,
    /// Inbound lines delivered to the presentation layer, in order.
    pub delivered: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
struct ModelSocket {
    opened: bool,
    errored: bool,
}

/// Model session state.
#[derive(Debug, Clone)]
pub struct ModelSession {
    identity: Option<String>,
    state: ConnectionState,
    socket: Option<ModelSocket>,
    /// Time at which the pending reconnect opens a socket.
    reconnect_at: Option<Duration>,
    logged_out: bool,
    polling: bool,
    roster: Vec<String>,
    now: Duration,
    sent: Vec<String>,
    delivered: Vec<String>,
}

impl Default for ModelSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelSession {
    /// Logged-out model at time zero.
    pub fn new() -> Self {
        Self {
            identity: None,
            state: ConnectionState::Disconnected,
            socket: None,
            reconnect_at: None,
            logged_out: false,
            polling: false,
            roster: Vec::new(),
            now: Duration::ZERO,
            sent: Vec::new(),
            delivered: Vec::new(),
        }
    }

    /// Connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether roster polling is running.
    pub fn is_polling(&self) -> bool {
        self.polling
    }

    /// Apply an operation and return the result.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        match op {
            Operation::Login { name } => self.login(name.name()),
            Operation::SendDirect { target, body } => {
                let (target, body) = (target.name().trim(), body.body().trim());
                if target.is_empty() || body.is_empty() {
                    return OperationResult::Error(OperationError::InvalidMessage);
                }
                self.send(format!("@{target} {body}"));
                OperationResult::Ok
            },
            Operation::SendBroadcast { body } => {
                let body = body.body().trim();
                if body.is_empty() {
                    return OperationResult::Error(OperationError::InvalidMessage);
                }
                self.send(body.to_string());
                OperationResult::Ok
            },
            Operation::Logout => {
                self.logged_out = true;
                self.polling = false;
                self.reconnect_at = None;
                self.socket = None;
                self.state = ConnectionState::Disconnected;
                OperationResult::Ok
            },
            Operation::ServerAccept => {
                if let Some(socket) = self.socket.as_mut().filter(|s| !s.opened && !s.errored) {
                    socket.opened = true;
                    self.state = ConnectionState::Connected;
                }
                OperationResult::Ok
            },
            Operation::ServerLine => {
                if self.socket.is_some_and(|s| s.opened && !s.errored) {
                    let line = format!("server: line {}", self.delivered.len());
                    self.delivered.push(line);
                }
                OperationResult::Ok
            },
            Operation::SocketError => {
                if let Some(socket) = self.socket.as_mut().filter(|s| !s.errored) {
                    socket.errored = true;
                    self.state = ConnectionState::Disconnected;
                }
                OperationResult::Ok
            },
            Operation::SocketClose => {
                if self.socket.take().is_some() {
                    if self.logged_out {
                        self.state = ConnectionState::Disconnected;
                    } else {
                        self.state = ConnectionState::Reconnecting;
                        self.reconnect_at = Some(self.now + DEFAULT_RECONNECT_DELAY);
                    }
                }
                OperationResult::Ok
            },
            Operation::StatusResponse { users } => {
                if self.polling {
                    self.roster = users_in(*users).into_iter().map(str::to_owned).collect();
                }
                OperationResult::Ok
            },
            Operation::StatusFailure => OperationResult::Ok,
            Operation::AdvanceTime { millis } => {
                self.now += Duration::from_millis(u64::from(*millis));
                if self.reconnect_at.is_some_and(|at| self.now >= at) {
                    self.reconnect_at = None;
                    self.open();
                }
                OperationResult::Ok
            },
        }
    }

    /// Extract observable state for comparison.
    pub fn observable_state(&self) -> ObservableState {
        ObservableState {
            identity: self.identity.clone(),
            state: self.state,
            roster: self.roster.clone(),
            sent: self.sent.clone(),
            delivered: self.delivered.clone(),
        }
    }

    fn login(&mut self, name: &str) -> OperationResult {
        let name = name.trim();
        if name.is_empty() {
            return OperationResult::Error(OperationError::InvalidIdentity);
        }
        if self.identity.as_deref().is_some_and(|current| current != name) {
            return OperationResult::Error(OperationError::IdentityAlreadySet);
        }

        self.identity = Some(name.to_string());
        self.logged_out = false;
        self.polling = true;
        if matches!(self.state, ConnectionState::Disconnected | ConnectionState::Reconnecting) {
            self.reconnect_at = None;
            self.open();
        }
        OperationResult::Ok
    }

    fn send(&mut self, line: String) {
        // Dropped, not queued, while the socket is not open.
        if self.state == ConnectionState::Connected {
            self.sent.push(line);
        }
    }

    /// Replace any socket with a fresh one.
    fn open(&mut self) {
        self.socket = Some(ModelSocket { opened: false, errored: false });
        self.state = ConnectionState::Connecting;
    }
}
