//! Real session driven by model operations.
//!
//! [`SessionWorld`] plays the part of the async driver for a
//! [`Session<SimEnv>`]: it executes the session's actions against a fake
//! socket, fake timers and a fake status endpoint, and translates each
//! [`Operation`] into the session events the real runtime would deliver.
//!
//! While executing actions it checks the driver-facing contract (at most one
//! live socket, at most one pending reconnect timer, no cancellation of
//! timers that were never scheduled) and records any breach. With a seed,
//! timers also fire early and cancelled timers fire late, the way a real
//! runtime can race them.

use std::{collections::VecDeque, time::Duration};

use murmur_core::{
    ConnectionState, Environment, Session, SessionAction, SessionConfig, SessionError,
    SessionEvent, TimerId,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::{
    model::{ObservableState, Operation, OperationError, OperationResult, users_in},
    sim_env::{SimEnv, SimInstant},
};

/// Probability that a pending timer fires before its deadline.
const EARLY_FIRE_PROBABILITY: f64 = 0.25;

/// The socket the session currently believes in.
#[derive(Debug, Clone, Copy)]
struct FakeSocket {
    attempt: u64,
    opened: bool,
    errored: bool,
}

/// Real session plus a synchronous fake driver.
pub struct SessionWorld {
    session: Session<SimEnv>,
    env: SimEnv,
    rng: Option<ChaCha8Rng>,
    socket: Option<FakeSocket>,
    timer: Option<(TimerId, SimInstant)>,
    cancelled_timer: Option<TimerId>,
    poll_timer: Option<u64>,
    last_fetch: Option<u64>,
    first_identity: Option<String>,
    sent: Vec<String>,
    delivered: Vec<String>,
    violations: Vec<String>,
}

impl Default for SessionWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionWorld {
    /// World whose timers fire exactly on time.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// World whose timers race, driven by `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self::build(Some(ChaCha8Rng::seed_from_u64(seed)))
    }

    fn build(rng: Option<ChaCha8Rng>) -> Self {
        let env = SimEnv::new();
        Self {
            session: Session::new(env.clone(), SessionConfig::default()),
            env,
            rng,
            socket: None,
            timer: None,
            cancelled_timer: None,
            poll_timer: None,
            last_fetch: None,
            first_identity: None,
            sent: Vec::new(),
            delivered: Vec::new(),
            violations: Vec::new(),
        }
    }

    /// The wrapped session.
    pub fn session(&self) -> &Session<SimEnv> {
        &self.session
    }

    /// Apply an operation and return the result.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        let outcome = match op {
            Operation::Login { name } => {
                self.feed(SessionEvent::Login { name: name.name().to_string() })
            },
            Operation::SendDirect { target, body } => self.feed(SessionEvent::SendDirect {
                target: target.name().to_string(),
                body: body.body().to_string(),
            }),
            Operation::SendBroadcast { body } => {
                self.feed(SessionEvent::SendBroadcast { body: body.body().to_string() })
            },
            Operation::Logout => self.feed(SessionEvent::Logout),
            Operation::ServerAccept => match self.socket.as_mut() {
                Some(socket) if !socket.opened && !socket.errored => {
                    socket.opened = true;
                    let attempt = socket.attempt;
                    self.feed(SessionEvent::SocketOpened { attempt })
                },
                _ => Ok(()),
            },
            Operation::ServerLine => match self.socket {
                Some(socket) if socket.opened && !socket.errored => {
                    let text = format!("server: line {}", self.delivered.len());
                    self.feed(SessionEvent::SocketFrame { attempt: socket.attempt, text })
                },
                _ => Ok(()),
            },
            Operation::SocketError => match self.socket.as_mut() {
                Some(socket) if !socket.errored => {
                    socket.errored = true;
                    let attempt = socket.attempt;
                    self.feed(SessionEvent::SocketError { attempt, reason: "reset".to_string() })
                },
                _ => Ok(()),
            },
            Operation::SocketClose => match self.socket.take() {
                Some(socket) => self.feed(SessionEvent::SocketClosed {
                    attempt: socket.attempt,
                    reason: "closed by server".to_string(),
                }),
                None => Ok(()),
            },
            Operation::StatusResponse { users } => match self.last_fetch {
                Some(generation) => {
                    let body = status_body(&users_in(*users));
                    self.feed(SessionEvent::RosterFetched { generation, body })
                },
                None => Ok(()),
            },
            Operation::StatusFailure => match self.last_fetch {
                Some(generation) => self.feed(SessionEvent::RosterFetchFailed {
                    generation,
                    reason: "timed out".to_string(),
                }),
                None => Ok(()),
            },
            Operation::AdvanceTime { millis } => {
                self.advance(Duration::from_millis(u64::from(*millis)));
                Ok(())
            },
        };

        match outcome {
            Ok(()) => OperationResult::Ok,
            Err(e) => OperationResult::Error(classify(&e)),
        }
    }

    /// Extract observable state for comparison.
    pub fn observable_state(&self) -> ObservableState {
        ObservableState {
            identity: self.session.identity().map(str::to_owned),
            state: self.session.state(),
            roster: self.session.roster().iter().map(str::to_owned).collect(),
            sent: self.sent.clone(),
            delivered: self.delivered.clone(),
        }
    }

    /// Verify driver-facing invariants.
    ///
    /// # Errors
    ///
    /// Returns a description of the first breach.
    pub fn check_invariants(&self) -> Result<(), String> {
        if let Some(violation) = self.violations.first() {
            return Err(violation.clone());
        }

        let state = self.session.state();
        let pending = self.session.connection().pending_reconnect();
        if pending != self.timer.map(|(id, _)| id) {
            return Err(format!("session pending {pending:?}, driver holds {:?}", self.timer));
        }
        if pending.is_some() && state != ConnectionState::Reconnecting {
            return Err(format!("reconnect pending in state {state}"));
        }
        if state == ConnectionState::Reconnecting && pending.is_none() {
            return Err("reconnecting with no timer".to_string());
        }
        if state == ConnectionState::Connected
            && !self.socket.is_some_and(|s| s.opened && !s.errored)
        {
            return Err(format!("connected without an open socket: {:?}", self.socket));
        }
        if self.session.is_ready() != (state == ConnectionState::Connected) {
            return Err(format!("is_ready disagrees with state {state}"));
        }
        let polling = self.session.poller().is_active();
        if self.poll_timer.is_some() != polling {
            return Err(format!("poll timer {:?} while polling={polling}", self.poll_timer));
        }
        if self.first_identity.as_deref() != self.session.identity() {
            return Err(format!(
                "identity changed from {:?} to {:?}",
                self.first_identity,
                self.session.identity()
            ));
        }
        Ok(())
    }

    fn advance(&mut self, by: Duration) {
        self.env.advance(by);
        let now = self.env.now();

        if let Some(timer) = self.cancelled_timer.take().filter(|_| self.coin()) {
            self.fire_timer(timer);
        }
        if let Some((timer, due)) = self.timer {
            if now < due && self.coin() {
                self.fire_timer(timer);
            }
        }
        if let Some((timer, due)) = self.timer {
            if now >= due {
                self.timer = None;
                self.fire_timer(timer);
            }
        }
        if let Some(generation) = self.poll_timer {
            self.feed_infallible(SessionEvent::PollTick { generation });
        }
    }

    fn fire_timer(&mut self, timer: TimerId) {
        self.feed_infallible(SessionEvent::ReconnectTimerFired { timer });
    }

    fn coin(&mut self) -> bool {
        self.rng.as_mut().is_some_and(|rng| rng.gen_bool(EARLY_FIRE_PROBABILITY))
    }

    fn feed(&mut self, event: SessionEvent) -> Result<(), SessionError> {
        let actions = self.session.handle(event)?;
        if let (None, Some(identity)) = (&self.first_identity, self.session.identity()) {
            self.first_identity = Some(identity.to_string());
        }
        self.execute(actions);
        Ok(())
    }

    /// Feed a driver event, which the session must never reject.
    fn feed_infallible(&mut self, event: SessionEvent) {
        let description = format!("{event:?}");
        if let Err(e) = self.feed(event) {
            self.violations.push(format!("{description} rejected: {e}"));
        }
    }

    fn execute(&mut self, actions: Vec<SessionAction>) {
        let mut queue = VecDeque::from(actions);
        while let Some(action) = queue.pop_front() {
            match action {
                SessionAction::OpenSocket { attempt, .. } => {
                    if let Some(live) = self.socket {
                        self.violations
                            .push(format!("opened attempt {attempt} while {} is live", live.attempt));
                    }
                    self.socket = Some(FakeSocket { attempt, opened: false, errored: false });
                },
                SessionAction::CloseSocket { attempt } => {
                    if self.socket.is_some_and(|s| s.attempt == attempt) {
                        self.socket = None;
                    }
                    // The transport reports the close it was asked for.
                    let event =
                        SessionEvent::SocketClosed { attempt, reason: "closed by client".to_string() };
                    match self.session.handle(event) {
                        Ok(more) => queue.extend(more),
                        Err(e) => self.violations.push(format!("close rejected: {e}")),
                    }
                },
                SessionAction::SendText(text) => {
                    if !self.socket.is_some_and(|s| s.opened && !s.errored) {
                        self.violations.push(format!("sent {text:?} without an open socket"));
                    }
                    self.sent.push(text);
                },
                SessionAction::ScheduleReconnect { timer, delay } => {
                    if let Some((held, _)) = self.timer.filter(|(held, _)| *held != timer) {
                        self.violations
                            .push(format!("scheduled {timer:?} while {held:?} is pending"));
                    }
                    self.timer = Some((timer, self.env.now() + delay));
                },
                SessionAction::CancelReconnect { timer } => {
                    if self.timer.map(|(held, _)| held) == Some(timer) {
                        self.timer = None;
                        self.cancelled_timer = Some(timer);
                    } else {
                        self.violations.push(format!("cancelled unknown timer {timer:?}"));
                    }
                },
                SessionAction::FetchRoster { generation } => self.last_fetch = Some(generation),
                SessionAction::StartPollTimer { generation, .. } => {
                    if let Some(running) = self.poll_timer {
                        self.violations
                            .push(format!("poll timer {generation} started while {running} runs"));
                    }
                    self.poll_timer = Some(generation);
                },
                SessionAction::CancelPollTimer { generation } => {
                    if self.poll_timer == Some(generation) {
                        self.poll_timer = None;
                    } else {
                        self.violations.push(format!("cancelled unknown poll timer {generation}"));
                    }
                },
                SessionAction::Deliver(text) => self.delivered.push(text),
                SessionAction::PublishRoster(_) | SessionAction::Notify(_) => {},
            }
        }
    }
}

fn classify(error: &SessionError) -> OperationError {
    match error {
        SessionError::InvalidIdentity => OperationError::InvalidIdentity,
        SessionError::IdentityAlreadySet { .. } => OperationError::IdentityAlreadySet,
        _ => OperationError::InvalidMessage,
    }
}

/// Status endpoint body listing `users`.
fn status_body(users: &[&str]) -> String {
    let quoted: Vec<String> = users.iter().map(|user| format!("\"{user}\"")).collect();
    format!("{{\"users\":[{}],\"activeConnections\":{}}}", quoted.join(","), users.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::operation::{BodyIdx, NameIdx};

    fn connect(world: &mut SessionWorld) {
        world.apply(&Operation::Login { name: NameIdx(0) });
        world.apply(&Operation::ServerAccept);
    }

    #[test]
    fn status_body_shape() {
        assert_eq!(
            status_body(&["alice", "bob"]),
            r#"{"users":["alice","bob"],"activeConnections":2}"#
        );
    }

    #[test]
    fn server_lines_are_delivered() {
        let mut world = SessionWorld::new();
        connect(&mut world);
        world.apply(&Operation::ServerLine);
        world.apply(&Operation::SendBroadcast { body: BodyIdx(0) });

        let state = world.observable_state();
        assert_eq!(state.delivered, ["server: line 0"]);
        assert_eq!(state.sent, ["hi"]);
        assert_eq!(world.check_invariants(), Ok(()));
    }

    #[test]
    fn early_timers_never_reconnect_early() {
        for seed in 0..32 {
            let mut world = SessionWorld::with_seed(seed);
            connect(&mut world);
            world.apply(&Operation::SocketClose);
            for _ in 0..9 {
                world.apply(&Operation::AdvanceTime { millis: 100 });
                assert_eq!(world.session().state(), ConnectionState::Reconnecting, "seed {seed}");
            }
            world.apply(&Operation::AdvanceTime { millis: 100 });
            assert_eq!(world.session().state(), ConnectionState::Connecting, "seed {seed}");
            assert_eq!(world.check_invariants(), Ok(()), "seed {seed}");
        }
    }

    #[test]
    fn roster_tracks_newest_request() {
        let mut world = SessionWorld::new();
        connect(&mut world);
        world.apply(&Operation::StatusResponse { users: 0b011 });
        assert_eq!(world.observable_state().roster, ["alice", "bob"]);

        world.apply(&Operation::StatusFailure);
        assert_eq!(world.observable_state().roster, ["alice", "bob"]);

        world.apply(&Operation::Logout);
        world.apply(&Operation::StatusResponse { users: 0b100 });
        assert_eq!(world.observable_state().roster, ["alice", "bob"]);
        assert_eq!(world.check_invariants(), Ok(()));
    }

    #[test]
    fn rejected_requests_map_to_operation_errors() {
        let mut world = SessionWorld::new();
        assert_eq!(
            world.apply(&Operation::Login { name: NameIdx(3) }),
            OperationResult::Error(OperationError::InvalidIdentity)
        );
        connect(&mut world);
        assert_eq!(
            world.apply(&Operation::Login { name: NameIdx(1) }),
            OperationResult::Error(OperationError::IdentityAlreadySet)
        );
        assert_eq!(
            world.apply(&Operation::SendBroadcast { body: BodyIdx(3) }),
            OperationResult::Error(OperationError::InvalidMessage)
        );
    }
}
