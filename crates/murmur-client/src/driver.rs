//! Event-loop driver.
//!
//! [`ChatClient`] owns the [`Session`] and is the only place its actions are
//! executed. User requests from a [`ClientHandle`] and everything the
//! spawned socket, timer and fetch tasks report arrive on channels and are
//! processed one at a time, so the session is never touched concurrently.
//!
//! ```text
//! ClientHandle ──requests──▶ ┌────────────┐ ──outputs──▶ presentation
//! socket task  ──events────▶ │ ChatClient │ ──watch────▶ roster, state
//! timer tasks  ──events────▶ │  Session   │
//! fetch tasks  ──events────▶ └────────────┘
//! ```

use std::sync::Arc;

use murmur_core::{
    ConnectionState, Environment, Notification, Session, SessionAction, SessionError, SessionEvent,
    StatusReport, TimerId,
};
use tokio::{
    sync::{
        mpsc::{self, error::TrySendError},
        oneshot, watch,
    },
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    config::ClientConfig,
    error::ClientRuntimeError,
    status::StatusSource,
    transport::{Connector, run_socket},
};

/// Output for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientOutput {
    /// Inbound chat line, exactly as the server sent it.
    Line(String),
    /// Local notification.
    Notice(Notification),
}

/// Receiving end of the presentation stream.
pub type ClientOutputs = mpsc::Receiver<ClientOutput>;

#[derive(Debug)]
struct Request {
    event: SessionEvent,
    reply: oneshot::Sender<Result<(), SessionError>>,
}

struct SocketHandle {
    attempt: u64,
    /// Dropping this closes the socket.
    outbound: mpsc::UnboundedSender<String>,
}

struct TimerHandle<K> {
    key: K,
    task: JoinHandle<()>,
}

impl<K> Drop for TimerHandle<K> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Chat client runtime.
///
/// # Type Parameters
///
/// - `E`: Environment for time and timers
/// - `C`: WebSocket connector
/// - `S`: Status endpoint source
pub struct ChatClient<E: Environment, C: Connector, S: StatusSource> {
    session: Session<E>,
    env: E,
    connector: Arc<C>,
    status: Arc<S>,

    requests: mpsc::Receiver<Request>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    outputs: mpsc::Sender<ClientOutput>,

    report_tx: watch::Sender<StatusReport>,
    state_tx: watch::Sender<ConnectionState>,
    identity_tx: watch::Sender<Option<String>>,

    socket: Option<SocketHandle>,
    reconnect: Option<TimerHandle<TimerId>>,
    poll: Option<TimerHandle<u64>>,
}

impl<E: Environment, C: Connector, S: StatusSource> ChatClient<E, C, S> {
    /// Create a client together with its handle and output stream.
    ///
    /// Nothing happens until [`ChatClient::run`] is polled.
    pub fn new(
        env: E,
        connector: C,
        status: S,
        config: &ClientConfig,
    ) -> (Self, ClientHandle, ClientOutputs) {
        let capacity = config.channel_capacity.max(1);
        let (requests_tx, requests) = mpsc::channel(capacity);
        let (outputs, outputs_rx) = mpsc::channel(capacity);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (report_tx, report_rx) = watch::channel(StatusReport::default());
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (identity_tx, identity_rx) = watch::channel(None);

        let client = Self {
            session: Session::new(env.clone(), config.session()),
            env,
            connector: Arc::new(connector),
            status: Arc::new(status),
            requests,
            events_tx,
            events_rx,
            outputs,
            report_tx,
            state_tx,
            identity_tx,
            socket: None,
            reconnect: None,
            poll: None,
        };
        let handle = ClientHandle {
            requests: requests_tx,
            report: report_rx,
            state: state_rx,
            identity: identity_rx,
        };
        (client, handle, outputs_rx)
    }

    /// Run until every [`ClientHandle`] is dropped.
    pub async fn run(mut self) {
        info!("chat client started");
        loop {
            tokio::select! {
                request = self.requests.recv() => match request {
                    Some(Request { event, reply }) => {
                        let result = self.process(event);
                        let _ = reply.send(result);
                    },
                    None => break,
                },
                Some(event) = self.events_rx.recv() => {
                    if let Err(e) = self.process(event) {
                        warn!(error = %e, "internal event rejected");
                    }
                },
            }
        }

        self.socket = None;
        self.reconnect = None;
        self.poll = None;
        info!("chat client stopped");
    }

    fn process(&mut self, event: SessionEvent) -> Result<(), SessionError> {
        let actions = self.session.handle(event)?;
        for action in actions {
            self.execute(action);
        }

        self.state_tx.send_if_modified(|state| {
            let current = self.session.state();
            let changed = *state != current;
            *state = current;
            changed
        });
        let identity = self.session.identity().map(str::to_owned);
        self.identity_tx.send_if_modified(|current| {
            let changed = *current != identity;
            *current = identity;
            changed
        });
        Ok(())
    }

    fn execute(&mut self, action: SessionAction) {
        match action {
            SessionAction::OpenSocket { attempt, url } => self.open_socket(attempt, url),

            SessionAction::SendText(text) => {
                let sent = self.socket.as_ref().is_some_and(|s| s.outbound.send(text).is_ok());
                if !sent {
                    warn!("no live socket for outbound text");
                }
            },

            SessionAction::CloseSocket { attempt } => {
                if self.socket.as_ref().is_some_and(|s| s.attempt == attempt) {
                    debug!(attempt, "closing socket");
                    self.socket = None;
                }
            },

            SessionAction::ScheduleReconnect { timer, delay } => {
                let env = self.env.clone();
                let events = self.events_tx.clone();
                let task = tokio::spawn(async move {
                    env.sleep(delay).await;
                    let _ = events.send(SessionEvent::ReconnectTimerFired { timer });
                });
                // Replacing the handle aborts whatever was pending.
                self.reconnect = Some(TimerHandle { key: timer, task });
            },

            SessionAction::CancelReconnect { timer } => {
                if self.reconnect.as_ref().is_some_and(|t| t.key == timer) {
                    self.reconnect = None;
                }
            },

            SessionAction::FetchRoster { generation } => {
                let status = Arc::clone(&self.status);
                let events = self.events_tx.clone();
                tokio::spawn(async move {
                    let event = match status.fetch().await {
                        Ok(body) => SessionEvent::RosterFetched { generation, body },
                        Err(e) => {
                            SessionEvent::RosterFetchFailed { generation, reason: e.to_string() }
                        },
                    };
                    let _ = events.send(event);
                });
            },

            SessionAction::StartPollTimer { generation, period } => {
                let env = self.env.clone();
                let events = self.events_tx.clone();
                let task = tokio::spawn(async move {
                    loop {
                        env.sleep(period).await;
                        if events.send(SessionEvent::PollTick { generation }).is_err() {
                            break;
                        }
                    }
                });
                self.poll = Some(TimerHandle { key: generation, task });
            },

            SessionAction::CancelPollTimer { generation } => {
                if self.poll.as_ref().is_some_and(|t| t.key == generation) {
                    self.poll = None;
                }
            },

            SessionAction::PublishRoster(report) => {
                self.report_tx.send_replace(report);
            },

            SessionAction::Deliver(text) => self.emit(ClientOutput::Line(text)),

            SessionAction::Notify(notification) => {
                self.emit(ClientOutput::Notice(notification));
            },
        }
    }

    fn open_socket(&mut self, attempt: u64, url: String) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_socket(
            Arc::clone(&self.connector),
            attempt,
            url,
            outbound_rx,
            self.events_tx.clone(),
        ));
        self.socket = Some(SocketHandle { attempt, outbound });
    }

    /// Hand an output to the presentation layer without waiting for it.
    fn emit(&self, output: ClientOutput) {
        match self.outputs.try_send(output) {
            Ok(()) => {},
            Err(TrySendError::Full(output)) => {
                warn!(?output, "presentation stream full, output dropped");
            },
            Err(TrySendError::Closed(_)) => debug!("presentation stream closed, output dropped"),
        }
    }
}

/// Cloneable handle to a running [`ChatClient`].
#[derive(Debug, Clone)]
pub struct ClientHandle {
    requests: mpsc::Sender<Request>,
    report: watch::Receiver<StatusReport>,
    state: watch::Receiver<ConnectionState>,
    identity: watch::Receiver<Option<String>>,
}

impl ClientHandle {
    /// Fix the identity and connect.
    pub async fn login(&self, name: impl Into<String>) -> Result<(), ClientRuntimeError> {
        self.submit(SessionEvent::Login { name: name.into() }).await
    }

    /// Send a message to one user.
    pub async fn send_direct(
        &self,
        target: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<(), ClientRuntimeError> {
        self.submit(SessionEvent::SendDirect { target: target.into(), body: body.into() }).await
    }

    /// Send a message to everyone.
    pub async fn send_broadcast(&self, body: impl Into<String>) -> Result<(), ClientRuntimeError> {
        self.submit(SessionEvent::SendBroadcast { body: body.into() }).await
    }

    /// Poll the status endpoint now.
    pub async fn refresh_roster(&self) -> Result<(), ClientRuntimeError> {
        self.submit(SessionEvent::RefreshRoster).await
    }

    /// Close the connection and stop polling.
    pub async fn logout(&self) -> Result<(), ClientRuntimeError> {
        self.submit(SessionEvent::Logout).await
    }

    /// Latest status report.
    pub fn status(&self) -> StatusReport {
        self.report.borrow().clone()
    }

    /// Users that can be messaged directly, excluding ourselves.
    pub fn direct_targets(&self) -> Vec<String> {
        let identity = self.identity.borrow();
        let report = self.report.borrow();
        report.roster.direct_targets(identity.as_deref()).map(str::to_owned).collect()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Identity bound to the session.
    pub fn identity(&self) -> Option<String> {
        self.identity.borrow().clone()
    }

    /// Receiver notified on every roster publication.
    pub fn watch_status(&self) -> watch::Receiver<StatusReport> {
        self.report.clone()
    }

    /// Receiver notified on every connection state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    async fn submit(&self, event: SessionEvent) -> Result<(), ClientRuntimeError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Request { event, reply })
            .await
            .map_err(|_| ClientRuntimeError::Closed)?;
        response.await.map_err(|_| ClientRuntimeError::Closed)??;
        Ok(())
    }
}
