//! Active-user roster and its polling state machine.
//!
//! The status endpoint is the authority on who is online. [`RosterPoller`]
//! pulls it on a fixed period and replaces the local [`Roster`] wholesale
//! with every successful answer.
//!
//! ## Freshness policy
//!
//! - Requests are not serialized. Whichever response arrives last wins.
//! - Network and parse failures leave the roster unchanged and are never
//!   surfaced. The next tick retries.
//! - A response whose `users` field is missing or is not an array of strings
//!   yields an empty roster.
//! - Every `start`/`stop` bumps the poll generation. Ticks and responses
//!   tagged with an older generation are discarded, so nothing issued before
//!   `stop()` can repopulate the roster.

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use serde_json::Value;
use tracing::{debug, trace};

use crate::error::RosterError;

/// Default polling period.
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_millis(3000);

/// JSON field carrying the user list.
const USERS_FIELD: &str = "users";

/// JSON field carrying the server's connection count.
const ACTIVE_CONNECTIONS_FIELD: &str = "activeConnections";

/// Set of active usernames.
///
/// Sorted for stable display; duplicates collapse on construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    users: BTreeSet<String>,
}

impl Roster {
    /// Empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of users.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// True when nobody is online.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Whether `name` is online.
    pub fn contains(&self, name: &str) -> bool {
        self.users.contains(name)
    }

    /// Usernames in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.users.iter().map(String::as_str)
    }

    /// Users that can be messaged directly by `me`.
    pub fn direct_targets<'a>(&'a self, me: Option<&'a str>) -> impl Iterator<Item = &'a str> {
        self.iter().filter(move |user| Some(*user) != me)
    }
}

impl<S: Into<String>> FromIterator<S> for Roster {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self { users: iter.into_iter().map(Into::into).collect() }
    }
}

/// One successful status poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    /// Users online.
    pub roster: Arc<Roster>,
    /// Connection count reported by the server, if present.
    pub active_connections: Option<u64>,
}

/// Parse a status endpoint body.
///
/// # Errors
///
/// Returns [`RosterError::Parse`] only for bodies that are not JSON. Valid
/// JSON of an unexpected shape yields an empty roster.
pub fn parse_status(body: &str) -> Result<StatusReport, RosterError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| RosterError::Parse { reason: e.to_string() })?;

    let roster = match value.get(USERS_FIELD) {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_owned))
            .collect::<Option<Roster>>()
            .unwrap_or_default(),
        _ => Roster::new(),
    };
    let active_connections = value.get(ACTIVE_CONNECTIONS_FIELD).and_then(Value::as_u64);

    Ok(StatusReport { roster: Arc::new(roster), active_connections })
}

/// Poller configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Time between polls.
    pub period: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self { period: DEFAULT_POLL_PERIOD }
    }
}

/// Actions produced by the poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterAction {
    /// Issue one status request.
    Fetch {
        /// Generation to echo back with the response.
        generation: u64,
    },

    /// Start the repeating tick timer, first tick one period from now.
    StartTimer {
        /// Generation to echo back with each tick.
        generation: u64,
        /// Tick period.
        period: Duration,
    },

    /// Cancel the repeating tick timer.
    CancelTimer {
        /// Generation of the timer to cancel.
        generation: u64,
    },

    /// Replace the published roster.
    Publish(StatusReport),
}

/// Roster polling state machine.
#[derive(Debug, Clone, Default)]
pub struct RosterPoller {
    config: PollerConfig,
    generation: u64,
    active: bool,
    latest: StatusReport,
}

impl RosterPoller {
    /// Create a stopped poller with an empty roster.
    pub fn new(config: PollerConfig) -> Self {
        Self { config, generation: 0, active: false, latest: StatusReport::default() }
    }

    /// Current roster.
    pub fn roster(&self) -> &Roster {
        &self.latest.roster
    }

    /// Most recent successful report.
    pub fn latest(&self) -> &StatusReport {
        &self.latest
    }

    /// Whether polling is running.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Current poll generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start polling: fetch now, then every period. No-op when running.
    pub fn start(&mut self) -> Vec<RosterAction> {
        if self.active {
            return vec![];
        }
        self.generation += 1;
        self.active = true;
        debug!(generation = self.generation, period = ?self.config.period, "roster polling started");

        vec![
            RosterAction::Fetch { generation: self.generation },
            RosterAction::StartTimer { generation: self.generation, period: self.config.period },
        ]
    }

    /// Stop polling. Safe when not started.
    pub fn stop(&mut self) -> Vec<RosterAction> {
        if !self.active {
            return vec![];
        }
        let generation = self.generation;
        self.active = false;
        // Responses already in flight carry the old generation.
        self.generation += 1;
        debug!(generation, "roster polling stopped");

        vec![RosterAction::CancelTimer { generation }]
    }

    /// Timer tick for `generation`.
    pub fn tick(&mut self, generation: u64) -> Vec<RosterAction> {
        if !self.accepts(generation) {
            trace!(generation, current = self.generation, "ignoring stale poll tick");
            return vec![];
        }
        vec![RosterAction::Fetch { generation }]
    }

    /// On-demand poll in addition to the periodic one.
    pub fn refresh(&mut self) -> Vec<RosterAction> {
        if !self.active {
            debug!("roster refresh ignored, polling stopped");
            return vec![];
        }
        vec![RosterAction::Fetch { generation: self.generation }]
    }

    /// Apply a status response body.
    pub fn handle_response(&mut self, generation: u64, body: &str) -> Vec<RosterAction> {
        if !self.accepts(generation) {
            debug!(generation, current = self.generation, "discarding stale roster response");
            return vec![];
        }
        match parse_status(body) {
            Ok(report) => {
                trace!(users = report.roster.len(), "roster replaced");
                self.latest = report.clone();
                vec![RosterAction::Publish(report)]
            },
            Err(e) => {
                debug!(error = %e, "roster response unusable, keeping previous");
                vec![]
            },
        }
    }

    /// Record a failed request. The roster is left as it was.
    pub fn handle_failure(&self, generation: u64, reason: &str) -> Vec<RosterAction> {
        debug!(generation, reason, "roster fetch failed");
        vec![]
    }

    fn accepts(&self, generation: u64) -> bool {
        self.active && generation == self.generation
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn names(roster: &Roster) -> Vec<&str> {
        roster.iter().collect()
    }

    fn started() -> (RosterPoller, u64) {
        let mut poller = RosterPoller::new(PollerConfig::default());
        poller.start();
        let generation = poller.generation();
        (poller, generation)
    }

    #[test]
    fn parse_users_array() {
        let report = parse_status(r#"{"users":["a","b","c"]}"#).unwrap();
        assert_eq!(names(&report.roster), ["a", "b", "c"]);
        assert_eq!(report.active_connections, None);
    }

    #[test]
    fn parse_active_connections() {
        let report = parse_status(r#"{"activeConnections": 2, "users": ["bob", "amy"]}"#).unwrap();
        assert_eq!(names(&report.roster), ["amy", "bob"]);
        assert_eq!(report.active_connections, Some(2));
    }

    #[test]
    fn missing_field_is_empty() {
        let report = parse_status(r#"{"activeConnections": 0}"#).unwrap();
        assert!(report.roster.is_empty());
    }

    #[test]
    fn wrong_shapes_are_empty() {
        for body in [r#"{"users":"a"}"#, r#"{"users":["a",1]}"#, r#"{"users":null}"#, "[1,2]", "3"] {
            let report = parse_status(body).unwrap();
            assert!(report.roster.is_empty(), "{body}");
        }
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(matches!(parse_status("<h3>500</h3>"), Err(RosterError::Parse { .. })));
    }

    #[test]
    fn duplicates_collapse() {
        let report = parse_status(r#"{"users":["a","a","b"]}"#).unwrap();
        assert_eq!(names(&report.roster), ["a", "b"]);
    }

    #[test]
    fn direct_targets_exclude_self() {
        let roster: Roster = ["alice", "bob", "carol"].into_iter().collect();
        let targets: Vec<_> = roster.direct_targets(Some("bob")).collect();
        assert_eq!(targets, ["alice", "carol"]);
        assert_eq!(roster.direct_targets(None).count(), 3);
    }

    #[test]
    fn start_fetches_immediately_then_periodically() {
        let mut poller = RosterPoller::new(PollerConfig::default());
        let actions = poller.start();

        assert_eq!(
            actions,
            vec![
                RosterAction::Fetch { generation: 1 },
                RosterAction::StartTimer { generation: 1, period: DEFAULT_POLL_PERIOD },
            ]
        );
        assert_eq!(poller.tick(1), vec![RosterAction::Fetch { generation: 1 }]);
    }

    #[test]
    fn start_twice_is_noop() {
        let (mut poller, _) = started();
        assert!(poller.start().is_empty());
    }

    #[test]
    fn response_replaces_roster() {
        let (mut poller, generation) = started();
        poller.handle_response(generation, r#"{"users":["a","b"]}"#);
        let actions = poller.handle_response(generation, r#"{"users":["c"]}"#);

        assert_eq!(names(poller.roster()), ["c"]);
        assert!(matches!(&actions[0], RosterAction::Publish(report) if report.roster.contains("c")));
    }

    #[test]
    fn failure_keeps_roster() {
        let (mut poller, generation) = started();
        poller.handle_response(generation, r#"{"users":["a"]}"#);

        assert!(poller.handle_failure(generation, "connection refused").is_empty());
        assert!(poller.handle_response(generation, "not json").is_empty());
        assert_eq!(names(poller.roster()), ["a"]);
        assert!(poller.is_active());
    }

    #[test]
    fn response_after_stop_is_discarded() {
        let (mut poller, generation) = started();
        poller.handle_response(generation, r#"{"users":["a"]}"#);
        let stop = poller.stop();
        assert_eq!(stop, vec![RosterAction::CancelTimer { generation }]);

        let actions = poller.handle_response(generation, r#"{"users":["x","y"]}"#);
        assert!(actions.is_empty());
        assert_eq!(names(poller.roster()), ["a"]);
    }

    #[test]
    fn response_from_previous_run_is_discarded_after_restart() {
        let (mut poller, old) = started();
        poller.stop();
        poller.start();

        assert!(poller.handle_response(old, r#"{"users":["stale"]}"#).is_empty());
        assert!(poller.tick(old).is_empty());
        assert!(poller.roster().is_empty());
    }

    #[test]
    fn stop_when_idle_is_safe() {
        let mut poller = RosterPoller::new(PollerConfig::default());
        assert!(poller.stop().is_empty());
        assert!(poller.refresh().is_empty());
    }

    #[test]
    fn refresh_uses_current_generation() {
        let (mut poller, generation) = started();
        assert_eq!(poller.refresh(), vec![RosterAction::Fetch { generation }]);
    }

    proptest! {
        #[test]
        fn latest_arriving_response_wins(
            bodies in prop::collection::vec(prop::collection::btree_set("[a-z]{1,6}", 0..6), 1..8),
        ) {
            let (mut poller, generation) = started();
            for users in &bodies {
                let body = serde_json::json!({ "users": users }).to_string();
                poller.handle_response(generation, &body);
            }

            let last: Roster = bodies.last().unwrap().iter().cloned().collect();
            prop_assert_eq!(poller.roster(), &last);
        }
    }
}
