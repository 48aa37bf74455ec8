//! Client runtime configuration.

use std::time::Duration;

use murmur_core::{ConnectionConfig, PollerConfig, SessionConfig};

/// Default status endpoint.
pub const DEFAULT_STATUS_URL: &str = "http://localhost:9000/metrics";

/// Default status request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Default capacity of the command and output channels.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Configuration for [`crate::ChatClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Chat server address and reconnect policy.
    pub connection: ConnectionConfig,
    /// Roster polling period.
    pub poller: PollerConfig,
    /// Status endpoint returning `{"users": [...]}`.
    pub status_url: String,
    /// Per-request timeout for the status endpoint.
    pub request_timeout: Duration,
    /// Capacity of the command and output channels.
    pub channel_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            poller: PollerConfig::default(),
            status_url: DEFAULT_STATUS_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl ClientConfig {
    /// Session part of the configuration.
    pub fn session(&self) -> SessionConfig {
        SessionConfig { connection: self.connection.clone(), poller: self.poller }
    }
}
