//! Murmur core: action-based state machines for a chat client.
//!
//! Nothing in this crate performs I/O. Each component consumes events and
//! returns actions; a driver (see `murmur-client`) turns actions into socket
//! writes, HTTP requests and timers, and feeds the results back in.
//!
//! ## Architecture
//!
//! ```text
//! Session
//!   ├─ ConnectionManager   (socket lifecycle + reconnect policy)
//!   ├─ RosterPoller        (status endpoint polling)
//!   └─ codec               (outbound line encoding)
//! ```
//!
//! Time enters through the [`env::Environment`] trait so the same state
//! machines run under the wall clock and under simulation.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod codec;
pub mod connection;
pub mod env;
pub mod error;
pub mod event;
pub mod roster;
pub mod session;

pub use codec::{DIRECT_PREFIX, OutboundMessage};
pub use connection::{
    ConnectionAction, ConnectionConfig, ConnectionEvent, ConnectionManager, ConnectionState,
    DEFAULT_RECONNECT_DELAY, TimerId,
};
pub use env::{Environment, Timestamp};
pub use error::{CodecError, ConnectionError, RosterError, SessionError};
pub use event::{Notification, SessionAction, SessionEvent};
pub use roster::{
    DEFAULT_POLL_PERIOD, PollerConfig, Roster, RosterAction, RosterPoller, StatusReport,
    parse_status,
};
pub use session::{Session, SessionConfig};
