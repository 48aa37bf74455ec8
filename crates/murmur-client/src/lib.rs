//! Murmur chat client runtime.
//!
//! This crate drives the `murmur-core` state machines with real I/O:
//! - tokio-tungstenite for the chat WebSocket
//! - reqwest for the status endpoint
//! - the tokio clock for reconnect and poll timers
//!
//! ## Architecture
//!
//! ```text
//! murmur-client
//!   ├─ SystemEnv            (production Environment impl)
//!   ├─ TungsteniteConnector (WebSocket dialling)
//!   ├─ HttpStatusSource     (status endpoint polling)
//!   ├─ ChatClient           (event loop executing SessionActions)
//!   └─ command              (terminal input parsing)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod command;
mod config;
mod driver;
mod error;
mod status;
mod system_env;
mod transport;

pub use config::{
    ClientConfig, DEFAULT_CHANNEL_CAPACITY, DEFAULT_REQUEST_TIMEOUT, DEFAULT_STATUS_URL,
};
pub use driver::{ChatClient, ClientHandle, ClientOutput, ClientOutputs};
pub use error::{ClientRuntimeError, FetchError, TransportError};
pub use status::{HttpStatusSource, StatusSource};
pub use system_env::SystemEnv;
pub use transport::{Connector, TungsteniteConnector};
