//! Client runtime error types.

use murmur_core::SessionError;
use thiserror::Error;

/// Errors from the WebSocket transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Handshake with the chat server failed.
    #[error("connect to {url} failed: {reason}")]
    Connect {
        /// Address that was dialled.
        url: String,
        /// Underlying failure.
        reason: String,
    },

    /// Established socket failed.
    #[error("socket error: {reason}")]
    Socket {
        /// Underlying failure.
        reason: String,
    },
}

impl TransportError {
    /// Transport errors feed the reconnect loop and are never fatal.
    pub fn is_fatal(&self) -> bool {
        false
    }
}

/// Errors from polling the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Request could not be built or sent.
    #[error("status request failed: {reason}")]
    Request {
        /// Underlying failure.
        reason: String,
    },

    /// Endpoint answered with a non-success status.
    #[error("status endpoint returned HTTP {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// Response body could not be read.
    #[error("reading status body failed: {reason}")]
    Body {
        /// Underlying failure.
        reason: String,
    },
}

impl FetchError {
    /// Fetch errors are retried on the next tick and are never fatal.
    pub fn is_fatal(&self) -> bool {
        false
    }
}

/// Errors surfaced through [`crate::ClientHandle`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientRuntimeError {
    /// The event loop has stopped; the handle is unusable.
    #[error("client event loop has stopped")]
    Closed,

    /// Session rejected the request.
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl ClientRuntimeError {
    /// Returns true if this error is fatal (unrecoverable).
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Closed => true,
            Self::Session(e) => e.is_fatal(),
        }
    }
}
