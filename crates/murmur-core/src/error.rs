//! Error types for the session state machines.

use thiserror::Error;

/// Errors from message encoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Directed message has no recipient after trimming.
    #[error("direct message target is empty")]
    EmptyTarget,

    /// Message body is empty after trimming.
    #[error("message body is empty")]
    EmptyBody,
}

/// Errors from the connection state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// Send attempted while the connection is not open.
    #[error("not connected")]
    NotReady,

    /// Connect called with an empty identity.
    #[error("identity is empty")]
    EmptyIdentity,

    /// Connect called with a different identity than the one captured first.
    #[error("connection is bound to {bound:?}, refusing {requested:?}")]
    IdentityMismatch {
        /// Identity captured at first connect.
        bound: String,
        /// Identity passed to the rejected call.
        requested: String,
    },
}

/// Errors from parsing a status endpoint response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RosterError {
    /// Response body was not valid JSON.
    #[error("malformed status response: {reason}")]
    Parse {
        /// Parser message.
        reason: String,
    },
}

/// Errors from session operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Login name is empty or whitespace-only.
    #[error("identity must not be empty")]
    InvalidIdentity,

    /// Login attempted with a different name after the identity was fixed.
    #[error("session identity is already {current:?}")]
    IdentityAlreadySet {
        /// The identity bound to this session.
        current: String,
    },

    /// Operation requires a prior login.
    #[error("not logged in")]
    NotLoggedIn,

    /// Outbound message failed validation.
    #[error("invalid message: {0}")]
    Codec(#[from] CodecError),

    /// Connection state machine rejected the request.
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),
}

impl CodecError {
    /// Returns true if this error is fatal (unrecoverable). Never.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::EmptyTarget | Self::EmptyBody => false,
        }
    }
}

impl ConnectionError {
    /// Returns true if this error is fatal (unrecoverable).
    ///
    /// The rejected call leaves the state machine unchanged.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::NotReady | Self::EmptyIdentity | Self::IdentityMismatch { .. } => false,
        }
    }
}

impl RosterError {
    /// Returns true if this error is fatal (unrecoverable). The next poll
    /// retries.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Parse { .. } => false,
        }
    }
}

impl SessionError {
    /// Returns true if this error is fatal (unrecoverable).
    ///
    /// Every session error is a local rejection of one request. The session
    /// stays usable afterwards.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::InvalidIdentity
            | Self::IdentityAlreadySet { .. }
            | Self::NotLoggedIn
            | Self::Codec(_)
            | Self::Connection(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_errors_are_never_fatal() {
        assert!(!SessionError::InvalidIdentity.is_fatal());
        assert!(!SessionError::Codec(CodecError::EmptyBody).is_fatal());
        assert!(!SessionError::Connection(ConnectionError::NotReady).is_fatal());
    }

    #[test]
    fn component_errors_are_never_fatal() {
        assert!(!CodecError::EmptyTarget.is_fatal());
        assert!(!ConnectionError::IdentityMismatch {
            bound: "alice".to_string(),
            requested: "bob".to_string()
        }
        .is_fatal());
        assert!(!RosterError::Parse { reason: "eof".to_string() }.is_fatal());
    }

    #[test]
    fn error_display() {
        let err = SessionError::IdentityAlreadySet { current: "alice".to_string() };
        assert_eq!(err.to_string(), "session identity is already \"alice\"");

        let err = SessionError::from(CodecError::EmptyTarget);
        assert_eq!(err.to_string(), "invalid message: direct message target is empty");
    }
}
