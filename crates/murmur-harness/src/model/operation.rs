//! Operations for model-based testing.
//!
//! Operations represent everything that can happen to one client: user
//! requests, server-side socket behaviour, status responses and the passage
//! of time. They are generated randomly and applied to both the model and
//! the real session.

use arbitrary::Arbitrary;

/// Names drawn from by generated operations. The empty and blank entries
/// exercise input validation.
pub const NAMES: [&str; 5] = ["alice", "bob", "carol", "", "  "];

/// Bodies drawn from by generated operations.
pub const BODIES: [&str; 4] = ["hi", "see you at 5", "@bob psst", "   "];

/// Index into [`NAMES`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub struct NameIdx(pub u8);

impl NameIdx {
    /// Resolve to a name.
    pub fn name(self) -> &'static str {
        NAMES[usize::from(self.0) % NAMES.len()]
    }
}

/// Index into [`BODIES`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub struct BodyIdx(pub u8);

impl BodyIdx {
    /// Resolve to a body.
    pub fn body(self) -> &'static str {
        BODIES[usize::from(self.0) % BODIES.len()]
    }
}

/// Operations that can be applied to the system.
#[derive(Debug, Clone, PartialEq, Eq, Arbitrary)]
pub enum Operation {
    /// User logs in.
    Login {
        /// Requested name.
        name: NameIdx,
    },

    /// User sends a direct message.
    SendDirect {
        /// Recipient.
        target: NameIdx,
        /// Message text.
        body: BodyIdx,
    },

    /// User sends a broadcast.
    SendBroadcast {
        /// Message text.
        body: BodyIdx,
    },

    /// User logs out.
    Logout,

    /// Server completes the handshake of the live socket.
    ServerAccept,

    /// Server sends a line on the live socket.
    ServerLine,

    /// Live socket reports an error.
    SocketError,

    /// Live socket closes.
    SocketClose,

    /// Status endpoint answers the newest request.
    ///
    /// Bit `i` of the mask puts `NAMES[i]` (for the first three names) in
    /// the answer.
    StatusResponse {
        /// Users present.
        users: u8,
    },

    /// Status endpoint request fails.
    StatusFailure,

    /// Advance simulation time, firing any timer that comes due.
    AdvanceTime {
        /// Milliseconds to advance.
        millis: u16,
    },
}

/// Users encoded in a [`Operation::StatusResponse`] mask.
pub fn users_in(mask: u8) -> Vec<&'static str> {
    NAMES[..3].iter().enumerate().filter(|(i, _)| mask & (1 << i) != 0).map(|(_, n)| *n).collect()
}

/// Result of applying an operation.
///
/// Used to compare model and real system behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult {
    /// Operation succeeded.
    Ok,

    /// Operation failed with an expected error.
    Error(OperationError),
}

/// Expected errors that can occur during operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationError {
    /// Login name empty after trimming.
    InvalidIdentity,

    /// Login with a different name than the bound identity.
    IdentityAlreadySet,

    /// Message target or body empty after trimming.
    InvalidMessage,
}

impl OperationResult {
    /// Check if operation succeeded.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Check if operation failed.
    pub fn is_err(&self) -> bool {
        !self.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_mask_selects_names() {
        assert_eq!(users_in(0b101), ["alice", "carol"]);
        assert!(users_in(0b1000).is_empty());
    }

    #[test]
    fn indices_wrap() {
        assert_eq!(NameIdx(5).name(), "alice");
        assert_eq!(BodyIdx(6).body(), "@bob psst");
    }
}
