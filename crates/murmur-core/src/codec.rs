//! Outbound message encoding.
//!
//! The chat channel carries one line of UTF-8 text per message:
//!
//! ```text
//! @<target> <body>    directed to one user
//! <body>              broadcast to everyone
//! ```
//!
//! Nothing is escaped. A broadcast whose body starts with `@` is
//! indistinguishable from a directed message on the wire; the server decides
//! how to read it. [`OutboundMessage::is_ambiguous`] lets callers flag it.
//!
//! Inbound text is never decoded by the client.

use std::fmt;

use crate::error::CodecError;

/// Prefix marking a directed message.
pub const DIRECT_PREFIX: char = '@';

/// A message ready for encoding.
///
/// Constructed through [`OutboundMessage::direct`] and
/// [`OutboundMessage::broadcast`], which trim and validate their input, so a
/// value of this type always encodes to a well-formed line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// Message for a single recipient.
    Direct {
        /// Recipient username.
        target: String,
        /// Message text.
        body: String,
    },
    /// Message for all connected users.
    Broadcast {
        /// Message text.
        body: String,
    },
}

impl OutboundMessage {
    /// Build a directed message. Both fields are trimmed.
    pub fn direct(target: &str, body: &str) -> Result<Self, CodecError> {
        let target = target.trim();
        if target.is_empty() {
            return Err(CodecError::EmptyTarget);
        }
        let body = non_empty_body(body)?;

        Ok(Self::Direct { target: target.to_string(), body })
    }

    /// Build a broadcast message. The body is trimmed.
    pub fn broadcast(body: &str) -> Result<Self, CodecError> {
        Ok(Self::Broadcast { body: non_empty_body(body)? })
    }

    /// Message text without addressing.
    pub fn body(&self) -> &str {
        match self {
            Self::Direct { body, .. } | Self::Broadcast { body } => body,
        }
    }

    /// True for a broadcast the server may read as a directed message.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Broadcast { body } if body.starts_with(DIRECT_PREFIX))
    }

    /// Encode to wire text.
    pub fn encode(&self) -> String {
        encode(self)
    }
}

/// Local echo form shown to the sender.
impl fmt::Display for OutboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct { target, body } => write!(f, "(you → {target}) {body}"),
            Self::Broadcast { body } => write!(f, "(you → ALL) {body}"),
        }
    }
}

/// Encode a message to the single-line wire format.
pub fn encode(message: &OutboundMessage) -> String {
    match message {
        OutboundMessage::Direct { target, body } => {
            let mut text = String::with_capacity(target.len() + body.len() + 2);
            text.push(DIRECT_PREFIX);
            text.push_str(target);
            text.push(' ');
            text.push_str(body);
            text
        },
        OutboundMessage::Broadcast { body } => body.clone(),
    }
}

fn non_empty_body(body: &str) -> Result<String, CodecError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(CodecError::EmptyBody);
    }
    Ok(body.to_string())
}
