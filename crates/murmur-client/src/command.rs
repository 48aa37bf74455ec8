//! Terminal input parsing.
//!
//! ```text
//! /login <name>          choose a one-word identity and connect
//! /msg <user> <text>     direct message
//! /users                 show the roster
//! /refresh               poll the status endpoint now
//! /logout                disconnect
//! /quit                  exit
//! /help                  list commands
//! anything else          broadcast
//! ```

use thiserror::Error;

/// Parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/login <name>`
    Login(String),
    /// `/msg <user> <text>`
    Direct {
        /// Recipient.
        target: String,
        /// Message text.
        body: String,
    },
    /// Plain text.
    Broadcast(String),
    /// `/users`
    Users,
    /// `/refresh`
    Refresh,
    /// `/logout`
    Logout,
    /// `/quit`
    Quit,
    /// `/help`
    Help,
    /// Blank line.
    Empty,
}

/// Input that is not a valid command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Unrecognised `/word`.
    #[error("unknown command /{0}, try /help")]
    Unknown(String),

    /// Known command with missing arguments.
    #[error("usage: {0}")]
    Usage(&'static str),
}

/// Help text for `/help`.
pub const HELP: &str = "/login <name, no spaces> | /msg <user> <text> | /users | /refresh | /logout | /quit";

/// Parse one input line.
pub fn parse(line: &str) -> Result<Command, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Command::Empty);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Command::Broadcast(line.to_string()));
    };

    let (word, args) = split_word(rest);
    match word {
        "login" => login_name(args).map(Command::Login),
        "msg" => match split_word(args) {
            (target, body) if !target.is_empty() && !body.is_empty() => {
                Ok(Command::Direct { target: target.to_string(), body: body.to_string() })
            },
            _ => Err(CommandError::Usage("/msg <user> <text>")),
        },
        "users" => Ok(Command::Users),
        "refresh" => Ok(Command::Refresh),
        "logout" => Ok(Command::Logout),
        "quit" | "exit" => Ok(Command::Quit),
        "help" => Ok(Command::Help),
        other => Err(CommandError::Unknown(other.to_string())),
    }
}

/// Validate a login name typed at the terminal or passed on the command line.
///
/// `/msg` splits its target at whitespace, so names cannot contain any.
pub fn login_name(text: &str) -> Result<String, CommandError> {
    match split_word(text) {
        (name, "") if !name.is_empty() => Ok(name.to_string()),
        _ => Err(CommandError::Usage("/login <name>")),
    }
}

fn split_word(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (text, ""),
    }
}
