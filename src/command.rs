//! Command text protocol
//!
//! `<prefix> <keyword> <password> [params...]`. The prefix and keyword match
//! case-insensitively, the password is compared exactly.

use thiserror::Error;

/// Why an inbound command was refused before dispatch
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing password")]
    MissingPassword,

    #[error("invalid password")]
    InvalidPassword,
}

/// An authenticated command, password already consumed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub keyword: String,
    pub params: Vec<String>,
}

/// The fixed command set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Locate,
    Ring,
    Info,
    Help,
    CallMe,
    Sound,
    Ping,
    Unknown,
}

impl CommandKind {
    pub const ALL: [CommandKind; 7] = [
        CommandKind::Locate,
        CommandKind::Ring,
        CommandKind::Info,
        CommandKind::Help,
        CommandKind::CallMe,
        CommandKind::Sound,
        CommandKind::Ping,
    ];

    /// Exact match on an already lower-cased keyword
    pub fn from_keyword(keyword: &str) -> Self {
        match keyword {
            "locate" => CommandKind::Locate,
            "ring" => CommandKind::Ring,
            "info" => CommandKind::Info,
            "help" => CommandKind::Help,
            "callme" => CommandKind::CallMe,
            "sound" => CommandKind::Sound,
            "ping" => CommandKind::Ping,
            _ => CommandKind::Unknown,
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            CommandKind::Locate => "locate",
            CommandKind::Ring => "ring",
            CommandKind::Info => "info",
            CommandKind::Help => "help",
            CommandKind::CallMe => "callme",
            CommandKind::Sound => "sound",
            CommandKind::Ping => "ping",
            CommandKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.keyword())
    }
}

/// Strip the command prefix from a message body.
///
/// Returns the trimmed remainder, or `None` if the body does not start with
/// the prefix.
pub fn strip_prefix<'a>(body: &'a str, prefix: &str) -> Option<&'a str> {
    let body = body.trim();
    let mut rest = body.char_indices();

    for p in prefix.chars() {
        let (_, b) = rest.next()?;
        if !p.to_lowercase().eq(b.to_lowercase()) {
            return None;
        }
    }

    let offset = rest.next().map(|(i, _)| i).unwrap_or(body.len());
    Some(body[offset..].trim())
}

/// Split a prefix-stripped command and check its password
pub fn parse_and_authenticate(
    raw: &str,
    expected_password: &str,
) -> std::result::Result<ParsedCommand, AuthError> {
    let mut tokens = raw.split_whitespace();

    let (keyword, password) = match (tokens.next(), tokens.next()) {
        (Some(keyword), Some(password)) => (keyword, password),
        _ => return Err(AuthError::MissingPassword),
    };

    if password != expected_password {
        return Err(AuthError::InvalidPassword);
    }

    Ok(ParsedCommand {
        keyword: keyword.to_lowercase(),
        params: tokens.map(str::to_string).collect(),
    })
}
