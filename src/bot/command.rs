//! Literal command classification for inbound message bodies
//!
//! Keywords match case-insensitively; payloads keep the sender's casing.

use std::fmt;

const ECHO_PREFIX: &str = "echo ";
const AI_PREFIX: &str = "ia ";

/// What an inbound message asks the bot to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Blank or whitespace-only body
    Empty,
    /// `menu` or `help`
    Help,
    /// `echo <payload>`: the payload is sent back as-is
    Echo(String),
    /// `ia <payload>`: the payload goes to the completion provider
    AiQuery(String),
    /// Anything else; carries the whole body
    Default(String),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Empty => "empty",
            Command::Help => "help",
            Command::Echo(_) => "echo",
            Command::AiQuery(_) => "ia",
            Command::Default(_) => "default",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Classifies a message body. Total and deterministic.
///
/// The body is trimmed before matching. `Empty` is decided first, so a
/// whitespace-only body never reaches the prefix checks.
pub fn classify(body: &str) -> Command {
    let body = body.trim();

    if body.is_empty() {
        return Command::Empty;
    }

    if body.eq_ignore_ascii_case("menu") || body.eq_ignore_ascii_case("help") {
        return Command::Help;
    }

    if let Some(payload) = strip_prefix_ignore_case(body, ECHO_PREFIX) {
        return Command::Echo(payload.to_string());
    }

    if let Some(payload) = strip_prefix_ignore_case(body, AI_PREFIX) {
        return Command::AiQuery(payload.trim().to_string());
    }

    Command::Default(body.to_string())
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&text[prefix.len()..])
    } else {
        None
    }
}
