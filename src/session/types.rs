use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Conversation state for one sender.
///
/// History is append-only for the lifetime of the session; expiry is tracked
/// by the store, not by the session value itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub sender: String,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<Message>,
}

impl Session {
    pub fn new(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            created_at: Utc::now(),
            messages: Vec::new(),
        }
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.messages.push(Message::new(Origin::User, text));
    }

    pub fn push_bot(&mut self, text: impl Into<String>) {
        self.messages.push(Message::new(Origin::Bot, text));
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Who produced a message in the conversation history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    User,
    Bot,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::User => "user",
            Origin::Bot => "bot",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub origin: Origin,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(origin: Origin, text: impl Into<String>) -> Self {
        Self {
            origin,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn is_user(&self) -> bool {
        self.origin == Origin::User
    }

    pub fn is_bot(&self) -> bool {
        self.origin == Origin::Bot
    }
}
