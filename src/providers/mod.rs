//! Completion provider module for whatsrelay
//!
//! The reply synthesizer depends only on the `CompletionProvider` trait; the
//! OpenAI-compatible HTTP client in `openai` is the production implementation.
//!
//! # Example
//!
//! ```rust,no_run
//! use whatsrelay::providers::{CompletionMeta, CompletionProvider};
//!
//! async fn example(provider: &dyn CompletionProvider) {
//!     let meta = CompletionMeta::new("whatsapp:+33600000000");
//!     match provider.complete_chat("Bonjour !", &meta).await {
//!         Ok(Some(text)) => println!("{}", text),
//!         Ok(None) => println!("(no answer)"),
//!         Err(e) => eprintln!("{}", e),
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod error;
#[cfg(test)]
pub mod mock;
pub mod openai;

pub use error::ProviderError;
pub use openai::{OpenAiConfig, OpenAiProvider};

/// Context passed alongside a prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionMeta {
    /// Conversation the prompt belongs to
    pub sender: String,
}

impl CompletionMeta {
    pub fn new(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
        }
    }
}

/// A message in a chat-completion request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmMessage {
    pub role: LlmRole,
    pub content: String,
}

impl LlmMessage {
    pub fn new(role: LlmRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Role of a message sender in a chat-completion request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmRole {
    System,
    User,
}

impl LlmRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmRole::System => "system",
            LlmRole::User => "user",
        }
    }
}

impl fmt::Display for LlmRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Trait for remote chat-completion services
///
/// All implementations must be Send + Sync so one instance can serve
/// concurrent webhook calls.
#[async_trait::async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Sends `prompt` to the service and returns its answer.
    ///
    /// `Ok(None)` means the service answered with nothing usable.
    async fn complete_chat(
        &self,
        prompt: &str,
        meta: &CompletionMeta,
    ) -> Result<Option<String>, ProviderError>;

    /// Returns the provider name, used for logging
    fn provider_name(&self) -> &'static str;
}
