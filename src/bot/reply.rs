//! Reply text for each classified command
//!
//! Every path that calls the completion provider has a fixed fallback, so an
//! outage of the remote service degrades the bot to echo behavior instead of
//! failing the conversation.

use crate::bot::command::Command;
use crate::providers::{CompletionMeta, CompletionProvider};
use std::sync::Arc;
use tracing::{error, warn};

pub const EMPTY_BODY_REPLY: &str =
    "Je n'ai reçu aucun texte. Envoie 'menu' pour voir les options.";

pub const HELP_REPLY: &str = "Menu:\n1) 'ia' + message → demande au modèle IA (si configuré)\n2) 'echo' + message → renvoie le message\n3) 'help' → ce menu";

pub const AI_EMPTY_REPLY: &str = "Désolé, pas de réponse de l'IA.";

pub const AI_ERROR_REPLY: &str = "Erreur lors de la requête IA. Réessaie plus tard.";

pub const AI_DISABLED_REPLY: &str =
    "L'IA n'est pas configurée côté serveur. Ajoute OPENAI_API_KEY dans .env pour activer.";

/// Builds reply text, optionally backed by a completion provider.
#[derive(Clone, Default)]
pub struct ReplySynthesizer {
    completion: Option<Arc<dyn CompletionProvider>>,
}

impl ReplySynthesizer {
    /// A synthesizer with no completion provider: AI commands get the
    /// "not configured" reply and everything else is echoed.
    pub fn without_completion() -> Self {
        Self { completion: None }
    }

    pub fn with_completion(provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            completion: Some(provider),
        }
    }

    /// Produces the reply for `command`. Never fails.
    pub async fn synthesize(&self, command: &Command, meta: &CompletionMeta) -> String {
        match command {
            Command::Empty => EMPTY_BODY_REPLY.to_string(),
            Command::Help => HELP_REPLY.to_string(),
            Command::Echo(payload) => payload.clone(),
            Command::AiQuery(query) => self.ai_reply(query, meta).await,
            Command::Default(body) => self.default_reply(body, meta).await,
        }
    }

    async fn ai_reply(&self, query: &str, meta: &CompletionMeta) -> String {
        let Some(provider) = &self.completion else {
            return AI_DISABLED_REPLY.to_string();
        };

        match provider.complete_chat(query, meta).await {
            Ok(answer) => non_blank(answer).unwrap_or_else(|| AI_EMPTY_REPLY.to_string()),
            Err(e) => {
                error!(
                    provider = provider.provider_name(),
                    sender = %meta.sender,
                    error = %e,
                    "Completion request failed"
                );
                AI_ERROR_REPLY.to_string()
            }
        }
    }

    async fn default_reply(&self, body: &str, meta: &CompletionMeta) -> String {
        let Some(provider) = &self.completion else {
            return echo(body);
        };

        match provider.complete_chat(body, meta).await {
            Ok(answer) => non_blank(answer).unwrap_or_else(|| echo(body)),
            Err(e) => {
                warn!(
                    provider = provider.provider_name(),
                    sender = %meta.sender,
                    error = %e,
                    "Completion failed, falling back to echo"
                );
                echo(body)
            }
        }
    }
}

fn echo(body: &str) -> String {
    format!("Echo: {}", body)
}

fn non_blank(answer: Option<String>) -> Option<String> {
    answer
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}
