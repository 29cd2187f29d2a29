use crate::providers::OpenAiConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_SESSION_TTL_MS: u64 = 15 * 60 * 1000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,

    /// Public URL the webhook is reachable at, used for signature checks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twilio_account_sid: Option<String>,

    /// Shared secret for both outbound sends and inbound signature checks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twilio_auth_token: Option<String>,

    /// Sender address for outbound messages, e.g. `whatsapp:+14155238886`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twilio_whatsapp_from: Option<String>,

    #[serde(default = "default_session_ttl_ms")]
    pub session_ttl_ms: u64,

    /// Interval of the background sweep; lazy expiry only when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_sweep_secs: Option<u64>,

    /// Completion provider; AI replies are disabled when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_config: Option<OpenAiConfig>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_session_ttl_ms() -> u64 {
    DEFAULT_SESSION_TTL_MS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            base_url: None,
            twilio_account_sid: None,
            twilio_auth_token: None,
            twilio_whatsapp_from: None,
            session_ttl_ms: DEFAULT_SESSION_TTL_MS,
            session_sweep_secs: None,
            provider_config: None,
        }
    }
}

/// What is configured, without the secrets themselves
#[derive(Debug, Clone, PartialEq)]
pub struct SafeConfigSummary {
    pub port: u16,
    pub base_url: Option<String>,
    pub signature_verification: bool,
    pub twilio_send_configured: bool,
    pub completion_configured: bool,
    pub model: Option<String>,
    pub session_ttl_ms: u64,
    pub session_sweep_secs: Option<u64>,
}

impl Config {
    pub fn get_safe_summary(&self) -> SafeConfigSummary {
        SafeConfigSummary {
            port: self.port,
            base_url: self.base_url.clone(),
            signature_verification: self.twilio_auth_token.is_some(),
            twilio_send_configured: self.twilio_account_sid.is_some()
                && self.twilio_auth_token.is_some()
                && self.twilio_whatsapp_from.is_some(),
            completion_configured: self.provider_config.is_some(),
            model: self
                .provider_config
                .as_ref()
                .map(|pc| pc.default_model.clone()),
            session_ttl_ms: self.session_ttl_ms,
            session_sweep_secs: self.session_sweep_secs,
        }
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_millis(self.session_ttl_ms)
    }

    /// `None` when no sweep should run
    pub fn session_sweep_interval(&self) -> Option<Duration> {
        self.session_sweep_secs
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs)
    }
}
