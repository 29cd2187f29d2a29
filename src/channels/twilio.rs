use crate::channels::{Channel, DeliveryReceipt};
use crate::chat::OutboundMessage;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

pub const TWILIO_CHANNEL_NAME: &str = "twilio";
pub const TWILIO_API_BASE: &str = "https://api.twilio.com";
/// Twilio rejects WhatsApp bodies longer than this
const WHATSAPP_MAX_MESSAGE_LENGTH: usize = 1600;
const SEND_TIMEOUT_SECS: u64 = 30;

#[derive(Error, Debug)]
pub enum TwilioError {
    #[error(
        "Twilio is not configured. Set TWILIO_ACCOUNT_SID, TWILIO_AUTH_TOKEN and TWILIO_WHATSAPP_FROM."
    )]
    NotConfigured,

    #[error("Invalid account SID format: {0}. Account SIDs start with 'AC' and are 34 characters long.")]
    InvalidAccountSid(String),

    #[error("Twilio API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Twilio request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
struct Credentials {
    account_sid: String,
    auth_token: String,
    from: String,
}

#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<u32>,
    message: String,
}

/// Outbound WhatsApp delivery through the Twilio Messages REST API.
///
/// A channel built without credentials still exists so the server can run
/// for local development; every send then fails with `NotConfigured`.
pub struct TwilioChannel {
    credentials: Option<Credentials>,
    api_base: String,
    client: Client,
}

impl TwilioChannel {
    /// Create a channel from the three Twilio settings.
    ///
    /// Any missing setting yields an unconfigured channel rather than an
    /// error; a malformed account SID is rejected.
    pub fn new(
        account_sid: Option<String>,
        auth_token: Option<String>,
        from: Option<String>,
    ) -> Result<Self> {
        let credentials = match (account_sid, auth_token, from) {
            (Some(account_sid), Some(auth_token), Some(from)) => {
                if !is_valid_account_sid(&account_sid) {
                    return Err(TwilioError::InvalidAccountSid(account_sid).into());
                }
                Some(Credentials {
                    account_sid,
                    auth_token,
                    from,
                })
            }
            _ => None,
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(SEND_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            credentials,
            api_base: TWILIO_API_BASE.to_string(),
            client,
        })
    }

    /// Points the channel at a different API host (used by tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    async fn send_message(&self, message: OutboundMessage) -> Result<DeliveryReceipt, TwilioError> {
        let credentials = self.credentials.as_ref().ok_or(TwilioError::NotConfigured)?;

        let body = truncate_body(&message.to, &message.body);
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base, credentials.account_sid
        );

        let resp = self
            .client
            .post(&url)
            .basic_auth(&credentials.account_sid, Some(&credentials.auth_token))
            .form(&[
                ("From", credentials.from.as_str()),
                ("To", message.to.as_str()),
                ("Body", body.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ApiError>(&text) {
                Ok(api_error) => match api_error.code {
                    Some(code) => format!("{} (code {})", api_error.message, code),
                    None => api_error.message,
                },
                Err(_) => text,
            };
            return Err(TwilioError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let resource: MessageResource = resp.json().await?;
        tracing::debug!(sid = %resource.sid, to = %message.to, "Message accepted by Twilio");

        Ok(DeliveryReceipt {
            sid: resource.sid,
            to: message.to,
        })
    }
}

#[async_trait]
impl Channel for TwilioChannel {
    fn name(&self) -> &'static str {
        TWILIO_CHANNEL_NAME
    }

    async fn send(&self, message: OutboundMessage) -> Result<DeliveryReceipt> {
        Ok(self.send_message(message).await?)
    }
}

/// Validates Twilio account SID format
///
/// Format: "AC" followed by 32 alphanumeric characters
pub fn is_valid_account_sid(sid: &str) -> bool {
    sid.len() == 34 && sid.starts_with("AC") && sid.chars().all(|c| c.is_ascii_alphanumeric())
}

fn truncate_body(to: &str, body: &str) -> String {
    let length = body.chars().count();
    if length <= WHATSAPP_MAX_MESSAGE_LENGTH {
        return body.to_string();
    }

    tracing::warn!(
        to = %to,
        original_length = length,
        "Outbound message too long, truncating to {} characters",
        WHATSAPP_MAX_MESSAGE_LENGTH
    );
    body.chars().take(WHATSAPP_MAX_MESSAGE_LENGTH).collect()
}
