use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A message received through the webhook
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Transport-qualified sender address, e.g. `whatsapp:+33600000000`
    pub sender: String,
    /// Message text, trimmed; empty when the transport sent none
    pub body: String,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(sender: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            body: body.into().trim().to_string(),
            received_at: Utc::now(),
        }
    }

    /// Builds a message from Twilio webhook form parameters.
    ///
    /// Returns `None` when `From` is missing or empty.
    pub fn from_params(params: &BTreeMap<String, String>) -> Option<Self> {
        let sender = params.get("From").filter(|from| !from.is_empty())?;
        let body = params.get("Body").map(String::as_str).unwrap_or("");
        Some(Self::new(sender.as_str(), body))
    }
}

/// A reply to deliver through the outbound channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub to: String,
    pub body: String,
}

impl OutboundMessage {
    pub fn new(to: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            body: body.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_inbound_message_creation() {
        let msg = InboundMessage::new("whatsapp:+1", "  Hello  ");
        assert_eq!(msg.sender, "whatsapp:+1");
        assert_eq!(msg.body, "Hello");
        let now = Utc::now();
        assert!(now.signed_duration_since(msg.received_at).num_seconds() < 5);
    }

    #[test]
    fn test_from_params() {
        let msg =
            InboundMessage::from_params(&params(&[("From", "whatsapp:+1"), ("Body", "menu ")]))
                .unwrap();
        assert_eq!(msg.sender, "whatsapp:+1");
        assert_eq!(msg.body, "menu");
    }

    #[test]
    fn test_from_params_missing_body_defaults_to_empty() {
        let msg = InboundMessage::from_params(&params(&[("From", "whatsapp:+1")])).unwrap();
        assert_eq!(msg.body, "");
    }

    #[test]
    fn test_from_params_requires_sender() {
        assert!(InboundMessage::from_params(&params(&[("Body", "menu")])).is_none());
        assert!(InboundMessage::from_params(&params(&[("From", ""), ("Body", "menu")])).is_none());
    }

    #[test]
    fn test_outbound_message() {
        let msg = OutboundMessage::new("whatsapp:+1", "Echo: hi");
        assert_eq!(msg.to, "whatsapp:+1");
        assert_eq!(msg.body, "Echo: hi");
    }
}
