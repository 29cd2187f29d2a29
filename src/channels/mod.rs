use crate::chat::OutboundMessage;
use anyhow::Result;
use async_trait::async_trait;

pub mod twilio;

pub use twilio::{TwilioChannel, TwilioError};

/// Proof that the transport accepted an outbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Transport-assigned message identifier
    pub sid: String,
    pub to: String,
}

/// Trait that outbound channels must implement.
///
/// The webhook pipeline only ever calls `send` from a detached task, so
/// implementations are free to take as long as the transport needs.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Channel name, used for logging
    fn name(&self) -> &'static str;

    /// Deliver a reply to its destination.
    async fn send(&self, message: OutboundMessage) -> Result<DeliveryReceipt>;
}
