//! Inbound webhook processing
//!
//! One call to [`WebhookPipeline::handle`] takes a Twilio webhook from
//! verification to acknowledgement:
//!
//! 1. verify the signature (or skip, when no secret is configured)
//! 2. extract the sender and trimmed body
//! 3. record the user turn in the sender's session
//! 4. classify the body and synthesize a reply
//! 5. record the bot turn
//! 6. hand the reply to the outbound channel on a detached task
//!
//! The acknowledgement never waits for step 6; delivery failures only show
//! up in the log. Sends still in flight at shutdown are awaited through
//! [`WebhookPipeline::drain_dispatches`].

use crate::bot::{ReplySynthesizer, classify};
use crate::channels::Channel;
use crate::chat::{InboundMessage, OutboundMessage};
use crate::providers::CompletionMeta;
use crate::session::{Session, SessionStore};
use crate::webhook::error::WebhookError;
use crate::webhook::signature::{SignatureVerifier, request_url};
use futures::FutureExt;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

pub const WEBHOOK_PATH: &str = "/webhook";

/// Transport-independent view of one webhook call
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    /// Decoded form parameters, sorted by key
    pub params: BTreeMap<String, String>,
    /// Value of `X-Twilio-Signature`
    pub signature: Option<String>,
    /// Value of `Host`
    pub host: Option<String>,
    /// Value of `X-Forwarded-Proto`
    pub forwarded_proto: Option<String>,
    /// Path and query exactly as received
    pub path_and_query: String,
}

impl WebhookRequest {
    pub fn new(params: BTreeMap<String, String>) -> Self {
        Self {
            params,
            signature: None,
            host: None,
            forwarded_proto: None,
            path_and_query: WEBHOOK_PATH.to_string(),
        }
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_forwarded_proto(mut self, proto: impl Into<String>) -> Self {
        self.forwarded_proto = Some(proto.into());
        self
    }

    pub fn with_path_and_query(mut self, path_and_query: impl Into<String>) -> Self {
        self.path_and_query = path_and_query.into();
        self
    }
}

/// What the caller gets back once the request is accepted
#[derive(Debug)]
pub struct Acknowledgement {
    pub sender: String,
    pub reply: String,
    /// The outbound send. Dropping it leaves the task running.
    pub dispatch: JoinHandle<()>,
}

pub struct WebhookPipeline {
    sessions: Arc<SessionStore>,
    verifier: SignatureVerifier,
    base_url: Option<String>,
    synthesizer: ReplySynthesizer,
    channel: Arc<dyn Channel>,
    dispatches: TaskTracker,
}

impl WebhookPipeline {
    pub fn new(
        sessions: Arc<SessionStore>,
        verifier: SignatureVerifier,
        synthesizer: ReplySynthesizer,
        channel: Arc<dyn Channel>,
    ) -> Self {
        Self {
            sessions,
            verifier,
            base_url: None,
            synthesizer,
            channel,
            dispatches: TaskTracker::new(),
        }
    }

    /// Public base URL used to rebuild the signed URL instead of the
    /// request headers
    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        self.base_url = base_url.filter(|url| !url.is_empty());
        self
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Processes one webhook call.
    ///
    /// Must be called from within a Tokio runtime, since the outbound send
    /// is spawned onto it.
    pub async fn handle(&self, request: WebhookRequest) -> Result<Acknowledgement, WebhookError> {
        let WebhookRequest {
            params,
            signature,
            host,
            forwarded_proto,
            path_and_query,
        } = request;

        self.verifier
            .check(
                signature.as_deref(),
                || {
                    request_url(
                        self.base_url.as_deref(),
                        forwarded_proto.as_deref(),
                        host.as_deref(),
                        &path_and_query,
                    )
                },
                &params,
            )
            .map_err(|e| {
                warn!(error = %e, "Rejected webhook request");
                WebhookError::from(e)
            })?;

        let inbound = InboundMessage::from_params(&params).ok_or_else(|| {
            warn!("Webhook request without From parameter");
            WebhookError::missing_sender()
        })?;

        info!("[IN] {}: {}", inbound.sender, inbound.body);

        AssertUnwindSafe(self.process(inbound))
            .catch_unwind()
            .await
            .map_err(|panic| {
                let message = panic_message(panic.as_ref());
                error!(panic = %message, "Webhook processing panicked");
                WebhookError::unexpected(message)
            })
    }

    async fn process(&self, inbound: InboundMessage) -> Acknowledgement {
        let InboundMessage { sender, body, .. } = inbound;

        let mut session = self
            .sessions
            .get(&sender)
            .unwrap_or_else(|| Session::new(sender.as_str()));
        session.push_user(body.as_str());
        let mut session = self.sessions.set(&sender, session);

        let command = classify(&body);
        debug!(sender = %sender, command = command.name(), "Classified message");

        let meta = CompletionMeta::new(sender.as_str());
        let reply = self.synthesizer.synthesize(&command, &meta).await;

        session.push_bot(reply.as_str());
        self.sessions.set(&sender, session);

        let dispatch = self.dispatch(OutboundMessage::new(sender.as_str(), reply.as_str()));

        Acknowledgement {
            sender,
            reply,
            dispatch,
        }
    }

    /// Waits up to `timeout` for in-flight outbound sends and returns how
    /// many were still running when it gave up.
    ///
    /// Sends started after this call are still tracked and awaited.
    pub async fn drain_dispatches(&self, timeout: Duration) -> usize {
        self.dispatches.close();
        let pending = self.dispatches.len();
        if pending > 0 {
            info!(pending, "Waiting for outbound sends to finish...");
        }

        match tokio::time::timeout(timeout, self.dispatches.wait()).await {
            Ok(()) => 0,
            Err(_) => {
                let abandoned = self.dispatches.len();
                error!(
                    abandoned,
                    "Outbound sends did not finish within {}s; their replies are lost",
                    timeout.as_secs()
                );
                abandoned
            }
        }
    }

    fn dispatch(&self, message: OutboundMessage) -> JoinHandle<()> {
        let channel = Arc::clone(&self.channel);
        self.dispatches.spawn(async move {
            let to = message.to.clone();
            match channel.send(message).await {
                Ok(receipt) => {
                    info!(channel = channel.name(), sid = %receipt.sid, "[OUT] {}", receipt.to);
                }
                Err(e) => {
                    error!(channel = channel.name(), to = %to, error = %e, "[OUT] delivery failed");
                }
            }
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
