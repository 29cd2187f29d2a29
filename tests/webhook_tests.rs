use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use http_body_util::BodyExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tower::ServiceExt;

use whatsrelay::bot::ReplySynthesizer;
use whatsrelay::bot::reply::{AI_ERROR_REPLY, HELP_REPLY};
use whatsrelay::channels::{Channel, DeliveryReceipt};
use whatsrelay::chat::OutboundMessage;
use whatsrelay::gateway::router;
use whatsrelay::providers::{CompletionMeta, CompletionProvider, ProviderError};
use whatsrelay::session::{Origin, SessionStore};
use whatsrelay::webhook::signature::compute_signature;
use whatsrelay::webhook::{SignatureVerifier, WebhookPipeline};

const SECRET: &str = "twilio-secret";
const HOST: &str = "bot.example.com";

/// Forwards every outbound message to the test
struct ChannelSpy {
    sent: mpsc::UnboundedSender<OutboundMessage>,
}

#[async_trait]
impl Channel for ChannelSpy {
    fn name(&self) -> &'static str {
        "spy"
    }

    async fn send(&self, message: OutboundMessage) -> anyhow::Result<DeliveryReceipt> {
        let to = message.to.clone();
        self.sent.send(message)?;
        Ok(DeliveryReceipt {
            sid: "SMtest".to_string(),
            to,
        })
    }
}

struct DownProvider;

#[async_trait]
impl CompletionProvider for DownProvider {
    async fn complete_chat(
        &self,
        _prompt: &str,
        _meta: &CompletionMeta,
    ) -> Result<Option<String>, ProviderError> {
        Err(ProviderError::network("connection refused"))
    }

    fn provider_name(&self) -> &'static str {
        "down"
    }
}

struct Harness {
    app: axum::Router,
    sessions: Arc<SessionStore>,
    outbound: mpsc::UnboundedReceiver<OutboundMessage>,
}

impl Harness {
    fn new(secret: Option<&str>, synthesizer: ReplySynthesizer) -> Self {
        let sessions = Arc::new(SessionStore::default());
        let (tx, outbound) = mpsc::unbounded_channel();
        let pipeline = WebhookPipeline::new(
            Arc::clone(&sessions),
            SignatureVerifier::new(secret.map(str::to_string)),
            synthesizer,
            Arc::new(ChannelSpy { sent: tx }),
        );
        Self {
            app: router(Arc::new(pipeline)),
            sessions,
            outbound,
        }
    }

    async fn post(&self, form: &[(&str, &str)], signature: Option<&str>) -> Response {
        let body = serde_urlencoded::to_string(form).unwrap();

        let mut builder = Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("host", HOST)
            .header("x-forwarded-proto", "https")
            .header("content-type", "application/x-www-form-urlencoded");
        if let Some(signature) = signature {
            builder = builder.header("x-twilio-signature", signature);
        }

        self.app
            .clone()
            .oneshot(builder.body(Body::from(body)).unwrap())
            .await
            .unwrap()
    }

    async fn next_outbound(&mut self) -> OutboundMessage {
        tokio::time::timeout(Duration::from_secs(5), self.outbound.recv())
            .await
            .expect("outbound dispatch timed out")
            .expect("channel closed")
    }
}

fn sign(form: &[(&str, &str)]) -> String {
    let params: BTreeMap<String, String> = form
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    compute_signature(SECRET, &format!("https://{}/webhook", HOST), &params)
}

async fn body_text(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_menu_without_provider() {
    let mut harness = Harness::new(None, ReplySynthesizer::without_completion());

    let response = harness
        .post(&[("From", "whatsapp:+1"), ("Body", "menu")], None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "OK");

    let sent = harness.next_outbound().await;
    assert_eq!(sent.to, "whatsapp:+1");
    assert_eq!(sent.body, HELP_REPLY);

    let session = harness.sessions.get("whatsapp:+1").unwrap();
    assert_eq!(session.messages.len(), 2);
    assert_eq!(session.messages[0].text, "menu");
    assert_eq!(session.messages[1].text, HELP_REPLY);
}

#[tokio::test]
async fn test_echo_reply_is_exact() {
    let mut harness = Harness::new(None, ReplySynthesizer::without_completion());

    let response = harness
        .post(&[("From", "whatsapp:+1"), ("Body", "echo hello world")], None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(harness.next_outbound().await.body, "hello world");
}

#[tokio::test]
async fn test_missing_from_has_no_side_effects() {
    let mut harness = Harness::new(None, ReplySynthesizer::without_completion());

    let response = harness.post(&[("Body", "menu")], None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(response).await, "Missing From");
    assert!(harness.sessions.is_empty());
    assert!(harness.outbound.try_recv().is_err());
}

#[tokio::test]
async fn test_invalid_signature_is_forbidden() {
    let mut harness = Harness::new(Some(SECRET), ReplySynthesizer::without_completion());
    let form = [("From", "whatsapp:+1"), ("Body", "menu")];
    let mut signature = sign(&form);
    // Flip one character of an otherwise valid signature
    let first = if signature.starts_with('A') { "B" } else { "A" };
    signature.replace_range(0..1, first);

    let response = harness.post(&form, Some(&signature)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_text(response).await, "Invalid signature");
    assert!(harness.sessions.is_empty());
    assert!(harness.outbound.try_recv().is_err());
}

#[tokio::test]
async fn test_missing_signature_with_secret_is_forbidden() {
    let harness = Harness::new(Some(SECRET), ReplySynthesizer::without_completion());

    let response = harness
        .post(&[("From", "whatsapp:+1"), ("Body", "menu")], None)
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(harness.sessions.is_empty());
}

#[tokio::test]
async fn test_valid_signature_is_accepted() {
    let mut harness = Harness::new(Some(SECRET), ReplySynthesizer::without_completion());
    let form = [("From", "whatsapp:+33600000000"), ("Body", "Bonjour à tous")];

    let response = harness.post(&form, Some(&sign(&form))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(harness.next_outbound().await.body, "Echo: Bonjour à tous");
}

#[tokio::test]
async fn test_signed_body_with_reserved_characters() {
    let mut harness = Harness::new(Some(SECRET), ReplySynthesizer::without_completion());
    let form = [("From", "whatsapp:+1"), ("Body", "echo 1+1=2 & 50% off?")];

    let response = harness.post(&form, Some(&sign(&form))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(harness.next_outbound().await.body, "1+1=2 & 50% off?");
}

#[tokio::test]
async fn test_failing_provider_yields_french_fallback() {
    let mut harness = Harness::new(
        None,
        ReplySynthesizer::with_completion(Arc::new(DownProvider)),
    );

    let response = harness
        .post(&[("From", "whatsapp:+1"), ("Body", "ia test")], None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(harness.next_outbound().await.body, AI_ERROR_REPLY);
}

#[tokio::test]
async fn test_sequential_calls_append_in_order() {
    let mut harness = Harness::new(None, ReplySynthesizer::without_completion());

    for body in ["echo first", "echo second"] {
        let response = harness
            .post(&[("From", "whatsapp:+1"), ("Body", body)], None)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        harness.next_outbound().await;
    }

    let session = harness.sessions.get("whatsapp:+1").unwrap();
    let turns: Vec<(Origin, &str)> = session
        .messages
        .iter()
        .map(|m| (m.origin, m.text.as_str()))
        .collect();
    assert_eq!(
        turns,
        vec![
            (Origin::User, "echo first"),
            (Origin::Bot, "first"),
            (Origin::User, "echo second"),
            (Origin::Bot, "second"),
        ]
    );
}

#[tokio::test]
async fn test_senders_have_separate_sessions() {
    let mut harness = Harness::new(None, ReplySynthesizer::without_completion());

    harness
        .post(&[("From", "whatsapp:+1"), ("Body", "help")], None)
        .await;
    harness.next_outbound().await;
    harness
        .post(&[("From", "whatsapp:+2"), ("Body", "help")], None)
        .await;
    harness.next_outbound().await;

    assert_eq!(harness.sessions.len(), 2);
    assert_eq!(harness.sessions.get("whatsapp:+1").unwrap().messages.len(), 2);
}

#[tokio::test]
async fn test_blank_body_gets_prompt() {
    let mut harness = Harness::new(None, ReplySynthesizer::without_completion());

    let response = harness
        .post(&[("From", "whatsapp:+1"), ("Body", "   ")], None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(harness.next_outbound().await.body.starts_with("Je n'ai reçu aucun texte"));

    let session = harness.sessions.get("whatsapp:+1").unwrap();
    assert_eq!(session.messages[0].text, "");
}
