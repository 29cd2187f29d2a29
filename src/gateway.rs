//! HTTP gateway for whatsrelay
//!
//! Serves the Twilio webhook and a health check, and owns the process-level
//! background tasks (optional session sweep, memory monitoring) until a
//! SIGTERM/SIGINT triggers graceful shutdown.

use crate::bot::ReplySynthesizer;
use crate::channels::{Channel, TwilioChannel};
use crate::config::Config;
use crate::providers::{CompletionProvider, OpenAiProvider};
use crate::session::{Cleanup, SessionStore};
use crate::webhook::{
    SIGNATURE_HEADER, SignatureVerifier, WEBHOOK_PATH, WebhookError, WebhookPipeline,
    WebhookRequest,
};
use anyhow::{Context, Result};
use axum::extract::rejection::FormRejection;
use axum::extract::{Form, OriginalUri, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::{get, post};
use axum::Router;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const HEALTH_TEXT: &str = "WhatsApp Twilio Bot is running";

const MEMORY_WARNING_THRESHOLD_MB: u64 = 200;
const MEMORY_CHECK_INTERVAL_SECS: u64 = 60;
const TASK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Builds the HTTP routes around a pipeline
pub fn router(pipeline: Arc<WebhookPipeline>) -> Router {
    Router::new()
        .route("/", get(health))
        .route(WEBHOOK_PATH, post(webhook))
        .with_state(pipeline)
}

async fn health() -> &'static str {
    HEALTH_TEXT
}

async fn webhook(
    State(pipeline): State<Arc<WebhookPipeline>>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    form: Result<Form<BTreeMap<String, String>>, FormRejection>,
) -> Result<(StatusCode, &'static str), WebhookError> {
    let Form(params) = form.map_err(|rejection| {
        warn!(error = %rejection, "Unreadable webhook body");
        WebhookError::malformed(rejection.body_text())
    })?;

    let mut request = WebhookRequest::new(params).with_path_and_query(
        uri.path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or(WEBHOOK_PATH),
    );
    if let Some(signature) = header_str(&headers, SIGNATURE_HEADER) {
        request = request.with_signature(signature);
    }
    if let Some(host) = header_str(&headers, header::HOST.as_str()) {
        request = request.with_host(host);
    }
    if let Some(proto) = header_str(&headers, "x-forwarded-proto") {
        request = request.with_forwarded_proto(proto);
    }

    // The outbound send keeps running after the handle is dropped.
    let _ack = pipeline.handle(request).await?;

    Ok((StatusCode::OK, "OK"))
}

/// Header value as UTF-8; non-UTF-8 values are treated as absent
fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Wires the pipeline's collaborators from configuration.
pub fn build_pipeline(config: &Config, sessions: Arc<SessionStore>) -> Result<WebhookPipeline> {
    let verifier = SignatureVerifier::new(config.twilio_auth_token.clone());
    if !verifier.is_enabled() {
        warn!(
            "TWILIO_AUTH_TOKEN not set: webhook signature verification is DISABLED. Do not run like this in production."
        );
    }

    let synthesizer = match &config.provider_config {
        Some(provider_config) => {
            let provider = OpenAiProvider::try_new(provider_config.clone())
                .context("Failed to create OpenAI provider")?;
            info!(model = provider.model(), "Completion provider initialized");
            ReplySynthesizer::with_completion(Arc::new(provider) as Arc<dyn CompletionProvider>)
        }
        None => {
            info!("No OPENAI_API_KEY configured, AI replies disabled");
            ReplySynthesizer::without_completion()
        }
    };

    let twilio = TwilioChannel::new(
        config.twilio_account_sid.clone(),
        config.twilio_auth_token.clone(),
        config.twilio_whatsapp_from.clone(),
    )
    .context("Invalid Twilio configuration")?;
    if !twilio.is_configured() {
        warn!(
            "Twilio credentials incomplete. Set TWILIO_ACCOUNT_SID, TWILIO_AUTH_TOKEN and TWILIO_WHATSAPP_FROM; replies will not be delivered."
        );
    }
    let channel: Arc<dyn Channel> = Arc::new(twilio);

    Ok(WebhookPipeline::new(sessions, verifier, synthesizer, channel)
        .with_base_url(config.base_url.clone()))
}

/// Runs the gateway until a shutdown signal arrives.
///
/// This function:
/// 1. Builds the session store and webhook pipeline
/// 2. Starts the optional session sweep and the memory monitor
/// 3. Serves HTTP on `0.0.0.0:{port}`
/// 4. Handles SIGTERM/SIGINT for graceful shutdown
/// 5. Waits for in-flight outbound sends, then stops the background tasks
pub async fn run_gateway(config: &Config) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting whatsrelay gateway"
    );

    let summary = config.get_safe_summary();
    info!(
        port = summary.port,
        base_url = ?summary.base_url,
        signature_verification = summary.signature_verification,
        twilio_send_configured = summary.twilio_send_configured,
        completion_configured = summary.completion_configured,
        model = ?summary.model,
        session_ttl_ms = summary.session_ttl_ms,
        session_sweep_secs = ?summary.session_sweep_secs,
        "Configuration"
    );

    let sessions = Arc::new(SessionStore::new(config.session_ttl()));
    let pipeline = Arc::new(build_pipeline(config, Arc::clone(&sessions))?);

    let sweeper = config.session_sweep_interval().map(|interval| {
        info!(interval_secs = interval.as_secs(), "Session sweep background task started");
        Cleanup::new(Arc::clone(&sessions), interval).start_cleanup_task()
    });

    let (memory_handle, memory_shutdown) = start_memory_monitor(Arc::clone(&sessions));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    let served = axum::serve(listener, router(Arc::clone(&pipeline)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error");

    // Graceful shutdown sequence
    info!("Starting graceful shutdown sequence...");

    // In-flight HTTP requests are finished by now; their replies may not be.
    let abandoned = pipeline.drain_dispatches(TASK_SHUTDOWN_TIMEOUT).await;
    if abandoned == 0 {
        info!("All outbound sends completed");
    }

    if let Some((handle, shutdown)) = sweeper {
        info!("Signaling session sweep task to stop...");
        stop_task("Session sweep", handle, shutdown).await;
    }

    debug!("Signaling memory monitoring task to stop...");
    stop_task("Memory monitoring", memory_handle, memory_shutdown).await;

    served?;
    info!("Gateway stopped gracefully");
    Ok(())
}

async fn stop_task(name: &str, handle: JoinHandle<()>, shutdown: mpsc::Sender<()>) {
    let _ = shutdown.send(()).await;
    match tokio::time::timeout(TASK_SHUTDOWN_TIMEOUT, handle).await {
        Ok(Ok(())) => {
            info!("{} task completed gracefully", name);
        }
        Ok(Err(e)) => {
            error!("{} task panicked: {}", name, e);
        }
        Err(_) => {
            error!(
                "{} task did not complete within {}s timeout",
                name,
                TASK_SHUTDOWN_TIMEOUT.as_secs()
            );
        }
    }
}

/// Resolves on SIGTERM or SIGINT (Ctrl+C elsewhere)
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, initiating graceful shutdown...");
                    }
                    _ = sigint.recv() => {
                        info!("Received SIGINT, initiating graceful shutdown...");
                    }
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to install signal handlers: {}. Falling back to Ctrl+C.", e);
                wait_for_ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        wait_for_ctrl_c().await;
    }
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        Err(e) => {
            // Without any signal source, run until the process is killed.
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

/// Logs process memory and live session count on a fixed interval
fn start_memory_monitor(sessions: Arc<SessionStore>) -> (JoinHandle<()>, mpsc::Sender<()>) {
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

    let handle = tokio::spawn(async move {
        use sysinfo::{System, get_current_pid};

        let mut system = System::new();
        let current_pid = match get_current_pid() {
            Ok(pid) => pid,
            Err(e) => {
                error!(
                    "Failed to get current PID for memory monitoring: {}. Memory monitoring disabled.",
                    e
                );
                // Still honor shutdown so the caller does not hit its timeout.
                let _ = shutdown_rx.recv().await;
                return;
            }
        };
        let mut interval = tokio::time::interval(Duration::from_secs(MEMORY_CHECK_INTERVAL_SECS));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    system.refresh_all();
                    if let Some(process) = system.process(current_pid) {
                        let memory_mb = process.memory() / (1024 * 1024);
                        if memory_mb > MEMORY_WARNING_THRESHOLD_MB {
                            warn!(memory_mb, threshold_mb = MEMORY_WARNING_THRESHOLD_MB, sessions = sessions.len(), "Memory usage exceeds threshold");
                        } else {
                            debug!(memory_mb, sessions = sessions.len(), "Current memory usage");
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    debug!("Memory monitoring task received shutdown signal");
                    break;
                }
            }
        }
    });

    (handle, shutdown_tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::OpenAiConfig;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn pipeline(config: &Config) -> Arc<WebhookPipeline> {
        Arc::new(build_pipeline(config, Arc::new(SessionStore::default())).unwrap())
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = router(pipeline(&Config::default()));
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, HEALTH_TEXT);
    }

    #[tokio::test]
    async fn test_unreadable_body_is_bad_request() {
        let app = router(pipeline(&Config::default()));
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(response).await, "Bad Request");
    }

    #[tokio::test]
    async fn test_missing_from_is_bad_request() {
        let app = router(pipeline(&Config::default()));
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from("Body=menu"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(response).await, "Missing From");
    }

    #[tokio::test]
    async fn test_build_pipeline_with_provider() {
        let config = Config {
            provider_config: Some(OpenAiConfig::new("sk-test")),
            ..Default::default()
        };
        assert!(build_pipeline(&config, Arc::new(SessionStore::default())).is_ok());
    }

    #[tokio::test]
    async fn test_build_pipeline_rejects_bad_account_sid() {
        let config = Config {
            twilio_account_sid: Some("bogus".to_string()),
            twilio_auth_token: Some("token".to_string()),
            twilio_whatsapp_from: Some("whatsapp:+1".to_string()),
            ..Default::default()
        };
        assert!(build_pipeline(&config, Arc::new(SessionStore::default())).is_err());
    }

    #[tokio::test]
    async fn test_memory_monitor_stops_on_signal() {
        let (handle, shutdown) = start_memory_monitor(Arc::new(SessionStore::default()));
        shutdown.send(()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
