//! HTTP surface of the dispatch engine.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use lighthouse_scm::github::parse_github_webhook;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::timeout::TimeoutLayer;
use tracing::{info, warn};

use crate::dispatcher::Dispatcher;
use crate::error::WebhookError;
use crate::metrics::WebhookMetrics;
use crate::signature::{header_value, verify_signature, DELIVERY_HEADER, EVENT_HEADER};

pub const HOOK_ENDPOINT: &str = "/hook";
pub const POLL_ENDPOINT: &str = "/poll";
pub const HEALTH_ENDPOINT: &str = "/health";
pub const READY_ENDPOINT: &str = "/ready";
pub const METRICS_ENDPOINT: &str = "/metrics";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct WebhookServerConfig {
    pub bind: String,
    /// Separate listener for `/metrics`; the main router serves it as well.
    pub metrics_bind: Option<String>,
    /// Shared HMAC secret; unsigned deliveries are accepted when unset.
    pub hmac_token: Option<String>,
    /// Upper bound for reading a request and producing its response.
    pub request_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl Default for WebhookServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            metrics_bind: Some("0.0.0.0:2112".to_string()),
            hmac_token: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

#[derive(Clone)]
pub struct WebhookState {
    dispatcher: Arc<Dispatcher>,
    hmac_token: Option<Arc<[u8]>>,
}

impl WebhookState {
    pub fn new(dispatcher: Arc<Dispatcher>, hmac_token: Option<&str>) -> Self {
        let hmac_token = hmac_token
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| Arc::from(token.as_bytes()));
        if hmac_token.is_none() {
            warn!("no hmac token configured, accepting unsigned webhooks");
        }
        Self {
            dispatcher,
            hmac_token,
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Verifies, parses, and dispatches one delivery.
    ///
    /// Returns the acknowledgement text; handlers keep running afterwards.
    pub async fn accept(&self, headers: &HeaderMap, body: &[u8]) -> Result<String, WebhookError> {
        if let Some(secret) = &self.hmac_token {
            verify_signature(headers, body, secret)?;
        }
        let event_type = header_value(headers, EVENT_HEADER).ok_or(WebhookError::MissingEventType)?;
        let guid = header_value(headers, DELIVERY_HEADER).unwrap_or_default();
        let hook = parse_github_webhook(event_type, guid, body)
            .map_err(|error| WebhookError::Malformed(error.to_string()))?;
        let Some(hook) = hook else {
            info!(event_type, event_guid = guid, "ignoring webhook");
            return Ok(format!("ignored {event_type}"));
        };
        let kind = hook.kind();
        let scheduled = self.dispatcher.dispatch(hook).await?;
        Ok(format!(
            "processed {} hook: {scheduled} handler(s) scheduled",
            kind.as_str()
        ))
    }
}

/// Requests still running after `request_timeout` are answered with 408.
pub fn build_router(state: WebhookState, request_timeout: Duration) -> Router {
    Router::new()
        .route(HOOK_ENDPOINT, post(handle_hook))
        .route(POLL_ENDPOINT, post(handle_hook))
        .route(HEALTH_ENDPOINT, get(handle_health))
        .route(READY_ENDPOINT, get(handle_ready))
        .route(METRICS_ENDPOINT, get(handle_metrics))
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}

pub fn build_metrics_router(metrics: WebhookMetrics) -> Router {
    Router::new()
        .route(
            METRICS_ENDPOINT,
            get(|State(metrics): State<WebhookMetrics>| async move { render_metrics(&metrics) }),
        )
        .with_state(metrics)
}

async fn handle_hook(State(state): State<WebhookState>, headers: HeaderMap, body: Bytes) -> Response {
    let response = match state.accept(&headers, &body).await {
        Ok(message) => (StatusCode::OK, message).into_response(),
        Err(error) => {
            warn!(error = %error, "rejected webhook");
            (error.status_code(), error.to_string()).into_response()
        }
    };
    state
        .dispatcher
        .metrics()
        .observe_response(response.status().as_u16());
    response
}

async fn handle_health() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn handle_ready(State(state): State<WebhookState>) -> StatusCode {
    if state.dispatcher.config_agent().is_loaded() {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn handle_metrics(State(state): State<WebhookState>) -> Response {
    render_metrics(state.dispatcher.metrics())
}

fn render_metrics(metrics: &WebhookMetrics) -> Response {
    match metrics.render() {
        Ok(text) => ([(CONTENT_TYPE, "text/plain; version=0.0.4")], text).into_response(),
        Err(error) => (StatusCode::INTERNAL_SERVER_ERROR, format!("{error:#}")).into_response(),
    }
}

/// Serves `router` until `shutdown` is cancelled.
pub async fn serve(listener: TcpListener, router: Router, shutdown: CancellationToken) -> Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("http server exited unexpectedly")
}

async fn bind(addr: &str) -> Result<TcpListener> {
    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("invalid bind address '{addr}': expected host:port"))?;
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))
}

/// Runs the webhook listener (and the metrics listener when configured)
/// until `shutdown` fires, then waits for in-flight handlers.
pub async fn run_webhook_server(
    config: WebhookServerConfig,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
) -> Result<()> {
    let listener = bind(&config.bind).await?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve webhook listen address")?;
    let metrics_task = match &config.metrics_bind {
        Some(metrics_bind) => {
            let metrics_listener = bind(metrics_bind).await?;
            info!(addr = %metrics_bind, "metrics server listening");
            let router = build_metrics_router(dispatcher.metrics().clone());
            Some(tokio::spawn(serve(metrics_listener, router, shutdown.clone())))
        }
        None => None,
    };

    info!(addr = %local_addr, plugins = dispatcher.registry().len(), "webhook server listening");
    let state = WebhookState::new(Arc::clone(&dispatcher), config.hmac_token.as_deref());
    serve(
        listener,
        build_router(state, config.request_timeout),
        shutdown.clone(),
    )
    .await?;

    info!("webhook server stopped accepting requests");
    dispatcher.shutdown(config.shutdown_grace).await;
    if let Some(task) = metrics_task {
        task.await.context("metrics server task failed")??;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use lighthouse_config::{Config, ConfigAgent, PluginConfig};
    use lighthouse_jobs::MemoryJobStore;
    use lighthouse_plugins::PluginRegistry;
    use lighthouse_scm::fake::FakeScmProvider;
    use lighthouse_scm::ScmClient;
    use reqwest::StatusCode;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_util::sync::CancellationToken;

    use super::{build_router, serve, WebhookState, DEFAULT_REQUEST_TIMEOUT};
    use crate::dispatcher::Dispatcher;
    use crate::metrics::WebhookMetrics;
    use crate::signature::{sign_sha256, DELIVERY_HEADER, EVENT_HEADER, SIGNATURE_256_HEADER};

    const SECRET: &str = "hunter2";

    fn issue_comment(body: &str) -> String {
        serde_json::json!({
            "action": "created",
            "issue": {
                "number": 3,
                "title": "Flaky test",
                "state": "open",
                "user": {"login": "author"},
                "pull_request": {"url": "https://api.github.com/repos/org/repo/pulls/3"}
            },
            "comment": {"id": 11, "body": body, "user": {"login": "carol"}},
            "repository": {"name": "repo", "full_name": "org/repo", "owner": {"login": "org"}}
        })
        .to_string()
    }

    struct TestServer {
        base: String,
        dispatcher: Arc<Dispatcher>,
        fake: Arc<FakeScmProvider>,
        shutdown: CancellationToken,
        task: tokio::task::JoinHandle<anyhow::Result<()>>,
    }

    async fn start() -> TestServer {
        start_with_timeout(DEFAULT_REQUEST_TIMEOUT).await
    }

    async fn start_with_timeout(request_timeout: Duration) -> TestServer {
        let fake = Arc::new(FakeScmProvider::new());
        let plugins = PluginConfig::from_yaml("plugins:\n  org/repo: [hold]\n").expect("plugins");
        let dispatcher = Arc::new(Dispatcher::new(
            ScmClient::new(fake.clone()),
            Arc::new(ConfigAgent::from_parts(Config::default(), plugins)),
            PluginRegistry::builtin().expect("registry"),
            Arc::new(MemoryJobStore::new()),
            WebhookMetrics::new().expect("metrics"),
        ));
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let base = format!("http://{}", listener.local_addr().expect("addr"));
        let shutdown = CancellationToken::new();
        let router = build_router(
            WebhookState::new(Arc::clone(&dispatcher), Some(SECRET)),
            request_timeout,
        );
        let task = tokio::spawn(serve(listener, router, shutdown.clone()));
        TestServer {
            base,
            dispatcher,
            fake,
            shutdown,
            task,
        }
    }

    async fn post(server: &TestServer, event: &str, body: String, signed: bool) -> (StatusCode, String) {
        let mut request = reqwest::Client::new()
            .post(format!("{}/hook", server.base))
            .header(EVENT_HEADER, event)
            .header(DELIVERY_HEADER, "delivery-1");
        if signed {
            let signature = sign_sha256(SECRET.as_bytes(), body.as_bytes()).expect("sign");
            request = request.header(SIGNATURE_256_HEADER, signature);
        }
        let response = request.body(body).send().await.expect("send");
        let status = response.status();
        (status, response.text().await.expect("body"))
    }

    #[tokio::test]
    async fn integration_signed_comment_is_processed() {
        let server = start().await;

        let (status, text) = post(&server, "issue_comment", issue_comment("/hold"), true).await;
        assert_eq!(status, StatusCode::OK);
        assert!(text.starts_with("processed issue_comment hook"), "{text}");

        server.dispatcher.drain().await;
        assert_eq!(
            server.fake.snapshot().issue_labels_added,
            vec!["org/repo#3:do-not-merge/hold".to_string()]
        );

        server.shutdown.cancel();
        server.task.await.expect("join").expect("serve");
    }

    #[tokio::test]
    async fn integration_rejections_and_ignored_events() {
        let server = start().await;

        let (status, _) = post(&server, "issue_comment", issue_comment("/hold"), false).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = post(&server, "issue_comment", "{not json".to_string(), true).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let (status, text) = post(&server, "ping", r#"{"zen":"hi"}"#.to_string(), true).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(text, "ignored ping");

        let body = issue_comment("/hold");
        let signature = sign_sha256(SECRET.as_bytes(), body.as_bytes()).expect("sign");
        let response = reqwest::Client::new()
            .post(format!("{}/hook", server.base))
            .header(SIGNATURE_256_HEADER, signature)
            .body(body)
            .send()
            .await
            .expect("send");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let metrics = reqwest::get(format!("{}/metrics", server.base))
            .await
            .expect("metrics")
            .text()
            .await
            .expect("text");
        assert!(metrics.contains(r#"lighthouse_webhook_response_codes{code="401"} 1"#));
        assert!(metrics.contains(r#"lighthouse_webhook_response_codes{code="200"} 1"#));

        server.shutdown.cancel();
        server.task.await.expect("join").expect("serve");
    }

    #[tokio::test]
    async fn functional_health_and_ready() {
        let server = start().await;
        let health = reqwest::get(format!("{}/health", server.base)).await.expect("health");
        assert_eq!(health.status(), StatusCode::NO_CONTENT);
        let ready = reqwest::get(format!("{}/ready", server.base)).await.expect("ready");
        assert_eq!(ready.status(), StatusCode::NO_CONTENT);

        server.shutdown.cancel();
        server.task.await.expect("join").expect("serve");
    }

    #[tokio::test]
    async fn regression_stalled_request_body_times_out() {
        let server = start_with_timeout(Duration::from_millis(200)).await;
        let addr = server.base.trim_start_matches("http://").to_string();

        let mut stream = TcpStream::connect(&addr).await.expect("connect");
        stream
            .write_all(
                b"POST /hook HTTP/1.1\r\nHost: lighthouse\r\nX-GitHub-Event: ping\r\nContent-Length: 64\r\n\r\n{\"zen\"",
            )
            .await
            .expect("write");

        let mut response = Vec::new();
        let mut chunk = [0_u8; 512];
        let read = tokio::time::timeout(Duration::from_secs(5), async {
            while !response.windows(4).any(|window| window == b"\r\n\r\n") {
                let n = stream.read(&mut chunk).await.expect("read");
                if n == 0 {
                    break;
                }
                response.extend_from_slice(&chunk[..n]);
            }
        })
        .await;
        assert!(read.is_ok(), "server kept the stalled request open");
        let response = String::from_utf8_lossy(&response);
        assert!(response.starts_with("HTTP/1.1 408"), "{response}");
        drop(stream);

        server.shutdown.cancel();
        server.task.await.expect("join").expect("serve");
    }
}
