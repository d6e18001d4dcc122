use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use lighthouse_core::truncate_for_error;
use lighthouse_scm::github::{render_github_pull_request, render_github_push};
use lighthouse_scm::{PullRequestHook, PushHook, Webhook};
use lighthouse_webhook::{
    sign_sha1, sign_sha256, Dispatcher, DELIVERY_HEADER, EVENT_HEADER, SIGNATURE_256_HEADER,
    SIGNATURE_HEADER,
};
use tracing::debug;

pub const DEFAULT_POLL_HOOK_ENDPOINT: &str = "http://localhost:8080/poll";

/// Delivers synthesized events to the dispatch engine.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_push(&self, hook: &PushHook) -> Result<()>;

    async fn notify_pull_request(&self, hook: &PullRequestHook) -> Result<()>;
}

/// Posts GitHub-shaped payloads to the webhook server's `/poll` endpoint.
pub struct HttpNotifier {
    client: reqwest::Client,
    endpoint: String,
    hmac_token: Option<String>,
}

impl HttpNotifier {
    pub fn new(endpoint: impl Into<String>, hmac_token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to construct reqwest client for poll notifier")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            hmac_token: hmac_token.filter(|token| !token.trim().is_empty()),
        })
    }

    async fn post(&self, event_type: &str, guid: &str, payload: serde_json::Value) -> Result<()> {
        let body = serde_json::to_vec(&payload).context("failed to encode poll payload")?;
        let mut request = self
            .client
            .post(&self.endpoint)
            .header(EVENT_HEADER, event_type)
            .header(DELIVERY_HEADER, guid)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(token) = &self.hmac_token {
            request = request
                .header(SIGNATURE_256_HEADER, sign_sha256(token.as_bytes(), &body)?)
                .header(SIGNATURE_HEADER, sign_sha1(token.as_bytes(), &body)?);
        }
        let response = request
            .body(body)
            .send()
            .await
            .with_context(|| format!("failed to post {event_type} event to {}", self.endpoint))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!(
                "poll endpoint {} returned {status}: {}",
                self.endpoint,
                truncate_for_error(&text, 200)
            );
        }
        debug!(event_type, event_guid = guid, "delivered poll event");
        Ok(())
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify_push(&self, hook: &PushHook) -> Result<()> {
        self.post("push", &hook.guid, render_github_push(hook)).await
    }

    async fn notify_pull_request(&self, hook: &PullRequestHook) -> Result<()> {
        self.post("pull_request", &hook.guid, render_github_pull_request(hook))
            .await
    }
}

/// Hands events straight to an in-process dispatcher.
pub struct DispatchNotifier {
    dispatcher: Arc<Dispatcher>,
}

impl DispatchNotifier {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl Notifier for DispatchNotifier {
    async fn notify_push(&self, hook: &PushHook) -> Result<()> {
        self.dispatcher.dispatch(Webhook::Push(hook.clone())).await?;
        Ok(())
    }

    async fn notify_pull_request(&self, hook: &PullRequestHook) -> Result<()> {
        self.dispatcher
            .dispatch(Webhook::PullRequest(hook.clone()))
            .await?;
        Ok(())
    }
}
