use anyhow::{Context, Result};
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

/// Prometheus counters for the dispatch engine.
///
/// Other components (the poller) register their own collectors into the same
/// [`Registry`] so one `/metrics` endpoint exposes everything.
#[derive(Clone)]
pub struct WebhookMetrics {
    registry: Registry,
    webhooks: IntCounterVec,
    response_codes: IntCounterVec,
    handler_errors: IntCounterVec,
}

impl WebhookMetrics {
    pub fn new() -> Result<Self> {
        Self::with_registry(Registry::new())
    }

    pub fn with_registry(registry: Registry) -> Result<Self> {
        let webhooks = IntCounterVec::new(
            Opts::new("lighthouse_webhook_counter", "Webhook deliveries by event type"),
            &["event_type"],
        )?;
        let response_codes = IntCounterVec::new(
            Opts::new("lighthouse_webhook_response_codes", "Webhook responses by HTTP status"),
            &["code"],
        )?;
        let handler_errors = IntCounterVec::new(
            Opts::new("lighthouse_plugin_handler_errors", "Failed plugin handler invocations"),
            &["plugin"],
        )?;
        registry
            .register(Box::new(webhooks.clone()))
            .context("failed to register webhook counter")?;
        registry
            .register(Box::new(response_codes.clone()))
            .context("failed to register response code counter")?;
        registry
            .register(Box::new(handler_errors.clone()))
            .context("failed to register handler error counter")?;
        Ok(Self {
            registry,
            webhooks,
            response_codes,
            handler_errors,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn observe_webhook(&self, event_type: &str) {
        self.webhooks.with_label_values(&[event_type]).inc();
    }

    pub fn observe_response(&self, code: u16) {
        self.response_codes
            .with_label_values(&[code.to_string().as_str()])
            .inc();
    }

    pub fn observe_handler_error(&self, plugin: &str) {
        self.handler_errors.with_label_values(&[plugin]).inc();
    }

    pub fn webhook_count(&self, event_type: &str) -> u64 {
        self.webhooks.with_label_values(&[event_type]).get()
    }

    pub fn handler_error_count(&self, plugin: &str) -> u64 {
        self.handler_errors.with_label_values(&[plugin]).get()
    }

    /// Prometheus text exposition of every registered collector.
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .context("failed to encode metrics")?;
        String::from_utf8(buffer).context("metrics exposition is not utf-8")
    }
}

#[cfg(test)]
mod tests {
    use super::WebhookMetrics;

    #[test]
    fn unit_render_includes_observed_series() {
        let metrics = WebhookMetrics::new().expect("metrics");
        metrics.observe_webhook("push");
        metrics.observe_webhook("push");
        metrics.observe_response(200);
        metrics.observe_handler_error("hold");

        assert_eq!(metrics.webhook_count("push"), 2);
        let text = metrics.render().expect("render");
        assert!(text.contains(r#"lighthouse_webhook_counter{event_type="push"} 2"#));
        assert!(text.contains(r#"lighthouse_webhook_response_codes{code="200"} 1"#));
        assert!(text.contains(r#"lighthouse_plugin_handler_errors{plugin="hold"} 1"#));
    }
}
