//! Webhook dispatch engine.
//!
//! Verifies and parses provider deliveries, builds a per-event [`Agent`]
//! (with in-repo configuration when enabled), and fans the event out to every
//! enabled plugin on background tasks. The HTTP surface lives in [`server`].
//!
//! [`Agent`]: lighthouse_plugins::Agent

pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod server;
pub mod signature;

pub use dispatcher::Dispatcher;
pub use error::WebhookError;
pub use metrics::WebhookMetrics;
pub use server::{
    build_metrics_router, build_router, run_webhook_server, serve, WebhookServerConfig,
    WebhookState, DEFAULT_REQUEST_TIMEOUT,
};
pub use signature::{
    sign_sha1, sign_sha256, verify_signature, DELIVERY_HEADER, EVENT_HEADER, SIGNATURE_256_HEADER,
    SIGNATURE_HEADER,
};
