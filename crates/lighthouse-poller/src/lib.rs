//! Polling controller for repositories whose webhooks are missing or
//! unreliable.
//!
//! Each tick compares the current default-branch head and open pull requests
//! against the last values seen and synthesizes the push or pull request
//! webhook a provider would have sent, delivered over loopback HTTP or
//! straight into an in-process [`Dispatcher`](lighthouse_webhook::Dispatcher).

pub mod controller;
pub mod notifier;
pub mod state;

pub use controller::{PollerConfig, PollerMetrics, PollingController};
pub use notifier::{DispatchNotifier, HttpNotifier, Notifier, DEFAULT_POLL_HOOK_ENDPOINT};
pub use state::{MemoryPollState, PollState};
