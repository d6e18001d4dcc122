//! Provider capability set consumed by Lighthouse plugins.
//!
//! Defines the normalized repository/issue/pull-request model, the webhook
//! variants the dispatcher classifies events into, the `ScmProvider` trait,
//! and the `ScmClient` facade that emulates PR labels through a tracking
//! comment when a provider cannot label pull requests.

pub mod client;
pub mod error;
pub mod github;
pub mod hooks;
pub mod label_report;
pub mod provider;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use client::ScmClient;
pub use error::{ScmError, ScmResult};
pub use hooks::{
    Action, BranchHook, IssueCommentHook, IssueHook, PullRequestCommentHook, PullRequestHook,
    PushCommit, PushHook, ReviewHook, Webhook, WebhookKind,
};
pub use provider::ScmProvider;
pub use types::*;
