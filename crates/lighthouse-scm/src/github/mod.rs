//! GitHub implementation of the provider capability set.

mod client;
mod model;
mod transport;
mod webhook;

pub use client::{GithubProviderConfig, GithubScmProvider};
pub use webhook::{parse_github_webhook, render_github_pull_request, render_github_push};
