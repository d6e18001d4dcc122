use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use lighthouse_git::{GitBrowserConfig, GitFileBrowser};
use lighthouse_poller::PollerConfig;
use lighthouse_scm::github::{GithubProviderConfig, GithubScmProvider};
use lighthouse_scm::ScmClient;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::cli_args::{PollingArgs, ProviderArgs};

pub(crate) fn init_tracing(json: bool) -> Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);
    let initialized = if json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
    initialized.map_err(|error| anyhow!("failed to initialize tracing: {error}"))
}

/// Token cancelled on SIGINT or SIGTERM.
pub(crate) fn shutdown_token() -> Result<CancellationToken> {
    #[cfg(unix)]
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("failed to install SIGTERM handler")?;

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        let terminated = terminate.recv();
        #[cfg(not(unix))]
        let terminated = std::future::pending::<Option<()>>();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminated => {}
        }
        info!("shutdown signal received");
        trigger.cancel();
    });
    Ok(token)
}

/// REST root for a GitHub web root: the public API, or `/api/v3` on Enterprise.
pub(crate) fn github_api_base(server: &str) -> String {
    let server = server.trim_end_matches('/');
    match server {
        "https://github.com" | "http://github.com" => "https://api.github.com".to_string(),
        _ => format!("{server}/api/v3"),
    }
}

fn bot_name(args: &ProviderArgs) -> String {
    args.bot_name
        .clone()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| args.git_user.clone())
}

pub(crate) fn build_scm(args: &ProviderArgs) -> Result<ScmClient> {
    let kind = args.git_kind.trim().to_ascii_lowercase();
    if kind != "github" {
        bail!("unsupported git kind '{}': only github is available", args.git_kind);
    }
    let provider = GithubScmProvider::new(GithubProviderConfig {
        api_base: args
            .git_api_base
            .clone()
            .unwrap_or_else(|| github_api_base(&args.git_server)),
        server_url: args.git_server.clone(),
        token: args.git_token.clone(),
        bot_name: bot_name(args),
        ..GithubProviderConfig::default()
    })
    .context("failed to construct github provider")?;
    Ok(ScmClient::new(Arc::new(provider)))
}

pub(crate) fn build_browser(args: &ProviderArgs) -> Result<Arc<GitFileBrowser>> {
    let browser = GitFileBrowser::new(GitBrowserConfig {
        server_url: args.git_server.clone(),
        user: args.git_user.clone(),
        token: args.git_token.clone(),
        clone_path_prefix: args.git_clone_path_prefix.clone(),
        sparse_checkout: args.sparse_checkout,
        ..GitBrowserConfig::default()
    })
    .context("failed to prepare git clone cache")?;
    info!(cache_dir = %browser.cache_dir().display(), "git clone cache ready");
    Ok(Arc::new(browser))
}

pub(crate) fn poller_config(args: &PollingArgs, server_url: &str) -> Result<PollerConfig> {
    let context_match_pattern = args
        .context_match_pattern
        .as_deref()
        .filter(|pattern| !pattern.trim().is_empty())
        .map(Regex::new)
        .transpose()
        .context("invalid --context-match-pattern")?;
    Ok(PollerConfig {
        repositories: args.repositories.clone(),
        release_period: args.poll_release_period.unwrap_or(args.poll_period),
        pull_request_period: args.poll_pull_request_period.unwrap_or(args.poll_period),
        disable_release_poll: args.disable_release_poll,
        disable_pr_poll: args.disable_pr_poll,
        require_release_success: args.require_release_success,
        context_match_pattern,
        run_once: args.run_once,
        server_url: server_url.to_string(),
    })
}
