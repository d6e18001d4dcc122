use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};
use lighthouse_core::RepoRef;
use lighthouse_poller::DEFAULT_POLL_HOOK_ENDPOINT;

pub(crate) fn parse_duration(value: &str) -> Result<Duration, String> {
    let trimmed = value.trim();
    let split = trimmed
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);
    let amount = digits
        .parse::<u64>()
        .map_err(|error| format!("failed to parse duration '{value}': {error}"))?;
    let duration = match unit {
        "ms" => Duration::from_millis(amount),
        "" | "s" => Duration::from_secs(amount),
        "m" => Duration::from_secs(amount.saturating_mul(60)),
        "h" => Duration::from_secs(amount.saturating_mul(3_600)),
        other => return Err(format!("unknown duration unit '{other}', expected ms, s, m or h")),
    };
    if duration.is_zero() {
        return Err("duration must be greater than 0".to_string());
    }
    Ok(duration)
}

fn parse_repository(value: &str) -> Result<RepoRef, String> {
    RepoRef::parse(value).map_err(|error| error.to_string())
}

#[derive(Debug, Parser)]
#[command(
    name = "lighthouse",
    version,
    about = "ChatOps webhook gateway: plugins, pipeline triggering and repository polling"
)]
pub struct Cli {
    #[arg(
        long = "log-json",
        env = "LOG_JSON",
        global = true,
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Emit logs as JSON lines instead of compact text"
    )]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the webhook endpoint and dispatch events to plugins.
    Webhooks(WebhooksArgs),
    /// Poll repositories and post synthesized events to a webhook server.
    Poller(PollerArgs),
    /// Print the built-in plugin reference as markdown.
    PluginHelp,
}

#[derive(Debug, Clone, Args)]
pub struct ProviderArgs {
    #[arg(
        long = "git-kind",
        env = "GIT_KIND",
        default_value = "github",
        help = "Git provider kind; only github is supported"
    )]
    pub git_kind: String,

    #[arg(
        long = "git-server",
        env = "GIT_SERVER",
        default_value = "https://github.com",
        help = "Web root of the git provider, used for links and clone URLs"
    )]
    pub git_server: String,

    #[arg(
        long = "git-api-base",
        env = "GIT_API_BASE",
        help = "REST API root; derived from --git-server when unset"
    )]
    pub git_api_base: Option<String>,

    #[arg(long = "git-user", env = "GIT_USER", default_value = "", help = "Git user for clones")]
    pub git_user: String,

    #[arg(
        long = "git-token",
        env = "GIT_TOKEN",
        default_value = "",
        hide_env_values = true,
        help = "Token used for provider API calls and clones"
    )]
    pub git_token: String,

    #[arg(
        long = "bot-name",
        env = "BOT_NAME",
        help = "Login of the bot account; defaults to --git-user"
    )]
    pub bot_name: Option<String>,

    #[arg(
        long = "git-clone-path-prefix",
        env = "GIT_CLONE_PATH_PREFIX",
        default_value = "",
        help = "Path inserted between the server and owner/repo in clone URLs"
    )]
    pub git_clone_path_prefix: String,

    #[arg(
        long = "sparse-checkout",
        env = "SPARSE_CHECKOUT",
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Check out only the .lighthouse directory when reading in-repo configuration"
    )]
    pub sparse_checkout: bool,
}

#[derive(Debug, Clone, Args)]
pub struct PollingArgs {
    #[arg(
        long = "poll-period",
        env = "POLL_PERIOD",
        default_value = "20s",
        value_parser = parse_duration,
        help = "Default period for both polling operations"
    )]
    pub poll_period: Duration,

    #[arg(
        long = "poll-release-period",
        env = "POLL_RELEASE_PERIOD",
        value_parser = parse_duration,
        help = "Override the release polling period"
    )]
    pub poll_release_period: Option<Duration>,

    #[arg(
        long = "poll-pull-request-period",
        env = "POLL_PULL_REQUEST_PERIOD",
        value_parser = parse_duration,
        help = "Override the pull request polling period"
    )]
    pub poll_pull_request_period: Option<Duration>,

    #[arg(
        long = "poll-repository",
        env = "POLL_REPOSITORIES",
        value_delimiter = ',',
        value_parser = parse_repository,
        help = "Repositories to poll in owner/repo form"
    )]
    pub repositories: Vec<RepoRef>,

    #[arg(long = "disable-release-poll", default_value_t = false, help = "Skip release polling")]
    pub disable_release_poll: bool,

    #[arg(
        long = "disable-pr-poll",
        default_value_t = false,
        help = "Skip pull request polling"
    )]
    pub disable_pr_poll: bool,

    #[arg(
        long = "require-release-success",
        default_value_t = false,
        help = "Only report a release once its commit statuses succeeded"
    )]
    pub require_release_success: bool,

    #[arg(
        long = "context-match-pattern",
        help = "Regex selecting the status contexts checked by --require-release-success"
    )]
    pub context_match_pattern: Option<String>,

    #[arg(long = "run-once", default_value_t = false, help = "Poll once and exit")]
    pub run_once: bool,
}

#[derive(Debug, Clone, Args)]
pub struct WebhooksArgs {
    #[command(flatten)]
    pub provider: ProviderArgs,

    #[arg(
        long = "hmac-token",
        env = "HMAC_TOKEN",
        hide_env_values = true,
        help = "Shared webhook secret; unsigned deliveries are accepted when unset"
    )]
    pub hmac_token: Option<String>,

    #[arg(long, env = "BIND", default_value = "0.0.0.0:8080", help = "Webhook listen address")]
    pub bind: String,

    #[arg(
        long = "metrics-bind",
        env = "METRICS_BIND",
        default_value = "0.0.0.0:2112",
        help = "Separate metrics listen address; empty disables it"
    )]
    pub metrics_bind: String,

    #[arg(
        long = "config-dir",
        env = "CONFIG_DIR",
        default_value = "/etc/lighthouse",
        help = "Directory holding config/config.yaml and plugins/plugins.yaml"
    )]
    pub config_dir: PathBuf,

    #[arg(
        long,
        env = "LIGHTHOUSE_NAMESPACE",
        help = "Job namespace the reconciler watches; defaults to lighthouse_job_namespace"
    )]
    pub namespace: Option<String>,

    #[arg(
        long = "server-url",
        env = "LIGHTHOUSE_SERVER_URL",
        help = "Server URL used in links written by plugins"
    )]
    pub server_url: Option<String>,

    #[arg(
        long = "request-timeout",
        env = "REQUEST_TIMEOUT",
        default_value = "10s",
        value_parser = parse_duration,
        help = "Longest time one HTTP request may take before it is answered with 408"
    )]
    pub request_timeout: Duration,

    #[arg(
        long = "shutdown-grace",
        default_value = "30s",
        value_parser = parse_duration,
        help = "Time allowed for running handlers to finish on shutdown"
    )]
    pub shutdown_grace: Duration,

    #[arg(
        long = "disable-reconciler",
        default_value_t = false,
        help = "Do not mirror job state onto commit statuses"
    )]
    pub disable_reconciler: bool,

    #[arg(
        long,
        default_value_t = false,
        help = "Also poll --poll-repository targets and dispatch in process"
    )]
    pub poll: bool,

    #[command(flatten)]
    pub polling: PollingArgs,
}

#[derive(Debug, Clone, Args)]
pub struct PollerArgs {
    #[command(flatten)]
    pub provider: ProviderArgs,

    #[command(flatten)]
    pub polling: PollingArgs,

    #[arg(
        long = "hmac-token",
        env = "HMAC_TOKEN",
        hide_env_values = true,
        help = "Secret used to sign posted events"
    )]
    pub hmac_token: Option<String>,

    #[arg(
        long = "poll-hook-endpoint",
        env = "POLL_HOOK_ENDPOINT",
        default_value = DEFAULT_POLL_HOOK_ENDPOINT,
        help = "Webhook server endpoint receiving synthesized events"
    )]
    pub hook_endpoint: String,

    #[arg(
        long = "metrics-bind",
        env = "METRICS_BIND",
        help = "Optional metrics listen address"
    )]
    pub metrics_bind: Option<String>,
}
