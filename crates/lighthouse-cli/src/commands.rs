use std::sync::Arc;

use anyhow::{Context, Result};
use lighthouse_config::{ConfigAgent, DirConfigStore, InRepoResolver};
use lighthouse_jobs::{MemoryJobStore, Reconciler};
use lighthouse_plugins::{render_help_markdown, PluginRegistry};
use lighthouse_poller::{
    DispatchNotifier, HttpNotifier, MemoryPollState, PollerMetrics, PollingController,
};
use lighthouse_webhook::{
    build_metrics_router, run_webhook_server, serve, Dispatcher, WebhookMetrics,
    WebhookServerConfig,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bootstrap::{build_browser, build_scm, poller_config};
use crate::cli_args::{PollerArgs, WebhooksArgs};

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

async fn join_background(name: &str, task: Option<JoinHandle<Result<()>>>) {
    let Some(task) = task else {
        return;
    };
    match task.await {
        Ok(Ok(())) => {}
        Ok(Err(error)) => warn!(task = name, error = %format!("{error:#}"), "background task failed"),
        Err(error) => warn!(task = name, error = %error, "background task panicked"),
    }
}

pub(crate) async fn run_webhooks(args: WebhooksArgs, shutdown: CancellationToken) -> Result<()> {
    let scm = build_scm(&args.provider)?;
    let browser = build_browser(&args.provider)?;
    let store = DirConfigStore::new(&args.config_dir);
    let config_agent = Arc::new(ConfigAgent::start(&store).await.with_context(|| {
        format!(
            "failed to load configuration from {}",
            args.config_dir.display()
        )
    })?);
    let metrics = WebhookMetrics::new()?;
    let jobs = Arc::new(MemoryJobStore::new());
    let registry = PluginRegistry::builtin().context("failed to build plugin registry")?;
    info!(plugins = registry.len(), "plugin registry ready");

    let mut dispatcher = Dispatcher::new(
        scm.clone(),
        Arc::clone(&config_agent),
        registry,
        jobs.clone(),
        metrics.clone(),
    )
    .with_resolver(Arc::new(InRepoResolver::new(browser.clone())));
    if let Some(server_url) = non_empty(args.server_url.as_deref()) {
        dispatcher = dispatcher.with_server_url(server_url);
    }
    let dispatcher = Arc::new(dispatcher);

    let reconciler_task = if args.disable_reconciler {
        None
    } else {
        let namespace = non_empty(args.namespace.as_deref())
            .unwrap_or_else(|| config_agent.config().lighthouse_job_namespace.clone());
        let reconciler = Reconciler::new(jobs, scm.clone(), Arc::clone(&config_agent), namespace);
        let token = shutdown.clone();
        Some(tokio::spawn(async move { reconciler.run(token).await }))
    };

    let poller_task = if args.poll {
        let controller = PollingController::new(
            poller_config(&args.polling, &args.provider.git_server)?,
            browser.clone(),
            scm,
            Arc::new(MemoryPollState::new()),
            Arc::new(DispatchNotifier::new(Arc::clone(&dispatcher))),
        )
        .with_metrics(PollerMetrics::new(metrics.registry())?);
        let token = shutdown.clone();
        Some(tokio::spawn(async move { controller.run(token).await }))
    } else {
        None
    };

    let server_config = WebhookServerConfig {
        bind: args.bind,
        metrics_bind: non_empty(Some(args.metrics_bind.as_str())),
        hmac_token: non_empty(args.hmac_token.as_deref()),
        request_timeout: args.request_timeout,
        shutdown_grace: args.shutdown_grace,
    };
    if server_config.hmac_token.is_none() {
        warn!("no HMAC token configured, accepting unsigned webhooks");
    }
    let result = run_webhook_server(server_config, dispatcher, shutdown.clone()).await;

    shutdown.cancel();
    join_background("reconciler", reconciler_task).await;
    join_background("poller", poller_task).await;
    config_agent.stop().await;
    result
}

pub(crate) async fn run_poller(args: PollerArgs, shutdown: CancellationToken) -> Result<()> {
    let scm = build_scm(&args.provider)?;
    let browser = build_browser(&args.provider)?;
    let metrics = WebhookMetrics::new()?;
    let notifier = HttpNotifier::new(
        args.hook_endpoint.clone(),
        non_empty(args.hmac_token.as_deref()),
    )?;
    let controller = PollingController::new(
        poller_config(&args.polling, &args.provider.git_server)?,
        browser,
        scm,
        Arc::new(MemoryPollState::new()),
        Arc::new(notifier),
    )
    .with_metrics(PollerMetrics::new(metrics.registry())?);
    info!(
        repositories = controller.config().repositories.len(),
        endpoint = %args.hook_endpoint,
        "poller starting"
    );

    let metrics_task = match non_empty(args.metrics_bind.as_deref()) {
        Some(bind) => {
            let listener = TcpListener::bind(&bind)
                .await
                .with_context(|| format!("failed to bind metrics listener on {bind}"))?;
            info!(addr = %bind, "metrics server listening");
            let token = shutdown.clone();
            Some(tokio::spawn(serve(
                listener,
                build_metrics_router(metrics),
                token,
            )))
        }
        None => None,
    };

    let result = controller.run(shutdown.clone()).await;
    shutdown.cancel();
    join_background("metrics", metrics_task).await;
    result
}

pub(crate) fn plugin_help() -> Result<String> {
    let registry = PluginRegistry::builtin().context("failed to build plugin registry")?;
    Ok(render_help_markdown(&registry.all_help()))
}
