//! Fans a normalized webhook out to the enabled plugins.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use lighthouse_config::{ConfigAgent, InRepoResolver};
use lighthouse_core::RepoRef;
use lighthouse_git::FetchCache;
use lighthouse_jobs::JobStore;
use lighthouse_plugins::{
    matching_commands, Agent, GenericCommentEvent, HandlerKind, Plugin, PluginRegistry,
};
use lighthouse_scm::{ScmClient, Webhook};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn, Instrument, Span};

use crate::metrics::WebhookMetrics;

pub struct Dispatcher {
    scm: ScmClient,
    config_agent: Arc<ConfigAgent>,
    resolver: Option<Arc<InRepoResolver>>,
    registry: PluginRegistry,
    jobs: Arc<dyn JobStore>,
    metrics: WebhookMetrics,
    tracker: TaskTracker,
    server_url: String,
}

impl Dispatcher {
    pub fn new(
        scm: ScmClient,
        config_agent: Arc<ConfigAgent>,
        registry: PluginRegistry,
        jobs: Arc<dyn JobStore>,
        metrics: WebhookMetrics,
    ) -> Self {
        let server_url = scm.server_url().to_string();
        Self {
            scm,
            config_agent,
            resolver: None,
            registry,
            jobs,
            metrics,
            tracker: TaskTracker::new(),
            server_url,
        }
    }

    /// Enables in-repo configuration for repositories that opt in.
    pub fn with_resolver(mut self, resolver: Arc<InRepoResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_server_url(mut self, server_url: impl Into<String>) -> Self {
        self.server_url = server_url.into();
        self
    }

    pub fn metrics(&self) -> &WebhookMetrics {
        &self.metrics
    }

    pub fn config_agent(&self) -> &Arc<ConfigAgent> {
        &self.config_agent
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Handler tasks still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Agent for an event on `repo` at `reference`.
    ///
    /// Repositories with in-repo configuration enabled get the base snapshots
    /// merged with their `.lighthouse/` files at `reference`; the resolver
    /// caches full SHAs only. Every call uses its own fetch cache.
    pub async fn create_agent(&self, repo: &RepoRef, reference: &str, guid: &str) -> Result<Agent> {
        let config = self.config_agent.config();
        let plugins = self.config_agent.plugins();
        let (config, plugins) = match &self.resolver {
            Some(resolver) if config.in_repo_config_enabled(&repo.full_name()) => {
                let fetch_cache = FetchCache::new();
                let resolved = resolver
                    .resolve(config, plugins, repo, reference, &fetch_cache)
                    .await
                    .with_context(|| format!("failed to resolve in-repo config for {repo}"))?;
                (resolved.config, resolved.plugins)
            }
            _ => (config, plugins),
        };
        Ok(Agent::new(self.scm.clone(), config, plugins, Arc::clone(&self.jobs))
            .with_server_url(self.server_url.clone())
            .with_guid(guid))
    }

    /// Schedules every handler the event reaches and returns how many were
    /// started. Handlers finish in the background.
    pub async fn dispatch(&self, hook: Webhook) -> Result<usize> {
        let kind = hook.kind();
        self.metrics.observe_webhook(kind.as_str());
        let repo = hook.repository().clone();
        let repo_ref = repo.repo_ref();
        let guid = hook.guid().to_string();

        let mut event = GenericCommentEvent::from_webhook(&hook);
        let mut reference = hook.event_ref().to_string();
        if let (Webhook::IssueComment(comment), Some(event)) = (&hook, event.as_mut()) {
            if comment.issue.pull_request && event.head_sha.is_empty() {
                match self.scm.get_pull_request(&repo_ref, comment.issue.number).await {
                    Ok(pr) => {
                        reference = pr.sha.clone();
                        event.head_sha = pr.sha;
                    }
                    Err(error) => {
                        warn!(
                            repo = %repo_ref,
                            pr = comment.issue.number,
                            error = %error,
                            "failed to look up pull request head for comment"
                        );
                    }
                }
            }
        }

        let agent = self
            .create_agent(&repo_ref, &reference, &guid)
            .await
            .with_context(|| format!("failed to create agent for {repo_ref} at {reference:?}"))?;
        let plugins = self
            .registry
            .enabled_for(&agent.plugin_config, &repo.namespace, &repo.name);
        info!(
            event_type = kind.as_str(),
            org = %repo.namespace,
            repo = %repo.name,
            event_guid = %guid,
            plugins = plugins.len(),
            "dispatching webhook"
        );

        let hook = Arc::new(hook);
        let event = event.map(Arc::new);
        let mut scheduled = 0_usize;
        for plugin in &plugins {
            scheduled += self.schedule_typed(plugin, &agent, &hook);
            if let Some(event) = &event {
                scheduled += self.schedule_comment(plugin, &agent, event);
            }
        }
        debug!(event_guid = %guid, scheduled, "scheduled plugin handlers");
        Ok(scheduled)
    }

    fn schedule_typed(&self, plugin: &Arc<dyn Plugin>, agent: &Agent, hook: &Arc<Webhook>) -> usize {
        let (kind, number, is_pr) = match hook.as_ref() {
            Webhook::Push(_) => (HandlerKind::Push, None, false),
            Webhook::PullRequest(hook) => (HandlerKind::PullRequest, Some(hook.pull_request.number), true),
            Webhook::Review(hook) => (HandlerKind::Review, Some(hook.pull_request.number), true),
            Webhook::Issue(hook) => (HandlerKind::Issue, Some(hook.issue.number), hook.issue.pull_request),
            Webhook::IssueComment(_) | Webhook::PullRequestComment(_) | Webhook::Branch(_) => return 0,
        };
        if !plugin.handles(kind) {
            return 0;
        }
        let plugin_agent = agent.for_plugin(plugin.name(), hook.repository(), number, is_pr);
        let span = plugin_agent.span().clone();
        let task_plugin = Arc::clone(plugin);
        let task_hook = Arc::clone(hook);
        self.spawn(plugin.name(), span, async move {
            match task_hook.as_ref() {
                Webhook::Push(hook) => task_plugin.handle_push(&plugin_agent, hook).await,
                Webhook::PullRequest(hook) => task_plugin.handle_pull_request(&plugin_agent, hook).await,
                Webhook::Review(hook) => task_plugin.handle_review(&plugin_agent, hook).await,
                Webhook::Issue(hook) => task_plugin.handle_issue(&plugin_agent, hook).await,
                Webhook::IssueComment(_) | Webhook::PullRequestComment(_) | Webhook::Branch(_) => Ok(()),
            }
        });
        1
    }

    fn schedule_comment(
        &self,
        plugin: &Arc<dyn Plugin>,
        agent: &Agent,
        event: &Arc<GenericCommentEvent>,
    ) -> usize {
        let mut scheduled = 0_usize;
        if plugin.handles(HandlerKind::GenericComment) {
            let plugin_agent = agent.for_plugin(plugin.name(), &event.repo, Some(event.number), event.is_pr);
            let span = plugin_agent.span().clone();
            let task_plugin = Arc::clone(plugin);
            let task_event = Arc::clone(event);
            self.spawn(plugin.name(), span, async move {
                task_plugin
                    .handle_generic_comment(&plugin_agent, &task_event)
                    .await
            });
            scheduled += 1;
        }
        for matched in matching_commands(plugin.as_ref(), event) {
            let plugin_agent = agent.for_plugin(plugin.name(), &event.repo, Some(event.number), event.is_pr);
            let span = plugin_agent.span().clone();
            let task_plugin = Arc::clone(plugin);
            let task_event = Arc::clone(event);
            self.spawn(plugin.name(), span, async move {
                task_plugin
                    .handle_command(&matched, &plugin_agent, &task_event)
                    .await
            });
            scheduled += 1;
        }
        scheduled
    }

    fn spawn<F>(&self, plugin: &'static str, span: Span, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let metrics = self.metrics.clone();
        self.tracker.spawn(
            async move {
                if let Err(error) = task.await {
                    metrics.observe_handler_error(plugin);
                    error!(error = %format!("{error:#}"), "plugin handler failed");
                }
            }
            .instrument(span),
        );
    }

    /// Waits for the handlers scheduled so far; new work is still accepted.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Stops tracking new work and waits up to `grace` for running handlers.
    ///
    /// Returns false when handlers were still running at the deadline.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tracker.close();
        let drained = tokio::time::timeout(grace, self.tracker.wait()).await.is_ok();
        if drained {
            info!("all plugin handlers finished");
        } else {
            warn!(in_flight = self.tracker.len(), "shutdown grace period elapsed with handlers running");
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use lighthouse_config::{Config, ConfigAgent, InRepoResolver, PluginConfig};
    use lighthouse_core::RepoRef;
    use lighthouse_git::{FetchCache, FileBrowser, FileEntry, FileEntryKind, GitError, RepoDir};
    use lighthouse_jobs::MemoryJobStore;
    use lighthouse_plugins::{
        Agent, CommandMatch, GenericCommentEvent, HandlerKind, Plugin, PluginCommand, PluginRegistry,
    };
    use lighthouse_scm::fake::FakeScmProvider;
    use lighthouse_scm::{
        Action, Comment, Issue, IssueCommentHook, PullRequest, PushHook, Repository, ScmClient,
        User, Webhook,
    };

    use super::Dispatcher;
    use crate::metrics::WebhookMetrics;

    const SHA: &str = "0123456789abcdef0123456789abcdef01234567";

    struct Recorder {
        name: &'static str,
        fail: bool,
        commands: Vec<PluginCommand>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn new(name: &'static str, calls: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name,
                fail: false,
                commands: vec![PluginCommand::builder("ping", &["ping"]).build().expect("command")],
                calls: Arc::clone(calls),
            }
        }

        fn record(&self, call: String) -> Result<()> {
            self.calls.lock().expect("calls").push(call);
            if self.fail {
                bail!("{} failed", self.name);
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Plugin for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        fn description(&self) -> &'static str {
            "records invocations"
        }

        fn commands(&self) -> &[PluginCommand] {
            &self.commands
        }

        fn handles(&self, _kind: HandlerKind) -> bool {
            true
        }

        async fn handle_command(
            &self,
            matched: &CommandMatch,
            _agent: &Agent,
            _event: &GenericCommentEvent,
        ) -> Result<()> {
            self.record(format!("{}:command:{}", self.name, matched.name))
        }

        async fn handle_generic_comment(&self, _agent: &Agent, event: &GenericCommentEvent) -> Result<()> {
            self.record(format!("{}:comment:{}", self.name, event.head_sha))
        }

        async fn handle_push(&self, agent: &Agent, _hook: &PushHook) -> Result<()> {
            let presubmits = agent.config.presubmits_for("org/repo").len();
            self.record(format!("{}:push:{presubmits}", self.name))
        }
    }

    fn repo() -> Repository {
        Repository {
            namespace: "org".to_string(),
            name: "repo".to_string(),
            full_name: "org/repo".to_string(),
            branch: "main".to_string(),
            ..Repository::default()
        }
    }

    fn push() -> Webhook {
        Webhook::Push(PushHook {
            ref_name: "refs/heads/main".to_string(),
            after: SHA.to_string(),
            repo: repo(),
            guid: "guid-push".to_string(),
            ..PushHook::default()
        })
    }

    fn pr_comment(body: &str) -> Webhook {
        Webhook::IssueComment(IssueCommentHook {
            action: Action::Create,
            repo: repo(),
            issue: Issue {
                number: 7,
                pull_request: true,
                author: User::new("author"),
                ..Issue::default()
            },
            comment: Comment {
                id: 1,
                body: body.to_string(),
                author: User::new("carol"),
                ..Comment::default()
            },
            guid: "guid-comment".to_string(),
            ..IssueCommentHook::default()
        })
    }

    fn dispatcher(
        plugins: &str,
        registry: PluginRegistry,
    ) -> (Dispatcher, Arc<FakeScmProvider>) {
        let fake = Arc::new(FakeScmProvider::new());
        let agent = ConfigAgent::from_parts(
            Config::default(),
            PluginConfig::from_yaml(plugins).expect("plugins"),
        );
        let dispatcher = Dispatcher::new(
            ScmClient::new(fake.clone()),
            Arc::new(agent),
            registry,
            Arc::new(MemoryJobStore::new()),
            WebhookMetrics::new().expect("metrics"),
        );
        (dispatcher, fake)
    }

    fn sorted(calls: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        let mut calls = calls.lock().expect("calls").clone();
        calls.sort();
        calls
    }

    #[tokio::test]
    async fn functional_only_enabled_plugins_are_invoked() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(Recorder::new("alpha", &calls))).expect("alpha");
        registry.register(Arc::new(Recorder::new("beta", &calls))).expect("beta");
        let (dispatcher, _fake) = dispatcher("plugins:\n  org/repo: [alpha]\n", registry);

        let scheduled = dispatcher.dispatch(push()).await.expect("dispatch");
        dispatcher.drain().await;

        assert_eq!(scheduled, 1);
        assert_eq!(sorted(&calls), vec!["alpha:push:0"]);
        assert_eq!(dispatcher.metrics().webhook_count("push"), 1);
    }

    #[tokio::test]
    async fn functional_comment_runs_handler_and_each_command_match() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(Recorder::new("alpha", &calls))).expect("alpha");
        let (dispatcher, fake) = dispatcher("plugins:\n  org: [alpha]\n", registry);
        fake.with_state(|state| {
            state.pull_requests.insert(
                7,
                PullRequest {
                    number: 7,
                    sha: "feedface".to_string(),
                    ..PullRequest::default()
                },
            );
        });

        let scheduled = dispatcher
            .dispatch(pr_comment("/ping\n/PING\n"))
            .await
            .expect("dispatch");
        dispatcher.drain().await;

        assert_eq!(scheduled, 3);
        assert_eq!(
            sorted(&calls),
            vec!["alpha:command:ping", "alpha:command:ping", "alpha:comment:feedface"]
        );
    }

    #[tokio::test]
    async fn regression_failing_handler_does_not_stop_others() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut failing = Recorder::new("failing", &calls);
        failing.fail = true;
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(failing)).expect("failing");
        registry.register(Arc::new(Recorder::new("alpha", &calls))).expect("alpha");
        let (dispatcher, _fake) = dispatcher("plugins:\n  org/repo: [failing, alpha]\n", registry);

        dispatcher.dispatch(push()).await.expect("dispatch");
        dispatcher.drain().await;

        assert_eq!(sorted(&calls), vec!["alpha:push:0", "failing:push:0"]);
        assert_eq!(dispatcher.metrics().handler_error_count("failing"), 1);
        assert_eq!(dispatcher.metrics().handler_error_count("alpha"), 0);
    }

    #[tokio::test]
    async fn integration_builtin_hold_plugin_labels_pull_request() {
        let registry = PluginRegistry::builtin().expect("builtin");
        let (dispatcher, fake) = dispatcher("plugins:\n  org/repo: [hold]\n", registry);

        dispatcher.dispatch(pr_comment("/hold")).await.expect("dispatch");
        dispatcher.drain().await;

        assert_eq!(
            fake.snapshot().issue_labels_added,
            vec!["org/repo#7:do-not-merge/hold".to_string()]
        );
    }

    /// Serves `.lighthouse/` files for one SHA.
    struct MapBrowser {
        files: HashMap<String, String>,
    }

    #[async_trait]
    impl FileBrowser for MapBrowser {
        async fn get_file(
            &self,
            _repo: &RepoRef,
            path: &str,
            reference: &str,
            _fetch_cache: &FetchCache,
        ) -> Result<Option<Vec<u8>>, GitError> {
            Ok(self
                .files
                .get(&format!("{reference}:{path}"))
                .map(|content| content.as_bytes().to_vec()))
        }

        async fn list_files(
            &self,
            _repo: &RepoRef,
            path: &str,
            reference: &str,
            _fetch_cache: &FetchCache,
        ) -> Result<Vec<FileEntry>, GitError> {
            if reference != SHA || path != ".lighthouse" {
                return Ok(Vec::new());
            }
            Ok(vec![FileEntry {
                name: "jenkins-x".to_string(),
                path: ".lighthouse/jenkins-x".to_string(),
                kind: FileEntryKind::Dir,
                size: 0,
                sha: String::new(),
                link: String::new(),
            }])
        }

        async fn with_dir(
            &self,
            _repo: &RepoRef,
            reference: &str,
            _fetch_cache: &FetchCache,
            _sparse_patterns: &[String],
        ) -> Result<RepoDir, GitError> {
            Err(GitError::InvalidPath(reference.to_string()))
        }

        async fn get_main_and_current_branch_refs(
            &self,
            _repo: &RepoRef,
            event_ref: &str,
        ) -> Result<Vec<String>, GitError> {
            Ok(vec!["main".to_string(), event_ref.to_string()])
        }
    }

    #[tokio::test]
    async fn integration_in_repo_config_enables_plugins_and_jobs() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(Recorder::new("alpha", &calls))).expect("alpha");
        let files = HashMap::from([
            (
                format!("{SHA}:.lighthouse/jenkins-x/triggers.yaml"),
                "spec:\n  presubmits:\n    - name: lint\n      always_run: true\n".to_string(),
            ),
            (format!("{SHA}:.lighthouse/plugins.yaml"), "plugins: [alpha]\n".to_string()),
        ]);
        let resolver = Arc::new(InRepoResolver::new(Arc::new(MapBrowser { files })));
        let config = Config::from_yaml("in_repo_config:\n  enabled:\n    org/repo: true\n").expect("config");
        let dispatcher = Dispatcher::new(
            ScmClient::new(Arc::new(FakeScmProvider::new())),
            Arc::new(ConfigAgent::from_parts(config, PluginConfig::default())),
            registry,
            Arc::new(MemoryJobStore::new()),
            WebhookMetrics::new().expect("metrics"),
        )
        .with_resolver(Arc::clone(&resolver));

        dispatcher.dispatch(push()).await.expect("dispatch");
        dispatcher.drain().await;

        assert_eq!(sorted(&calls), vec!["alpha:push:1"]);
        assert_eq!(resolver.cached_len(), 1);
    }

    /// Records requested refs and rejects commits the remote never had.
    #[derive(Default)]
    struct RefRecordingBrowser {
        references: Mutex<Vec<String>>,
    }

    impl RefRecordingBrowser {
        fn check(&self, reference: &str) -> Result<(), GitError> {
            self.references.lock().expect("references").push(reference.to_string());
            if reference.starts_with("0000000") {
                return Err(GitError::InvalidPath(format!("not our ref {reference}")));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl FileBrowser for RefRecordingBrowser {
        async fn get_file(
            &self,
            _repo: &RepoRef,
            _path: &str,
            reference: &str,
            _fetch_cache: &FetchCache,
        ) -> Result<Option<Vec<u8>>, GitError> {
            self.check(reference)?;
            Ok(None)
        }

        async fn list_files(
            &self,
            _repo: &RepoRef,
            _path: &str,
            reference: &str,
            _fetch_cache: &FetchCache,
        ) -> Result<Vec<FileEntry>, GitError> {
            self.check(reference)?;
            Ok(Vec::new())
        }

        async fn with_dir(
            &self,
            _repo: &RepoRef,
            reference: &str,
            _fetch_cache: &FetchCache,
            _sparse_patterns: &[String],
        ) -> Result<RepoDir, GitError> {
            self.check(reference)?;
            Err(GitError::InvalidPath(reference.to_string()))
        }

        async fn get_main_and_current_branch_refs(
            &self,
            _repo: &RepoRef,
            event_ref: &str,
        ) -> Result<Vec<String>, GitError> {
            Ok(vec!["main".to_string(), event_ref.to_string()])
        }
    }

    #[tokio::test]
    async fn regression_branch_deletion_push_resolves_in_repo_config_on_default_branch() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(Recorder::new("alpha", &calls))).expect("alpha");
        let browser = Arc::new(RefRecordingBrowser::default());
        let config = Config::from_yaml("in_repo_config:\n  enabled:\n    org/repo: true\n").expect("config");
        let dispatcher = Dispatcher::new(
            ScmClient::new(Arc::new(FakeScmProvider::new())),
            Arc::new(ConfigAgent::from_parts(
                config,
                PluginConfig::from_yaml("plugins:\n  org/repo: [alpha]\n").expect("plugins"),
            )),
            registry,
            Arc::new(MemoryJobStore::new()),
            WebhookMetrics::new().expect("metrics"),
        )
        .with_resolver(Arc::new(InRepoResolver::new(browser.clone())));

        let deletion = Webhook::Push(PushHook {
            ref_name: "refs/heads/feature".to_string(),
            before: SHA.to_string(),
            after: "0".repeat(40),
            deleted: true,
            repo: repo(),
            guid: "guid-delete".to_string(),
            ..PushHook::default()
        });
        let scheduled = dispatcher.dispatch(deletion).await.expect("dispatch");
        dispatcher.drain().await;

        assert_eq!(scheduled, 1);
        assert_eq!(sorted(&calls), vec!["alpha:push:0"]);
        let references = browser.references.lock().expect("references").clone();
        assert!(!references.is_empty());
        assert!(references.iter().all(String::is_empty), "{references:?}");
    }

    #[tokio::test]
    async fn unit_shutdown_reports_drained() {
        let (dispatcher, _fake) = dispatcher("", PluginRegistry::new());
        assert!(dispatcher.shutdown(std::time::Duration::from_millis(50)).await);
        assert_eq!(dispatcher.in_flight(), 0);
    }
}
