use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use lighthouse_core::RepoRef;
use lighthouse_git::{FetchCache, FileBrowser};
use lighthouse_scm::{
    Action, PullRequest, PullRequestHook, PushHook, Repository, ScmClient, StatusState, User,
};
use prometheus::{HistogramOpts, HistogramVec, Registry};
use regex::Regex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::notifier::Notifier;
use crate::state::PollState;

const RELEASE_OPERATION: &str = "release";

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub repositories: Vec<RepoRef>,
    pub release_period: Duration,
    pub pull_request_period: Duration,
    pub disable_release_poll: bool,
    pub disable_pr_poll: bool,
    /// Only report a release once its commit statuses succeeded.
    pub require_release_success: bool,
    /// Restricts the success check to matching status contexts.
    pub context_match_pattern: Option<Regex>,
    pub run_once: bool,
    /// Base used to build repository links in synthesized events.
    pub server_url: String,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            repositories: Vec::new(),
            release_period: Duration::from_secs(20),
            pull_request_period: Duration::from_secs(20),
            disable_release_poll: false,
            disable_pr_poll: false,
            require_release_success: false,
            context_match_pattern: None,
            run_once: false,
            server_url: "https://github.com".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct PollerMetrics {
    resync: HistogramVec,
}

impl PollerMetrics {
    pub fn new(registry: &Registry) -> Result<Self> {
        let resync = HistogramVec::new(
            HistogramOpts::new(
                "lighthouse_poller_resync_seconds",
                "Duration of one polling pass over all repositories",
            ),
            &["operation"],
        )?;
        registry
            .register(Box::new(resync.clone()))
            .context("failed to register poller histogram")?;
        Ok(Self { resync })
    }

    fn observe(&self, operation: &str, elapsed: Duration) {
        self.resync
            .with_label_values(&[operation])
            .observe(elapsed.as_secs_f64());
    }

    pub fn sample_count(&self, operation: &str) -> u64 {
        self.resync.with_label_values(&[operation]).get_sample_count()
    }
}

/// Turns observed repository state into synthesized webhook events.
pub struct PollingController {
    config: PollerConfig,
    browser: Arc<dyn FileBrowser>,
    scm: ScmClient,
    state: Arc<dyn PollState>,
    notifier: Arc<dyn Notifier>,
    metrics: Option<PollerMetrics>,
}

impl PollingController {
    pub fn new(
        config: PollerConfig,
        browser: Arc<dyn FileBrowser>,
        scm: ScmClient,
        state: Arc<dyn PollState>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            browser,
            scm,
            state,
            notifier,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: PollerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Polls until `shutdown` fires, or once when `run_once` is set.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        if self.config.repositories.is_empty() {
            warn!("no repositories configured for polling");
        }
        if self.config.run_once {
            if !self.config.disable_release_poll {
                self.poll_releases().await;
            }
            if !self.config.disable_pr_poll {
                self.poll_pull_requests().await;
            }
            return Ok(());
        }
        tokio::join!(
            self.release_loop(shutdown.clone()),
            self.pull_request_loop(shutdown)
        );
        info!("poller stopped");
        Ok(())
    }

    async fn release_loop(&self, shutdown: CancellationToken) {
        if self.config.disable_release_poll {
            info!("release polling disabled");
            return;
        }
        let mut ticker = tokio::time::interval(self.config.release_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.poll_releases().await;
                }
            }
        }
    }

    async fn pull_request_loop(&self, shutdown: CancellationToken) {
        if self.config.disable_pr_poll {
            info!("pull request polling disabled");
            return;
        }
        let mut ticker = tokio::time::interval(self.config.pull_request_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.poll_pull_requests().await;
                }
            }
        }
    }

    /// One release pass; returns the number of push events emitted.
    pub async fn poll_releases(&self) -> usize {
        let started = Instant::now();
        let mut emitted = 0;
        for repo in &self.config.repositories {
            match self.poll_release(repo).await {
                Ok(true) => emitted += 1,
                Ok(false) => {}
                Err(error) => warn!(repository = %repo, error = %format!("{error:#}"), "release poll failed"),
            }
        }
        if let Some(metrics) = &self.metrics {
            metrics.observe(RELEASE_OPERATION, started.elapsed());
        }
        emitted
    }

    pub async fn poll_release(&self, repo: &RepoRef) -> Result<bool> {
        let full_name = repo.full_name();
        let fetch_cache = FetchCache::new();
        let dir = self
            .browser
            .with_dir(repo, "", &fetch_cache, &[])
            .await
            .with_context(|| format!("failed to check out {full_name}"))?;
        let sha = dir
            .git(&["rev-parse", "HEAD"])
            .await
            .with_context(|| format!("failed to resolve head of {full_name}"))?
            .trim()
            .to_string();
        let branch = dir
            .git(&["rev-parse", "--abbrev-ref", "HEAD"])
            .await
            .map(|branch| branch.trim().to_string())
            .ok()
            .filter(|branch| !branch.is_empty() && branch != "HEAD")
            .unwrap_or_else(|| dir.main_branch().to_string());
        drop(dir);

        if self.config.require_release_success && !self.release_succeeded(repo, &sha).await? {
            debug!(repository = %repo, sha, "release statuses not successful yet");
            return Ok(false);
        }
        if !self.state.is_new(&full_name, RELEASE_OPERATION, &sha) {
            return Ok(false);
        }

        let hook = PushHook {
            ref_name: format!("refs/heads/{branch}"),
            before: String::new(),
            after: sha.clone(),
            repo: self.repository(repo, &branch),
            sender: User::new(self.scm.bot_name()),
            guid: sha.clone(),
            ..PushHook::default()
        };
        if let Err(error) = self.notifier.notify_push(&hook).await {
            self.state.invalidate(&full_name, RELEASE_OPERATION, &sha);
            return Err(error.context(format!("failed to notify release of {full_name}")));
        }
        info!(repository = %repo, branch, sha, "emitted release push");
        Ok(true)
    }

    /// Pending or missing statuses count as not successful.
    async fn release_succeeded(&self, repo: &RepoRef, sha: &str) -> Result<bool> {
        let combined = self
            .scm
            .get_combined_status(repo, sha)
            .await
            .with_context(|| format!("failed to read statuses of {repo}@{sha}"))?;
        let pattern = self.config.context_match_pattern.as_ref();
        let relevant: Vec<_> = combined
            .statuses
            .iter()
            .filter(|status| pattern.map_or(true, |pattern| pattern.is_match(&status.label)))
            .collect();
        Ok(!relevant.is_empty()
            && relevant
                .iter()
                .all(|status| status.state == StatusState::Success))
    }

    /// One pull request pass; returns the number of events emitted.
    pub async fn poll_pull_requests(&self) -> usize {
        let started = Instant::now();
        let mut emitted = 0;
        for repo in &self.config.repositories {
            match self.poll_repository_pull_requests(repo).await {
                Ok(count) => emitted += count,
                Err(error) => warn!(repository = %repo, error = %format!("{error:#}"), "pull request poll failed"),
            }
        }
        if let Some(metrics) = &self.metrics {
            metrics.observe("pull_request", started.elapsed());
        }
        emitted
    }

    pub async fn poll_repository_pull_requests(&self, repo: &RepoRef) -> Result<usize> {
        let pulls = self
            .scm
            .list_open_pull_requests(repo)
            .await
            .with_context(|| format!("failed to list open pull requests of {repo}"))?;
        let mut emitted = 0;
        for pull in &pulls {
            match self.poll_pull_request(repo, pull).await {
                Ok(true) => emitted += 1,
                Ok(false) => {}
                Err(error) => warn!(
                    repository = %repo,
                    number = pull.number,
                    error = %format!("{error:#}"),
                    "pull request poll failed"
                ),
            }
        }
        Ok(emitted)
    }

    pub async fn poll_pull_request(&self, repo: &RepoRef, pull: &PullRequest) -> Result<bool> {
        let full_name = repo.full_name();
        let operation = format!("pr/{}", pull.number);
        let head_operation = format!("pr/{}/head", pull.number);
        let fingerprint = pull_request_fingerprint(pull);
        if !self.state.is_new(&full_name, &operation, &fingerprint) {
            return Ok(false);
        }
        let head_changed = self.state.is_new(&full_name, &head_operation, &pull.sha);

        let result = self.emit_pull_request(repo, pull, head_changed).await;
        if result.is_err() {
            self.state.invalidate(&full_name, &operation, &fingerprint);
            if head_changed {
                self.state.invalidate(&full_name, &head_operation, &pull.sha);
            }
        }
        result
    }

    async fn emit_pull_request(
        &self,
        repo: &RepoRef,
        pull: &PullRequest,
        head_changed: bool,
    ) -> Result<bool> {
        let action = if head_changed {
            // A head commit with statuses has already been triggered elsewhere.
            let statuses = self
                .scm
                .list_statuses(repo, &pull.sha)
                .await
                .with_context(|| format!("failed to list statuses of {repo}@{}", pull.sha))?;
            if !statuses.is_empty() {
                debug!(repository = %repo, number = pull.number, sha = %pull.sha, "head already has statuses");
                return Ok(false);
            }
            Action::Sync
        } else {
            Action::Update
        };

        let repository = if pull.base.repo.full_name.is_empty() {
            self.repository(repo, pull.target())
        } else {
            pull.base.repo.clone()
        };
        let hook = PullRequestHook {
            action,
            repo: repository,
            pull_request: pull.clone(),
            sender: pull.author.clone(),
            label: None,
            guid: format!("{}-pr{}-{}", repo.full_name(), pull.number, pull.sha),
        };
        self.notifier
            .notify_pull_request(&hook)
            .await
            .with_context(|| format!("failed to notify pull request {repo}#{}", pull.number))?;
        info!(repository = %repo, number = pull.number, action = ?action, "emitted pull request event");
        Ok(true)
    }

    fn repository(&self, repo: &RepoRef, branch: &str) -> Repository {
        let server = self.config.server_url.trim_end_matches('/');
        let full_name = repo.full_name();
        Repository {
            namespace: repo.owner.clone(),
            name: repo.name.clone(),
            full_name: full_name.clone(),
            branch: branch.to_string(),
            link: format!("{server}/{full_name}"),
            clone: format!("{server}/{full_name}.git"),
            ..Repository::default()
        }
    }
}

/// Head SHA, title, label set, and state; any change re-emits the pull request.
fn pull_request_fingerprint(pull: &PullRequest) -> String {
    let mut labels: Vec<&str> = pull.labels.iter().map(|label| label.name.as_str()).collect();
    labels.sort_unstable();
    labels.dedup();
    let mut hasher = DefaultHasher::new();
    labels.hash(&mut hasher);
    format!(
        "{}|{}|{:016x}|{}",
        pull.sha,
        pull.title,
        hasher.finish(),
        pull.state()
    )
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::Path;
    use std::process::Command;
    use std::sync::{Arc, Mutex};

    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use lighthouse_config::{Config, ConfigAgent, PluginConfig, Presubmit};
    use lighthouse_core::RepoRef;
    use lighthouse_git::{GitBrowserConfig, GitFileBrowser};
    use lighthouse_jobs::MemoryJobStore;
    use lighthouse_plugins::PluginRegistry;
    use lighthouse_scm::fake::FakeScmProvider;
    use lighthouse_scm::{
        Action, CombinedStatus, Label, PullRequest, PullRequestBranch, PullRequestHook, PushHook,
        ScmClient, Status, StatusState, User,
    };
    use lighthouse_webhook::{Dispatcher, WebhookMetrics};
    use prometheus::Registry;
    use regex::Regex;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    use super::{pull_request_fingerprint, PollerConfig, PollerMetrics, PollingController};
    use crate::notifier::{DispatchNotifier, Notifier};
    use crate::state::MemoryPollState;

    #[derive(Default)]
    struct Recording {
        pushes: Mutex<Vec<PushHook>>,
        pulls: Mutex<Vec<PullRequestHook>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for Recording {
        async fn notify_push(&self, hook: &PushHook) -> Result<()> {
            if self.fail {
                bail!("endpoint unavailable");
            }
            self.pushes.lock().expect("pushes").push(hook.clone());
            Ok(())
        }

        async fn notify_pull_request(&self, hook: &PullRequestHook) -> Result<()> {
            if self.fail {
                bail!("endpoint unavailable");
            }
            self.pulls.lock().expect("pulls").push(hook.clone());
            Ok(())
        }
    }

    fn git(dir: &Path, args: &[&str]) -> String {
        let output = Command::new("git")
            .current_dir(dir)
            .args([
                "-c",
                "user.name=Lighthouse Test",
                "-c",
                "user.email=test@example.com",
                "-c",
                "commit.gpgsign=false",
            ])
            .args(args)
            .output()
            .expect("run git");
        assert!(
            output.status.success(),
            "git {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    struct GitFixture {
        _root: TempDir,
        browser: Arc<GitFileBrowser>,
        head: String,
    }

    fn git_fixture() -> GitFixture {
        let root = tempfile::tempdir().expect("tempdir");
        let server = root.path().join("server");
        let remote = server.join("myorg").join("myrepo.git");
        std::fs::create_dir_all(&remote).expect("mkdir remote");
        git(&remote, &["init", "-b", "main"]);
        std::fs::write(remote.join("README.md"), "v1\n").expect("write");
        git(&remote, &["add", "-A"]);
        git(&remote, &["commit", "-m", "initial"]);
        let head = git(&remote, &["rev-parse", "HEAD"]);
        let browser = GitFileBrowser::new(GitBrowserConfig {
            server_url: server.to_string_lossy().to_string(),
            cache_root: Some(root.path().join("cache")),
            ..GitBrowserConfig::default()
        })
        .expect("browser");
        GitFixture {
            _root: root,
            browser: Arc::new(browser),
            head,
        }
    }

    fn config() -> PollerConfig {
        PollerConfig {
            repositories: vec![RepoRef::new("myorg", "myrepo")],
            ..PollerConfig::default()
        }
    }

    fn controller(
        config: PollerConfig,
        browser: Arc<GitFileBrowser>,
        fake: &Arc<FakeScmProvider>,
        notifier: Arc<dyn Notifier>,
    ) -> PollingController {
        PollingController::new(
            config,
            browser,
            ScmClient::new(fake.clone()),
            Arc::new(MemoryPollState::new()),
            notifier,
        )
    }

    fn pull_request(number: u64, sha: &str, author: &str) -> PullRequest {
        PullRequest {
            number,
            title: format!("change {number}"),
            sha: sha.to_string(),
            author: User::new(author),
            base: PullRequestBranch {
                ref_name: "main".to_string(),
                sha: "base123".to_string(),
                ..PullRequestBranch::default()
            },
            head: PullRequestBranch {
                ref_name: format!("feature-{number}"),
                sha: sha.to_string(),
                ..PullRequestBranch::default()
            },
            ..PullRequest::default()
        }
    }

    fn status(label: &str, state: StatusState) -> Status {
        Status {
            state,
            label: label.to_string(),
            ..Status::default()
        }
    }

    #[test]
    fn unit_fingerprint_ignores_label_order() {
        let mut first = pull_request(1, "abc", "alice");
        first.labels = vec![Label::named("b"), Label::named("a")];
        let mut second = first.clone();
        second.labels = vec![Label::named("a"), Label::named("b")];
        assert_eq!(pull_request_fingerprint(&first), pull_request_fingerprint(&second));

        second.title = "renamed".to_string();
        assert_ne!(pull_request_fingerprint(&first), pull_request_fingerprint(&second));
    }

    #[tokio::test]
    async fn integration_release_poll_emits_one_push_per_head() {
        let fixture = git_fixture();
        let fake = Arc::new(FakeScmProvider::new());
        let notifier = Arc::new(Recording::default());
        let registry = Registry::new();
        let metrics = PollerMetrics::new(&registry).expect("metrics");
        let controller = controller(config(), fixture.browser.clone(), &fake, notifier.clone())
            .with_metrics(metrics.clone());

        assert_eq!(controller.poll_releases().await, 1);
        assert_eq!(controller.poll_releases().await, 0);

        let pushes = notifier.pushes.lock().expect("pushes").clone();
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0].ref_name, "refs/heads/main");
        assert_eq!(pushes[0].after, fixture.head);
        assert_eq!(pushes[0].repo.full_name, "myorg/myrepo");
        assert_eq!(pushes[0].guid, fixture.head);
        assert_eq!(metrics.sample_count("release"), 2);
        assert!(registry
            .gather()
            .iter()
            .any(|family| family.get_name() == "lighthouse_poller_resync_seconds"));
    }

    #[tokio::test]
    async fn functional_release_waits_for_matching_successful_statuses() {
        let fixture = git_fixture();
        let fake = Arc::new(FakeScmProvider::new());
        let notifier = Arc::new(Recording::default());
        let controller = controller(
            PollerConfig {
                require_release_success: true,
                context_match_pattern: Some(Regex::new("^ci$").expect("regex")),
                ..config()
            },
            fixture.browser.clone(),
            &fake,
            notifier.clone(),
        );

        assert_eq!(controller.poll_releases().await, 0);

        fake.with_state(|state| {
            state.combined_statuses.insert(
                fixture.head.clone(),
                CombinedStatus {
                    state: StatusState::Failure,
                    sha: fixture.head.clone(),
                    statuses: vec![
                        status("ci", StatusState::Pending),
                        status("lint", StatusState::Failure),
                    ],
                },
            );
        });
        assert_eq!(controller.poll_releases().await, 0);

        fake.with_state(|state| {
            if let Some(combined) = state.combined_statuses.get_mut(&fixture.head) {
                combined.statuses[0].state = StatusState::Success;
            }
        });
        assert_eq!(controller.poll_releases().await, 1);
        assert_eq!(notifier.pushes.lock().expect("pushes").len(), 1);
    }

    #[tokio::test]
    async fn regression_failed_release_notification_is_retried() {
        let fixture = git_fixture();
        let fake = Arc::new(FakeScmProvider::new());
        let state = Arc::new(MemoryPollState::new());
        let failing = PollingController::new(
            config(),
            fixture.browser.clone(),
            ScmClient::new(fake.clone()),
            state.clone(),
            Arc::new(Recording {
                fail: true,
                ..Recording::default()
            }),
        );
        assert_eq!(failing.poll_releases().await, 0);

        let notifier = Arc::new(Recording::default());
        let retry = PollingController::new(
            config(),
            fixture.browser.clone(),
            ScmClient::new(fake),
            state,
            notifier.clone(),
        );
        assert_eq!(retry.poll_releases().await, 1);
    }

    #[tokio::test]
    async fn functional_pull_request_poll_emits_sync_then_update() {
        let fixture = git_fixture();
        let fake = Arc::new(FakeScmProvider::new());
        fake.with_state(|state| {
            state.pull_requests.insert(1, pull_request(1, "sha-one", "alice"));
            state.pull_requests.insert(2, pull_request(2, "sha-two", "bob"));
            state
                .created_statuses
                .insert("sha-two".to_string(), vec![status("ci", StatusState::Success)]);
        });
        let notifier = Arc::new(Recording::default());
        let controller = controller(config(), fixture.browser.clone(), &fake, notifier.clone());

        assert_eq!(controller.poll_pull_requests().await, 1);
        assert_eq!(controller.poll_pull_requests().await, 0);

        fake.with_state(|state| {
            if let Some(pull) = state.pull_requests.get_mut(&1) {
                pull.title = "retitled".to_string();
            }
        });
        assert_eq!(controller.poll_pull_requests().await, 1);

        let pulls = notifier.pulls.lock().expect("pulls").clone();
        assert_eq!(pulls.len(), 2);
        assert_eq!(pulls[0].action, Action::Sync);
        assert_eq!(pulls[0].pull_request.number, 1);
        assert_eq!(pulls[0].repo.full_name, "myorg/myrepo");
        assert_eq!(pulls[1].action, Action::Update);
    }

    #[tokio::test]
    async fn functional_run_once_honours_disabled_pollers() {
        let fixture = git_fixture();
        let fake = Arc::new(FakeScmProvider::new());
        fake.with_state(|state| {
            state.pull_requests.insert(1, pull_request(1, "sha-one", "alice"));
        });
        let notifier = Arc::new(Recording::default());
        let controller = controller(
            PollerConfig {
                run_once: true,
                disable_pr_poll: true,
                ..config()
            },
            fixture.browser.clone(),
            &fake,
            notifier.clone(),
        );

        controller
            .run(CancellationToken::new())
            .await
            .expect("run once");

        assert_eq!(notifier.pushes.lock().expect("pushes").len(), 1);
        assert!(notifier.pulls.lock().expect("pulls").is_empty());
    }

    #[tokio::test]
    async fn functional_run_stops_on_cancellation() {
        let fixture = git_fixture();
        let fake = Arc::new(FakeScmProvider::new());
        let notifier = Arc::new(Recording::default());
        let controller = controller(config(), fixture.browser.clone(), &fake, notifier.clone());
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        tokio::time::timeout(std::time::Duration::from_secs(5), controller.run(shutdown))
            .await
            .expect("stops promptly")
            .expect("run");
    }

    #[tokio::test]
    async fn integration_polled_pull_request_triggers_presubmits_in_process() {
        let fixture = git_fixture();
        let fake = Arc::new(FakeScmProvider::new());
        fake.with_state(|state| {
            state.collaborators.push("alice".to_string());
            state.pull_requests.insert(1, pull_request(1, "sha-one", "alice"));
        });
        let mut unit = Presubmit::named("unit");
        unit.always_run = true;
        let agent = ConfigAgent::from_parts(
            Config {
                presubmits: BTreeMap::from([("myorg/myrepo".to_string(), vec![unit])]),
                ..Config::default()
            },
            PluginConfig::from_yaml("plugins:\n  myorg/myrepo: [trigger]\n").expect("plugins"),
        );
        let jobs = Arc::new(MemoryJobStore::new());
        let dispatcher = Arc::new(Dispatcher::new(
            ScmClient::new(fake.clone()),
            Arc::new(agent),
            PluginRegistry::builtin().expect("registry"),
            jobs.clone(),
            WebhookMetrics::new().expect("metrics"),
        ));
        let controller = controller(
            config(),
            fixture.browser.clone(),
            &fake,
            Arc::new(DispatchNotifier::new(dispatcher.clone())),
        );

        assert_eq!(controller.poll_pull_requests().await, 1);
        dispatcher.drain().await;

        let created = jobs.all_jobs();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].spec.job, "unit");
        assert_eq!(dispatcher.metrics().webhook_count("pull_request"), 1);
    }
}
