//! Per-invocation context handed to plugin handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use lighthouse_config::{Config, PluginConfig};
use lighthouse_core::RepoRef;
use lighthouse_jobs::JobStore;
use lighthouse_scm::{Comment, Repository, ScmClient};
use tokio::sync::Mutex;
use tracing::{debug, info_span, Span};

#[derive(Clone)]
pub struct Agent {
    pub scm: ScmClient,
    pub config: Arc<Config>,
    pub plugin_config: Arc<PluginConfig>,
    pub jobs: Arc<dyn JobStore>,
    pub server_url: String,
    /// Delivery id of the webhook being handled.
    pub guid: String,
    span: Span,
    pruner: Option<Arc<CommentPruner>>,
}

impl Agent {
    pub fn new(
        scm: ScmClient,
        config: Arc<Config>,
        plugin_config: Arc<PluginConfig>,
        jobs: Arc<dyn JobStore>,
    ) -> Self {
        let server_url = scm.server_url().to_string();
        Self {
            scm,
            config,
            plugin_config,
            jobs,
            server_url,
            guid: String::new(),
            span: Span::none(),
            pruner: None,
        }
    }

    pub fn with_server_url(mut self, server_url: impl Into<String>) -> Self {
        self.server_url = server_url.into();
        self
    }

    pub fn with_guid(mut self, guid: impl Into<String>) -> Self {
        self.guid = guid.into();
        self
    }

    /// A copy tagged for one plugin, with a pruner for the issue or PR when
    /// `number` is set.
    pub fn for_plugin(
        &self,
        plugin: &str,
        repo: &Repository,
        number: Option<u64>,
        is_pr: bool,
    ) -> Self {
        let span = info_span!(
            "plugin",
            plugin,
            org = %repo.namespace,
            repo = %repo.name,
            pr = number.unwrap_or_default(),
            event_guid = %self.guid,
        );
        let pruner = number.map(|number| {
            Arc::new(CommentPruner::new(
                self.scm.clone(),
                repo.repo_ref(),
                number,
                is_pr,
            ))
        });
        Self {
            span,
            pruner,
            ..self.clone()
        }
    }

    /// Handlers instrument their futures with this span.
    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn comment_pruner(&self) -> Option<&CommentPruner> {
        self.pruner.as_deref()
    }

    /// The jobs namespace from the current configuration snapshot.
    pub fn job_namespace(&self) -> &str {
        &self.config.lighthouse_job_namespace
    }
}

/// Deletes earlier bot comments on one issue or pull request.
///
/// The comment list is fetched on first use and shared by later calls in
/// the same invocation.
pub struct CommentPruner {
    scm: ScmClient,
    repo: RepoRef,
    number: u64,
    is_pr: bool,
    comments: Mutex<Option<Vec<Comment>>>,
}

impl CommentPruner {
    pub fn new(scm: ScmClient, repo: RepoRef, number: u64, is_pr: bool) -> Self {
        Self {
            scm,
            repo,
            number,
            is_pr,
            comments: Mutex::new(None),
        }
    }

    pub async fn prune_comments<F>(&self, predicate: F) -> Result<usize>
    where
        F: Fn(&Comment) -> bool + Send + Sync,
    {
        let mut cached = self.comments.lock().await;
        if cached.is_none() {
            let listed = if self.is_pr {
                self.scm
                    .list_pull_request_comments(&self.repo, self.number)
                    .await
            } else {
                self.scm.list_issue_comments(&self.repo, self.number).await
            }
            .with_context(|| format!("failed to list comments on {}#{}", self.repo, self.number))?;
            *cached = Some(listed);
        }
        let comments = cached.get_or_insert_with(Vec::new);
        let doomed: Vec<Comment> = comments
            .iter()
            .filter(|comment| self.scm.is_bot(&comment.author.login) && predicate(comment))
            .cloned()
            .collect();
        let deleted = self
            .scm
            .delete_stale_comments(&self.repo, self.number, &doomed, self.is_pr, |_| true)
            .await
            .with_context(|| format!("failed to prune comments on {}#{}", self.repo, self.number))?;
        comments.retain(|comment| !doomed.iter().any(|gone| gone.id == comment.id));
        debug!(repo = %self.repo, number = self.number, deleted, "pruned comments");
        Ok(deleted)
    }
}
