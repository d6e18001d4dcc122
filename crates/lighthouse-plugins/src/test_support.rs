//! Shared fixtures for plugin tests.

use std::sync::Arc;

use anyhow::Result;
use lighthouse_config::{Config, PluginConfig};
use lighthouse_jobs::MemoryJobStore;
use lighthouse_scm::fake::FakeScmProvider;
use lighthouse_scm::{Repository, ScmClient, User};

use crate::agent::Agent;
use crate::event::{GenericCommentAction, GenericCommentEvent};
use crate::plugin::{matching_commands, HandlerKind, Plugin};

pub(crate) struct Harness {
    pub fake: Arc<FakeScmProvider>,
    pub jobs: Arc<MemoryJobStore>,
    pub agent: Agent,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(Config::default(), PluginConfig::default())
    }

    pub fn with_config(config: Config, plugins: PluginConfig) -> Self {
        let fake = Arc::new(FakeScmProvider::new());
        let jobs = Arc::new(MemoryJobStore::new());
        let agent = Agent::new(
            ScmClient::new(fake.clone()),
            Arc::new(config),
            Arc::new(plugins),
            jobs.clone(),
        )
        .with_guid("guid-1");
        Self { fake, jobs, agent }
    }

    /// Runs the plugin's comment handler and every matching command in order.
    pub async fn comment(&self, plugin: &dyn Plugin, event: &GenericCommentEvent) -> Result<()> {
        let agent = self
            .agent
            .for_plugin(plugin.name(), &event.repo, Some(event.number), event.is_pr);
        if plugin.handles(HandlerKind::GenericComment) {
            plugin.handle_generic_comment(&agent, event).await?;
        }
        for matched in matching_commands(plugin, event) {
            plugin.handle_command(&matched, &agent, event).await?;
        }
        Ok(())
    }

    /// Label entries recorded by the fake, without the `org/repo#n:` prefix.
    pub fn added_labels(&self) -> Vec<String> {
        strip_entries(&self.fake.snapshot().issue_labels_added)
    }

    pub fn removed_labels(&self) -> Vec<String> {
        strip_entries(&self.fake.snapshot().issue_labels_removed)
    }

    pub fn seed_labels(&self, number: u64, labels: &[&str]) {
        self.fake.with_state(|state| {
            for label in labels {
                state
                    .issue_labels_existing
                    .push(format!("org/repo#{number}:{label}"));
            }
        });
    }

    /// Comments posted on issues and pull requests, bodies only.
    pub fn comments(&self) -> Vec<String> {
        let snapshot = self.fake.snapshot();
        strip_entries(
            &snapshot
                .issue_comments_added
                .iter()
                .chain(snapshot.pull_request_comments_added.iter())
                .cloned()
                .collect::<Vec<_>>(),
        )
    }
}

fn strip_entries(entries: &[String]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            entry
                .split_once(':')
                .map(|(_, value)| value.to_string())
                .unwrap_or_else(|| entry.clone())
        })
        .collect()
}

pub(crate) fn repo() -> Repository {
    Repository {
        namespace: "org".to_string(),
        name: "repo".to_string(),
        full_name: "org/repo".to_string(),
        branch: "main".to_string(),
        clone: "https://github.com/org/repo.git".to_string(),
        link: "https://github.com/org/repo".to_string(),
        private: false,
    }
}

pub(crate) fn comment_event(body: &str, number: u64, is_pr: bool, author: &str) -> GenericCommentEvent {
    GenericCommentEvent {
        is_pr,
        action: GenericCommentAction::Created,
        body: body.to_string(),
        link: format!("https://github.com/org/repo/issues/{number}#comment"),
        number,
        repo: repo(),
        author: User::new(author),
        issue_author: User::new("issue-author"),
        assignees: Vec::new(),
        issue_state: "open".to_string(),
        issue_title: "A title".to_string(),
        issue_body: String::new(),
        issue_link: format!("https://github.com/org/repo/issues/{number}"),
        head_sha: String::new(),
        guid: "guid-1".to_string(),
    }
}
