//! `/close`, `/reopen` and the `lifecycle/*` labels.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};

use super::{add_label, has_label, issue_labels, remove_label, respond};
use crate::agent::Agent;
use crate::command::{CommandArg, CommandMatch, PluginCommand};
use crate::event::GenericCommentEvent;
use crate::plugin::{CommandHelp, Plugin};

pub const FROZEN_LABEL: &str = "lifecycle/frozen";
pub const STALE_LABEL: &str = "lifecycle/stale";
pub const ROTTEN_LABEL: &str = "lifecycle/rotten";
const LIFECYCLE_LABELS: [&str; 3] = [FROZEN_LABEL, STALE_LABEL, ROTTEN_LABEL];

pub struct LifecyclePlugin {
    commands: Vec<PluginCommand>,
}

impl LifecyclePlugin {
    pub fn new() -> Result<Self> {
        Ok(Self {
            commands: vec![
                PluginCommand::builder("close", &["close"])
                    .help(
                        CommandHelp::new("/close", "Closes an issue or PR.")
                            .who_can_use("Authors and collaborators on the repository can trigger this command.")
                            .examples(&["/close"]),
                    )
                    .build()?,
                PluginCommand::builder("reopen", &["reopen"])
                    .help(
                        CommandHelp::new("/reopen", "Reopens an issue or PR")
                            .who_can_use("Authors and collaborators on the repository can trigger this command.")
                            .examples(&["/reopen"]),
                    )
                    .build()?,
                PluginCommand::builder("lifecycle", &["lifecycle"])
                    .prefix("remove")
                    .arg(CommandArg::required("frozen|stale|rotten"))
                    .help(
                        CommandHelp::new(
                            "/[remove-]lifecycle <frozen|stale|rotten>",
                            "Flags an issue or PR as frozen/stale/rotten",
                        )
                        .examples(&["/lifecycle frozen", "/remove-lifecycle stale"]),
                    )
                    .build()?,
            ],
        })
    }

    async fn close(&self, agent: &Agent, event: &GenericCommentEvent) -> Result<()> {
        if !event.is_open() {
            return Ok(());
        }
        let repo = event.repo.repo_ref();
        let commenter = &event.author.login;
        let is_author = event.issue_author.login.eq_ignore_ascii_case(commenter);
        let is_collaborator = agent
            .scm
            .is_collaborator(&repo, commenter)
            .await
            .with_context(|| format!("failed to check collaborator {commenter} on {repo}"))?;
        let labels = issue_labels(agent, event).await?;
        let active = !has_label(&labels, STALE_LABEL) && !has_label(&labels, ROTTEN_LABEL);

        if !is_author && !is_collaborator && active {
            info!(number = event.number, commenter = %commenter, "refusing to close active issue");
            return respond(
                agent,
                event,
                "You can't close an active issue/PR unless you authored it or you are a collaborator.",
            )
            .await;
        }

        let closed = if event.is_pr {
            agent.scm.close_pull_request(&repo, event.number).await
        } else {
            agent.scm.close_issue(&repo, event.number).await
        };
        closed.with_context(|| format!("failed to close {repo}#{}", event.number))?;
        info!(number = event.number, commenter = %commenter, "closed");
        let noun = if event.is_pr { "PR" } else { "issue" };
        respond(agent, event, &format!("Closed this {noun}.")).await
    }

    async fn reopen(&self, agent: &Agent, event: &GenericCommentEvent) -> Result<()> {
        if event.is_open() {
            return Ok(());
        }
        let repo = event.repo.repo_ref();
        let commenter = &event.author.login;
        let is_author = event.issue_author.login.eq_ignore_ascii_case(commenter);
        let is_collaborator = agent
            .scm
            .is_collaborator(&repo, commenter)
            .await
            .with_context(|| format!("failed to check collaborator {commenter} on {repo}"))?;
        if !is_author && !is_collaborator {
            return respond(
                agent,
                event,
                "You can't reopen an issue/PR unless you authored it or you are a collaborator.",
            )
            .await;
        }

        let reopened = if event.is_pr {
            agent.scm.reopen_pull_request(&repo, event.number).await
        } else {
            agent.scm.reopen_issue(&repo, event.number).await
        };
        let noun = if event.is_pr { "PR" } else { "issue" };
        if let Err(error) = reopened {
            warn!(number = event.number, error = %error, "reopen failed");
            respond(agent, event, &format!("Failed to re-open this {noun}: {error}")).await?;
            return Err(error).with_context(|| format!("failed to reopen {repo}#{}", event.number));
        }
        respond(agent, event, &format!("Reopened this {noun}.")).await
    }

    async fn lifecycle(
        &self,
        matched: &CommandMatch,
        agent: &Agent,
        event: &GenericCommentEvent,
    ) -> Result<()> {
        let Some(state) = matched.arg.as_deref() else {
            return Ok(());
        };
        let target = format!("lifecycle/{}", state.to_ascii_lowercase());
        let labels = issue_labels(agent, event).await?;
        if matched.has_prefix("remove") {
            if has_label(&labels, &target) {
                remove_label(agent, event, &target).await?;
            }
            return Ok(());
        }
        if !has_label(&labels, &target) {
            add_label(agent, event, &target).await?;
        }
        for other in LIFECYCLE_LABELS {
            if other != target && has_label(&labels, other) {
                remove_label(agent, event, other).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Plugin for LifecyclePlugin {
    fn name(&self) -> &'static str {
        "lifecycle"
    }

    fn description(&self) -> &'static str {
        "Close, reopen, flag and/or unflag an issue or PR as frozen/stale/rotten"
    }

    fn commands(&self) -> &[PluginCommand] {
        &self.commands
    }

    async fn handle_command(
        &self,
        matched: &CommandMatch,
        agent: &Agent,
        event: &GenericCommentEvent,
    ) -> Result<()> {
        match matched.command {
            "close" => self.close(agent, event).await,
            "reopen" => self.reopen(agent, event).await,
            "lifecycle" => self.lifecycle(matched, agent, event).await,
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LifecyclePlugin, FROZEN_LABEL, STALE_LABEL};
    use crate::test_support::{comment_event, Harness};

    #[tokio::test]
    async fn functional_non_collaborator_cannot_close_active_issue() {
        let harness = Harness::new();
        let plugin = LifecyclePlugin::new().expect("plugin");
        harness
            .comment(&plugin, &comment_event("/close", 5, false, "mallory"))
            .await
            .expect("handle");
        let snapshot = harness.fake.snapshot();
        assert!(snapshot.issues_closed.is_empty());
        let comments = harness.comments();
        assert_eq!(comments.len(), 1);
        assert!(comments[0].starts_with("You can't close an active issue/PR"));
    }

    #[tokio::test]
    async fn functional_non_collaborator_closes_stale_issue_with_audit_comment() {
        let harness = Harness::new();
        harness.seed_labels(5, &[STALE_LABEL]);
        let plugin = LifecyclePlugin::new().expect("plugin");
        harness
            .comment(&plugin, &comment_event("/close", 5, false, "mallory"))
            .await
            .expect("handle");
        assert_eq!(harness.fake.snapshot().issues_closed, vec![5]);
        let comments = harness.comments();
        assert_eq!(comments.len(), 1);
        assert!(comments[0].starts_with("Closed this issue."));
    }

    #[tokio::test]
    async fn functional_collaborator_closes_pr_with_mixed_case_and_cr() {
        let harness = Harness::new();
        harness.fake.with_state(|state| state.collaborators.push("carol".to_string()));
        let plugin = LifecyclePlugin::new().expect("plugin");
        harness
            .comment(&plugin, &comment_event("/Close \r", 6, true, "carol"))
            .await
            .expect("handle");
        assert_eq!(harness.fake.snapshot().pull_requests_closed, vec![6]);
    }

    #[tokio::test]
    async fn functional_reopen_requires_author_or_collaborator() {
        let harness = Harness::new();
        let plugin = LifecyclePlugin::new().expect("plugin");
        let mut event = comment_event("/reopen", 7, false, "mallory");
        event.issue_state = "closed".to_string();
        harness.comment(&plugin, &event).await.expect("handle");
        assert!(harness.fake.snapshot().issues_reopened.is_empty());
        assert!(harness.comments()[0].starts_with("You can't reopen an issue/PR"));

        event.author.login = "issue-author".to_string();
        harness.comment(&plugin, &event).await.expect("handle");
        assert_eq!(harness.fake.snapshot().issues_reopened, vec![7]);
    }

    #[tokio::test]
    async fn unit_lifecycle_label_replaces_others() {
        let harness = Harness::new();
        harness.seed_labels(8, &[STALE_LABEL]);
        let plugin = LifecyclePlugin::new().expect("plugin");
        harness
            .comment(&plugin, &comment_event("/lifecycle frozen", 8, false, "alice"))
            .await
            .expect("handle");
        assert_eq!(harness.added_labels(), vec![FROZEN_LABEL]);
        assert_eq!(harness.removed_labels(), vec![STALE_LABEL]);

        harness
            .comment(&plugin, &comment_event("/remove-lifecycle frozen", 8, false, "alice"))
            .await
            .expect("handle");
        assert_eq!(harness.removed_labels(), vec![STALE_LABEL, FROZEN_LABEL]);
    }
}
