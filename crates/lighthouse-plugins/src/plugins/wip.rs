//! Labels draft and `WIP` pull requests as not ready to merge.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lighthouse_scm::{Action, PullRequestHook};
use regex::Regex;
use tracing::info;

use crate::agent::Agent;
use crate::plugin::{HandlerKind, Plugin};

pub const WIP_LABEL: &str = "do-not-merge/work-in-progress";

pub struct WipPlugin {
    title: Regex,
}

impl WipPlugin {
    pub fn new() -> Result<Self> {
        Ok(Self {
            title: Regex::new(r"(?i)^\W?WIP\W").context("invalid wip title pattern")?,
        })
    }

    fn needs_label(&self, title: &str, draft: bool) -> bool {
        draft || self.title.is_match(title)
    }
}

#[async_trait]
impl Plugin for WipPlugin {
    fn name(&self) -> &'static str {
        "wip"
    }

    fn description(&self) -> &'static str {
        "The wip (Work In Progress) plugin applies the 'do-not-merge/work-in-progress' label to pull requests whose title starts with 'WIP' or are in the 'draft' stage, and removes it from pull requests when they remove the title prefix or become ready for review."
    }

    fn handles(&self, kind: HandlerKind) -> bool {
        kind == HandlerKind::PullRequest
    }

    async fn handle_pull_request(&self, agent: &Agent, hook: &PullRequestHook) -> Result<()> {
        if !matches!(
            hook.action,
            Action::Open
                | Action::Reopen
                | Action::Update
                | Action::Sync
                | Action::ReadyForReview
                | Action::ConvertedToDraft
        ) {
            return Ok(());
        }
        let pr = &hook.pull_request;
        let repo = hook.repo.repo_ref();
        let labels = agent
            .scm
            .get_issue_labels(&repo, pr.number, true)
            .await
            .with_context(|| format!("failed to list labels on {repo}#{}", pr.number))?;
        let has = labels
            .iter()
            .any(|label| label.name.eq_ignore_ascii_case(WIP_LABEL));
        let needs = self.needs_label(&pr.title, pr.draft);

        if needs && !has {
            agent
                .scm
                .add_label(&repo, pr.number, WIP_LABEL, true)
                .await
                .with_context(|| format!("failed to add {WIP_LABEL} to {repo}#{}", pr.number))?;
            info!(number = pr.number, "marked pull request as work in progress");
        } else if !needs && has {
            agent
                .scm
                .remove_label(&repo, pr.number, WIP_LABEL, true)
                .await
                .with_context(|| format!("failed to remove {WIP_LABEL} from {repo}#{}", pr.number))?;
            info!(number = pr.number, "pull request no longer work in progress");
        }
        Ok(())
    }
}
