//! Built-in plugins.

use std::sync::Arc;

use anyhow::{Context, Result};
use lighthouse_core::RepoRef;
use lighthouse_scm::Label;

use crate::agent::Agent;
use crate::event::GenericCommentEvent;
use crate::plugin::Plugin;

pub mod assign;
pub mod help;
pub mod hold;
pub mod label;
pub mod lifecycle;
pub mod milestone;
pub mod skip;
pub mod trigger;
pub mod wip;

pub fn builtin() -> Result<Vec<Arc<dyn Plugin>>> {
    Ok(vec![
        Arc::new(assign::AssignPlugin::new()?),
        Arc::new(help::HelpPlugin::new()?),
        Arc::new(hold::HoldPlugin::new()?),
        Arc::new(label::LabelPlugin::new()?),
        Arc::new(lifecycle::LifecyclePlugin::new()?),
        Arc::new(milestone::MilestonePlugin::new()?),
        Arc::new(skip::SkipPlugin::new()?),
        Arc::new(trigger::TriggerPlugin::new()?),
        Arc::new(wip::WipPlugin::new()?),
    ])
}

/// `reply` followed by a collapsed quote of the comment it answers.
pub fn format_response(author: &str, body: &str, link: &str, reply: &str) -> String {
    let quoted = body
        .lines()
        .map(|line| format!(">{line}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "{reply}\n\n<details>\n\nIn response to [this]({link}) from @{author}:\n\n{quoted}\n</details>"
    )
}

/// Posts `reply` on the event's issue or pull request.
pub async fn respond(agent: &Agent, event: &GenericCommentEvent, reply: &str) -> Result<()> {
    let body = format_response(&event.author.login, &event.body, &event.link, reply);
    agent
        .scm
        .create_comment(&event.repo.repo_ref(), event.number, event.is_pr, &body)
        .await
        .with_context(|| format!("failed to comment on {}#{}", event.repo.full_name, event.number))?;
    Ok(())
}

pub async fn issue_labels(agent: &Agent, event: &GenericCommentEvent) -> Result<Vec<Label>> {
    agent
        .scm
        .get_issue_labels(&event.repo.repo_ref(), event.number, event.is_pr)
        .await
        .with_context(|| format!("failed to list labels on {}#{}", event.repo.full_name, event.number))
}

/// Paths touched by a pull request, fetched only when some job filters on them.
pub async fn changed_files_if_needed(
    agent: &Agent,
    repo: &RepoRef,
    number: u64,
    needed: bool,
) -> Result<Option<Vec<String>>> {
    if !needed {
        return Ok(None);
    }
    let changes = agent
        .scm
        .get_pull_request_changes(repo, number)
        .await
        .with_context(|| format!("failed to list changes of {repo}#{number}"))?;
    Ok(Some(changes.into_iter().map(|change| change.path).collect()))
}

pub fn has_label(labels: &[Label], name: &str) -> bool {
    labels.iter().any(|label| label.name.eq_ignore_ascii_case(name))
}

pub async fn add_label(agent: &Agent, event: &GenericCommentEvent, label: &str) -> Result<()> {
    agent
        .scm
        .add_label(&event.repo.repo_ref(), event.number, label, event.is_pr)
        .await
        .with_context(|| format!("failed to add label {label} to {}#{}", event.repo.full_name, event.number))
}

pub async fn remove_label(agent: &Agent, event: &GenericCommentEvent, label: &str) -> Result<()> {
    agent
        .scm
        .remove_label(&event.repo.repo_ref(), event.number, label, event.is_pr)
        .await
        .with_context(|| {
            format!("failed to remove label {label} from {}#{}", event.repo.full_name, event.number)
        })
}

#[cfg(test)]
mod tests {
    use super::format_response;

    #[test]
    fn unit_format_response_quotes_every_line() {
        let reply = format_response("alice", "/close\nplease", "https://link", "Closed this issue.");
        assert!(reply.starts_with("Closed this issue."));
        assert!(reply.contains("from @alice"));
        assert!(reply.contains(">/close\n>please"));
        assert!(reply.contains("[this](https://link)"));
    }
}
