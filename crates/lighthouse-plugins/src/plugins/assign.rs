//! `/assign`, `/unassign`, `/cc` and `/uncc`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lighthouse_scm::ScmError;
use tracing::info;

use super::respond;
use crate::agent::Agent;
use crate::command::{created_on_pull_request, CommandArg, CommandMatch, PluginCommand};
use crate::event::GenericCommentEvent;
use crate::plugin::{CommandHelp, Plugin};

pub struct AssignPlugin {
    commands: Vec<PluginCommand>,
}

impl AssignPlugin {
    pub fn new() -> Result<Self> {
        Ok(Self {
            commands: vec![
                PluginCommand::builder("assign", &["assign", "unassign"])
                    .arg(CommandArg::optional(".+?"))
                    .help(
                        CommandHelp::new(
                            "/[un]assign [[@]<username>...]",
                            "Assigns assignee(s) to the PR or issue. Without arguments the commenter is used.",
                        )
                        .examples(&["/assign", "/unassign", "/assign @alice @bob"]),
                    )
                    .build()?,
                PluginCommand::builder("cc", &["cc", "uncc"])
                    .arg(CommandArg::optional(".+?"))
                    .filter(created_on_pull_request)
                    .help(
                        CommandHelp::new(
                            "/[un]cc [[@]<username>...]",
                            "Requests a review from the user(s).",
                        )
                        .examples(&["/cc", "/uncc", "/cc @alice"]),
                    )
                    .build()?,
            ],
        })
    }
}

/// Logins named in the argument, or the commenter when there are none.
fn parse_logins(matched: &CommandMatch, commenter: &str) -> Vec<String> {
    let logins: Vec<String> = matched
        .arg
        .as_deref()
        .unwrap_or_default()
        .split(|ch: char| ch.is_whitespace() || ch == ',')
        .map(|word| word.trim_start_matches('@'))
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect();
    if logins.is_empty() {
        vec![commenter.to_string()]
    } else {
        logins
    }
}

#[async_trait]
impl Plugin for AssignPlugin {
    fn name(&self) -> &'static str {
        "assign"
    }

    fn description(&self) -> &'static str {
        "The assign plugin assigns or requests reviews from users."
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
        let repo = event.repo.repo_ref();
        let logins = parse_logins(matched, &event.author.login);
        let org = &event.repo.namespace;
        let result = match matched.name.as_str() {
            "assign" => agent.scm.assign_issue(&repo, event.number, &logins).await,
            "unassign" => agent.scm.unassign_issue(&repo, event.number, &logins).await,
            "cc" => agent.scm.request_review(&repo, event.number, &logins).await,
            "uncc" => agent.scm.unrequest_review(&repo, event.number, &logins).await,
            _ => return Ok(()),
        };
        match result {
            Ok(()) => {
                info!(number = event.number, command = %matched.name, users = ?logins, "updated users");
                Ok(())
            }
            Err(ScmError::MissingUsers { users, .. }) => {
                let people = format!("{}/orgs/{org}/people", agent.server_url.trim_end_matches('/'));
                let reply = if matched.name == "cc" {
                    format!(
                        "GitHub didn't allow me to request PR reviews from the following users: {}.\n\nNote that only [{org} members]({people}) and repo collaborators can review this PR, and authors cannot review their own PRs.",
                        users.join(", ")
                    )
                } else {
                    format!(
                        "GitHub didn't allow me to assign the following users: {}.\n\nNote that only [{org} members]({people}), repo collaborators and people who have commented on this issue/PR can be assigned. Additionally, issues/PRs can only have 10 assignees at the same time.",
                        users.join(", ")
                    )
                };
                respond(agent, event, &reply).await
            }
            Err(error) => Err(error)
                .with_context(|| format!("failed to {} on {repo}#{}", matched.name, event.number)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_logins, AssignPlugin};
    use crate::command::CommandMatch;
    use crate::test_support::{comment_event, Harness};

    #[test]
    fn unit_parse_logins_defaults_to_commenter() {
        let mut matched = CommandMatch {
            command: "assign",
            name: "assign".to_string(),
            prefix: None,
            arg: None,
        };
        assert_eq!(parse_logins(&matched, "alice"), vec!["alice"]);
        matched.arg = Some("@bob, carol".to_string());
        assert_eq!(parse_logins(&matched, "alice"), vec!["bob", "carol"]);
    }

    #[tokio::test]
    async fn functional_assign_self_and_missing_users() {
        let harness = Harness::new();
        harness
            .fake
            .with_state(|state| state.collaborators.push("alice".to_string()));
        let plugin = AssignPlugin::new().expect("plugin");
        harness
            .comment(&plugin, &comment_event("/assign", 1, false, "alice"))
            .await
            .expect("handle");
        assert_eq!(harness.fake.snapshot().assignees_added, vec!["org/repo#1:alice"]);

        harness
            .comment(&plugin, &comment_event("/assign @stranger", 1, false, "alice"))
            .await
            .expect("handle");
        let comments = harness.comments();
        assert_eq!(comments.len(), 1);
        assert!(comments[0].starts_with("GitHub didn't allow me to assign the following users: stranger."));
    }

    #[tokio::test]
    async fn functional_cc_requests_review_on_pull_requests_only() {
        let harness = Harness::new();
        harness
            .fake
            .with_state(|state| state.collaborators.push("bob".to_string()));
        let plugin = AssignPlugin::new().expect("plugin");
        harness
            .comment(&plugin, &comment_event("/cc @bob", 2, true, "alice"))
            .await
            .expect("handle");
        harness
            .comment(&plugin, &comment_event("/cc @bob", 3, false, "alice"))
            .await
            .expect("handle");
        harness
            .comment(&plugin, &comment_event("/uncc @bob", 2, true, "alice"))
            .await
            .expect("handle");
        let snapshot = harness.fake.snapshot();
        assert_eq!(snapshot.reviewers_requested, vec!["org/repo#2:bob"]);
        assert_eq!(snapshot.reviewers_unrequested, vec!["org/repo#2:bob"]);
    }
}
