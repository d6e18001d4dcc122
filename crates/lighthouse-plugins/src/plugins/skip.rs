//! `/skip` clears failed statuses of jobs that would not run on the PR.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lighthouse_scm::{Status, StatusState};
use tracing::info;

use super::changed_files_if_needed;
use crate::agent::Agent;
use crate::command::{CommandMatch, PluginCommand};
use crate::event::GenericCommentEvent;
use crate::plugin::{CommandHelp, Plugin};

pub struct SkipPlugin {
    commands: Vec<PluginCommand>,
}

impl SkipPlugin {
    pub fn new() -> Result<Self> {
        Ok(Self {
            commands: vec![PluginCommand::builder("skip", &["skip"])
                .filter(|event| event.is_created() && event.is_pr && event.is_open())
                .help(
                    CommandHelp::new(
                        "/skip",
                        "Cleans up GitHub stale commit statuses for non-blocking jobs on a PR.",
                    )
                    .examples(&["/skip"]),
                )
                .build()?],
        })
    }
}

#[async_trait]
impl Plugin for SkipPlugin {
    fn name(&self) -> &'static str {
        "skip"
    }

    fn description(&self) -> &'static str {
        "The skip plugin allows users to clean up GitHub stale commit statuses for non-blocking jobs on a PR."
    }

    fn commands(&self) -> &[PluginCommand] {
        &self.commands
    }

    async fn handle_command(
        &self,
        _matched: &CommandMatch,
        agent: &Agent,
        event: &GenericCommentEvent,
    ) -> Result<()> {
        let repo = event.repo.repo_ref();
        let pr = agent
            .scm
            .get_pull_request(&repo, event.number)
            .await
            .with_context(|| format!("failed to get pull request {repo}#{}", event.number))?;
        let combined = agent
            .scm
            .get_combined_status(&repo, &pr.sha)
            .await
            .with_context(|| format!("failed to get statuses of {}", pr.sha))?;
        let states: HashMap<&str, StatusState> = combined
            .statuses
            .iter()
            .map(|status| (status.label.as_str(), status.state))
            .collect();

        let presubmits = agent.config.presubmits_for(&event.repo.full_name);
        let needs_changes = presubmits
            .iter()
            .any(|job| !job.base.run_if_changed.is_empty());
        let changes = changed_files_if_needed(agent, &repo, event.number, needs_changes).await?;

        for job in presubmits {
            match states.get(job.context.as_str()) {
                None | Some(StatusState::Success) => continue,
                Some(_) => {}
            }
            if job.should_run(pr.target(), changes.as_deref(), false, false) {
                continue;
            }
            if job.skip_report {
                continue;
            }
            let status = Status {
                state: StatusState::Success,
                label: job.context.clone(),
                desc: "Skipped".to_string(),
                target: String::new(),
            };
            agent
                .scm
                .create_status(&repo, &pr.sha, &status)
                .await
                .with_context(|| format!("failed to skip context {}", job.context))?;
            info!(number = event.number, context = %job.context, "skipped stale status");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use lighthouse_config::{Config, PluginConfig, Presubmit};
    use lighthouse_scm::{CombinedStatus, PullRequest, PullRequestBranch, Status, StatusState};

    use super::SkipPlugin;
    use crate::test_support::{comment_event, Harness};

    fn config() -> Config {
        let mut optional = Presubmit::named("failed-tests");
        optional.optional = true;
        let mut blocking = Presubmit::named("unit");
        blocking.always_run = true;
        Config {
            presubmits: BTreeMap::from([("org/repo".to_string(), vec![optional, blocking])]),
            ..Config::default()
        }
    }

    fn status(label: &str, state: StatusState) -> Status {
        Status {
            state,
            label: label.to_string(),
            desc: "Job failed.".to_string(),
            target: String::new(),
        }
    }

    #[tokio::test]
    async fn functional_skip_marks_optional_failure_as_skipped() {
        let harness = Harness::with_config(config(), PluginConfig::default());
        harness.fake.with_state(|state| {
            state.pull_requests.insert(
                1,
                PullRequest {
                    number: 1,
                    sha: "shalala".to_string(),
                    base: PullRequestBranch {
                        ref_name: "master".to_string(),
                        ..PullRequestBranch::default()
                    },
                    ..PullRequest::default()
                },
            );
            state.combined_statuses.insert(
                "shalala".to_string(),
                CombinedStatus {
                    state: StatusState::Failure,
                    sha: "shalala".to_string(),
                    statuses: vec![
                        status("failed-tests", StatusState::Failure),
                        status("unit", StatusState::Failure),
                    ],
                },
            );
        });
        let plugin = SkipPlugin::new().expect("plugin");
        harness
            .comment(&plugin, &comment_event("/skip", 1, true, "alice"))
            .await
            .expect("handle");

        let created = harness.fake.snapshot().created_statuses;
        assert_eq!(
            created.get("shalala"),
            Some(&vec![Status {
                state: StatusState::Success,
                label: "failed-tests".to_string(),
                desc: "Skipped".to_string(),
                target: String::new(),
            }])
        );
    }

    #[tokio::test]
    async fn unit_skip_ignores_issues() {
        let harness = Harness::with_config(config(), PluginConfig::default());
        let plugin = SkipPlugin::new().expect("plugin");
        harness
            .comment(&plugin, &comment_event("/skip", 2, false, "alice"))
            .await
            .expect("handle");
        assert!(harness.fake.snapshot().created_statuses.is_empty());
    }
}
