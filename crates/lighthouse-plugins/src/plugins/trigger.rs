//! Creates presubmit and postsubmit jobs.
//!
//! Pull requests from trusted authors run their default presubmits when
//! opened or updated; everyone else waits for `/ok-to-test` from a trusted
//! user. Comments rerun jobs by trigger (`/test <job>`, `/test all`) or by
//! failed status (`/retest`). Pushes run the matching postsubmits.

use std::collections::HashSet;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use lighthouse_config::{PluginConfig, Presubmit, Trigger};
use lighthouse_core::{branch_from_ref, tag_from_ref};
use lighthouse_jobs::{LighthouseJob, Pull, Refs};
use lighthouse_scm::{
    Action, PullRequest, PullRequestHook, PushHook, Repository, StatusState,
};
use regex::Regex;
use tracing::{debug, error, info, warn};

use super::{add_label, changed_files_if_needed, has_label, issue_labels, remove_label, respond};
use crate::agent::Agent;
use crate::event::GenericCommentEvent;
use crate::plugin::{CommandHelp, HandlerKind, Plugin, PluginHelp};

pub const OK_TO_TEST_LABEL: &str = "ok-to-test";
pub const NEEDS_OK_TO_TEST_LABEL: &str = "needs-ok-to-test";

/// Phrase identifying the welcome comment left on untrusted pull requests.
const WELCOME_MARKER: &str = "to verify that this patch is reasonable to test";

pub struct TriggerPlugin {
    ok_to_test: Regex,
    retest: Regex,
    test_all: Regex,
}

impl TriggerPlugin {
    pub fn new() -> Result<Self> {
        Ok(Self {
            ok_to_test: Regex::new(r"(?mi)^/(?:lh-)?ok-to-test[ \t]*\r?$")
                .context("invalid ok-to-test pattern")?,
            retest: Regex::new(r"(?mi)^/(?:lh-)?retest[ \t]*\r?$").context("invalid retest pattern")?,
            test_all: Regex::new(r"(?mi)^/(?:lh-)?test all,?(?:[ \t]+|\r?$)")
                .context("invalid test all pattern")?,
        })
    }

    async fn handle_comment(&self, agent: &Agent, event: &GenericCommentEvent) -> Result<()> {
        if !event.is_pr || !event.is_created() || !event.is_open() {
            return Ok(());
        }
        let body = event.body.as_str();
        let presubmits = agent.config.presubmits_for(&event.repo.full_name);
        let ok_to_test = self.ok_to_test.is_match(body);
        let retest = self.retest.is_match(body);
        let requested: Vec<&Presubmit> = presubmits
            .iter()
            .filter(|job| job.trigger_matches(body))
            .collect();
        if !ok_to_test && !retest && requested.is_empty() {
            return Ok(());
        }

        let repo = event.repo.repo_ref();
        let trigger = agent
            .plugin_config
            .trigger_for(&event.repo.namespace, &event.repo.name);
        let commenter = &event.author.login;
        let commenter_trusted = trusted_user(agent, &trigger, &event.repo, commenter).await?;
        let labels = issue_labels(agent, event).await?;
        if !commenter_trusted {
            let pr_approved = !trigger.ignore_ok_to_test && has_label(&labels, OK_TO_TEST_LABEL);
            if ok_to_test || !pr_approved {
                debug!(number = event.number, commenter = %commenter, "ignoring untrusted test request");
                return Ok(());
            }
        }

        let pr = agent
            .scm
            .get_pull_request(&repo, event.number)
            .await
            .with_context(|| format!("failed to get pull request {repo}#{}", event.number))?;
        let needs_changes = presubmits
            .iter()
            .any(|job| !job.base.run_if_changed.is_empty());
        let changes = changed_files_if_needed(agent, &repo, pr.number, needs_changes).await?;
        let branch = pr.target();

        let mut to_run: Vec<&Presubmit> = Vec::new();
        if ok_to_test {
            if has_label(&labels, NEEDS_OK_TO_TEST_LABEL) {
                remove_label(agent, event, NEEDS_OK_TO_TEST_LABEL).await?;
            }
            if let Some(pruner) = agent.comment_pruner() {
                if let Err(error) = pruner
                    .prune_comments(|comment| comment.body.contains(WELCOME_MARKER))
                    .await
                {
                    warn!(number = event.number, error = %format!("{error:#}"), "failed to prune welcome comment");
                }
            }
            if !trigger.ignore_ok_to_test && !has_label(&labels, OK_TO_TEST_LABEL) {
                add_label(agent, event, OK_TO_TEST_LABEL).await?;
            }
            to_run.extend(
                presubmits
                    .iter()
                    .filter(|job| job.should_run(branch, changes.as_deref(), false, false)),
            );
        }
        if retest {
            let combined = agent
                .scm
                .get_combined_status(&repo, &pr.sha)
                .await
                .with_context(|| format!("failed to get statuses of {}", pr.sha))?;
            let failed: HashSet<&str> = combined
                .statuses
                .iter()
                .filter(|status| matches!(status.state, StatusState::Failure | StatusState::Error))
                .map(|status| status.label.as_str())
                .collect();
            to_run.extend(presubmits.iter().filter(|job| {
                failed.contains(job.context.as_str()) && job.base.can_run_on_branch(branch)
            }));
        }
        let test_all = self.test_all.is_match(body);
        to_run.extend(
            requested
                .into_iter()
                .filter(|job| job.should_run(branch, changes.as_deref(), !test_all, test_all)),
        );

        let mut seen = HashSet::new();
        to_run.retain(|job| seen.insert(job.name()));
        if to_run.is_empty() {
            let reply = "There are no presubmit jobs to run for this request.";
            if !ok_to_test {
                respond(agent, event, reply).await?;
            }
            return Ok(());
        }
        let created = create_presubmits(agent, &event.repo, &pr, &to_run, &event.guid).await?;
        info!(number = pr.number, created, commenter = %commenter, "triggered presubmits from comment");
        Ok(())
    }
}

/// Members of the repository owner or the trusted org, and collaborators
/// unless the trigger restricts trust to org members.
pub async fn trusted_user(
    agent: &Agent,
    trigger: &Trigger,
    repo: &Repository,
    login: &str,
) -> Result<bool> {
    if agent.scm.is_bot(login) {
        return Ok(true);
    }
    let repo_ref = repo.repo_ref();
    if !trigger.only_org_members
        && agent
            .scm
            .is_collaborator(&repo_ref, login)
            .await
            .with_context(|| format!("failed to check collaborator {login} on {repo_ref}"))?
    {
        return Ok(true);
    }
    if agent
        .scm
        .is_org_member(&repo.namespace, login)
        .await
        .with_context(|| format!("failed to check membership of {login} in {}", repo.namespace))?
    {
        return Ok(true);
    }
    if !trigger.trusted_org.is_empty() && trigger.trusted_org != repo.namespace {
        return agent
            .scm
            .is_org_member(&trigger.trusted_org, login)
            .await
            .with_context(|| {
                format!("failed to check membership of {login} in {}", trigger.trusted_org)
            });
    }
    Ok(false)
}

pub fn pull_refs(repo: &Repository, pr: &PullRequest) -> Refs {
    Refs {
        org: repo.namespace.clone(),
        repo: repo.name.clone(),
        repo_link: repo.link.clone(),
        base_ref: pr.base.ref_name.clone(),
        base_sha: pr.base.sha.clone(),
        base_link: commit_link(repo, &pr.base.sha),
        clone_uri: repo.clone.clone(),
        pulls: vec![Pull {
            number: pr.number,
            author: pr.author.login.clone(),
            sha: pr.sha.clone(),
            link: pr.link.clone(),
            ref_name: pr.head.ref_name.clone(),
        }],
    }
}

fn commit_link(repo: &Repository, sha: &str) -> String {
    if repo.link.is_empty() || sha.is_empty() {
        String::new()
    } else {
        format!("{}/commit/{sha}", repo.link)
    }
}

/// Creates one job per presubmit; every job is attempted before failing.
async fn create_presubmits(
    agent: &Agent,
    repo: &Repository,
    pr: &PullRequest,
    jobs: &[&Presubmit],
    guid: &str,
) -> Result<usize> {
    let refs = pull_refs(repo, pr);
    let namespace = agent.job_namespace().to_string();
    let mut created = 0_usize;
    let mut failures = Vec::new();
    for job in jobs {
        let record = LighthouseJob::new_presubmit(job, refs.clone(), &namespace, guid);
        match agent.jobs.create_job(record).await {
            Ok(stored) => {
                created = created.saturating_add(1);
                info!(job = %stored.key(), context = %job.context, number = pr.number, "created presubmit job");
            }
            Err(err) => {
                error!(job = %job.name(), number = pr.number, error = %err, "failed to create presubmit job");
                failures.push(job.name().to_string());
            }
        }
    }
    if failures.is_empty() {
        Ok(created)
    } else {
        Err(anyhow!("failed to create presubmit jobs: {}", failures.join(", ")))
    }
}

fn welcome_message(agent: &Agent, trigger: &Trigger, org: &str, author: &str) -> String {
    let join_url = if trigger.join_org_url.is_empty() {
        format!("{}/orgs/{org}/people", agent.server_url.trim_end_matches('/'))
    } else {
        trigger.join_org_url.clone()
    };
    format!(
        "Hi @{author}. Thanks for your PR.\n\nI'm waiting for a [{org}]({join_url}) member {WELCOME_MARKER}. If it is, they should reply with `/ok-to-test` on its own line. Until that is done, I will not automatically test new commits in this PR, but the usual testing commands by org members will still work. Regular contributors should [join the org]({join_url}) to skip this step.\n\nOnce the patch is verified, the new status will be reflected by the `{OK_TO_TEST_LABEL}` label."
    )
}

#[async_trait]
impl Plugin for TriggerPlugin {
    fn name(&self) -> &'static str {
        "trigger"
    }

    fn description(&self) -> &'static str {
        "The trigger plugin starts tests in reaction to commands and pull request events. It is responsible for ensuring that test jobs are only run on trusted PRs."
    }

    fn handles(&self, kind: HandlerKind) -> bool {
        matches!(
            kind,
            HandlerKind::GenericComment | HandlerKind::PullRequest | HandlerKind::Push
        )
    }

    fn help(&self, config: &PluginConfig, org: &str, repo: &str) -> PluginHelp {
        let trigger = config.trigger_for(org, repo);
        let mut notes = Vec::new();
        if trigger.only_org_members {
            notes.push("Only org members are trusted to run tests.".to_string());
        }
        if !trigger.trusted_org.is_empty() {
            notes.push(format!("Members of {} are trusted to run tests.", trigger.trusted_org));
        }
        let trusted = "Members of the trusted organization for the repo.";
        PluginHelp {
            name: self.name(),
            description: self.description(),
            config: notes,
            commands: vec![
                CommandHelp::new("/ok-to-test", "Marks a PR as 'trusted' and starts tests.")
                    .who_can_use(trusted)
                    .examples(&["/ok-to-test"]),
                CommandHelp::new(
                    "/test (<job name>|all)",
                    "Manually starts a/all automatically configured test job(s).",
                )
                .who_can_use("Anyone can trigger this command on a trusted PR.")
                .examples(&["/test all", "/test pull-unit"]),
                CommandHelp::new("/retest", "Rerun test jobs that have failed.")
                    .who_can_use("Anyone can trigger this command on a trusted PR.")
                    .examples(&["/retest"]),
            ],
        }
    }

    async fn handle_generic_comment(&self, agent: &Agent, event: &GenericCommentEvent) -> Result<()> {
        self.handle_comment(agent, event).await
    }

    async fn handle_pull_request(&self, agent: &Agent, hook: &PullRequestHook) -> Result<()> {
        let labeled_ok = hook.action == Action::Label
            && hook
                .label
                .as_ref()
                .is_some_and(|label| label.name.eq_ignore_ascii_case(OK_TO_TEST_LABEL));
        if !labeled_ok
            && !matches!(
                hook.action,
                Action::Open | Action::Reopen | Action::Sync | Action::ReadyForReview
            )
        {
            return Ok(());
        }
        let pr = &hook.pull_request;
        let repo = hook.repo.repo_ref();
        let trigger = agent
            .plugin_config
            .trigger_for(&hook.repo.namespace, &hook.repo.name);
        let approved = !trigger.ignore_ok_to_test
            && pr
                .labels
                .iter()
                .any(|label| label.name.eq_ignore_ascii_case(OK_TO_TEST_LABEL));
        let trusted = labeled_ok
            || approved
            || trusted_user(agent, &trigger, &hook.repo, &pr.author.login).await?;

        if !trusted {
            if hook.action == Action::Open {
                let has_needs = pr
                    .labels
                    .iter()
                    .any(|label| label.name.eq_ignore_ascii_case(NEEDS_OK_TO_TEST_LABEL));
                if !has_needs {
                    agent
                        .scm
                        .add_label(&repo, pr.number, NEEDS_OK_TO_TEST_LABEL, true)
                        .await
                        .with_context(|| format!("failed to label {repo}#{}", pr.number))?;
                }
                let welcome = welcome_message(agent, &trigger, &hook.repo.namespace, &pr.author.login);
                agent
                    .scm
                    .create_comment(&repo, pr.number, true, &welcome)
                    .await
                    .with_context(|| format!("failed to comment on {repo}#{}", pr.number))?;
                info!(number = pr.number, author = %pr.author.login, "pull request needs ok-to-test");
            }
            return Ok(());
        }

        let presubmits = agent.config.presubmits_for(&hook.repo.full_name);
        let needs_changes = presubmits
            .iter()
            .any(|job| !job.base.run_if_changed.is_empty());
        let changes = changed_files_if_needed(agent, &repo, pr.number, needs_changes).await?;
        let to_run: Vec<&Presubmit> = presubmits
            .iter()
            .filter(|job| job.should_run(pr.target(), changes.as_deref(), false, false))
            .collect();
        if to_run.is_empty() {
            debug!(number = pr.number, "no presubmits to run");
            return Ok(());
        }
        let created = create_presubmits(agent, &hook.repo, pr, &to_run, &hook.guid).await?;
        info!(number = pr.number, created, action = hook.action.as_str(), "triggered presubmits");
        Ok(())
    }

    async fn handle_push(&self, agent: &Agent, hook: &PushHook) -> Result<()> {
        if hook.is_deletion() {
            return Ok(());
        }
        let branch = tag_from_ref(&hook.ref_name)
            .or_else(|| branch_from_ref(&hook.ref_name))
            .unwrap_or(hook.ref_name.as_str());
        let changes = hook.changed_files();
        let refs = Refs {
            org: hook.repo.namespace.clone(),
            repo: hook.repo.name.clone(),
            repo_link: hook.repo.link.clone(),
            base_ref: branch.to_string(),
            base_sha: hook.after.clone(),
            base_link: commit_link(&hook.repo, &hook.after),
            clone_uri: hook.repo.clone.clone(),
            pulls: Vec::new(),
        };
        let namespace = agent.job_namespace().to_string();
        let mut failures = Vec::new();
        for job in agent.config.postsubmits_for(&hook.repo.full_name) {
            if !job.should_run(branch, &changes) {
                continue;
            }
            let record = LighthouseJob::new_postsubmit(job, refs.clone(), &namespace, &hook.guid);
            match agent.jobs.create_job(record).await {
                Ok(stored) => {
                    info!(job = %stored.key(), branch, sha = %hook.after, "created postsubmit job");
                }
                Err(err) => {
                    error!(job = %job.name(), branch, error = %err, "failed to create postsubmit job");
                    failures.push(job.name().to_string());
                }
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("failed to create postsubmit jobs: {}", failures.join(", ")))
        }
    }
}
