//! In-memory provider that records every mutating call for assertions.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use lighthouse_core::RepoRef;

use crate::error::{ScmError, ScmResult};
use crate::provider::ScmProvider;
use crate::types::{
    Change, CombinedStatus, Comment, Commit, Issue, Label, ListedIssueEvent, MergeDetails,
    Milestone, ProviderKind, PullRequest, Review, Status, StatusState, Team, TeamRole, User,
};

pub const FAKE_BOT_NAME: &str = "lighthouse-bot";

/// Recorded state of the fake provider.
///
/// Label and assignment entries use the `org/repo#number:value` format.
#[derive(Debug, Clone)]
pub struct FakeScmState {
    pub supports_pr_labels: bool,
    pub issue_labels_existing: Vec<String>,
    pub issue_labels_added: Vec<String>,
    pub issue_labels_removed: Vec<String>,
    pub repo_labels_existing: Vec<String>,

    pub issue_comments: HashMap<u64, Vec<Comment>>,
    pub pull_request_comments: HashMap<u64, Vec<Comment>>,
    pub issue_comments_added: Vec<String>,
    pub pull_request_comments_added: Vec<String>,
    pub comments_edited: Vec<String>,
    /// `org/repo#comment_id` for every deleted comment.
    pub issue_comments_deleted: Vec<String>,
    pub next_comment_id: u64,

    pub issues: HashMap<u64, Issue>,
    pub issue_events: HashMap<u64, Vec<ListedIssueEvent>>,
    pub issues_closed: Vec<u64>,
    pub issues_reopened: Vec<u64>,
    pub assignees_added: Vec<String>,
    pub assignees_removed: Vec<String>,
    pub collaborators: Vec<String>,

    pub pull_requests: HashMap<u64, PullRequest>,
    pub pull_request_changes: HashMap<u64, Vec<Change>>,
    pub pull_requests_closed: Vec<u64>,
    pub pull_requests_reopened: Vec<u64>,
    pub pull_requests_merged: Vec<u64>,

    pub reviews: HashMap<u64, Vec<Review>>,
    pub reviewers_requested: Vec<String>,
    pub reviewers_unrequested: Vec<String>,

    /// Statuses created through the provider, keyed by commit SHA.
    pub created_statuses: HashMap<String, Vec<Status>>,
    /// Pre-seeded combined statuses, keyed by ref or SHA.
    pub combined_statuses: HashMap<String, CombinedStatus>,
    pub commits: HashMap<String, Commit>,

    pub milestones: Vec<Milestone>,
    /// Issue number to milestone number.
    pub milestone_map: HashMap<u64, u64>,
    pub milestones_cleared: Vec<u64>,

    pub teams: HashMap<String, Vec<Team>>,
    pub team_members: HashMap<u64, Vec<String>>,
    pub org_members: HashMap<String, Vec<String>>,
    pub org_admins: HashMap<String, Vec<String>>,

    pub refs: HashMap<String, String>,
    pub refs_deleted: Vec<String>,
    /// File contents keyed by `reference:path`.
    pub files: HashMap<String, Vec<u8>>,
}

impl Default for FakeScmState {
    fn default() -> Self {
        Self {
            supports_pr_labels: true,
            issue_labels_existing: Vec::new(),
            issue_labels_added: Vec::new(),
            issue_labels_removed: Vec::new(),
            repo_labels_existing: Vec::new(),
            issue_comments: HashMap::new(),
            pull_request_comments: HashMap::new(),
            issue_comments_added: Vec::new(),
            pull_request_comments_added: Vec::new(),
            comments_edited: Vec::new(),
            issue_comments_deleted: Vec::new(),
            next_comment_id: 1,
            issues: HashMap::new(),
            issue_events: HashMap::new(),
            issues_closed: Vec::new(),
            issues_reopened: Vec::new(),
            assignees_added: Vec::new(),
            assignees_removed: Vec::new(),
            collaborators: Vec::new(),
            pull_requests: HashMap::new(),
            pull_request_changes: HashMap::new(),
            pull_requests_closed: Vec::new(),
            pull_requests_reopened: Vec::new(),
            pull_requests_merged: Vec::new(),
            reviews: HashMap::new(),
            reviewers_requested: Vec::new(),
            reviewers_unrequested: Vec::new(),
            created_statuses: HashMap::new(),
            combined_statuses: HashMap::new(),
            commits: HashMap::new(),
            milestones: Vec::new(),
            milestone_map: HashMap::new(),
            milestones_cleared: Vec::new(),
            teams: HashMap::new(),
            team_members: HashMap::new(),
            org_members: HashMap::new(),
            org_admins: HashMap::new(),
            refs: HashMap::new(),
            refs_deleted: Vec::new(),
            files: HashMap::new(),
        }
    }
}

impl FakeScmState {
    pub fn add_file(&mut self, reference: &str, path: &str, content: &str) {
        self.files
            .insert(format!("{reference}:{path}"), content.as_bytes().to_vec());
    }

    fn labels_for(&self, repo: &RepoRef, number: u64) -> Vec<Label> {
        let prefix = format!("{repo}#{number}:");
        self.issue_labels_existing
            .iter()
            .filter_map(|entry| entry.strip_prefix(&prefix))
            .map(Label::named)
            .collect()
    }

    fn push_comment(&mut self, repo: &RepoRef, number: u64, is_pr: bool, body: &str) -> Comment {
        let comment = Comment {
            id: self.next_comment_id,
            body: body.to_string(),
            author: User::new(FAKE_BOT_NAME),
            ..Comment::default()
        };
        self.next_comment_id = self.next_comment_id.saturating_add(1);
        let record = format!("{repo}#{number}:{body}");
        if is_pr {
            self.pull_request_comments_added.push(record);
            self.pull_request_comments
                .entry(number)
                .or_default()
                .push(comment.clone());
        } else {
            self.issue_comments_added.push(record);
            self.issue_comments
                .entry(number)
                .or_default()
                .push(comment.clone());
        }
        comment
    }

    fn comments_mut(&mut self, number: u64, is_pr: bool) -> &mut Vec<Comment> {
        if is_pr {
            self.pull_request_comments.entry(number).or_default()
        } else {
            self.issue_comments.entry(number).or_default()
        }
    }
}

/// Test double for `ScmProvider`.
#[derive(Debug)]
pub struct FakeScmProvider {
    bot_name: String,
    state: Mutex<FakeScmState>,
}

impl Default for FakeScmProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeScmProvider {
    pub fn new() -> Self {
        Self {
            bot_name: FAKE_BOT_NAME.to_string(),
            state: Mutex::new(FakeScmState::default()),
        }
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut FakeScmState) -> R) -> R {
        let mut guard = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    pub fn snapshot(&self) -> FakeScmState {
        self.with_state(|state| state.clone())
    }
}

fn contains_login(logins: &[String], login: &str) -> bool {
    logins.iter().any(|entry| entry.eq_ignore_ascii_case(login))
}

#[async_trait]
impl ScmProvider for FakeScmProvider {
    fn provider_kind(&self) -> ProviderKind {
        ProviderKind::Fake
    }

    fn bot_name(&self) -> &str {
        &self.bot_name
    }

    fn server_url(&self) -> &str {
        "https://fake.example.com"
    }

    fn supports_pr_labels(&self) -> bool {
        self.with_state(|state| state.supports_pr_labels)
    }

    async fn list_issue_comments(&self, _repo: &RepoRef, number: u64) -> ScmResult<Vec<Comment>> {
        Ok(self.with_state(|state| state.issue_comments.get(&number).cloned().unwrap_or_default()))
    }

    async fn list_pull_request_comments(
        &self,
        _repo: &RepoRef,
        number: u64,
    ) -> ScmResult<Vec<Comment>> {
        Ok(self.with_state(|state| {
            state
                .pull_request_comments
                .get(&number)
                .cloned()
                .unwrap_or_default()
        }))
    }

    async fn create_comment(
        &self,
        repo: &RepoRef,
        number: u64,
        is_pr: bool,
        body: &str,
    ) -> ScmResult<Comment> {
        Ok(self.with_state(|state| state.push_comment(repo, number, is_pr, body)))
    }

    async fn edit_comment(
        &self,
        repo: &RepoRef,
        number: u64,
        comment_id: u64,
        is_pr: bool,
        body: &str,
    ) -> ScmResult<()> {
        self.with_state(|state| {
            let comment = state
                .comments_mut(number, is_pr)
                .iter_mut()
                .find(|comment| comment.id == comment_id)
                .ok_or_else(|| ScmError::not_found("edit comment"))?;
            comment.body = body.to_string();
            state.comments_edited.push(format!("{repo}#{comment_id}"));
            Ok(())
        })
    }

    async fn delete_comment(
        &self,
        repo: &RepoRef,
        number: u64,
        comment_id: u64,
        is_pr: bool,
    ) -> ScmResult<()> {
        self.with_state(|state| {
            state
                .comments_mut(number, is_pr)
                .retain(|comment| comment.id != comment_id);
            state.issue_comments_deleted.push(format!("{repo}#{comment_id}"));
        });
        Ok(())
    }

    async fn get_issue_labels(
        &self,
        repo: &RepoRef,
        number: u64,
        _is_pr: bool,
    ) -> ScmResult<Vec<Label>> {
        Ok(self.with_state(|state| state.labels_for(repo, number)))
    }

    async fn add_label(
        &self,
        repo: &RepoRef,
        number: u64,
        label: &str,
        _is_pr: bool,
    ) -> ScmResult<()> {
        self.with_state(|state| {
            let entry = format!("{repo}#{number}:{label}");
            if !state.issue_labels_existing.contains(&entry) {
                state.issue_labels_existing.push(entry.clone());
            }
            state.issue_labels_added.push(entry);
        });
        Ok(())
    }

    async fn remove_label(
        &self,
        repo: &RepoRef,
        number: u64,
        label: &str,
        _is_pr: bool,
    ) -> ScmResult<()> {
        self.with_state(|state| {
            let entry = format!("{repo}#{number}:{label}");
            state.issue_labels_existing.retain(|existing| existing != &entry);
            state.issue_labels_removed.push(entry);
        });
        Ok(())
    }

    async fn get_repo_labels(&self, _repo: &RepoRef) -> ScmResult<Vec<Label>> {
        Ok(self.with_state(|state| {
            state
                .repo_labels_existing
                .iter()
                .map(Label::named)
                .collect()
        }))
    }

    async fn get_issue(&self, _repo: &RepoRef, number: u64) -> ScmResult<Issue> {
        self.with_state(|state| state.issues.get(&number).cloned())
            .ok_or_else(|| ScmError::not_found(format!("get issue {number}")))
    }

    async fn close_issue(&self, _repo: &RepoRef, number: u64) -> ScmResult<()> {
        self.with_state(|state| {
            if let Some(issue) = state.issues.get_mut(&number) {
                issue.closed = true;
            }
            state.issues_closed.push(number);
        });
        Ok(())
    }

    async fn reopen_issue(&self, _repo: &RepoRef, number: u64) -> ScmResult<()> {
        self.with_state(|state| {
            if let Some(issue) = state.issues.get_mut(&number) {
                issue.closed = false;
            }
            state.issues_reopened.push(number);
        });
        Ok(())
    }

    async fn find_issues(
        &self,
        _query: &str,
        _sort: &str,
        ascending: bool,
    ) -> ScmResult<Vec<Issue>> {
        let mut issues = self.with_state(|state| state.issues.values().cloned().collect::<Vec<_>>());
        issues.sort_by_key(|issue| issue.number);
        if !ascending {
            issues.reverse();
        }
        Ok(issues)
    }

    async fn assign_issue(&self, repo: &RepoRef, number: u64, logins: &[String]) -> ScmResult<()> {
        self.with_state(|state| {
            let mut missing = Vec::new();
            for login in logins {
                if !contains_login(&state.collaborators, login) {
                    missing.push(login.clone());
                    continue;
                }
                state.assignees_added.push(format!("{repo}#{number}:{login}"));
                if let Some(issue) = state.issues.get_mut(&number) {
                    issue.assignees.push(User::new(login.clone()));
                }
            }
            if missing.is_empty() {
                Ok(())
            } else {
                Err(ScmError::MissingUsers {
                    users: missing,
                    action: "assign".to_string(),
                })
            }
        })
    }

    async fn unassign_issue(
        &self,
        repo: &RepoRef,
        number: u64,
        logins: &[String],
    ) -> ScmResult<()> {
        self.with_state(|state| {
            for login in logins {
                state.assignees_removed.push(format!("{repo}#{number}:{login}"));
                if let Some(issue) = state.issues.get_mut(&number) {
                    issue
                        .assignees
                        .retain(|assignee| !assignee.login.eq_ignore_ascii_case(login));
                }
            }
        });
        Ok(())
    }

    async fn list_issue_events(
        &self,
        _repo: &RepoRef,
        number: u64,
    ) -> ScmResult<Vec<ListedIssueEvent>> {
        Ok(self.with_state(|state| state.issue_events.get(&number).cloned().unwrap_or_default()))
    }

    async fn is_collaborator(&self, _repo: &RepoRef, login: &str) -> ScmResult<bool> {
        Ok(self.with_state(|state| contains_login(&state.collaborators, login)))
    }

    async fn list_collaborators(&self, _repo: &RepoRef) -> ScmResult<Vec<User>> {
        Ok(self.with_state(|state| {
            state
                .collaborators
                .iter()
                .map(|login| User::new(login.clone()))
                .collect()
        }))
    }

    async fn get_pull_request(&self, _repo: &RepoRef, number: u64) -> ScmResult<PullRequest> {
        self.with_state(|state| state.pull_requests.get(&number).cloned())
            .ok_or_else(|| ScmError::not_found(format!("get pull request {number}")))
    }

    async fn list_open_pull_requests(&self, _repo: &RepoRef) -> ScmResult<Vec<PullRequest>> {
        let mut prs = self.with_state(|state| {
            state
                .pull_requests
                .values()
                .filter(|pr| !pr.closed && !pr.merged)
                .cloned()
                .collect::<Vec<_>>()
        });
        prs.sort_by_key(|pr| pr.number);
        Ok(prs)
    }

    async fn get_pull_request_changes(
        &self,
        _repo: &RepoRef,
        number: u64,
    ) -> ScmResult<Vec<Change>> {
        Ok(self.with_state(|state| {
            state
                .pull_request_changes
                .get(&number)
                .cloned()
                .unwrap_or_default()
        }))
    }

    async fn merge_pull_request(
        &self,
        _repo: &RepoRef,
        number: u64,
        details: &MergeDetails,
    ) -> ScmResult<()> {
        self.with_state(|state| {
            let pr = state
                .pull_requests
                .get_mut(&number)
                .ok_or_else(|| ScmError::not_found(format!("merge pull request {number}")))?;
            if let Some(expected) = &details.sha {
                if expected != &pr.sha {
                    return Err(ScmError::ModifiedHead(format!(
                        "head is {}, expected {expected}",
                        pr.sha
                    )));
                }
            }
            pr.merged = true;
            pr.closed = true;
            state.pull_requests_merged.push(number);
            Ok(())
        })
    }

    async fn close_pull_request(&self, _repo: &RepoRef, number: u64) -> ScmResult<()> {
        self.with_state(|state| {
            if let Some(pr) = state.pull_requests.get_mut(&number) {
                pr.closed = true;
            }
            state.pull_requests_closed.push(number);
        });
        Ok(())
    }

    async fn reopen_pull_request(&self, _repo: &RepoRef, number: u64) -> ScmResult<()> {
        self.with_state(|state| {
            if let Some(pr) = state.pull_requests.get_mut(&number) {
                pr.closed = false;
            }
            state.pull_requests_reopened.push(number);
        });
        Ok(())
    }

    async fn list_reviews(&self, _repo: &RepoRef, number: u64) -> ScmResult<Vec<Review>> {
        Ok(self.with_state(|state| state.reviews.get(&number).cloned().unwrap_or_default()))
    }

    async fn request_review(
        &self,
        repo: &RepoRef,
        number: u64,
        logins: &[String],
    ) -> ScmResult<()> {
        self.with_state(|state| {
            let mut missing = Vec::new();
            for login in logins {
                if contains_login(&state.collaborators, login) {
                    state.reviewers_requested.push(format!("{repo}#{number}:{login}"));
                } else {
                    missing.push(login.clone());
                }
            }
            if missing.is_empty() {
                Ok(())
            } else {
                Err(ScmError::MissingUsers {
                    users: missing,
                    action: "request a pull request review from".to_string(),
                })
            }
        })
    }

    async fn unrequest_review(
        &self,
        repo: &RepoRef,
        number: u64,
        logins: &[String],
    ) -> ScmResult<()> {
        self.with_state(|state| {
            for login in logins {
                state
                    .reviewers_unrequested
                    .push(format!("{repo}#{number}:{login}"));
            }
        });
        Ok(())
    }

    async fn create_status(&self, _repo: &RepoRef, sha: &str, status: &Status) -> ScmResult<Status> {
        self.with_state(|state| {
            state
                .created_statuses
                .entry(sha.to_string())
                .or_default()
                .push(status.clone());
        });
        Ok(status.clone())
    }

    async fn list_statuses(&self, _repo: &RepoRef, reference: &str) -> ScmResult<Vec<Status>> {
        Ok(self.with_state(|state| {
            state
                .created_statuses
                .get(reference)
                .cloned()
                .unwrap_or_default()
        }))
    }

    async fn get_combined_status(
        &self,
        _repo: &RepoRef,
        reference: &str,
    ) -> ScmResult<CombinedStatus> {
        Ok(self.with_state(|state| {
            if let Some(combined) = state.combined_statuses.get(reference) {
                return combined.clone();
            }
            let statuses = state
                .created_statuses
                .get(reference)
                .cloned()
                .unwrap_or_default();
            CombinedStatus {
                state: if statuses.is_empty() {
                    StatusState::Unknown
                } else {
                    StatusState::Pending
                },
                sha: reference.to_string(),
                statuses,
            }
        }))
    }

    async fn get_single_commit(&self, _repo: &RepoRef, sha: &str) -> ScmResult<Commit> {
        self.with_state(|state| state.commits.get(sha).cloned())
            .ok_or_else(|| ScmError::not_found(format!("get commit {sha}")))
    }

    async fn list_milestones(&self, _repo: &RepoRef) -> ScmResult<Vec<Milestone>> {
        Ok(self.with_state(|state| state.milestones.clone()))
    }

    async fn set_milestone(&self, _repo: &RepoRef, number: u64, milestone: u64) -> ScmResult<()> {
        self.with_state(|state| {
            state.milestone_map.insert(number, milestone);
        });
        Ok(())
    }

    async fn clear_milestone(&self, _repo: &RepoRef, number: u64) -> ScmResult<()> {
        self.with_state(|state| {
            state.milestone_map.remove(&number);
            state.milestones_cleared.push(number);
        });
        Ok(())
    }

    async fn list_teams(&self, org: &str) -> ScmResult<Vec<Team>> {
        Ok(self.with_state(|state| state.teams.get(org).cloned().unwrap_or_default()))
    }

    async fn list_team_members(&self, team_id: u64, _role: TeamRole) -> ScmResult<Vec<User>> {
        Ok(self.with_state(|state| {
            state
                .team_members
                .get(&team_id)
                .map(|members| members.iter().map(|login| User::new(login.clone())).collect())
                .unwrap_or_default()
        }))
    }

    async fn is_org_member(&self, org: &str, login: &str) -> ScmResult<bool> {
        Ok(self.with_state(|state| {
            state
                .org_members
                .get(org)
                .is_some_and(|members| contains_login(members, login))
        }))
    }

    async fn is_org_admin(&self, org: &str, login: &str) -> ScmResult<bool> {
        Ok(self.with_state(|state| {
            state
                .org_admins
                .get(org)
                .is_some_and(|admins| contains_login(admins, login))
        }))
    }

    async fn get_ref(&self, _repo: &RepoRef, reference: &str) -> ScmResult<String> {
        self.with_state(|state| state.refs.get(reference).cloned())
            .ok_or_else(|| ScmError::not_found(format!("get ref {reference}")))
    }

    async fn delete_ref(&self, _repo: &RepoRef, reference: &str) -> ScmResult<()> {
        self.with_state(|state| {
            state.refs.remove(reference);
            state.refs_deleted.push(reference.to_string());
        });
        Ok(())
    }

    async fn get_file(
        &self,
        _repo: &RepoRef,
        path: &str,
        reference: &str,
    ) -> ScmResult<Option<Vec<u8>>> {
        Ok(self.with_state(|state| state.files.get(&format!("{reference}:{path}")).cloned()))
    }
}
