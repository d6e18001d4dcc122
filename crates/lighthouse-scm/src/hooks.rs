//! Normalized webhook variants.
//!
//! Provider-specific payloads are parsed into one of these shapes before the
//! dispatcher sees them; plugins never read raw provider JSON.

use lighthouse_core::{is_null_sha, normalize_branch_name};
use serde::{Deserialize, Serialize};

use crate::types::{Comment, Issue, Label, PullRequest, Repository, Review, User};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    #[default]
    Unknown,
    Create,
    Update,
    Delete,
    Open,
    Close,
    Reopen,
    Sync,
    Merge,
    Label,
    Unlabel,
    Assigned,
    Unassigned,
    ReviewRequested,
    ReadyForReview,
    ConvertedToDraft,
    Submitted,
    Dismissed,
}

impl Action {
    /// Maps a GitHub `action` field onto the normalized action.
    pub fn from_github(raw: &str) -> Self {
        match raw {
            "created" => Self::Create,
            "edited" => Self::Update,
            "deleted" => Self::Delete,
            "opened" => Self::Open,
            "closed" => Self::Close,
            "reopened" => Self::Reopen,
            "synchronize" => Self::Sync,
            "labeled" => Self::Label,
            "unlabeled" => Self::Unlabel,
            "assigned" => Self::Assigned,
            "unassigned" => Self::Unassigned,
            "review_requested" => Self::ReviewRequested,
            "ready_for_review" => Self::ReadyForReview,
            "converted_to_draft" => Self::ConvertedToDraft,
            "submitted" => Self::Submitted,
            "dismissed" => Self::Dismissed,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Create => "created",
            Self::Update => "edited",
            Self::Delete => "deleted",
            Self::Open => "opened",
            Self::Close => "closed",
            Self::Reopen => "reopened",
            Self::Sync => "synchronize",
            Self::Merge => "merged",
            Self::Label => "labeled",
            Self::Unlabel => "unlabeled",
            Self::Assigned => "assigned",
            Self::Unassigned => "unassigned",
            Self::ReviewRequested => "review_requested",
            Self::ReadyForReview => "ready_for_review",
            Self::ConvertedToDraft => "converted_to_draft",
            Self::Submitted => "submitted",
            Self::Dismissed => "dismissed",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushCommit {
    pub sha: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
    #[serde(default)]
    pub modified: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushHook {
    /// Fully qualified ref, e.g. `refs/heads/main`.
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub before: String,
    pub after: String,
    pub repo: Repository,
    #[serde(default)]
    pub commits: Vec<PushCommit>,
    #[serde(default)]
    pub sender: User,
    #[serde(default)]
    pub created: bool,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub guid: String,
}

impl PushHook {
    pub fn branch(&self) -> &str {
        normalize_branch_name(&self.ref_name)
    }

    /// A push that removed the ref; `after` names no commit.
    pub fn is_deletion(&self) -> bool {
        self.deleted || is_null_sha(&self.after)
    }

    /// Union of all paths touched by the pushed commits.
    pub fn changed_files(&self) -> Vec<String> {
        let mut files = Vec::new();
        for commit in &self.commits {
            for path in commit
                .added
                .iter()
                .chain(commit.removed.iter())
                .chain(commit.modified.iter())
            {
                if !files.contains(path) {
                    files.push(path.clone());
                }
            }
        }
        files
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestHook {
    pub action: Action,
    pub repo: Repository,
    pub pull_request: PullRequest,
    #[serde(default)]
    pub sender: User,
    #[serde(default)]
    pub label: Option<Label>,
    #[serde(default)]
    pub guid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueCommentHook {
    pub action: Action,
    pub repo: Repository,
    pub issue: Issue,
    pub comment: Comment,
    #[serde(default)]
    pub sender: User,
    #[serde(default)]
    pub guid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestCommentHook {
    pub action: Action,
    pub repo: Repository,
    pub pull_request: PullRequest,
    pub comment: Comment,
    #[serde(default)]
    pub sender: User,
    #[serde(default)]
    pub guid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueHook {
    pub action: Action,
    pub repo: Repository,
    pub issue: Issue,
    #[serde(default)]
    pub sender: User,
    #[serde(default)]
    pub label: Option<Label>,
    #[serde(default)]
    pub guid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewHook {
    pub action: Action,
    pub repo: Repository,
    pub pull_request: PullRequest,
    pub review: Review,
    #[serde(default)]
    pub sender: User,
    #[serde(default)]
    pub guid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchHook {
    pub action: Action,
    /// Bare branch name.
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub repo: Repository,
    #[serde(default)]
    pub sender: User,
    #[serde(default)]
    pub guid: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WebhookKind {
    Push,
    PullRequest,
    PullRequestComment,
    IssueComment,
    Issue,
    Review,
    Branch,
}

impl WebhookKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::PullRequest => "pull_request",
            Self::PullRequestComment => "pull_request_comment",
            Self::IssueComment => "issue_comment",
            Self::Issue => "issue",
            Self::Review => "review",
            Self::Branch => "branch",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Webhook {
    Push(PushHook),
    PullRequest(PullRequestHook),
    PullRequestComment(PullRequestCommentHook),
    IssueComment(IssueCommentHook),
    Issue(IssueHook),
    Review(ReviewHook),
    Branch(BranchHook),
}

impl Webhook {
    pub fn kind(&self) -> WebhookKind {
        match self {
            Self::Push(_) => WebhookKind::Push,
            Self::PullRequest(_) => WebhookKind::PullRequest,
            Self::PullRequestComment(_) => WebhookKind::PullRequestComment,
            Self::IssueComment(_) => WebhookKind::IssueComment,
            Self::Issue(_) => WebhookKind::Issue,
            Self::Review(_) => WebhookKind::Review,
            Self::Branch(_) => WebhookKind::Branch,
        }
    }

    pub fn repository(&self) -> &Repository {
        match self {
            Self::Push(hook) => &hook.repo,
            Self::PullRequest(hook) => &hook.repo,
            Self::PullRequestComment(hook) => &hook.repo,
            Self::IssueComment(hook) => &hook.repo,
            Self::Issue(hook) => &hook.repo,
            Self::Review(hook) => &hook.repo,
            Self::Branch(hook) => &hook.repo,
        }
    }

    pub fn guid(&self) -> &str {
        match self {
            Self::Push(hook) => &hook.guid,
            Self::PullRequest(hook) => &hook.guid,
            Self::PullRequestComment(hook) => &hook.guid,
            Self::IssueComment(hook) => &hook.guid,
            Self::Issue(hook) => &hook.guid,
            Self::Review(hook) => &hook.guid,
            Self::Branch(hook) => &hook.guid,
        }
    }

    pub fn set_guid(&mut self, guid: &str) {
        let slot = match self {
            Self::Push(hook) => &mut hook.guid,
            Self::PullRequest(hook) => &mut hook.guid,
            Self::PullRequestComment(hook) => &mut hook.guid,
            Self::IssueComment(hook) => &mut hook.guid,
            Self::Issue(hook) => &mut hook.guid,
            Self::Review(hook) => &mut hook.guid,
            Self::Branch(hook) => &mut hook.guid,
        };
        *slot = guid.to_string();
    }

    /// The commit the event refers to, used to resolve in-repo config.
    ///
    /// Empty for issue events, comments on plain issues and ref deletions,
    /// which resolve against the default branch.
    pub fn event_ref(&self) -> &str {
        match self {
            Self::Push(hook) if hook.is_deletion() => "",
            Self::Push(hook) => &hook.after,
            Self::PullRequest(hook) => &hook.pull_request.sha,
            Self::PullRequestComment(hook) => &hook.pull_request.sha,
            Self::Review(hook) => &hook.pull_request.sha,
            Self::IssueComment(_) | Self::Issue(_) | Self::Branch(_) => "",
        }
    }
}
