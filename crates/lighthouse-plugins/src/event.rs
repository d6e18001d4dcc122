//! The generic-comment event: every comment-like webhook flattened into one shape.

use lighthouse_scm::{
    Action, IssueCommentHook, IssueHook, PullRequest, PullRequestCommentHook, PullRequestHook,
    Repository, ReviewHook, User, Webhook,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenericCommentAction {
    Created,
    Edited,
    Deleted,
}

impl GenericCommentAction {
    /// Opened, submitted and created all count as a new comment.
    ///
    /// Close and reopen never produce a comment event.
    pub fn from_action(action: Action) -> Option<Self> {
        match action {
            Action::Create | Action::Open | Action::Submitted => Some(Self::Created),
            Action::Update => Some(Self::Edited),
            Action::Delete | Action::Dismissed => Some(Self::Deleted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericCommentEvent {
    pub is_pr: bool,
    pub action: GenericCommentAction,
    pub body: String,
    pub link: String,
    pub number: u64,
    pub repo: Repository,
    pub author: User,
    pub issue_author: User,
    pub assignees: Vec<User>,
    /// `open` or `closed`.
    pub issue_state: String,
    pub issue_title: String,
    pub issue_body: String,
    pub issue_link: String,
    /// Head commit of the pull request, empty for issues.
    pub head_sha: String,
    pub guid: String,
}

impl GenericCommentEvent {
    pub fn is_created(&self) -> bool {
        self.action == GenericCommentAction::Created
    }

    pub fn is_open(&self) -> bool {
        self.issue_state == "open"
    }

    pub fn from_webhook(hook: &Webhook) -> Option<Self> {
        match hook {
            Webhook::IssueComment(hook) => Self::from_issue_comment(hook),
            Webhook::PullRequestComment(hook) => Self::from_pull_request_comment(hook),
            Webhook::Review(hook) => Self::from_review(hook),
            Webhook::PullRequest(hook) => Self::from_pull_request(hook),
            Webhook::Issue(hook) => Self::from_issue(hook),
            Webhook::Push(_) | Webhook::Branch(_) => None,
        }
    }

    pub fn from_issue_comment(hook: &IssueCommentHook) -> Option<Self> {
        let action = GenericCommentAction::from_action(hook.action)?;
        Some(Self {
            is_pr: hook.issue.pull_request,
            action,
            body: hook.comment.body.clone(),
            link: hook.comment.link.clone(),
            number: hook.issue.number,
            repo: hook.repo.clone(),
            author: hook.comment.author.clone(),
            issue_author: hook.issue.author.clone(),
            assignees: hook.issue.assignees.clone(),
            issue_state: hook.issue.state().to_string(),
            issue_title: hook.issue.title.clone(),
            issue_body: hook.issue.body.clone(),
            issue_link: hook.issue.link.clone(),
            head_sha: String::new(),
            guid: hook.guid.clone(),
        })
    }

    pub fn from_pull_request_comment(hook: &PullRequestCommentHook) -> Option<Self> {
        let action = GenericCommentAction::from_action(hook.action)?;
        let pr = &hook.pull_request;
        Some(Self {
            is_pr: true,
            action,
            body: hook.comment.body.clone(),
            link: hook.comment.link.clone(),
            number: pr.number,
            repo: hook.repo.clone(),
            author: hook.comment.author.clone(),
            issue_author: pr.author.clone(),
            assignees: pr.assignees.clone(),
            issue_state: pull_request_state(pr),
            issue_title: pr.title.clone(),
            issue_body: pr.body.clone(),
            issue_link: pr.link.clone(),
            head_sha: pr.sha.clone(),
            guid: hook.guid.clone(),
        })
    }

    pub fn from_review(hook: &ReviewHook) -> Option<Self> {
        let action = GenericCommentAction::from_action(hook.action)?;
        let pr = &hook.pull_request;
        Some(Self {
            is_pr: true,
            action,
            body: hook.review.body.clone(),
            link: hook.review.link.clone(),
            number: pr.number,
            repo: hook.repo.clone(),
            author: hook.review.author.clone(),
            issue_author: pr.author.clone(),
            assignees: pr.assignees.clone(),
            issue_state: pull_request_state(pr),
            issue_title: pr.title.clone(),
            issue_body: pr.body.clone(),
            issue_link: pr.link.clone(),
            head_sha: pr.sha.clone(),
            guid: hook.guid.clone(),
        })
    }

    /// Only opened and edited pull requests read as a comment on their body.
    pub fn from_pull_request(hook: &PullRequestHook) -> Option<Self> {
        if !matches!(hook.action, Action::Open | Action::Update) {
            return None;
        }
        let action = GenericCommentAction::from_action(hook.action)?;
        let pr = &hook.pull_request;
        Some(Self {
            is_pr: true,
            action,
            body: pr.body.clone(),
            link: pr.link.clone(),
            number: pr.number,
            repo: hook.repo.clone(),
            author: pr.author.clone(),
            issue_author: pr.author.clone(),
            assignees: pr.assignees.clone(),
            issue_state: pull_request_state(pr),
            issue_title: pr.title.clone(),
            issue_body: pr.body.clone(),
            issue_link: pr.link.clone(),
            head_sha: pr.sha.clone(),
            guid: hook.guid.clone(),
        })
    }

    pub fn from_issue(hook: &IssueHook) -> Option<Self> {
        if !matches!(hook.action, Action::Open | Action::Update) {
            return None;
        }
        let action = GenericCommentAction::from_action(hook.action)?;
        let issue = &hook.issue;
        Some(Self {
            is_pr: issue.pull_request,
            action,
            body: issue.body.clone(),
            link: issue.link.clone(),
            number: issue.number,
            repo: hook.repo.clone(),
            author: issue.author.clone(),
            issue_author: issue.author.clone(),
            assignees: issue.assignees.clone(),
            issue_state: issue.state().to_string(),
            issue_title: issue.title.clone(),
            issue_body: issue.body.clone(),
            issue_link: issue.link.clone(),
            head_sha: String::new(),
            guid: hook.guid.clone(),
        })
    }
}

/// Merged pull requests read as closed.
fn pull_request_state(pr: &PullRequest) -> String {
    if pr.closed || pr.merged {
        "closed".to_string()
    } else {
        "open".to_string()
    }
}
