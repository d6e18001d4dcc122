//! GitHub REST/webhook JSON shapes and their conversion into the normalized model.

use serde::Deserialize;

use crate::types::{
    Change, CombinedStatus, Comment, Commit, Issue, Label, ListedIssueEvent, Milestone,
    PullRequest, PullRequestBranch, Repository, Review, Status, StatusState, Team, User,
};

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct GhUser {
    #[serde(default)]
    pub(crate) login: String,
    #[serde(default)]
    pub(crate) name: Option<String>,
}

impl From<GhUser> for User {
    fn from(user: GhUser) -> Self {
        // Push payloads carry `name` only on the repository owner.
        let login = if user.login.is_empty() {
            user.name.clone().unwrap_or_default()
        } else {
            user.login
        };
        User {
            login,
            name: user.name.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GhLabel {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) color: Option<String>,
    #[serde(default)]
    pub(crate) description: Option<String>,
}

impl From<GhLabel> for Label {
    fn from(label: GhLabel) -> Self {
        Label {
            name: label.name,
            color: label.color.unwrap_or_default(),
            description: label.description.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct GhRepository {
    #[serde(default)]
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) full_name: String,
    #[serde(default)]
    pub(crate) owner: GhUser,
    #[serde(default)]
    pub(crate) default_branch: Option<String>,
    #[serde(default)]
    pub(crate) clone_url: Option<String>,
    #[serde(default)]
    pub(crate) html_url: Option<String>,
    #[serde(default)]
    pub(crate) private: bool,
}

impl From<GhRepository> for Repository {
    fn from(repo: GhRepository) -> Self {
        let owner = User::from(repo.owner);
        let namespace = if owner.login.is_empty() {
            repo.full_name
                .split_once('/')
                .map(|(owner, _)| owner.to_string())
                .unwrap_or_default()
        } else {
            owner.login
        };
        let full_name = if repo.full_name.is_empty() {
            format!("{namespace}/{}", repo.name)
        } else {
            repo.full_name
        };
        Repository {
            namespace,
            name: repo.name,
            full_name,
            branch: repo.default_branch.unwrap_or_default(),
            clone: repo.clone_url.unwrap_or_default(),
            link: repo.html_url.unwrap_or_default(),
            private: repo.private,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GhMilestone {
    pub(crate) number: u64,
    #[serde(default)]
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) description: Option<String>,
    #[serde(default)]
    pub(crate) state: String,
}

impl From<GhMilestone> for Milestone {
    fn from(milestone: GhMilestone) -> Self {
        Milestone {
            number: milestone.number,
            title: milestone.title,
            description: milestone.description.unwrap_or_default(),
            state: milestone.state,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GhIssue {
    pub(crate) number: u64,
    #[serde(default)]
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) body: Option<String>,
    #[serde(default)]
    pub(crate) html_url: String,
    #[serde(default)]
    pub(crate) labels: Vec<GhLabel>,
    #[serde(default)]
    pub(crate) state: String,
    #[serde(default)]
    pub(crate) user: GhUser,
    #[serde(default)]
    pub(crate) assignees: Vec<GhUser>,
    #[serde(default)]
    pub(crate) pull_request: Option<serde_json::Value>,
    #[serde(default)]
    pub(crate) milestone: Option<GhMilestone>,
}

impl From<GhIssue> for Issue {
    fn from(issue: GhIssue) -> Self {
        Issue {
            number: issue.number,
            title: issue.title,
            body: issue.body.unwrap_or_default(),
            link: issue.html_url,
            labels: issue.labels.into_iter().map(Label::from).collect(),
            closed: issue.state.eq_ignore_ascii_case("closed"),
            author: issue.user.into(),
            assignees: issue.assignees.into_iter().map(User::from).collect(),
            pull_request: issue.pull_request.is_some(),
            milestone: issue.milestone.map(Milestone::from),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GhComment {
    pub(crate) id: u64,
    #[serde(default)]
    pub(crate) body: Option<String>,
    #[serde(default)]
    pub(crate) user: GhUser,
    #[serde(default)]
    pub(crate) html_url: String,
    #[serde(default)]
    pub(crate) created_at: String,
    #[serde(default)]
    pub(crate) updated_at: String,
}

impl From<GhComment> for Comment {
    fn from(comment: GhComment) -> Self {
        Comment {
            id: comment.id,
            body: comment.body.unwrap_or_default(),
            author: comment.user.into(),
            link: comment.html_url,
            created: comment.created_at,
            updated: comment.updated_at,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct GhBranch {
    #[serde(rename = "ref", default)]
    pub(crate) ref_name: String,
    #[serde(default)]
    pub(crate) sha: String,
    #[serde(default)]
    pub(crate) repo: Option<GhRepository>,
}

impl From<GhBranch> for PullRequestBranch {
    fn from(branch: GhBranch) -> Self {
        PullRequestBranch {
            ref_name: branch.ref_name,
            sha: branch.sha,
            repo: branch.repo.map(Repository::from).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GhPullRequest {
    pub(crate) number: u64,
    #[serde(default)]
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) body: Option<String>,
    #[serde(default)]
    pub(crate) html_url: String,
    #[serde(default)]
    pub(crate) state: String,
    #[serde(default)]
    pub(crate) head: GhBranch,
    #[serde(default)]
    pub(crate) base: GhBranch,
    #[serde(default)]
    pub(crate) user: GhUser,
    #[serde(default)]
    pub(crate) assignees: Vec<GhUser>,
    #[serde(default)]
    pub(crate) labels: Vec<GhLabel>,
    #[serde(default)]
    pub(crate) merged: Option<bool>,
    #[serde(default)]
    pub(crate) draft: Option<bool>,
    #[serde(default)]
    pub(crate) mergeable: Option<bool>,
    #[serde(default)]
    pub(crate) merge_commit_sha: Option<String>,
    #[serde(default)]
    pub(crate) milestone: Option<GhMilestone>,
}

impl From<GhPullRequest> for PullRequest {
    fn from(pr: GhPullRequest) -> Self {
        let head = PullRequestBranch::from(pr.head);
        PullRequest {
            number: pr.number,
            title: pr.title,
            body: pr.body.unwrap_or_default(),
            link: pr.html_url,
            sha: head.sha.clone(),
            base: pr.base.into(),
            head,
            author: pr.user.into(),
            assignees: pr.assignees.into_iter().map(User::from).collect(),
            labels: pr.labels.into_iter().map(Label::from).collect(),
            closed: pr.state.eq_ignore_ascii_case("closed"),
            merged: pr.merged.unwrap_or(false),
            draft: pr.draft.unwrap_or(false),
            mergeable: pr.mergeable,
            merge_sha: pr.merge_commit_sha,
            milestone: pr.milestone.map(Milestone::from),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GhStatus {
    #[serde(default)]
    pub(crate) state: String,
    #[serde(default)]
    pub(crate) context: String,
    #[serde(default)]
    pub(crate) description: Option<String>,
    #[serde(default)]
    pub(crate) target_url: Option<String>,
}

impl From<GhStatus> for Status {
    fn from(status: GhStatus) -> Self {
        Status {
            state: StatusState::parse(&status.state),
            label: status.context,
            desc: status.description.unwrap_or_default(),
            target: status.target_url.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GhCombinedStatus {
    #[serde(default)]
    pub(crate) state: String,
    #[serde(default)]
    pub(crate) sha: String,
    #[serde(default)]
    pub(crate) statuses: Vec<GhStatus>,
}

impl From<GhCombinedStatus> for CombinedStatus {
    fn from(combined: GhCombinedStatus) -> Self {
        CombinedStatus {
            state: StatusState::parse(&combined.state),
            sha: combined.sha,
            statuses: combined.statuses.into_iter().map(Status::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GhReview {
    pub(crate) id: u64,
    #[serde(default)]
    pub(crate) body: Option<String>,
    #[serde(default)]
    pub(crate) user: GhUser,
    #[serde(default)]
    pub(crate) state: String,
    #[serde(default)]
    pub(crate) html_url: String,
    #[serde(default)]
    pub(crate) commit_id: String,
}

impl From<GhReview> for Review {
    fn from(review: GhReview) -> Self {
        Review {
            id: review.id,
            body: review.body.unwrap_or_default(),
            author: review.user.into(),
            state: review.state,
            link: review.html_url,
            sha: review.commit_id,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GhFile {
    pub(crate) filename: String,
    #[serde(default)]
    pub(crate) previous_filename: Option<String>,
    #[serde(default)]
    pub(crate) status: String,
    #[serde(default)]
    pub(crate) sha: Option<String>,
    #[serde(default)]
    pub(crate) additions: u64,
    #[serde(default)]
    pub(crate) deletions: u64,
}

impl From<GhFile> for Change {
    fn from(file: GhFile) -> Self {
        Change {
            path: file.filename,
            previous_path: file.previous_filename.unwrap_or_default(),
            added: file.status == "added",
            renamed: file.status == "renamed",
            deleted: file.status == "removed",
            sha: file.sha.unwrap_or_default(),
            additions: file.additions,
            deletions: file.deletions,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GhIssueEvent {
    #[serde(default)]
    pub(crate) event: String,
    #[serde(default)]
    pub(crate) actor: Option<GhUser>,
    #[serde(default)]
    pub(crate) label: Option<GhLabel>,
    #[serde(default)]
    pub(crate) created_at: String,
}

impl From<GhIssueEvent> for ListedIssueEvent {
    fn from(event: GhIssueEvent) -> Self {
        ListedIssueEvent {
            event: event.event,
            actor: event.actor.map(User::from).unwrap_or_default(),
            label: event.label.map(Label::from),
            created: event.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct GhGitAuthor {
    #[serde(default)]
    pub(crate) name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct GhGitCommit {
    #[serde(default)]
    pub(crate) message: String,
    #[serde(default)]
    pub(crate) author: GhGitAuthor,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GhCommit {
    pub(crate) sha: String,
    #[serde(default)]
    pub(crate) commit: GhGitCommit,
    #[serde(default)]
    pub(crate) author: Option<GhUser>,
    #[serde(default)]
    pub(crate) html_url: String,
}

impl From<GhCommit> for Commit {
    fn from(commit: GhCommit) -> Self {
        let author = commit.author.map(User::from).unwrap_or_else(|| User {
            login: String::new(),
            name: commit.commit.author.name.clone(),
        });
        Commit {
            sha: commit.sha,
            message: commit.commit.message,
            author,
            link: commit.html_url,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GhTeam {
    pub(crate) id: u64,
    #[serde(default)]
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) slug: String,
}

impl From<GhTeam> for Team {
    fn from(team: GhTeam) -> Self {
        Team {
            id: team.id,
            name: team.name,
            slug: team.slug,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GhRefObject {
    pub(crate) sha: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GhRef {
    pub(crate) object: GhRefObject,
}

#[cfg(test)]
mod tests {
    use super::{GhIssue, GhPullRequest, GhRepository};
    use crate::types::{Issue, PullRequest, Repository};

    #[test]
    fn unit_issue_conversion_detects_pull_request_marker() {
        let raw = serde_json::json!({
            "number": 5,
            "title": "Fix it",
            "body": null,
            "state": "closed",
            "user": {"login": "alice"},
            "labels": [{"name": "help"}],
            "pull_request": {"url": "https://api.github.com/repos/o/r/pulls/5"}
        });
        let issue: Issue = serde_json::from_value::<GhIssue>(raw).expect("decode").into();
        assert!(issue.pull_request);
        assert!(issue.closed);
        assert_eq!(issue.author.login, "alice");
        assert!(issue.has_label("help"));
        assert_eq!(issue.body, "");
    }

    #[test]
    fn unit_pull_request_conversion_copies_head_sha() {
        let raw = serde_json::json!({
            "number": 9,
            "title": "WIP: thing",
            "state": "open",
            "draft": true,
            "head": {"ref": "feature", "sha": "abc1234"},
            "base": {"ref": "main", "sha": "def5678"},
            "user": {"login": "bob"}
        });
        let pr: PullRequest = serde_json::from_value::<GhPullRequest>(raw).expect("decode").into();
        assert_eq!(pr.sha, "abc1234");
        assert_eq!(pr.target(), "main");
        assert_eq!(pr.source(), "feature");
        assert!(pr.draft);
        assert!(!pr.merged);
    }

    #[test]
    fn regression_push_repository_owner_uses_name_when_login_missing() {
        let raw = serde_json::json!({
            "name": "repo",
            "full_name": "org/repo",
            "owner": {"name": "org", "email": null}
        });
        let repo: Repository = serde_json::from_value::<GhRepository>(raw).expect("decode").into();
        assert_eq!(repo.namespace, "org");
        assert_eq!(repo.full_name, "org/repo");
    }
}
