//! Parses GitHub webhook deliveries into normalized `Webhook` variants.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::model::{GhComment, GhIssue, GhLabel, GhPullRequest, GhRepository, GhReview, GhUser};
use crate::error::{ScmError, ScmResult};
use crate::hooks::{
    Action, BranchHook, IssueCommentHook, IssueHook, PullRequestCommentHook, PullRequestHook,
    PushCommit, PushHook, ReviewHook, Webhook,
};
use crate::types::{
    Comment, Issue, Label, PullRequest, PullRequestBranch, Repository, Review, User,
};

#[derive(Debug, Deserialize)]
struct GhPushCommit {
    #[serde(default)]
    id: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    added: Vec<String>,
    #[serde(default)]
    removed: Vec<String>,
    #[serde(default)]
    modified: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GhPushPayload {
    #[serde(rename = "ref")]
    ref_name: String,
    #[serde(default)]
    before: String,
    #[serde(default)]
    after: String,
    repository: GhRepository,
    #[serde(default)]
    commits: Vec<GhPushCommit>,
    #[serde(default)]
    sender: GhUser,
    #[serde(default)]
    created: bool,
    #[serde(default)]
    deleted: bool,
}

#[derive(Debug, Deserialize)]
struct GhPullRequestPayload {
    action: String,
    pull_request: GhPullRequest,
    repository: GhRepository,
    #[serde(default)]
    sender: GhUser,
    #[serde(default)]
    label: Option<GhLabel>,
}

#[derive(Debug, Deserialize)]
struct GhIssueCommentPayload {
    action: String,
    issue: GhIssue,
    comment: GhComment,
    repository: GhRepository,
    #[serde(default)]
    sender: GhUser,
}

#[derive(Debug, Deserialize)]
struct GhReviewCommentPayload {
    action: String,
    pull_request: GhPullRequest,
    comment: GhComment,
    repository: GhRepository,
    #[serde(default)]
    sender: GhUser,
}

#[derive(Debug, Deserialize)]
struct GhIssuesPayload {
    action: String,
    issue: GhIssue,
    repository: GhRepository,
    #[serde(default)]
    sender: GhUser,
    #[serde(default)]
    label: Option<GhLabel>,
}

#[derive(Debug, Deserialize)]
struct GhReviewPayload {
    action: String,
    review: GhReview,
    pull_request: GhPullRequest,
    repository: GhRepository,
    #[serde(default)]
    sender: GhUser,
}

#[derive(Debug, Deserialize)]
struct GhRefPayload {
    #[serde(rename = "ref")]
    ref_name: String,
    #[serde(default)]
    ref_type: String,
    repository: GhRepository,
    #[serde(default)]
    sender: GhUser,
}

fn decode<T: DeserializeOwned>(event_type: &str, body: &[u8]) -> ScmResult<T> {
    serde_json::from_slice(body).map_err(|error| ScmError::Decode {
        operation: format!("{event_type} webhook"),
        message: error.to_string(),
    })
}

fn pull_request_action(raw: &str, pr: &PullRequest) -> Action {
    if raw == "closed" && pr.merged {
        Action::Merge
    } else {
        Action::from_github(raw)
    }
}

/// Parses a delivery identified by its `X-GitHub-Event` header value.
///
/// Returns `Ok(None)` for event types the dispatcher does not act on
/// (`ping`, tag create/delete, and anything unrecognised).
pub fn parse_github_webhook(event_type: &str, guid: &str, body: &[u8]) -> ScmResult<Option<Webhook>> {
    let hook = match event_type {
        "push" => {
            let payload: GhPushPayload = decode(event_type, body)?;
            Webhook::Push(PushHook {
                ref_name: payload.ref_name,
                before: payload.before,
                after: payload.after,
                repo: Repository::from(payload.repository),
                commits: payload
                    .commits
                    .into_iter()
                    .map(|commit| PushCommit {
                        sha: commit.id,
                        message: commit.message,
                        added: commit.added,
                        removed: commit.removed,
                        modified: commit.modified,
                    })
                    .collect(),
                sender: User::from(payload.sender),
                created: payload.created,
                deleted: payload.deleted,
                guid: guid.to_string(),
            })
        }
        "pull_request" => {
            let payload: GhPullRequestPayload = decode(event_type, body)?;
            let pull_request = PullRequest::from(payload.pull_request);
            Webhook::PullRequest(PullRequestHook {
                action: pull_request_action(&payload.action, &pull_request),
                repo: Repository::from(payload.repository),
                pull_request,
                sender: User::from(payload.sender),
                label: payload.label.map(Label::from),
                guid: guid.to_string(),
            })
        }
        "issue_comment" => {
            let payload: GhIssueCommentPayload = decode(event_type, body)?;
            Webhook::IssueComment(IssueCommentHook {
                action: Action::from_github(&payload.action),
                repo: Repository::from(payload.repository),
                issue: Issue::from(payload.issue),
                comment: Comment::from(payload.comment),
                sender: User::from(payload.sender),
                guid: guid.to_string(),
            })
        }
        "pull_request_review_comment" => {
            let payload: GhReviewCommentPayload = decode(event_type, body)?;
            Webhook::PullRequestComment(PullRequestCommentHook {
                action: Action::from_github(&payload.action),
                repo: Repository::from(payload.repository),
                pull_request: PullRequest::from(payload.pull_request),
                comment: Comment::from(payload.comment),
                sender: User::from(payload.sender),
                guid: guid.to_string(),
            })
        }
        "issues" => {
            let payload: GhIssuesPayload = decode(event_type, body)?;
            Webhook::Issue(IssueHook {
                action: Action::from_github(&payload.action),
                repo: Repository::from(payload.repository),
                issue: Issue::from(payload.issue),
                sender: User::from(payload.sender),
                label: payload.label.map(Label::from),
                guid: guid.to_string(),
            })
        }
        "pull_request_review" => {
            let payload: GhReviewPayload = decode(event_type, body)?;
            Webhook::Review(ReviewHook {
                action: Action::from_github(&payload.action),
                repo: Repository::from(payload.repository),
                pull_request: PullRequest::from(payload.pull_request),
                review: Review::from(payload.review),
                sender: User::from(payload.sender),
                guid: guid.to_string(),
            })
        }
        "create" | "delete" => {
            let payload: GhRefPayload = decode(event_type, body)?;
            if payload.ref_type != "branch" {
                return Ok(None);
            }
            Webhook::Branch(BranchHook {
                action: if event_type == "create" {
                    Action::Create
                } else {
                    Action::Delete
                },
                ref_name: payload.ref_name,
                repo: Repository::from(payload.repository),
                sender: User::from(payload.sender),
                guid: guid.to_string(),
            })
        }
        _ => return Ok(None),
    };
    Ok(Some(hook))
}

fn repository_json(repo: &Repository) -> serde_json::Value {
    serde_json::json!({
        "name": repo.name,
        "full_name": repo.full_name,
        "owner": {"login": repo.namespace},
        "default_branch": repo.branch,
        "clone_url": repo.clone,
        "html_url": repo.link,
        "private": repo.private,
    })
}

fn branch_json(branch: &PullRequestBranch) -> serde_json::Value {
    serde_json::json!({"ref": branch.ref_name, "sha": branch.sha})
}

/// Renders a push in GitHub's `push` delivery shape.
pub fn render_github_push(hook: &PushHook) -> serde_json::Value {
    serde_json::json!({
        "ref": hook.ref_name,
        "before": hook.before,
        "after": hook.after,
        "created": hook.created,
        "deleted": hook.deleted,
        "repository": repository_json(&hook.repo),
        "commits": hook.commits.iter().map(|commit| serde_json::json!({
            "id": commit.sha,
            "message": commit.message,
            "added": commit.added,
            "removed": commit.removed,
            "modified": commit.modified,
        })).collect::<Vec<_>>(),
        "sender": {"login": hook.sender.login},
    })
}

/// Renders a pull request event in GitHub's `pull_request` delivery shape.
pub fn render_github_pull_request(hook: &PullRequestHook) -> serde_json::Value {
    let pr = &hook.pull_request;
    let action = match hook.action {
        Action::Merge => "closed",
        other => other.as_str(),
    };
    let state = if pr.closed || pr.merged { "closed" } else { "open" };
    serde_json::json!({
        "action": action,
        "pull_request": {
            "number": pr.number,
            "title": pr.title,
            "body": pr.body,
            "html_url": pr.link,
            "state": state,
            "head": branch_json(&pr.head),
            "base": branch_json(&pr.base),
            "user": {"login": pr.author.login},
            "assignees": pr.assignees.iter().map(|user| serde_json::json!({"login": user.login})).collect::<Vec<_>>(),
            "labels": pr.labels.iter().map(|label| serde_json::json!({"name": label.name})).collect::<Vec<_>>(),
            "merged": pr.merged,
            "draft": pr.draft,
        },
        "repository": repository_json(&hook.repo),
        "sender": {"login": hook.sender.login},
    })
}

#[cfg(test)]
mod tests {
    use super::{parse_github_webhook, render_github_pull_request, render_github_push};
    use crate::hooks::{Action, PullRequestHook, PushHook, Webhook, WebhookKind};
    use crate::types::{PullRequest, PullRequestBranch, Repository, User};

    fn repository() -> serde_json::Value {
        serde_json::json!({
            "name": "repo",
            "full_name": "org/repo",
            "owner": {"login": "org"},
            "default_branch": "main",
            "clone_url": "https://github.com/org/repo.git"
        })
    }

    #[test]
    fn functional_issue_comment_on_pull_request_is_flagged() {
        let body = serde_json::json!({
            "action": "created",
            "issue": {
                "number": 1,
                "title": "t",
                "state": "open",
                "user": {"login": "author"},
                "pull_request": {}
            },
            "comment": {"id": 99, "body": "/help", "user": {"login": "bob"}},
            "repository": repository(),
            "sender": {"login": "bob"}
        });
        let hook = parse_github_webhook("issue_comment", "guid-7", body.to_string().as_bytes())
            .expect("parse")
            .expect("handled");
        let Webhook::IssueComment(comment) = &hook else {
            panic!("unexpected variant {:?}", hook.kind());
        };
        assert!(comment.issue.pull_request);
        assert_eq!(comment.action, Action::Create);
        assert_eq!(comment.comment.body, "/help");
        assert_eq!(hook.guid(), "guid-7");
        assert_eq!(hook.repository().full_name, "org/repo");
    }

    #[test]
    fn functional_push_payload_normalizes_commits() {
        let body = serde_json::json!({
            "ref": "refs/heads/main",
            "before": "0000000",
            "after": "abc1234",
            "repository": repository(),
            "commits": [{"id": "abc1234", "message": "m", "added": ["a"], "modified": ["b"]}],
            "sender": {"login": "alice"}
        });
        let hook = parse_github_webhook("push", "g", body.to_string().as_bytes())
            .expect("parse")
            .expect("handled");
        let Webhook::Push(push) = hook else {
            panic!("expected push");
        };
        assert_eq!(push.branch(), "main");
        assert_eq!(push.changed_files(), vec!["a", "b"]);
        assert_eq!(push.repo.namespace, "org");
    }

    #[test]
    fn unit_merged_close_maps_to_merge_action() {
        let body = serde_json::json!({
            "action": "closed",
            "pull_request": {
                "number": 4,
                "state": "closed",
                "merged": true,
                "head": {"ref": "f", "sha": "abc1234"},
                "base": {"ref": "main", "sha": "def5678"},
                "user": {"login": "a"}
            },
            "repository": repository()
        });
        let hook = parse_github_webhook("pull_request", "g", body.to_string().as_bytes())
            .expect("parse")
            .expect("handled");
        let Webhook::PullRequest(pr) = &hook else {
            panic!("expected pull request");
        };
        assert_eq!(pr.action, Action::Merge);
        assert_eq!(hook.event_ref(), "abc1234");
    }

    #[test]
    fn unit_ping_and_tag_events_are_ignored() {
        assert!(parse_github_webhook("ping", "g", b"{\"zen\":\"x\"}")
            .expect("parse")
            .is_none());
        let tag = serde_json::json!({"ref": "v1", "ref_type": "tag", "repository": repository()});
        assert!(parse_github_webhook("create", "g", tag.to_string().as_bytes())
            .expect("parse")
            .is_none());
        let branch = serde_json::json!({"ref": "feature", "ref_type": "branch", "repository": repository()});
        let hook = parse_github_webhook("delete", "g", branch.to_string().as_bytes())
            .expect("parse")
            .expect("handled");
        assert_eq!(hook.kind(), WebhookKind::Branch);
    }

    #[test]
    fn regression_malformed_payload_is_decode_error() {
        let error = parse_github_webhook("push", "g", b"{not json").expect_err("malformed");
        assert!(error.to_string().contains("push webhook"));
    }

    fn normalized_repo() -> Repository {
        Repository {
            namespace: "myorg".to_string(),
            name: "myrepo".to_string(),
            full_name: "myorg/myrepo".to_string(),
            branch: "main".to_string(),
            ..Repository::default()
        }
    }

    #[test]
    fn functional_rendered_push_parses_back() {
        let hook = PushHook {
            ref_name: "refs/heads/main".to_string(),
            after: "abc123".to_string(),
            repo: normalized_repo(),
            guid: "abc123".to_string(),
            ..PushHook::default()
        };
        let body = render_github_push(&hook).to_string();
        let parsed = parse_github_webhook("push", "abc123", body.as_bytes())
            .expect("parse")
            .expect("handled");
        assert_eq!(parsed, Webhook::Push(hook));
    }

    #[test]
    fn functional_rendered_pull_request_parses_back() {
        let hook = PullRequestHook {
            action: Action::Sync,
            repo: normalized_repo(),
            pull_request: PullRequest {
                number: 3,
                title: "Add feature".to_string(),
                sha: "def456".to_string(),
                head: PullRequestBranch {
                    ref_name: "feature".to_string(),
                    sha: "def456".to_string(),
                    ..PullRequestBranch::default()
                },
                base: PullRequestBranch {
                    ref_name: "main".to_string(),
                    ..PullRequestBranch::default()
                },
                author: User::new("alice"),
                ..PullRequest::default()
            },
            guid: "g".to_string(),
            ..PullRequestHook::default()
        };
        let body = render_github_pull_request(&hook).to_string();
        let parsed = parse_github_webhook("pull_request", "g", body.as_bytes())
            .expect("parse")
            .expect("handled");
        let Webhook::PullRequest(parsed) = parsed else {
            panic!("expected pull request");
        };
        assert_eq!(parsed.action, Action::Sync);
        assert_eq!(parsed.pull_request.sha, "def456");
        assert_eq!(parsed.pull_request.target(), "main");
        assert_eq!(parsed.repo.full_name, "myorg/myrepo");
    }
}
