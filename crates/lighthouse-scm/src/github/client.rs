use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use lighthouse_core::{truncate_for_error, RepoRef};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::model::{
    GhCombinedStatus, GhComment, GhCommit, GhFile, GhIssue, GhIssueEvent, GhLabel, GhMilestone,
    GhPullRequest, GhRef, GhReview, GhStatus, GhTeam, GhUser,
};
use super::transport::{
    error_message, is_retryable_status, is_retryable_transport_error, parse_retry_after,
    retry_delay,
};
use crate::error::{ScmError, ScmResult};
use crate::provider::ScmProvider;
use crate::types::{
    Change, CombinedStatus, Comment, Commit, Issue, Label, ListedIssueEvent, MergeDetails,
    Milestone, ProviderKind, PullRequest, Review, Status, StatusState, Team, TeamRole, User,
};

const PAGE_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct GithubProviderConfig {
    /// REST root, e.g. `https://api.github.com` or `https://ghe.example.com/api/v3`.
    pub api_base: String,
    /// Web root used for links and clone URLs.
    pub server_url: String,
    pub token: String,
    pub bot_name: String,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
}

impl Default for GithubProviderConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            server_url: "https://github.com".to_string(),
            token: String::new(),
            bot_name: String::new(),
            request_timeout_ms: 30_000,
            retry_max_attempts: 3,
            retry_base_delay_ms: 500,
        }
    }
}

/// `ScmProvider` backed by the GitHub REST API.
#[derive(Clone)]
pub struct GithubScmProvider {
    http: reqwest::Client,
    api_base: Url,
    server_url: String,
    bot_name: String,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl GithubScmProvider {
    pub fn new(config: GithubProviderConfig) -> anyhow::Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("lighthouse"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            reqwest::header::HeaderValue::from_static("2022-11-28"),
        );
        if !config.token.trim().is_empty() {
            let auth_header = format!("Bearer {}", config.token.trim());
            headers.insert(
                reqwest::header::AUTHORIZATION,
                reqwest::header::HeaderValue::from_str(&auth_header)
                    .context("invalid github authorization header")?,
            );
        }
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()
            .context("failed to create github api client")?;
        let api_base = Url::parse(config.api_base.trim_end_matches('/'))
            .with_context(|| format!("invalid github api base '{}'", config.api_base))?;
        Ok(Self {
            http,
            api_base,
            server_url: config.server_url.trim_end_matches('/').to_string(),
            bot_name: config.bot_name,
            retry_max_attempts: config.retry_max_attempts.max(1),
            retry_base_delay_ms: config.retry_base_delay_ms.max(1),
        })
    }

    /// Builds `api_base/<segments..>` with each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.api_base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        url
    }

    fn repo_url(&self, repo: &RepoRef, rest: &[&str]) -> Url {
        let mut segments = vec!["repos", repo.owner.as_str(), repo.name.as_str()];
        segments.extend_from_slice(rest);
        self.url(&segments)
    }

    async fn send<F>(&self, operation: &str, mut build: F) -> ScmResult<reqwest::Response>
    where
        F: FnMut() -> reqwest::RequestBuilder + Send,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            match build().send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    if status == StatusCode::NOT_FOUND {
                        return Err(ScmError::not_found(operation));
                    }
                    let retry_after = parse_retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if attempt < self.retry_max_attempts && is_retryable_status(status.as_u16()) {
                        let delay = retry_delay(self.retry_base_delay_ms, attempt, retry_after);
                        warn!(
                            operation,
                            status = status.as_u16(),
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "retrying github request"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(ScmError::Api {
                        operation: operation.to_string(),
                        status: status.as_u16(),
                        body: truncate_for_error(&body, 800),
                    });
                }
                Err(error) => {
                    if attempt < self.retry_max_attempts && is_retryable_transport_error(&error) {
                        tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, None))
                            .await;
                        continue;
                    }
                    return Err(ScmError::Transport {
                        operation: operation.to_string(),
                        message: error.to_string(),
                    });
                }
            }
        }
    }

    async fn decode<T: DeserializeOwned>(operation: &str, response: reqwest::Response) -> ScmResult<T> {
        response.json::<T>().await.map_err(|error| ScmError::Decode {
            operation: operation.to_string(),
            message: error.to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, operation: &str, url: Url) -> ScmResult<T> {
        let response = self.send(operation, || self.http.get(url.clone())).await?;
        Self::decode(operation, response).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        method: Method,
        url: Url,
        body: &Value,
    ) -> ScmResult<T> {
        let response = self
            .send(operation, || {
                self.http.request(method.clone(), url.clone()).json(body)
            })
            .await?;
        Self::decode(operation, response).await
    }

    async fn send_discard(
        &self,
        operation: &str,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> ScmResult<()> {
        self.send(operation, || {
            let request = self.http.request(method.clone(), url.clone());
            match body {
                Some(body) => request.json(body),
                None => request,
            }
        })
        .await
        .map(|_| ())
    }

    /// Follows `page=N` until a short page is returned.
    async fn get_paginated<T: DeserializeOwned>(
        &self,
        operation: &str,
        url: Url,
        query: &[(&str, &str)],
    ) -> ScmResult<Vec<T>> {
        let mut page = 1_u32;
        let mut rows = Vec::new();
        loop {
            let page_value = page.to_string();
            let per_page = PAGE_SIZE.to_string();
            let response = self
                .send(operation, || {
                    self.http
                        .get(url.clone())
                        .query(query)
                        .query(&[("per_page", per_page.as_str()), ("page", page_value.as_str())])
                })
                .await?;
            let chunk: Vec<T> = Self::decode(operation, response).await?;
            let chunk_len = chunk.len();
            rows.extend(chunk);
            if chunk_len < PAGE_SIZE {
                break;
            }
            page = page.saturating_add(1);
        }
        Ok(rows)
    }

    /// 2xx means yes, 404 means no.
    async fn exists(&self, operation: &str, url: Url) -> ScmResult<bool> {
        match self.send(operation, || self.http.get(url.clone())).await {
            Ok(_) => Ok(true),
            Err(error) if error.is_not_found() => Ok(false),
            Err(error) => Err(error),
        }
    }

    async fn set_issue_state(&self, repo: &RepoRef, kind: &str, number: u64, state: &str) -> ScmResult<()> {
        let number = number.to_string();
        self.send_discard(
            &format!("set {kind} state"),
            Method::PATCH,
            self.repo_url(repo, &[kind, &number]),
            Some(&json!({ "state": state })),
        )
        .await
    }
}

/// Translates a failed merge into the typed merge family.
pub(crate) fn map_merge_error(error: ScmError) -> ScmError {
    match error {
        ScmError::Api { status: 405, body, .. } => {
            let message = error_message(&body);
            let lowered = message.to_ascii_lowercase();
            if lowered.contains("base branch was modified") {
                ScmError::UnmergableBaseChanged
            } else if lowered.contains("not authorized to push") {
                ScmError::UnauthorizedToPush
            } else if lowered.contains("merge commits are not allowed") {
                ScmError::MergeCommitsForbidden
            } else {
                ScmError::Unmergable(message)
            }
        }
        ScmError::Api { status: 409, body, .. } => ScmError::ModifiedHead(error_message(&body)),
        other => other,
    }
}

fn missing_logins(requested: &[String], present: &[User]) -> Vec<String> {
    requested
        .iter()
        .filter(|login| {
            !present
                .iter()
                .any(|user| user.login.eq_ignore_ascii_case(login))
        })
        .cloned()
        .collect()
}

fn git_ref_path(reference: &str) -> &str {
    reference.strip_prefix("refs/").unwrap_or(reference)
}

#[async_trait]
impl ScmProvider for GithubScmProvider {
    fn provider_kind(&self) -> ProviderKind {
        ProviderKind::Github
    }

    fn bot_name(&self) -> &str {
        &self.bot_name
    }

    fn server_url(&self) -> &str {
        &self.server_url
    }

    fn supports_graphql(&self) -> bool {
        true
    }

    async fn list_issue_comments(&self, repo: &RepoRef, number: u64) -> ScmResult<Vec<Comment>> {
        let number = number.to_string();
        let rows: Vec<GhComment> = self
            .get_paginated(
                "list issue comments",
                self.repo_url(repo, &["issues", &number, "comments"]),
                &[],
            )
            .await?;
        Ok(rows.into_iter().map(Comment::from).collect())
    }

    async fn list_pull_request_comments(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> ScmResult<Vec<Comment>> {
        // Conversation comments on a pull request live on the issue endpoint.
        self.list_issue_comments(repo, number).await
    }

    async fn create_comment(
        &self,
        repo: &RepoRef,
        number: u64,
        _is_pr: bool,
        body: &str,
    ) -> ScmResult<Comment> {
        let number = number.to_string();
        let comment: GhComment = self
            .send_json(
                "create comment",
                Method::POST,
                self.repo_url(repo, &["issues", &number, "comments"]),
                &json!({ "body": body }),
            )
            .await?;
        Ok(comment.into())
    }

    async fn edit_comment(
        &self,
        repo: &RepoRef,
        _number: u64,
        comment_id: u64,
        _is_pr: bool,
        body: &str,
    ) -> ScmResult<()> {
        let comment_id = comment_id.to_string();
        self.send_discard(
            "edit comment",
            Method::PATCH,
            self.repo_url(repo, &["issues", "comments", &comment_id]),
            Some(&json!({ "body": body })),
        )
        .await
    }

    async fn delete_comment(
        &self,
        repo: &RepoRef,
        _number: u64,
        comment_id: u64,
        _is_pr: bool,
    ) -> ScmResult<()> {
        let comment_id = comment_id.to_string();
        self.send_discard(
            "delete comment",
            Method::DELETE,
            self.repo_url(repo, &["issues", "comments", &comment_id]),
            None,
        )
        .await
    }

    async fn get_issue_labels(
        &self,
        repo: &RepoRef,
        number: u64,
        _is_pr: bool,
    ) -> ScmResult<Vec<Label>> {
        let number = number.to_string();
        let rows: Vec<GhLabel> = self
            .get_paginated(
                "list issue labels",
                self.repo_url(repo, &["issues", &number, "labels"]),
                &[],
            )
            .await?;
        Ok(rows.into_iter().map(Label::from).collect())
    }

    async fn add_label(
        &self,
        repo: &RepoRef,
        number: u64,
        label: &str,
        _is_pr: bool,
    ) -> ScmResult<()> {
        let number = number.to_string();
        self.send_discard(
            "add label",
            Method::POST,
            self.repo_url(repo, &["issues", &number, "labels"]),
            Some(&json!({ "labels": [label] })),
        )
        .await
    }

    async fn remove_label(
        &self,
        repo: &RepoRef,
        number: u64,
        label: &str,
        _is_pr: bool,
    ) -> ScmResult<()> {
        let number = number.to_string();
        self.send_discard(
            "remove label",
            Method::DELETE,
            self.repo_url(repo, &["issues", &number, "labels", label]),
            None,
        )
        .await
    }

    async fn get_repo_labels(&self, repo: &RepoRef) -> ScmResult<Vec<Label>> {
        let rows: Vec<GhLabel> = self
            .get_paginated("list repo labels", self.repo_url(repo, &["labels"]), &[])
            .await?;
        Ok(rows.into_iter().map(Label::from).collect())
    }

    async fn get_issue(&self, repo: &RepoRef, number: u64) -> ScmResult<Issue> {
        let number = number.to_string();
        let issue: GhIssue = self
            .get_json("get issue", self.repo_url(repo, &["issues", &number]))
            .await?;
        Ok(issue.into())
    }

    async fn close_issue(&self, repo: &RepoRef, number: u64) -> ScmResult<()> {
        self.set_issue_state(repo, "issues", number, "closed").await
    }

    async fn reopen_issue(&self, repo: &RepoRef, number: u64) -> ScmResult<()> {
        self.set_issue_state(repo, "issues", number, "open").await
    }

    async fn find_issues(&self, query: &str, sort: &str, ascending: bool) -> ScmResult<Vec<Issue>> {
        #[derive(Deserialize)]
        struct SearchResult {
            #[serde(default)]
            items: Vec<GhIssue>,
        }

        let url = self.url(&["search", "issues"]);
        let order = if ascending { "asc" } else { "desc" };
        let response = self
            .send("search issues", || {
                let mut request = self.http.get(url.clone()).query(&[("q", query), ("order", order)]);
                if !sort.is_empty() {
                    request = request.query(&[("sort", sort)]);
                }
                request
            })
            .await?;
        let result: SearchResult = Self::decode("search issues", response).await?;
        Ok(result.items.into_iter().map(Issue::from).collect())
    }

    async fn assign_issue(&self, repo: &RepoRef, number: u64, logins: &[String]) -> ScmResult<()> {
        let number_segment = number.to_string();
        let issue: GhIssue = self
            .send_json(
                "assign issue",
                Method::POST,
                self.repo_url(repo, &["issues", &number_segment, "assignees"]),
                &json!({ "assignees": logins }),
            )
            .await?;
        let assigned = Issue::from(issue).assignees;
        let missing = missing_logins(logins, &assigned);
        if missing.is_empty() {
            return Ok(());
        }
        debug!(repo = %repo, issue = number, missing = ?missing, "github ignored assignees");
        Err(ScmError::MissingUsers {
            users: missing,
            action: "assign".to_string(),
        })
    }

    async fn unassign_issue(
        &self,
        repo: &RepoRef,
        number: u64,
        logins: &[String],
    ) -> ScmResult<()> {
        let number = number.to_string();
        self.send_discard(
            "unassign issue",
            Method::DELETE,
            self.repo_url(repo, &["issues", &number, "assignees"]),
            Some(&json!({ "assignees": logins })),
        )
        .await
    }

    async fn list_issue_events(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> ScmResult<Vec<ListedIssueEvent>> {
        let number = number.to_string();
        let rows: Vec<GhIssueEvent> = self
            .get_paginated(
                "list issue events",
                self.repo_url(repo, &["issues", &number, "events"]),
                &[],
            )
            .await?;
        Ok(rows.into_iter().map(ListedIssueEvent::from).collect())
    }

    async fn is_collaborator(&self, repo: &RepoRef, login: &str) -> ScmResult<bool> {
        self.exists(
            "check collaborator",
            self.repo_url(repo, &["collaborators", login]),
        )
        .await
    }

    async fn list_collaborators(&self, repo: &RepoRef) -> ScmResult<Vec<User>> {
        let rows: Vec<GhUser> = self
            .get_paginated(
                "list collaborators",
                self.repo_url(repo, &["collaborators"]),
                &[],
            )
            .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn get_pull_request(&self, repo: &RepoRef, number: u64) -> ScmResult<PullRequest> {
        let number = number.to_string();
        let pr: GhPullRequest = self
            .get_json("get pull request", self.repo_url(repo, &["pulls", &number]))
            .await?;
        Ok(pr.into())
    }

    async fn list_open_pull_requests(&self, repo: &RepoRef) -> ScmResult<Vec<PullRequest>> {
        let rows: Vec<GhPullRequest> = self
            .get_paginated(
                "list pull requests",
                self.repo_url(repo, &["pulls"]),
                &[("state", "open")],
            )
            .await?;
        Ok(rows.into_iter().map(PullRequest::from).collect())
    }

    async fn get_pull_request_changes(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> ScmResult<Vec<Change>> {
        let number = number.to_string();
        let rows: Vec<GhFile> = self
            .get_paginated(
                "list pull request files",
                self.repo_url(repo, &["pulls", &number, "files"]),
                &[],
            )
            .await?;
        Ok(rows.into_iter().map(Change::from).collect())
    }

    async fn merge_pull_request(
        &self,
        repo: &RepoRef,
        number: u64,
        details: &MergeDetails,
    ) -> ScmResult<()> {
        let number = number.to_string();
        let mut body = json!({ "merge_method": details.method.as_str() });
        if let Some(sha) = &details.sha {
            body["sha"] = json!(sha);
        }
        if !details.title.is_empty() {
            body["commit_title"] = json!(details.title);
        }
        if !details.message.is_empty() {
            body["commit_message"] = json!(details.message);
        }
        self.send_discard(
            "merge pull request",
            Method::PUT,
            self.repo_url(repo, &["pulls", &number, "merge"]),
            Some(&body),
        )
        .await
        .map_err(map_merge_error)
    }

    async fn close_pull_request(&self, repo: &RepoRef, number: u64) -> ScmResult<()> {
        self.set_issue_state(repo, "pulls", number, "closed").await
    }

    async fn reopen_pull_request(&self, repo: &RepoRef, number: u64) -> ScmResult<()> {
        self.set_issue_state(repo, "pulls", number, "open").await
    }

    async fn list_reviews(&self, repo: &RepoRef, number: u64) -> ScmResult<Vec<Review>> {
        let number = number.to_string();
        let rows: Vec<GhReview> = self
            .get_paginated(
                "list reviews",
                self.repo_url(repo, &["pulls", &number, "reviews"]),
                &[],
            )
            .await?;
        Ok(rows.into_iter().map(Review::from).collect())
    }

    async fn request_review(
        &self,
        repo: &RepoRef,
        number: u64,
        logins: &[String],
    ) -> ScmResult<()> {
        let number = number.to_string();
        let result = self
            .send_discard(
                "request review",
                Method::POST,
                self.repo_url(repo, &["pulls", &number, "requested_reviewers"]),
                Some(&json!({ "reviewers": logins })),
            )
            .await;
        match result {
            // GitHub rejects the whole request when any reviewer is not a collaborator.
            Err(ScmError::Api { status: 422, .. }) => Err(ScmError::MissingUsers {
                users: logins.to_vec(),
                action: "request a pull request review from".to_string(),
            }),
            other => other,
        }
    }

    async fn unrequest_review(
        &self,
        repo: &RepoRef,
        number: u64,
        logins: &[String],
    ) -> ScmResult<()> {
        let number = number.to_string();
        self.send_discard(
            "unrequest review",
            Method::DELETE,
            self.repo_url(repo, &["pulls", &number, "requested_reviewers"]),
            Some(&json!({ "reviewers": logins })),
        )
        .await
    }

    async fn create_status(&self, repo: &RepoRef, sha: &str, status: &Status) -> ScmResult<Status> {
        let state = match status.state {
            StatusState::Unknown => StatusState::Pending,
            other => other,
        };
        let mut body = json!({
            "state": state.as_str(),
            "context": status.label,
            "description": status.desc,
        });
        if !status.target.is_empty() {
            body["target_url"] = json!(status.target);
        }
        let created: GhStatus = self
            .send_json(
                "create status",
                Method::POST,
                self.repo_url(repo, &["statuses", sha]),
                &body,
            )
            .await?;
        Ok(created.into())
    }

    async fn list_statuses(&self, repo: &RepoRef, reference: &str) -> ScmResult<Vec<Status>> {
        let rows: Vec<GhStatus> = self
            .get_paginated(
                "list statuses",
                self.repo_url(repo, &["commits", reference, "statuses"]),
                &[],
            )
            .await?;
        Ok(rows.into_iter().map(Status::from).collect())
    }

    async fn get_combined_status(
        &self,
        repo: &RepoRef,
        reference: &str,
    ) -> ScmResult<CombinedStatus> {
        let combined: GhCombinedStatus = self
            .get_json(
                "get combined status",
                self.repo_url(repo, &["commits", reference, "status"]),
            )
            .await?;
        Ok(combined.into())
    }

    async fn get_single_commit(&self, repo: &RepoRef, sha: &str) -> ScmResult<Commit> {
        let commit: GhCommit = self
            .get_json("get commit", self.repo_url(repo, &["commits", sha]))
            .await?;
        Ok(commit.into())
    }

    async fn list_milestones(&self, repo: &RepoRef) -> ScmResult<Vec<Milestone>> {
        let rows: Vec<GhMilestone> = self
            .get_paginated(
                "list milestones",
                self.repo_url(repo, &["milestones"]),
                &[("state", "open")],
            )
            .await?;
        Ok(rows.into_iter().map(Milestone::from).collect())
    }

    async fn set_milestone(&self, repo: &RepoRef, number: u64, milestone: u64) -> ScmResult<()> {
        let number = number.to_string();
        self.send_discard(
            "set milestone",
            Method::PATCH,
            self.repo_url(repo, &["issues", &number]),
            Some(&json!({ "milestone": milestone })),
        )
        .await
    }

    async fn clear_milestone(&self, repo: &RepoRef, number: u64) -> ScmResult<()> {
        let number = number.to_string();
        self.send_discard(
            "clear milestone",
            Method::PATCH,
            self.repo_url(repo, &["issues", &number]),
            Some(&json!({ "milestone": Value::Null })),
        )
        .await
    }

    async fn list_teams(&self, org: &str) -> ScmResult<Vec<Team>> {
        let rows: Vec<GhTeam> = self
            .get_paginated("list teams", self.url(&["orgs", org, "teams"]), &[])
            .await?;
        Ok(rows.into_iter().map(Team::from).collect())
    }

    async fn list_team_members(&self, team_id: u64, role: TeamRole) -> ScmResult<Vec<User>> {
        let team_id = team_id.to_string();
        let rows: Vec<GhUser> = self
            .get_paginated(
                "list team members",
                self.url(&["teams", &team_id, "members"]),
                &[("role", role.as_str())],
            )
            .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn is_org_member(&self, org: &str, login: &str) -> ScmResult<bool> {
        self.exists("check org membership", self.url(&["orgs", org, "members", login]))
            .await
    }

    async fn is_org_admin(&self, org: &str, login: &str) -> ScmResult<bool> {
        #[derive(Deserialize)]
        struct Membership {
            #[serde(default)]
            role: String,
            #[serde(default)]
            state: String,
        }

        match self
            .get_json::<Membership>(
                "get org membership",
                self.url(&["orgs", org, "memberships", login]),
            )
            .await
        {
            Ok(membership) => Ok(membership.role == "admin" && membership.state == "active"),
            Err(error) if error.is_not_found() => Ok(false),
            Err(error) => Err(error),
        }
    }

    async fn get_ref(&self, repo: &RepoRef, reference: &str) -> ScmResult<String> {
        let mut segments = vec!["git", "ref"];
        segments.extend(git_ref_path(reference).split('/'));
        let git_ref: GhRef = self.get_json("get ref", self.repo_url(repo, &segments)).await?;
        Ok(git_ref.object.sha)
    }

    async fn delete_ref(&self, repo: &RepoRef, reference: &str) -> ScmResult<()> {
        let mut segments = vec!["git", "refs"];
        segments.extend(git_ref_path(reference).split('/'));
        self.send_discard("delete ref", Method::DELETE, self.repo_url(repo, &segments), None)
            .await
    }

    async fn get_file(
        &self,
        repo: &RepoRef,
        path: &str,
        reference: &str,
    ) -> ScmResult<Option<Vec<u8>>> {
        let mut segments = vec!["contents"];
        segments.extend(path.trim_matches('/').split('/'));
        let url = self.repo_url(repo, &segments);
        let result = self
            .send("get file", || {
                let request = self
                    .http
                    .get(url.clone())
                    .header(reqwest::header::ACCEPT, "application/vnd.github.raw");
                if reference.is_empty() {
                    request
                } else {
                    request.query(&[("ref", reference)])
                }
            })
            .await;
        let response = match result {
            Ok(response) => response,
            Err(error) if error.is_not_found() => return Ok(None),
            Err(error) => return Err(error),
        };
        let bytes = response.bytes().await.map_err(|error| ScmError::Decode {
            operation: "get file".to_string(),
            message: error.to_string(),
        })?;
        Ok(Some(bytes.to_vec()))
    }
}
