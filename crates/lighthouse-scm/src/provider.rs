use async_trait::async_trait;
use lighthouse_core::RepoRef;

use crate::error::ScmResult;
use crate::types::{
    Change, CombinedStatus, Comment, Commit, Issue, Label, ListedIssueEvent, MergeDetails,
    Milestone, ProviderKind, PullRequest, Review, Status, Team, TeamRole, User,
};

#[async_trait]
/// Capability set plugins consume from a repository provider.
///
/// `is_pr` selects between the issue and pull-request flavour of an endpoint
/// for providers that distinguish them.
pub trait ScmProvider: Send + Sync {
    fn provider_kind(&self) -> ProviderKind;

    /// Login the gateway posts comments and applies labels as.
    fn bot_name(&self) -> &str;

    /// Web URL of the provider, used to build links.
    fn server_url(&self) -> &str;

    fn supports_pr_labels(&self) -> bool {
        true
    }

    fn supports_graphql(&self) -> bool {
        false
    }

    // Comments.
    async fn list_issue_comments(&self, repo: &RepoRef, number: u64) -> ScmResult<Vec<Comment>>;
    async fn list_pull_request_comments(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> ScmResult<Vec<Comment>>;
    async fn create_comment(
        &self,
        repo: &RepoRef,
        number: u64,
        is_pr: bool,
        body: &str,
    ) -> ScmResult<Comment>;
    async fn edit_comment(
        &self,
        repo: &RepoRef,
        number: u64,
        comment_id: u64,
        is_pr: bool,
        body: &str,
    ) -> ScmResult<()>;
    async fn delete_comment(
        &self,
        repo: &RepoRef,
        number: u64,
        comment_id: u64,
        is_pr: bool,
    ) -> ScmResult<()>;

    // Labels.
    async fn get_issue_labels(
        &self,
        repo: &RepoRef,
        number: u64,
        is_pr: bool,
    ) -> ScmResult<Vec<Label>>;
    async fn add_label(&self, repo: &RepoRef, number: u64, label: &str, is_pr: bool)
        -> ScmResult<()>;
    async fn remove_label(
        &self,
        repo: &RepoRef,
        number: u64,
        label: &str,
        is_pr: bool,
    ) -> ScmResult<()>;
    async fn get_repo_labels(&self, repo: &RepoRef) -> ScmResult<Vec<Label>>;

    // Issues.
    async fn get_issue(&self, repo: &RepoRef, number: u64) -> ScmResult<Issue>;
    async fn close_issue(&self, repo: &RepoRef, number: u64) -> ScmResult<()>;
    async fn reopen_issue(&self, repo: &RepoRef, number: u64) -> ScmResult<()>;
    async fn find_issues(&self, query: &str, sort: &str, ascending: bool)
        -> ScmResult<Vec<Issue>>;
    async fn assign_issue(&self, repo: &RepoRef, number: u64, logins: &[String])
        -> ScmResult<()>;
    async fn unassign_issue(
        &self,
        repo: &RepoRef,
        number: u64,
        logins: &[String],
    ) -> ScmResult<()>;
    async fn list_issue_events(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> ScmResult<Vec<ListedIssueEvent>>;
    async fn is_collaborator(&self, repo: &RepoRef, login: &str) -> ScmResult<bool>;
    async fn list_collaborators(&self, repo: &RepoRef) -> ScmResult<Vec<User>>;

    // Pull requests.
    async fn get_pull_request(&self, repo: &RepoRef, number: u64) -> ScmResult<PullRequest>;
    async fn list_open_pull_requests(&self, repo: &RepoRef) -> ScmResult<Vec<PullRequest>>;
    async fn get_pull_request_changes(&self, repo: &RepoRef, number: u64)
        -> ScmResult<Vec<Change>>;
    async fn merge_pull_request(
        &self,
        repo: &RepoRef,
        number: u64,
        details: &MergeDetails,
    ) -> ScmResult<()>;
    async fn close_pull_request(&self, repo: &RepoRef, number: u64) -> ScmResult<()>;
    async fn reopen_pull_request(&self, repo: &RepoRef, number: u64) -> ScmResult<()>;

    // Reviews.
    async fn list_reviews(&self, repo: &RepoRef, number: u64) -> ScmResult<Vec<Review>>;
    async fn request_review(&self, repo: &RepoRef, number: u64, logins: &[String])
        -> ScmResult<()>;
    async fn unrequest_review(
        &self,
        repo: &RepoRef,
        number: u64,
        logins: &[String],
    ) -> ScmResult<()>;

    // Statuses.
    async fn create_status(&self, repo: &RepoRef, sha: &str, status: &Status)
        -> ScmResult<Status>;
    async fn list_statuses(&self, repo: &RepoRef, reference: &str) -> ScmResult<Vec<Status>>;
    async fn get_combined_status(&self, repo: &RepoRef, reference: &str)
        -> ScmResult<CombinedStatus>;
    async fn get_single_commit(&self, repo: &RepoRef, sha: &str) -> ScmResult<Commit>;

    // Milestones.
    async fn list_milestones(&self, repo: &RepoRef) -> ScmResult<Vec<Milestone>>;
    async fn set_milestone(&self, repo: &RepoRef, number: u64, milestone: u64) -> ScmResult<()>;
    async fn clear_milestone(&self, repo: &RepoRef, number: u64) -> ScmResult<()>;

    // Teams and organisations.
    async fn list_teams(&self, org: &str) -> ScmResult<Vec<Team>>;
    async fn list_team_members(&self, team_id: u64, role: TeamRole) -> ScmResult<Vec<User>>;
    async fn is_org_member(&self, org: &str, login: &str) -> ScmResult<bool>;
    async fn is_org_admin(&self, org: &str, login: &str) -> ScmResult<bool>;

    // Refs and content.
    async fn get_ref(&self, repo: &RepoRef, reference: &str) -> ScmResult<String>;
    async fn delete_ref(&self, repo: &RepoRef, reference: &str) -> ScmResult<()>;
    /// Returns `None` when the path does not exist at `reference`.
    async fn get_file(
        &self,
        repo: &RepoRef,
        path: &str,
        reference: &str,
    ) -> ScmResult<Option<Vec<u8>>>;
}
