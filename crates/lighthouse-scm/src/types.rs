use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use lighthouse_core::RepoRef;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Enumerates the repository providers Lighthouse can talk to.
pub enum ProviderKind {
    Github,
    Fake,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Github => "github",
            Self::Fake => "fake",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "github" | "" => Ok(Self::Github),
            "fake" => Ok(Self::Fake),
            other => bail!("unsupported git provider kind '{other}'"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub login: String,
    #[serde(default)]
    pub name: String,
}

impl User {
    pub fn new(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            name: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub description: String,
}

impl Label {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    /// Owning user or organisation.
    pub namespace: String,
    pub name: String,
    pub full_name: String,
    /// Default branch as reported by the provider.
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub clone: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub private: bool,
}

impl Repository {
    pub fn repo_ref(&self) -> RepoRef {
        RepoRef::new(self.namespace.clone(), self.name.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    pub body: String,
    pub author: User,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub updated: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub state: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub closed: bool,
    pub author: User,
    #[serde(default)]
    pub assignees: Vec<User>,
    /// True when the issue is the conversation half of a pull request.
    #[serde(default)]
    pub pull_request: bool,
    #[serde(default)]
    pub milestone: Option<Milestone>,
}

impl Issue {
    pub fn state(&self) -> &'static str {
        if self.closed {
            "closed"
        } else {
            "open"
        }
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels
            .iter()
            .any(|existing| existing.name.eq_ignore_ascii_case(label))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestBranch {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub sha: String,
    #[serde(default)]
    pub repo: Repository,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub link: String,
    /// Head commit SHA.
    pub sha: String,
    pub base: PullRequestBranch,
    pub head: PullRequestBranch,
    pub author: User,
    #[serde(default)]
    pub assignees: Vec<User>,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub closed: bool,
    #[serde(default)]
    pub merged: bool,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub mergeable: Option<bool>,
    #[serde(default)]
    pub merge_sha: Option<String>,
    #[serde(default)]
    pub milestone: Option<Milestone>,
}

impl PullRequest {
    pub fn state(&self) -> &'static str {
        if self.merged {
            "merged"
        } else if self.closed {
            "closed"
        } else {
            "open"
        }
    }

    /// Target branch name of the pull request.
    pub fn target(&self) -> &str {
        &self.base.ref_name
    }

    /// Source branch name of the pull request.
    pub fn source(&self) -> &str {
        &self.head.ref_name
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusState {
    #[default]
    Unknown,
    Pending,
    Success,
    Failure,
    Error,
}

impl StatusState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Error => "error",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" | "running" | "queued" => Self::Pending,
            "success" => Self::Success,
            "failure" | "failed" => Self::Failure,
            "error" | "canceled" | "cancelled" => Self::Error,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for StatusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status context on a commit. `label` is the context name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub state: StatusState,
    pub label: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub target: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinedStatus {
    pub state: StatusState,
    pub sha: String,
    #[serde(default)]
    pub statuses: Vec<Status>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: u64,
    #[serde(default)]
    pub body: String,
    pub author: User,
    pub state: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub sha: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMethod {
    #[default]
    Merge,
    Squash,
    Rebase,
}

impl MergeMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::Squash => "squash",
            Self::Rebase => "rebase",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeDetails {
    /// Expected head SHA; the merge fails with `ModifiedHead` if it moved.
    #[serde(default)]
    pub sha: Option<String>,
    #[serde(default)]
    pub method: MergeMethod,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub path: String,
    #[serde(default)]
    pub previous_path: String,
    #[serde(default)]
    pub added: bool,
    #[serde(default)]
    pub renamed: bool,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub sha: String,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedIssueEvent {
    pub event: String,
    pub actor: User,
    #[serde(default)]
    pub label: Option<Label>,
    #[serde(default)]
    pub created: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub author: User,
    #[serde(default)]
    pub link: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub slug: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamRole {
    #[default]
    All,
    Admin,
    Maintainer,
    Member,
}

impl TeamRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Admin => "admin",
            Self::Maintainer => "maintainer",
            Self::Member => "member",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Issue, Label, ProviderKind, PullRequest, StatusState};

    #[test]
    fn unit_provider_kind_parses_known_values() {
        assert_eq!("GitHub".parse::<ProviderKind>().expect("parse"), ProviderKind::Github);
        assert_eq!("".parse::<ProviderKind>().expect("parse"), ProviderKind::Github);
        assert_eq!("fake".parse::<ProviderKind>().expect("parse"), ProviderKind::Fake);
        assert!("bitbucketcloud".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn unit_status_state_parse_maps_provider_spellings() {
        assert_eq!(StatusState::parse("SUCCESS"), StatusState::Success);
        assert_eq!(StatusState::parse("running"), StatusState::Pending);
        assert_eq!(StatusState::parse("failed"), StatusState::Failure);
        assert_eq!(StatusState::parse("canceled"), StatusState::Error);
        assert_eq!(StatusState::parse("weird"), StatusState::Unknown);
    }

    #[test]
    fn functional_issue_and_pull_request_state_helpers() {
        let mut issue = Issue {
            labels: vec![Label::named("lifecycle/stale")],
            ..Issue::default()
        };
        assert_eq!(issue.state(), "open");
        assert!(issue.has_label("Lifecycle/Stale"));
        issue.closed = true;
        assert_eq!(issue.state(), "closed");

        let mut pr = PullRequest::default();
        assert_eq!(pr.state(), "open");
        pr.closed = true;
        pr.merged = true;
        assert_eq!(pr.state(), "merged");
    }
}
