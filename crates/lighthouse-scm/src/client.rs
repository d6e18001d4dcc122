use std::collections::BTreeSet;
use std::ops::Deref;
use std::sync::Arc;

use lighthouse_core::RepoRef;
use tracing::debug;

use crate::error::ScmResult;
use crate::label_report::{is_label_report, parse_label_report, render_label_report};
use crate::provider::ScmProvider;
use crate::types::{Comment, Label};

/// Plugin-facing provider handle.
///
/// Dereferences to the underlying `ScmProvider`; the label methods defined
/// here shadow the provider's and route pull-request labels through the
/// tracking comment when `supports_pr_labels()` is false.
#[derive(Clone)]
pub struct ScmClient {
    provider: Arc<dyn ScmProvider>,
}

impl Deref for ScmClient {
    type Target = dyn ScmProvider;

    fn deref(&self) -> &Self::Target {
        self.provider.as_ref()
    }
}

impl ScmClient {
    pub fn new(provider: Arc<dyn ScmProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> Arc<dyn ScmProvider> {
        Arc::clone(&self.provider)
    }

    pub fn is_bot(&self, login: &str) -> bool {
        login.eq_ignore_ascii_case(self.provider.bot_name())
    }

    fn emulates_labels(&self, is_pr: bool) -> bool {
        is_pr && !self.provider.supports_pr_labels()
    }

    pub async fn get_issue_labels(
        &self,
        repo: &RepoRef,
        number: u64,
        is_pr: bool,
    ) -> ScmResult<Vec<Label>> {
        if !self.emulates_labels(is_pr) {
            return self.provider.get_issue_labels(repo, number, is_pr).await;
        }
        let (_, labels) = self.read_label_report(repo, number).await?;
        Ok(labels.into_iter().map(Label::named).collect())
    }

    pub async fn add_label(
        &self,
        repo: &RepoRef,
        number: u64,
        label: &str,
        is_pr: bool,
    ) -> ScmResult<()> {
        if !self.emulates_labels(is_pr) {
            return self.provider.add_label(repo, number, label, is_pr).await;
        }
        let (comment, mut labels) = self.read_label_report(repo, number).await?;
        if !labels.insert(label.to_string()) {
            return Ok(());
        }
        self.write_label_report(repo, number, comment, &labels).await
    }

    pub async fn remove_label(
        &self,
        repo: &RepoRef,
        number: u64,
        label: &str,
        is_pr: bool,
    ) -> ScmResult<()> {
        if !self.emulates_labels(is_pr) {
            return self.provider.remove_label(repo, number, label, is_pr).await;
        }
        let (comment, mut labels) = self.read_label_report(repo, number).await?;
        if !labels.remove(label) {
            return Ok(());
        }
        self.write_label_report(repo, number, comment, &labels).await
    }

    /// Deletes comments by the bot among `comments` that satisfy `predicate`.
    pub async fn delete_stale_comments<F>(
        &self,
        repo: &RepoRef,
        number: u64,
        comments: &[Comment],
        is_pr: bool,
        predicate: F,
    ) -> ScmResult<usize>
    where
        F: Fn(&Comment) -> bool + Send + Sync,
    {
        let mut deleted = 0_usize;
        for comment in comments {
            if !self.is_bot(&comment.author.login) || !predicate(comment) {
                continue;
            }
            self.provider
                .delete_comment(repo, number, comment.id, is_pr)
                .await?;
            deleted = deleted.saturating_add(1);
        }
        Ok(deleted)
    }

    async fn read_label_report(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> ScmResult<(Option<Comment>, BTreeSet<String>)> {
        let comments = self.provider.list_pull_request_comments(repo, number).await?;
        let report = comments
            .into_iter()
            .find(|comment| self.is_bot(&comment.author.login) && is_label_report(&comment.body));
        let labels = report
            .as_ref()
            .map(|comment| parse_label_report(&comment.body))
            .unwrap_or_default();
        Ok((report, labels))
    }

    async fn write_label_report(
        &self,
        repo: &RepoRef,
        number: u64,
        existing: Option<Comment>,
        labels: &BTreeSet<String>,
    ) -> ScmResult<()> {
        let body = render_label_report(labels.iter().map(String::as_str));
        match existing {
            Some(comment) => {
                debug!(repo = %repo, pr = number, comment_id = comment.id, "updating label report comment");
                self.provider
                    .edit_comment(repo, number, comment.id, true, &body)
                    .await
            }
            None => {
                debug!(repo = %repo, pr = number, "creating label report comment");
                self.provider
                    .create_comment(repo, number, true, &body)
                    .await
                    .map(|_| ())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use lighthouse_core::RepoRef;

    use super::ScmClient;
    use crate::fake::FakeScmProvider;
    use crate::label_report::is_label_report;
    use crate::provider::ScmProvider;
    use crate::types::{Comment, User};

    fn repo() -> RepoRef {
        RepoRef::new("org", "repo")
    }

    #[tokio::test]
    async fn functional_labels_route_to_provider_when_supported() {
        let fake = Arc::new(FakeScmProvider::new());
        let client = ScmClient::new(fake.clone());
        client
            .add_label(&repo(), 1, "help", true)
            .await
            .expect("add label");
        fake.with_state(|state| {
            assert_eq!(state.issue_labels_added, vec!["org/repo#1:help"]);
            assert!(state.pull_request_comments.is_empty());
        });
    }

    #[tokio::test]
    async fn integration_labels_round_trip_through_tracking_comment() {
        let fake = Arc::new(FakeScmProvider::new());
        fake.with_state(|state| state.supports_pr_labels = false);
        let client = ScmClient::new(fake.clone());
        let repo = repo();

        client.add_label(&repo, 7, "kind/bug", true).await.expect("add");
        client.add_label(&repo, 7, "help", true).await.expect("add");
        client.add_label(&repo, 7, "help", true).await.expect("add twice");
        client.remove_label(&repo, 7, "kind/bug", true).await.expect("remove");

        let labels = client
            .get_issue_labels(&repo, 7, true)
            .await
            .expect("labels")
            .into_iter()
            .map(|label| label.name)
            .collect::<BTreeSet<_>>();
        assert_eq!(labels, BTreeSet::from(["help".to_string()]));

        fake.with_state(|state| {
            let comments = state.pull_request_comments.get(&7).cloned().unwrap_or_default();
            assert_eq!(comments.len(), 1, "report comment is edited in place");
            assert!(is_label_report(&comments[0].body));
            assert!(state.issue_labels_added.is_empty());
        });
    }

    #[tokio::test]
    async fn unit_delete_stale_comments_only_touches_bot_comments() {
        let fake = Arc::new(FakeScmProvider::new());
        let client = ScmClient::new(fake.clone());
        let bot = fake.bot_name().to_string();
        let comments = vec![
            Comment {
                id: 1,
                body: "stale".to_string(),
                author: User::new(bot.clone()),
                ..Comment::default()
            },
            Comment {
                id: 2,
                body: "stale".to_string(),
                author: User::new("human"),
                ..Comment::default()
            },
            Comment {
                id: 3,
                body: "fresh".to_string(),
                author: User::new(bot),
                ..Comment::default()
            },
        ];
        let deleted = client
            .delete_stale_comments(&repo(), 3, &comments, false, |comment| comment.body == "stale")
            .await
            .expect("delete");
        assert_eq!(deleted, 1);
        fake.with_state(|state| assert_eq!(state.issue_comments_deleted, vec!["org/repo#1"]));
    }
}
