use std::path::Path;

use async_trait::async_trait;
use lighthouse_core::RepoRef;
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;

use crate::error::GitError;
use crate::fetch_cache::FetchCache;
use crate::git_browser::RepoClient;
use crate::runner::GitRunner;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileEntryKind {
    File,
    Dir,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    /// Path relative to the repository root.
    pub path: String,
    #[serde(rename = "type")]
    pub kind: FileEntryKind,
    pub size: u64,
    pub sha: String,
    pub link: String,
}

/// Read access to repository content at a ref.
#[async_trait]
pub trait FileBrowser: Send + Sync {
    /// Returns `None` when `path` does not exist at `reference`.
    async fn get_file(
        &self,
        repo: &RepoRef,
        path: &str,
        reference: &str,
        fetch_cache: &FetchCache,
    ) -> Result<Option<Vec<u8>>, GitError>;

    async fn list_files(
        &self,
        repo: &RepoRef,
        path: &str,
        reference: &str,
        fetch_cache: &FetchCache,
    ) -> Result<Vec<FileEntry>, GitError>;

    /// Exclusive access to the working tree checked out at `reference`.
    ///
    /// The repository stays locked until the returned `RepoDir` is dropped.
    async fn with_dir(
        &self,
        repo: &RepoRef,
        reference: &str,
        fetch_cache: &FetchCache,
        sparse_patterns: &[String],
    ) -> Result<RepoDir, GitError>;

    /// `[main]`, or `[main, event_ref]` when the event is not on main.
    async fn get_main_and_current_branch_refs(
        &self,
        repo: &RepoRef,
        event_ref: &str,
    ) -> Result<Vec<String>, GitError>;
}

/// Scoped handle on a locked working tree.
pub struct RepoDir {
    pub(crate) client: OwnedMutexGuard<RepoClient>,
    pub(crate) runner: GitRunner,
}

impl RepoDir {
    pub fn dir(&self) -> &Path {
        &self.client.dir
    }

    pub fn main_branch(&self) -> &str {
        &self.client.main_branch
    }

    pub fn current_ref(&self) -> &str {
        &self.client.current_ref
    }

    /// Runs `git <args>` inside the locked working tree.
    pub async fn git(&self, args: &[&str]) -> Result<String, GitError> {
        self.runner.run(&self.client.dir, args).await
    }
}

impl std::fmt::Debug for RepoDir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoDir")
            .field("dir", &self.client.dir)
            .field("current_ref", &self.client.current_ref)
            .finish()
    }
}
