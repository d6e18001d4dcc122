use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use lighthouse_core::{branch_from_ref, is_sha, tag_from_ref, RepoRef};
use tempfile::TempDir;
use tracing::{debug, info};

use crate::browser::{FileBrowser, FileEntry, FileEntryKind, RepoDir};
use crate::error::GitError;
use crate::fetch_cache::FetchCache;
use crate::runner::GitRunner;

#[derive(Debug, Clone)]
pub struct GitBrowserConfig {
    /// Clone host root, e.g. `https://github.com`; a local path also works.
    pub server_url: String,
    pub user: String,
    pub token: String,
    /// Extra path inserted between the server and `owner/repo`.
    pub clone_path_prefix: String,
    pub sparse_checkout: bool,
    pub git_binary: PathBuf,
    pub command_timeout: Duration,
    /// Parent of the per-process clone cache; the system temp dir when unset.
    pub cache_root: Option<PathBuf>,
}

impl Default for GitBrowserConfig {
    fn default() -> Self {
        Self {
            server_url: "https://github.com".to_string(),
            user: String::new(),
            token: String::new(),
            clone_path_prefix: String::new(),
            sparse_checkout: false,
            git_binary: PathBuf::from("git"),
            command_timeout: Duration::from_secs(120),
            cache_root: None,
        }
    }
}

/// Per-repository working-tree state, guarded by its own mutex.
#[derive(Debug)]
pub(crate) struct RepoClient {
    pub(crate) dir: PathBuf,
    pub(crate) full_name: String,
    pub(crate) main_branch: String,
    pub(crate) current_ref: String,
    pub(crate) cloned: bool,
    /// Patterns applied with `git sparse-checkout set`; empty when disabled.
    pub(crate) sparse_patterns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Main,
    Branch(String),
    Tag(String),
    Sha(String),
}

impl Target {
    fn resolve(requested: &str, main: &str) -> Self {
        let requested = requested.trim();
        if requested.is_empty() || requested == main || requested == "HEAD" {
            return Self::Main;
        }
        if let Some(branch) = branch_from_ref(requested).or_else(|| requested.strip_prefix("origin/")) {
            return if branch == main {
                Self::Main
            } else {
                Self::Branch(branch.to_string())
            };
        }
        if let Some(tag) = tag_from_ref(requested) {
            return Self::Tag(tag.to_string());
        }
        if is_sha(requested) {
            return Self::Sha(requested.to_string());
        }
        Self::Branch(requested.to_string())
    }

    /// Name passed to `git checkout`; also the fetch-cache key.
    fn checkout_name(&self, main: &str) -> String {
        match self {
            Self::Main => main.to_string(),
            Self::Branch(branch) => format!("origin/{branch}"),
            Self::Tag(tag) => format!("refs/tags/{tag}"),
            Self::Sha(sha) => sha.clone(),
        }
    }
}

/// `FileBrowser` backed by cached local clones.
///
/// Clones live under a temporary directory removed when the browser drops.
pub struct GitFileBrowser {
    config: GitBrowserConfig,
    runner: GitRunner,
    cache_dir: TempDir,
    repos: Mutex<HashMap<String, Arc<tokio::sync::Mutex<RepoClient>>>>,
}

impl GitFileBrowser {
    pub fn new(config: GitBrowserConfig) -> anyhow::Result<Self> {
        let builder = {
            let mut builder = tempfile::Builder::new();
            builder.prefix("lighthouse-clones-");
            builder
        };
        let cache_dir = match &config.cache_root {
            Some(root) => {
                std::fs::create_dir_all(root)
                    .with_context(|| format!("failed to create {}", root.display()))?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .context("failed to create clone cache directory")?;
        let runner = GitRunner::new(config.git_binary.clone(), config.command_timeout);
        Ok(Self {
            config,
            runner,
            cache_dir,
            repos: Mutex::new(HashMap::new()),
        })
    }

    pub fn cache_dir(&self) -> &Path {
        self.cache_dir.path()
    }

    pub fn clone_url(&self, repo: &RepoRef) -> String {
        let mut base = self.config.server_url.trim_end_matches('/').to_string();
        let prefix = self.config.clone_path_prefix.trim_matches('/');
        if !prefix.is_empty() {
            base.push('/');
            base.push_str(prefix);
        }
        let url = format!("{base}/{}/{}.git", repo.owner, repo.name);
        let token = self.config.token.trim();
        if token.is_empty() {
            return url;
        }
        let Some((scheme, rest)) = url.split_once("://") else {
            return url;
        };
        if scheme != "https" && scheme != "http" {
            return url;
        }
        let user = self.config.user.trim();
        if user.is_empty() {
            format!("{scheme}://{token}@{rest}")
        } else {
            format!("{scheme}://{user}:{token}@{rest}")
        }
    }

    fn repo_client(&self, repo: &RepoRef) -> Arc<tokio::sync::Mutex<RepoClient>> {
        let full_name = repo.full_name();
        let mut repos = self
            .repos
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let entry = repos.entry(full_name.clone()).or_insert_with(|| {
            Arc::new(tokio::sync::Mutex::new(RepoClient {
                dir: self.cache_dir.path().join(&repo.owner).join(&repo.name),
                full_name,
                main_branch: String::new(),
                current_ref: String::new(),
                cloned: false,
                sparse_patterns: Vec::new(),
            }))
        });
        Arc::clone(entry)
    }

    async fn ensure_cloned(
        &self,
        repo: &RepoRef,
        client: &mut RepoClient,
        fetch_cache: &FetchCache,
    ) -> Result<(), GitError> {
        if client.cloned {
            return Ok(());
        }
        let parent = client
            .dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.cache_dir.path().to_path_buf());
        tokio::fs::create_dir_all(&parent)
            .await
            .map_err(|source| GitError::io(&parent, source))?;
        if tokio::fs::try_exists(&client.dir).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(&client.dir)
                .await
                .map_err(|source| GitError::io(&client.dir, source))?;
        }
        let url = self.clone_url(repo);
        let target = client.dir.to_string_lossy().to_string();
        self.runner
            .run(&parent, &["clone", url.as_str(), target.as_str()])
            .await?;

        client.main_branch = self.detect_main_branch(&client.dir).await?;
        client.current_ref = client.main_branch.clone();
        client.cloned = true;
        client.sparse_patterns.clear();
        // The clone itself fetched main for this request.
        fetch_cache.should_fetch(&client.full_name, &client.main_branch);
        info!(
            repo = %client.full_name,
            dir = %client.dir.display(),
            main_branch = %client.main_branch,
            "cloned repository"
        );
        Ok(())
    }

    async fn detect_main_branch(&self, dir: &Path) -> Result<String, GitError> {
        if let Ok(head) = self
            .runner
            .run(dir, &["rev-parse", "--abbrev-ref", "origin/HEAD"])
            .await
        {
            if let Some(branch) = head.strip_prefix("origin/") {
                if !branch.is_empty() && branch != "HEAD" {
                    return Ok(branch.to_string());
                }
            }
        }
        let remote = self.runner.run(dir, &["remote", "show", "origin"]).await?;
        let advertised = remote
            .lines()
            .filter_map(|line| line.trim().strip_prefix("HEAD branch:"))
            .map(str::trim)
            .find(|branch| !branch.is_empty() && *branch != "(unknown)");
        if let Some(branch) = advertised {
            return Ok(branch.to_string());
        }
        self.runner
            .run(dir, &["rev-parse", "--abbrev-ref", "HEAD"])
            .await
    }

    /// Moves the working tree to `requested`, fetching at most once per request.
    async fn use_ref(
        &self,
        client: &mut RepoClient,
        requested: &str,
        fetch_cache: &FetchCache,
    ) -> Result<(), GitError> {
        let target = Target::resolve(requested, &client.main_branch);
        let checkout = target.checkout_name(&client.main_branch);
        let mut should_fetch = fetch_cache.should_fetch(&client.full_name, &checkout);
        if let Target::Sha(sha) = &target {
            if should_fetch {
                let object = format!("{sha}^{{commit}}");
                if self
                    .runner
                    .succeeds(&client.dir, &["cat-file", "-e", object.as_str()])
                    .await?
                {
                    should_fetch = false;
                }
            }
        }
        if client.current_ref == checkout && !should_fetch {
            return Ok(());
        }

        debug!(
            repo = %client.full_name,
            from = %client.current_ref,
            to = %checkout,
            fetch = should_fetch,
            "switching ref"
        );
        self.runner
            .run(&client.dir, &["checkout", "--detach"])
            .await?;
        if should_fetch {
            match &target {
                Target::Main => {
                    let refspec = format!("{0}:{0}", client.main_branch);
                    self.runner
                        .run(&client.dir, &["fetch", "origin", "--force", refspec.as_str()])
                        .await?;
                }
                Target::Branch(branch) => {
                    self.runner
                        .run(&client.dir, &["fetch", "origin", branch.as_str()])
                        .await?;
                }
                Target::Tag(tag) => {
                    let refspec = format!("+refs/tags/{tag}:refs/tags/{tag}");
                    self.runner
                        .run(&client.dir, &["fetch", "origin", "--force", refspec.as_str()])
                        .await?;
                }
                Target::Sha(sha) => {
                    self.runner
                        .run(&client.dir, &["fetch", "origin", sha.as_str()])
                        .await?;
                }
            }
        }
        self.runner
            .run(&client.dir, &["checkout", checkout.as_str()])
            .await?;
        client.current_ref = checkout;
        Ok(())
    }

    /// Brings the clone's sparse-checkout state in line with `patterns`.
    ///
    /// An empty list restores the full working tree.
    async fn apply_sparse(&self, client: &mut RepoClient, patterns: &[String]) -> Result<(), GitError> {
        let patterns: &[String] = if self.config.sparse_checkout { patterns } else { &[] };
        if client.sparse_patterns == patterns {
            return Ok(());
        }
        if patterns.is_empty() {
            self.runner
                .run(&client.dir, &["sparse-checkout", "disable"])
                .await?;
        } else {
            let mut args = vec!["sparse-checkout", "set", "--no-cone"];
            args.extend(patterns.iter().map(String::as_str));
            self.runner.run(&client.dir, &args).await?;
        }
        debug!(repo = %client.full_name, patterns = ?patterns, "updated sparse checkout");
        client.sparse_patterns = patterns.to_vec();
        Ok(())
    }

    /// Locks the clone and checks out `reference`.
    ///
    /// `sparse` of `None` keeps the current sparse-checkout state.
    async fn checkout(
        &self,
        repo: &RepoRef,
        reference: &str,
        fetch_cache: &FetchCache,
        sparse: Option<&[String]>,
    ) -> Result<RepoDir, GitError> {
        let client = self.repo_client(repo);
        let mut guard = client.lock_owned().await;
        self.ensure_cloned(repo, &mut guard, fetch_cache).await?;
        if let Some(patterns) = sparse {
            self.apply_sparse(&mut guard, patterns).await?;
        }
        self.use_ref(&mut guard, reference, fetch_cache).await?;
        Ok(RepoDir {
            client: guard,
            runner: self.runner.clone(),
        })
    }

    fn file_link(&self, repo: &RepoRef, kind: FileEntryKind, sha: &str, path: &str) -> String {
        let segment = match kind {
            FileEntryKind::File => "blob",
            FileEntryKind::Dir => "tree",
        };
        format!(
            "{}/{}/{}/{segment}/{sha}/{path}",
            self.config.server_url.trim_end_matches('/'),
            repo.owner,
            repo.name
        )
    }
}

/// Rejects absolute paths and `..`; returns the path without leading or trailing slashes.
fn relative_repo_path(path: &str) -> Result<String, GitError> {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    let candidate = Path::new(trimmed);
    let safe = candidate
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
    if !safe {
        return Err(GitError::InvalidPath(path.to_string()));
    }
    Ok(trimmed.to_string())
}

/// Sparse pattern covering the top-level entry that contains `relative`.
fn sparse_scope(relative: &str) -> String {
    match relative.split_once('/') {
        Some((top, _)) => format!("/{top}/"),
        None => format!("/{relative}"),
    }
}

/// Parses `git ls-tree -l -z` output.
fn parse_ls_tree(output: &str) -> Vec<(FileEntryKind, String, u64, String)> {
    output
        .split('\0')
        .filter_map(|record| {
            let (meta, path) = record.split_once('\t')?;
            let mut fields = meta.split_whitespace();
            let _mode = fields.next()?;
            let kind = match fields.next()? {
                "blob" => FileEntryKind::File,
                "tree" => FileEntryKind::Dir,
                _ => return None,
            };
            let sha = fields.next()?.to_string();
            let size = fields
                .next()
                .and_then(|size| size.parse::<u64>().ok())
                .unwrap_or(0);
            Some((kind, sha, size, path.to_string()))
        })
        .collect()
}

#[async_trait]
impl FileBrowser for GitFileBrowser {
    async fn get_file(
        &self,
        repo: &RepoRef,
        path: &str,
        reference: &str,
        fetch_cache: &FetchCache,
    ) -> Result<Option<Vec<u8>>, GitError> {
        let relative = relative_repo_path(path)?;
        if relative.is_empty() {
            return Err(GitError::InvalidPath(path.to_string()));
        }
        let scope = [sparse_scope(&relative)];
        let dir = self.checkout(repo, reference, fetch_cache, Some(scope.as_slice())).await?;
        let full_path = dir.dir().join(&relative);
        match tokio::fs::read(&full_path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(GitError::io(full_path, error)),
        }
    }

    async fn list_files(
        &self,
        repo: &RepoRef,
        path: &str,
        reference: &str,
        fetch_cache: &FetchCache,
    ) -> Result<Vec<FileEntry>, GitError> {
        let relative = relative_repo_path(path)?;
        let dir = self.checkout(repo, reference, fetch_cache, None).await?;
        let head = dir.git(&["rev-parse", "HEAD"]).await?;
        let pathspec = format!("{relative}/");
        let mut args = vec!["ls-tree", "-l", "-z", "HEAD"];
        if !relative.is_empty() {
            args.push("--");
            args.push(pathspec.as_str());
        }
        let output = dir.git(&args).await?;
        Ok(parse_ls_tree(&output)
            .into_iter()
            .filter_map(|(kind, sha, size, entry_path)| {
                let name = entry_path.rsplit('/').next().unwrap_or(&entry_path).to_string();
                if name == ".git" {
                    return None;
                }
                Some(FileEntry {
                    link: self.file_link(repo, kind, &head, &entry_path),
                    name,
                    path: entry_path,
                    kind,
                    size,
                    sha,
                })
            })
            .collect())
    }

    async fn with_dir(
        &self,
        repo: &RepoRef,
        reference: &str,
        fetch_cache: &FetchCache,
        sparse_patterns: &[String],
    ) -> Result<RepoDir, GitError> {
        self.checkout(repo, reference, fetch_cache, Some(sparse_patterns))
            .await
    }

    async fn get_main_and_current_branch_refs(
        &self,
        repo: &RepoRef,
        event_ref: &str,
    ) -> Result<Vec<String>, GitError> {
        let client = self.repo_client(repo);
        let mut guard = client.lock_owned().await;
        let fetch_cache = FetchCache::new();
        self.ensure_cloned(repo, &mut guard, &fetch_cache).await?;
        let main = guard.main_branch.clone();
        let event_ref = event_ref.trim();
        if event_ref.is_empty() || event_ref == main || branch_from_ref(event_ref) == Some(main.as_str()) {
            return Ok(vec![main]);
        }
        Ok(vec![main, event_ref.to_string()])
    }
}
