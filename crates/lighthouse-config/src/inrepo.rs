//! Configuration committed into the repository under `.lighthouse/`.
//!
//! Each `.lighthouse/<dir>/triggers.yaml` contributes jobs and an optional
//! `.lighthouse/plugins.yaml` enables extra plugins. The fragment read at a
//! ref is merged onto the base snapshots for that repository only.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use lighthouse_core::{is_sha, RepoRef};
use lighthouse_git::{FetchCache, FileBrowser, FileEntryKind};
use serde::Deserialize;
use tracing::debug;

use crate::core_config::Config;
use crate::job::{Postsubmit, Presubmit};
use crate::plugin_config::PluginConfig;

pub const IN_REPO_DIR: &str = ".lighthouse";
const TRIGGERS_FILE: &str = "triggers.yaml";
const PLUGINS_FILE: &str = "plugins.yaml";

/// Jobs and plugin names read from one repository at one ref.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InRepoFragment {
    pub presubmits: Vec<Presubmit>,
    pub postsubmits: Vec<Postsubmit>,
    pub plugins: Vec<String>,
}

impl InRepoFragment {
    pub fn is_empty(&self) -> bool {
        self.presubmits.is_empty() && self.postsubmits.is_empty() && self.plugins.is_empty()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TriggersDocument {
    spec: TriggersSpec,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TriggersSpec {
    presubmits: Vec<Presubmit>,
    postsubmits: Vec<Postsubmit>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PluginsDocument {
    plugins: Vec<String>,
}

/// Effective snapshots for one event.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: Arc<Config>,
    pub plugins: Arc<PluginConfig>,
}

pub struct InRepoResolver {
    browser: Arc<dyn FileBrowser>,
    /// Fragments keyed by `owner/repo/sha`, full SHAs only.
    cache: RwLock<HashMap<String, Arc<InRepoFragment>>>,
}

impl InRepoResolver {
    pub fn new(browser: Arc<dyn FileBrowser>) -> Self {
        Self {
            browser,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn browser(&self) -> &Arc<dyn FileBrowser> {
        &self.browser
    }

    pub fn cached_len(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Merges the repository's fragment at `reference` onto the base snapshots.
    ///
    /// Fragments are cached only for full 40-character SHAs; branch names and
    /// abbreviated SHAs are re-read on every call. The merge itself always runs
    /// against the given base, so base reloads take effect immediately.
    pub async fn resolve(
        &self,
        base_config: Arc<Config>,
        base_plugins: Arc<PluginConfig>,
        repo: &RepoRef,
        reference: &str,
        fetch_cache: &FetchCache,
    ) -> Result<ResolvedConfig> {
        let fragment = if is_cacheable_ref(reference) {
            let key = format!("{}/{reference}", repo.full_name());
            let cached = self
                .cache
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .get(&key)
                .cloned();
            match cached {
                Some(fragment) => {
                    debug!(repo = %repo, reference, "in-repo config cache hit");
                    fragment
                }
                None => {
                    let fragment = Arc::new(self.load_fragment(repo, reference, fetch_cache).await?);
                    self.cache
                        .write()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .entry(key)
                        .or_insert_with(|| Arc::clone(&fragment));
                    fragment
                }
            }
        } else {
            Arc::new(self.load_fragment(repo, reference, fetch_cache).await?)
        };

        if fragment.is_empty() {
            return Ok(ResolvedConfig {
                config: base_config,
                plugins: base_plugins,
            });
        }
        let (config, plugins) = merge_fragment(&base_config, &base_plugins, repo, &fragment);
        Ok(ResolvedConfig {
            config: Arc::new(config),
            plugins: Arc::new(plugins),
        })
    }

    /// Reads every `.lighthouse/*/triggers.yaml` and `.lighthouse/plugins.yaml`.
    pub async fn load_fragment(
        &self,
        repo: &RepoRef,
        reference: &str,
        fetch_cache: &FetchCache,
    ) -> Result<InRepoFragment> {
        let mut entries = self
            .browser
            .list_files(repo, IN_REPO_DIR, reference, fetch_cache)
            .await
            .with_context(|| format!("failed to list {IN_REPO_DIR} in {repo} at {reference}"))?;
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        let mut fragment = InRepoFragment::default();
        for entry in entries.iter().filter(|entry| entry.kind == FileEntryKind::Dir) {
            let path = format!("{IN_REPO_DIR}/{}/{TRIGGERS_FILE}", entry.name);
            let Some(bytes) = self
                .browser
                .get_file(repo, &path, reference, fetch_cache)
                .await
                .with_context(|| format!("failed to read {path} in {repo} at {reference}"))?
            else {
                continue;
            };
            let document: TriggersDocument = serde_yaml::from_slice(&bytes)
                .with_context(|| format!("failed to parse {path} in {repo} at {reference}"))?;
            for mut job in document.spec.presubmits {
                job.set_defaults();
                job.validate().with_context(|| format!("invalid presubmit in {path}"))?;
                if fragment.presubmits.iter().any(|other| other.name() == job.name()) {
                    anyhow::bail!("duplicate presubmit {} in {path}", job.name());
                }
                fragment.presubmits.push(job);
            }
            for mut job in document.spec.postsubmits {
                job.set_defaults();
                job.validate().with_context(|| format!("invalid postsubmit in {path}"))?;
                if fragment.postsubmits.iter().any(|other| other.name() == job.name()) {
                    anyhow::bail!("duplicate postsubmit {} in {path}", job.name());
                }
                fragment.postsubmits.push(job);
            }
        }

        let plugins_path = format!("{IN_REPO_DIR}/{PLUGINS_FILE}");
        if let Some(bytes) = self
            .browser
            .get_file(repo, &plugins_path, reference, fetch_cache)
            .await
            .with_context(|| format!("failed to read {plugins_path} in {repo} at {reference}"))?
        {
            let document: PluginsDocument = serde_yaml::from_slice(&bytes)
                .with_context(|| format!("failed to parse {plugins_path} in {repo}"))?;
            fragment.plugins = document.plugins;
        }

        debug!(
            repo = %repo,
            reference,
            presubmits = fragment.presubmits.len(),
            postsubmits = fragment.postsubmits.len(),
            plugins = fragment.plugins.len(),
            "loaded in-repo config"
        );
        Ok(fragment)
    }
}

impl std::fmt::Debug for InRepoResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InRepoResolver")
            .field("cached", &self.cached_len())
            .finish()
    }
}

fn is_cacheable_ref(reference: &str) -> bool {
    reference.len() == 40 && is_sha(reference)
}

/// In-repo jobs replace same-named base jobs for the repository, the rest are
/// appended; in-repo plugin names are added to the repository's enablement.
pub fn merge_fragment(
    base_config: &Config,
    base_plugins: &PluginConfig,
    repo: &RepoRef,
    fragment: &InRepoFragment,
) -> (Config, PluginConfig) {
    let full_name = repo.full_name();
    let mut config = base_config.clone();
    let mut plugins = base_plugins.clone();

    if !fragment.presubmits.is_empty() {
        let jobs = config.presubmits.entry(full_name.clone()).or_default();
        for job in &fragment.presubmits {
            match jobs.iter_mut().find(|existing| existing.name() == job.name()) {
                Some(existing) => *existing = job.clone(),
                None => jobs.push(job.clone()),
            }
        }
    }
    if !fragment.postsubmits.is_empty() {
        let jobs = config.postsubmits.entry(full_name.clone()).or_default();
        for job in &fragment.postsubmits {
            match jobs.iter_mut().find(|existing| existing.name() == job.name()) {
                Some(existing) => *existing = job.clone(),
                None => jobs.push(job.clone()),
            }
        }
    }
    if !fragment.plugins.is_empty() {
        let names = plugins.plugins.entry(full_name).or_default();
        for name in &fragment.plugins {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
    }
    (config, plugins)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use lighthouse_core::RepoRef;
    use lighthouse_git::{FetchCache, FileBrowser, FileEntry, FileEntryKind, GitError, RepoDir};

    use super::{merge_fragment, InRepoFragment, InRepoResolver};
    use crate::core_config::Config;
    use crate::job::Presubmit;
    use crate::plugin_config::PluginConfig;

    const SHA: &str = "0123456789abcdef0123456789abcdef01234567";

    /// Files keyed by `ref:path`.
    #[derive(Default)]
    struct MapBrowser {
        files: HashMap<String, String>,
        reads: AtomicUsize,
    }

    impl MapBrowser {
        fn with(mut self, reference: &str, path: &str, content: &str) -> Self {
            self.files
                .insert(format!("{reference}:{path}"), content.to_string());
            self
        }
    }

    #[async_trait]
    impl FileBrowser for MapBrowser {
        async fn get_file(
            &self,
            _repo: &RepoRef,
            path: &str,
            reference: &str,
            _fetch_cache: &FetchCache,
        ) -> Result<Option<Vec<u8>>, GitError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .files
                .get(&format!("{reference}:{path}"))
                .map(|content| content.as_bytes().to_vec()))
        }

        async fn list_files(
            &self,
            _repo: &RepoRef,
            path: &str,
            reference: &str,
            _fetch_cache: &FetchCache,
        ) -> Result<Vec<FileEntry>, GitError> {
            let prefix = format!("{reference}:{path}/");
            let mut dirs: Vec<String> = self
                .files
                .keys()
                .filter_map(|key| key.strip_prefix(&prefix))
                .filter_map(|rest| rest.split_once('/').map(|(dir, _)| dir.to_string()))
                .collect();
            dirs.sort();
            dirs.dedup();
            Ok(dirs
                .into_iter()
                .map(|name| FileEntry {
                    path: format!("{path}/{name}"),
                    name,
                    kind: FileEntryKind::Dir,
                    size: 0,
                    sha: String::new(),
                    link: String::new(),
                })
                .collect())
        }

        async fn with_dir(
            &self,
            _repo: &RepoRef,
            reference: &str,
            _fetch_cache: &FetchCache,
            _sparse_patterns: &[String],
        ) -> Result<RepoDir, GitError> {
            Err(GitError::InvalidPath(reference.to_string()))
        }

        async fn get_main_and_current_branch_refs(
            &self,
            _repo: &RepoRef,
            event_ref: &str,
        ) -> Result<Vec<String>, GitError> {
            Ok(vec!["main".to_string(), event_ref.to_string()])
        }
    }

    const TRIGGERS: &str = r#"
apiVersion: config.lighthouse.jenkins-x.io/v1alpha1
kind: TriggerConfig
spec:
  presubmits:
    - name: lint
      always_run: true
      agent: tekton-pipeline
    - name: unit
  postsubmits:
    - name: release
      branches: [main]
"#;

    fn base() -> (Arc<Config>, Arc<PluginConfig>) {
        let mut config = Config::default();
        config
            .presubmits
            .insert("org/repo".to_string(), vec![Presubmit::named("lint"), Presubmit::named("e2e")]);
        let mut plugins = PluginConfig::default();
        plugins
            .plugins
            .insert("org".to_string(), vec!["help".to_string()]);
        (Arc::new(config), Arc::new(plugins))
    }

    #[tokio::test]
    async fn functional_resolve_merges_in_repo_jobs_and_plugins() {
        let browser = MapBrowser::default()
            .with(SHA, ".lighthouse/jenkins-x/triggers.yaml", TRIGGERS)
            .with(SHA, ".lighthouse/plugins.yaml", "plugins: [trigger, help]\n");
        let resolver = InRepoResolver::new(Arc::new(browser));
        let (config, plugins) = base();
        let repo = RepoRef::new("org", "repo");

        let resolved = resolver
            .resolve(config, plugins, &repo, SHA, &FetchCache::new())
            .await
            .expect("resolve");

        let names: Vec<&str> = resolved
            .config
            .presubmits_for("org/repo")
            .iter()
            .map(|job| job.name())
            .collect();
        assert_eq!(names, vec!["lint", "e2e", "unit"]);
        let lint = resolved.config.find_presubmit("org/repo", "lint").expect("lint");
        assert!(lint.always_run);
        assert_eq!(lint.base.agent, "tekton-pipeline");
        assert_eq!(resolved.config.postsubmits_for("org/repo")[0].name(), "release");
        assert_eq!(
            resolved.plugins.enabled_plugins("org", "repo"),
            vec!["help", "trigger"]
        );
        assert_eq!(resolved.plugins.enabled_plugins("org", "other"), vec!["help"]);
    }

    #[tokio::test]
    async fn functional_sha_refs_are_cached_and_branches_are_not() {
        let browser = Arc::new(
            MapBrowser::default()
                .with(SHA, ".lighthouse/jenkins-x/triggers.yaml", TRIGGERS)
                .with("main", ".lighthouse/jenkins-x/triggers.yaml", TRIGGERS),
        );
        let resolver = InRepoResolver::new(browser.clone());
        let repo = RepoRef::new("org", "repo");
        let (config, plugins) = base();

        for _ in 0..3 {
            resolver
                .resolve(config.clone(), plugins.clone(), &repo, SHA, &FetchCache::new())
                .await
                .expect("resolve sha");
        }
        let after_sha = browser.reads.load(Ordering::SeqCst);
        assert_eq!(resolver.cached_len(), 1);

        for _ in 0..2 {
            resolver
                .resolve(config.clone(), plugins.clone(), &repo, "main", &FetchCache::new())
                .await
                .expect("resolve branch");
        }
        assert_eq!(resolver.cached_len(), 1);
        assert_eq!(browser.reads.load(Ordering::SeqCst), after_sha * 3);
    }

    #[tokio::test]
    async fn unit_repo_without_in_repo_files_keeps_base_snapshots() {
        let resolver = InRepoResolver::new(Arc::new(MapBrowser::default()));
        let (config, plugins) = base();
        let resolved = resolver
            .resolve(
                config.clone(),
                plugins.clone(),
                &RepoRef::new("org", "repo"),
                "feature",
                &FetchCache::new(),
            )
            .await
            .expect("resolve");
        assert!(Arc::ptr_eq(&resolved.config, &config));
        assert!(Arc::ptr_eq(&resolved.plugins, &plugins));
    }

    #[tokio::test]
    async fn regression_invalid_triggers_file_is_an_error() {
        let browser = MapBrowser::default().with(
            "main",
            ".lighthouse/ci/triggers.yaml",
            "spec:\n  presubmits:\n    - name: bad\n      trigger: \"(\"\n",
        );
        let resolver = InRepoResolver::new(Arc::new(browser));
        let (config, plugins) = base();
        let error = resolver
            .resolve(config, plugins, &RepoRef::new("org", "repo"), "main", &FetchCache::new())
            .await
            .expect_err("invalid regex");
        assert!(format!("{error:#}").contains("invalid presubmit"));
    }

    #[test]
    fn unit_merge_only_touches_target_repository() {
        let (config, plugins) = base();
        let fragment = InRepoFragment {
            presubmits: vec![Presubmit::named("new")],
            ..InRepoFragment::default()
        };
        let (merged, _) = merge_fragment(&config, &plugins, &RepoRef::new("org", "other"), &fragment);
        assert_eq!(merged.presubmits_for("org/repo").len(), 2);
        assert_eq!(merged.presubmits_for("org/other")[0].name(), "new");
    }
}
