//! Configuration documents addressed by `(name, key)`.
//!
//! `DirConfigStore` reads a mounted ConfigMap layout, `<root>/<name>/<key>`,
//! and watches it with `notify` plus a periodic re-read (kubelet swaps mounted
//! files through symlinks, which some backends report late or not at all).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Invoked with the full new document content after every change.
pub type ChangeCallback = Arc<dyn Fn(String) + Send + Sync>;

#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// `Ok(None)` when the document does not exist.
    async fn load(&self, name: &str, key: &str) -> Result<Option<String>>;

    async fn subscribe(&self, name: &str, key: &str, callback: ChangeCallback)
        -> Result<ConfigWatch>;
}

/// A running subscription. Dropping it aborts the watch task.
pub struct ConfigWatch {
    watcher: Option<RecommendedWatcher>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ConfigWatch {
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ConfigWatch {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for ConfigWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigWatch")
            .field("watching", &self.watcher.is_some())
            .field("running", &self.task.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct DirConfigStore {
    root: PathBuf,
    poll_interval: Duration,
}

impl DirConfigStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            poll_interval: Duration::from_secs(10),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document_path(&self, name: &str, key: &str) -> PathBuf {
        self.root.join(name).join(key)
    }
}

async fn read_document(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(Some(text)),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(error) => {
            Err(error).with_context(|| format!("failed to read {}", path.display()))
        }
    }
}

#[async_trait]
impl ConfigStore for DirConfigStore {
    async fn load(&self, name: &str, key: &str) -> Result<Option<String>> {
        read_document(&self.document_path(name, key)).await
    }

    async fn subscribe(
        &self,
        name: &str,
        key: &str,
        callback: ChangeCallback,
    ) -> Result<ConfigWatch> {
        let path = self.document_path(name, key);
        let mut last = read_document(&path).await?;

        let (event_tx, mut event_rx) = mpsc::channel::<notify::Result<Event>>(16);
        let watcher = match create_watcher(path.parent(), event_tx, self.poll_interval) {
            Ok(watcher) => Some(watcher),
            Err(error) => {
                warn!(path = %path.display(), error = %format!("{error:#}"), "config watcher unavailable, polling only");
                None
            }
        };

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let poll_interval = self.poll_interval;
        let mut events_open = watcher.is_some();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    event = event_rx.recv(), if events_open => match event {
                        Some(Ok(_)) => {}
                        Some(Err(error)) => {
                            debug!(path = %path.display(), %error, "config watcher event error");
                        }
                        None => events_open = false,
                    },
                    _ = interval.tick() => {}
                }
                match read_document(&path).await {
                    Ok(Some(content)) if last.as_deref() != Some(content.as_str()) => {
                        info!(path = %path.display(), bytes = content.len(), "config document changed");
                        last = Some(content.clone());
                        callback(content);
                    }
                    Ok(Some(_)) => {}
                    Ok(None) => {
                        if last.take().is_some() {
                            warn!(path = %path.display(), "config document removed, keeping current snapshot");
                        }
                    }
                    Err(error) => {
                        warn!(path = %path.display(), error = %format!("{error:#}"), "failed to reread config document");
                    }
                }
            }
        });

        Ok(ConfigWatch {
            watcher,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }
}

fn create_watcher(
    dir: Option<&Path>,
    sender: mpsc::Sender<notify::Result<Event>>,
    poll_interval: Duration,
) -> Result<RecommendedWatcher> {
    let dir = dir.context("config document has no parent directory")?;
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            // Only a wake-up; a full channel already has one pending.
            let _ = sender.try_send(res);
        },
        NotifyConfig::default().with_poll_interval(poll_interval),
    )
    .context("failed to create config watcher")?;
    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("failed to watch {}", dir.display()))?;
    Ok(watcher)
}
