use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::job::{label_value, JobStatus, LighthouseJob};

#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("job {0} already exists")]
    AlreadyExists(String),
    #[error("job {0} not found")]
    NotFound(String),
    #[error("job store backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    Added(LighthouseJob),
    Updated(LighthouseJob),
    /// Events were dropped; the receiver should list jobs again.
    Resync,
}

/// Receives job events for one namespace.
pub struct JobWatch {
    namespace: String,
    receiver: broadcast::Receiver<JobEvent>,
}

impl JobWatch {
    pub fn new(namespace: impl Into<String>, receiver: broadcast::Receiver<JobEvent>) -> Self {
        Self {
            namespace: namespace.into(),
            receiver,
        }
    }

    /// `None` once the store is gone.
    pub async fn recv(&mut self) -> Option<JobEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(JobEvent::Added(job)) if job.namespace == self.namespace => {
                    return Some(JobEvent::Added(job))
                }
                Ok(JobEvent::Updated(job)) if job.namespace == self.namespace => {
                    return Some(JobEvent::Updated(job))
                }
                Ok(JobEvent::Resync) => return Some(JobEvent::Resync),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(namespace = %self.namespace, skipped, "job watch lagged");
                    return Some(JobEvent::Resync);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Storage for job records.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Stores `job`, generating a name when it has none.
    async fn create_job(&self, job: LighthouseJob) -> Result<LighthouseJob, JobStoreError>;

    async fn list_jobs(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<LighthouseJob>, JobStoreError>;

    async fn update_status(
        &self,
        namespace: &str,
        name: &str,
        status: JobStatus,
    ) -> Result<LighthouseJob, JobStoreError>;

    fn watch_jobs(&self, namespace: &str) -> JobWatch;
}

/// Process-local job store.
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<String, LighthouseJob>>,
    sequence: AtomicU64,
    events: broadcast::Sender<JobEvent>,
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryJobStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            jobs: RwLock::new(HashMap::new()),
            sequence: AtomicU64::new(1),
            events,
        }
    }

    pub fn len(&self) -> usize {
        self.jobs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every job across namespaces, sorted by key.
    pub fn all_jobs(&self) -> Vec<LighthouseJob> {
        let mut jobs: Vec<LighthouseJob> = self
            .jobs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect();
        jobs.sort_by_key(LighthouseJob::key);
        jobs
    }

    fn generate_name(&self, job: &LighthouseJob) -> String {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let stem = label_value(&format!(
            "{}-{}-{}",
            job.spec.refs.org, job.spec.refs.repo, job.spec.job
        ))
        .to_ascii_lowercase();
        format!("{}-{sequence}", stem.chars().take(50).collect::<String>())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_job(&self, mut job: LighthouseJob) -> Result<LighthouseJob, JobStoreError> {
        if job.name.is_empty() {
            job.name = self.generate_name(&job);
        }
        let key = job.key();
        {
            let mut jobs = self
                .jobs
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if jobs.contains_key(&key) {
                return Err(JobStoreError::AlreadyExists(key));
            }
            jobs.insert(key.clone(), job.clone());
        }
        debug!(job = %key, context = %job.spec.context, "created job");
        let _ = self.events.send(JobEvent::Added(job.clone()));
        Ok(job)
    }

    async fn list_jobs(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<LighthouseJob>, JobStoreError> {
        Ok(self
            .all_jobs()
            .into_iter()
            .filter(|job| job.namespace == namespace && job.matches_selector(selector))
            .collect())
    }

    async fn update_status(
        &self,
        namespace: &str,
        name: &str,
        mut status: JobStatus,
    ) -> Result<LighthouseJob, JobStoreError> {
        let key = format!("{namespace}/{name}");
        let updated = {
            let mut jobs = self
                .jobs
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let job = jobs
                .get_mut(&key)
                .ok_or_else(|| JobStoreError::NotFound(key.clone()))?;
            if status.state.is_terminal() && status.completion_time.is_none() {
                status.completion_time = Some(Utc::now());
            }
            if status.start_time.is_none() {
                status.start_time = job.status.start_time;
            }
            job.status = status;
            job.clone()
        };
        let _ = self.events.send(JobEvent::Updated(updated.clone()));
        Ok(updated)
    }

    fn watch_jobs(&self, namespace: &str) -> JobWatch {
        JobWatch::new(namespace, self.events.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use lighthouse_config::Presubmit;

    use super::{JobEvent, JobStore, JobStoreError, MemoryJobStore};
    use crate::job::{JobState, JobStatus, LighthouseJob, Refs, JOB_TYPE_LABEL};

    fn job(namespace: &str) -> LighthouseJob {
        let refs = Refs {
            org: "org".to_string(),
            repo: "repo".to_string(),
            base_ref: "main".to_string(),
            base_sha: "abc".to_string(),
            ..Refs::default()
        };
        LighthouseJob::new_presubmit(&Presubmit::named("lint"), refs, namespace, "guid")
    }

    #[tokio::test]
    async fn functional_create_list_and_update() {
        let store = MemoryJobStore::new();
        let created = store.create_job(job("jx")).await.expect("create");
        assert!(created.name.starts_with("org-repo-lint-"));
        store.create_job(job("other")).await.expect("create");

        let mut selector = BTreeMap::new();
        selector.insert(JOB_TYPE_LABEL.to_string(), "presubmit".to_string());
        assert_eq!(store.list_jobs("jx", &selector).await.expect("list").len(), 1);
        assert_eq!(store.len(), 2);

        let updated = store
            .update_status(
                "jx",
                &created.name,
                JobStatus {
                    state: JobState::Success,
                    ..JobStatus::default()
                },
            )
            .await
            .expect("update");
        assert_eq!(updated.status.state, JobState::Success);
        assert!(updated.status.completion_time.is_some());
        assert_eq!(updated.status.start_time, created.status.start_time);
    }

    #[tokio::test]
    async fn unit_duplicate_and_missing_jobs_error() {
        let store = MemoryJobStore::new();
        let mut named = job("jx");
        named.name = "fixed".to_string();
        store.create_job(named.clone()).await.expect("create");
        assert!(matches!(
            store.create_job(named).await,
            Err(JobStoreError::AlreadyExists(_))
        ));
        assert!(matches!(
            store.update_status("jx", "missing", JobStatus::default()).await,
            Err(JobStoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn functional_watch_filters_by_namespace() {
        let store = MemoryJobStore::new();
        let mut watch = store.watch_jobs("jx");
        store.create_job(job("other")).await.expect("create");
        let created = store.create_job(job("jx")).await.expect("create");
        match watch.recv().await {
            Some(JobEvent::Added(seen)) => assert_eq!(seen.name, created.name),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
