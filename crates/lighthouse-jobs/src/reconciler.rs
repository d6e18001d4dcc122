//! Mirrors job state onto provider commit statuses.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use lighthouse_config::ConfigAgent;
use lighthouse_scm::{ScmClient, Status, StatusState};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::job::LighthouseJob;
use crate::store::{JobEvent, JobStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Reported(StatusState),
    Unchanged,
    /// The job opted out, or its type is not configured for reporting.
    Skipped,
}

pub struct Reconciler {
    store: Arc<dyn JobStore>,
    scm: ScmClient,
    config: Arc<ConfigAgent>,
    namespace: String,
    /// Last state published per job key, for jobs not yet finished.
    reported: Mutex<HashMap<String, StatusState>>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn JobStore>,
        scm: ScmClient,
        config: Arc<ConfigAgent>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            store,
            scm,
            config,
            namespace: namespace.into(),
            reported: Mutex::new(HashMap::new()),
        }
    }

    pub async fn reconcile(&self, job: &LighthouseJob) -> Result<ReconcileOutcome> {
        if job.spec.skip_report {
            return Ok(ReconcileOutcome::Skipped);
        }
        let config = self.config.config();
        if !config.github_reporter.should_report(job.spec.job_type) {
            return Ok(ReconcileOutcome::Skipped);
        }

        let key = job.key();
        let state = job.status.state.status_state();
        let previous = self
            .reported
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&key)
            .copied();
        if previous == Some(state) {
            return Ok(ReconcileOutcome::Unchanged);
        }

        let sha = job.spec.refs.report_sha();
        if sha.is_empty() {
            warn!(job = %key, "job has no commit to report on");
            return Ok(ReconcileOutcome::Skipped);
        }
        let description = if job.status.description.is_empty() {
            job.status.state.description().to_string()
        } else {
            job.status.description.clone()
        };
        let status = Status {
            state,
            label: job.spec.context.clone(),
            desc: description,
            target: job.status.report_url.clone(),
        };
        let repo = job.spec.refs.repo_ref();
        self.scm
            .create_status(&repo, sha, &status)
            .await
            .with_context(|| format!("failed to report status for job {key}"))?;
        {
            let mut reported = self
                .reported
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if job.status.state.is_terminal() {
                reported.remove(&key);
            } else {
                reported.insert(key.clone(), state);
            }
        }
        info!(
            job = %key,
            repo = %repo,
            sha,
            context = %job.spec.context,
            state = %state,
            event_guid = job.event_guid().unwrap_or_default(),
            "reported job status"
        );
        Ok(ReconcileOutcome::Reported(state))
    }

    /// Jobs whose last published state is still in progress.
    pub fn tracked_jobs(&self) -> usize {
        self.reported
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Reconciles every job in the namespace.
    pub async fn resync(&self) -> Result<usize> {
        let jobs = self
            .store
            .list_jobs(&self.namespace, &BTreeMap::new())
            .await
            .context("failed to list jobs")?;
        let mut reported = 0_usize;
        for job in &jobs {
            match self.reconcile(job).await {
                Ok(ReconcileOutcome::Reported(_)) => reported = reported.saturating_add(1),
                Ok(_) => {}
                Err(error) => warn!(job = %job.key(), error = %format!("{error:#}"), "reconcile failed"),
            }
        }
        Ok(reported)
    }

    /// Watches the store until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let mut watch = self.store.watch_jobs(&self.namespace);
        self.resync().await?;
        info!(namespace = %self.namespace, "job reconciler started");
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = watch.recv() => event,
            };
            match event {
                Some(JobEvent::Added(job)) | Some(JobEvent::Updated(job)) => {
                    if let Err(error) = self.reconcile(&job).await {
                        warn!(job = %job.key(), error = %format!("{error:#}"), "reconcile failed");
                    }
                }
                Some(JobEvent::Resync) => {
                    if let Err(error) = self.resync().await {
                        warn!(error = %format!("{error:#}"), "job resync failed");
                    }
                }
                None => {
                    debug!("job store closed");
                    break;
                }
            }
        }
        info!(namespace = %self.namespace, "job reconciler stopped");
        Ok(())
    }
}
