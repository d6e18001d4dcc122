//! The `LighthouseJob` envelope written by the dispatcher and mirrored by the reconciler.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use lighthouse_config::{JobType, Postsubmit, Presubmit};
use lighthouse_core::RepoRef;
use lighthouse_scm::StatusState;
use serde::{Deserialize, Serialize};

pub const CREATED_BY_LIGHTHOUSE_LABEL: &str = "created-by-lighthouse";
pub const JOB_NAME_LABEL: &str = "lighthouse.jenkins-x.io/job";
pub const JOB_TYPE_LABEL: &str = "lighthouse.jenkins-x.io/type";
pub const ORG_LABEL: &str = "lighthouse.jenkins-x.io/refs.org";
pub const REPO_LABEL: &str = "lighthouse.jenkins-x.io/refs.repo";
pub const PULL_LABEL: &str = "lighthouse.jenkins-x.io/refs.pull";
pub const BRANCH_LABEL: &str = "lighthouse.jenkins-x.io/branch";
pub const BASE_SHA_LABEL: &str = "lighthouse.jenkins-x.io/baseSHA";
pub const LAST_COMMIT_SHA_LABEL: &str = "lighthouse.jenkins-x.io/lastCommitSHA";
pub const CONTEXT_LABEL: &str = "lighthouse.jenkins-x.io/context";
pub const EVENT_GUID_ANNOTATION: &str = "lighthouse.jenkins-x.io/event-GUID";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    #[default]
    Triggered,
    Pending,
    Success,
    Failure,
    Error,
    Aborted,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Triggered => "triggered",
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Error => "error",
            Self::Aborted => "aborted",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Triggered | Self::Pending)
    }

    pub fn status_state(self) -> StatusState {
        match self {
            Self::Triggered | Self::Pending => StatusState::Pending,
            Self::Success => StatusState::Success,
            Self::Failure => StatusState::Failure,
            Self::Error | Self::Aborted => StatusState::Error,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Triggered => "Job triggered.",
            Self::Pending => "Job is running.",
            Self::Success => "Job succeeded.",
            Self::Failure => "Job failed.",
            Self::Error => "Job errored.",
            Self::Aborted => "Job aborted.",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pull {
    pub number: u64,
    pub author: String,
    pub sha: String,
    #[serde(default)]
    pub link: String,
    #[serde(rename = "ref", default)]
    pub ref_name: String,
}

/// What to check out: a base ref plus any pull requests merged on top.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refs {
    pub org: String,
    pub repo: String,
    #[serde(default)]
    pub repo_link: String,
    pub base_ref: String,
    pub base_sha: String,
    #[serde(default)]
    pub base_link: String,
    #[serde(default)]
    pub clone_uri: String,
    #[serde(default)]
    pub pulls: Vec<Pull>,
}

impl Refs {
    pub fn repo_ref(&self) -> RepoRef {
        RepoRef::new(self.org.clone(), self.repo.clone())
    }

    /// The commit a status context belongs on: the PR head, or the base SHA.
    pub fn report_sha(&self) -> &str {
        self.pulls
            .first()
            .map(|pull| pull.sha.as_str())
            .unwrap_or(&self.base_sha)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub agent: String,
    /// Name of the configured job.
    pub job: String,
    pub context: String,
    pub refs: Refs,
    #[serde(default)]
    pub rerun_command: String,
    #[serde(default)]
    pub skip_report: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub state: JobState,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub report_url: String,
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completion_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LighthouseJob {
    /// Assigned by the store when empty.
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    pub spec: JobSpec,
    #[serde(default)]
    pub status: JobStatus,
}

impl LighthouseJob {
    /// `namespace/name`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    pub fn event_guid(&self) -> Option<&str> {
        self.annotations.get(EVENT_GUID_ANNOTATION).map(String::as_str)
    }

    /// Whether every `selector` entry is present in the labels.
    pub fn matches_selector(&self, selector: &BTreeMap<String, String>) -> bool {
        selector
            .iter()
            .all(|(key, value)| self.labels.get(key) == Some(value))
    }

    pub fn new_presubmit(
        job: &Presubmit,
        refs: Refs,
        namespace: &str,
        event_guid: &str,
    ) -> Self {
        let spec = JobSpec {
            job_type: JobType::Presubmit,
            agent: job.base.agent.clone(),
            job: job.name().to_string(),
            context: job.context.clone(),
            refs,
            rerun_command: job.rerun_command.clone(),
            skip_report: job.skip_report,
        };
        Self::from_spec(spec, namespace, event_guid)
    }

    pub fn new_postsubmit(
        job: &Postsubmit,
        refs: Refs,
        namespace: &str,
        event_guid: &str,
    ) -> Self {
        let spec = JobSpec {
            job_type: JobType::Postsubmit,
            agent: job.base.agent.clone(),
            job: job.name().to_string(),
            context: job.context.clone(),
            refs,
            rerun_command: String::new(),
            skip_report: job.skip_report,
        };
        Self::from_spec(spec, namespace, event_guid)
    }

    fn from_spec(spec: JobSpec, namespace: &str, event_guid: &str) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(CREATED_BY_LIGHTHOUSE_LABEL.to_string(), "true".to_string());
        labels.insert(JOB_NAME_LABEL.to_string(), label_value(&spec.job));
        labels.insert(JOB_TYPE_LABEL.to_string(), spec.job_type.to_string());
        labels.insert(ORG_LABEL.to_string(), label_value(&spec.refs.org));
        labels.insert(REPO_LABEL.to_string(), label_value(&spec.refs.repo));
        labels.insert(BRANCH_LABEL.to_string(), label_value(&spec.refs.base_ref));
        labels.insert(CONTEXT_LABEL.to_string(), label_value(&spec.context));
        if !spec.refs.base_sha.is_empty() {
            labels.insert(BASE_SHA_LABEL.to_string(), label_value(&spec.refs.base_sha));
        }
        if let Some(pull) = spec.refs.pulls.first() {
            labels.insert(PULL_LABEL.to_string(), pull.number.to_string());
            labels.insert(LAST_COMMIT_SHA_LABEL.to_string(), label_value(&pull.sha));
        }

        let mut annotations = BTreeMap::new();
        if !event_guid.is_empty() {
            annotations.insert(EVENT_GUID_ANNOTATION.to_string(), event_guid.to_string());
        }

        Self {
            name: String::new(),
            namespace: namespace.to_string(),
            labels,
            annotations,
            spec,
            status: JobStatus {
                state: JobState::Triggered,
                start_time: Some(Utc::now()),
                ..JobStatus::default()
            },
        }
    }
}

/// Label values are at most 63 characters of `[A-Za-z0-9._-]`.
pub fn label_value(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch
            } else {
                '-'
            }
        })
        .take(63)
        .collect();
    cleaned
        .trim_matches(|ch: char| !ch.is_ascii_alphanumeric())
        .to_string()
}
