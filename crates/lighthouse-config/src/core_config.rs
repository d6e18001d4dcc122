use std::collections::{BTreeMap, HashSet};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::job::{JobType, Postsubmit, Presubmit};

pub const DEFAULT_JOB_NAMESPACE: &str = "jx";

/// Core configuration: which jobs exist per repository and how they report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `org/repo` to presubmit jobs.
    pub presubmits: BTreeMap<String, Vec<Presubmit>>,
    pub postsubmits: BTreeMap<String, Vec<Postsubmit>>,
    pub in_repo_config: InRepoConfig,
    pub lighthouse_job_namespace: String,
    pub github_reporter: GithubReporter,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            presubmits: BTreeMap::new(),
            postsubmits: BTreeMap::new(),
            in_repo_config: InRepoConfig::default(),
            lighthouse_job_namespace: DEFAULT_JOB_NAMESPACE.to_string(),
            github_reporter: GithubReporter::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InRepoConfig {
    /// Keys are `org/repo`, `org` or `*`; the most specific key wins.
    pub enabled: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubReporter {
    pub job_types_to_report: Vec<JobType>,
}

impl Default for GithubReporter {
    fn default() -> Self {
        Self {
            job_types_to_report: vec![JobType::Presubmit, JobType::Postsubmit],
        }
    }
}

impl GithubReporter {
    pub fn should_report(&self, job_type: JobType) -> bool {
        self.job_types_to_report.contains(&job_type)
    }
}

impl Config {
    /// Parses a YAML document and applies job defaults.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let mut config: Config = if text.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(text).context("failed to parse core config yaml")?
        };
        config.finalize()?;
        Ok(config)
    }

    /// Fills defaults on every job and validates names and regexes.
    pub fn finalize(&mut self) -> Result<()> {
        if self.lighthouse_job_namespace.trim().is_empty() {
            self.lighthouse_job_namespace = DEFAULT_JOB_NAMESPACE.to_string();
        }
        for (repo, jobs) in &mut self.presubmits {
            let mut seen = HashSet::new();
            for job in jobs.iter_mut() {
                job.set_defaults();
                job.validate().with_context(|| format!("presubmits for {repo}"))?;
                if !seen.insert(job.name().to_string()) {
                    anyhow::bail!("duplicate presubmit {} for {repo}", job.name());
                }
            }
        }
        for (repo, jobs) in &mut self.postsubmits {
            let mut seen = HashSet::new();
            for job in jobs.iter_mut() {
                job.set_defaults();
                job.validate().with_context(|| format!("postsubmits for {repo}"))?;
                if !seen.insert(job.name().to_string()) {
                    anyhow::bail!("duplicate postsubmit {} for {repo}", job.name());
                }
            }
        }
        Ok(())
    }

    pub fn in_repo_config_enabled(&self, full_name: &str) -> bool {
        let enabled = &self.in_repo_config.enabled;
        if let Some(value) = enabled.get(full_name) {
            return *value;
        }
        let org = full_name.split('/').next().unwrap_or(full_name);
        if let Some(value) = enabled.get(org) {
            return *value;
        }
        enabled.get("*").copied().unwrap_or(false)
    }

    pub fn presubmits_for(&self, full_name: &str) -> &[Presubmit] {
        self.presubmits
            .get(full_name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn postsubmits_for(&self, full_name: &str) -> &[Postsubmit] {
        self.postsubmits
            .get(full_name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn find_presubmit(&self, full_name: &str, name: &str) -> Option<&Presubmit> {
        self.presubmits_for(full_name)
            .iter()
            .find(|job| job.name() == name)
    }
}
