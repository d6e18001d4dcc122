//! Presubmit and postsubmit job declarations.

use std::fmt;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const DEFAULT_AGENT: &str = "tekton";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Presubmit,
    Postsubmit,
    Periodic,
    Batch,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Presubmit => "presubmit",
            Self::Postsubmit => "postsubmit",
            Self::Periodic => "periodic",
            Self::Batch => "batch",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields shared by every job kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobBase {
    pub name: String,
    /// Agent that executes the job, e.g. `tekton`.
    pub agent: String,
    /// Branch regexes the job may run against; empty means all.
    pub branches: Vec<String>,
    pub skip_branches: Vec<String>,
    /// Only run when a changed file matches this regex.
    pub run_if_changed: String,
    pub max_concurrency: u32,
}

impl JobBase {
    fn set_defaults(&mut self) {
        if self.agent.trim().is_empty() {
            self.agent = DEFAULT_AGENT.to_string();
        }
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("job is missing a name");
        }
        for pattern in self.branches.iter().chain(self.skip_branches.iter()) {
            anchored(pattern).with_context(|| format!("job {}: invalid branch regex", self.name))?;
        }
        if !self.run_if_changed.is_empty() {
            Regex::new(&self.run_if_changed)
                .with_context(|| format!("job {}: invalid run_if_changed regex", self.name))?;
        }
        Ok(())
    }

    /// Branch patterns match the whole branch name.
    pub fn can_run_on_branch(&self, branch: &str) -> bool {
        let matches = |pattern: &String| anchored(pattern).is_ok_and(|re| re.is_match(branch));
        if self.skip_branches.iter().any(matches) {
            return false;
        }
        self.branches.is_empty() || self.branches.iter().any(matches)
    }

    /// `None` when no `run_if_changed` is set.
    pub fn changes_match(&self, changed_files: &[String]) -> Option<bool> {
        if self.run_if_changed.is_empty() {
            return None;
        }
        let re = Regex::new(&self.run_if_changed).ok()?;
        Some(changed_files.iter().any(|path| re.is_match(path)))
    }
}

fn anchored(pattern: &str) -> std::result::Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})$"))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Presubmit {
    #[serde(flatten)]
    pub base: JobBase,
    /// Status context name; defaults to the job name.
    pub context: String,
    pub always_run: bool,
    pub optional: bool,
    pub skip_report: bool,
    /// Comment regex that requests the job.
    pub trigger: String,
    /// Command shown to users for re-running the job.
    pub rerun_command: String,
}

impl Presubmit {
    pub fn named(name: impl Into<String>) -> Self {
        let mut job = Self {
            base: JobBase {
                name: name.into(),
                ..JobBase::default()
            },
            ..Self::default()
        };
        job.set_defaults();
        job
    }

    pub fn name(&self) -> &str {
        &self.base.name
    }

    pub fn set_defaults(&mut self) {
        self.base.set_defaults();
        if self.context.trim().is_empty() {
            self.context = self.base.name.clone();
        }
        if self.trigger.trim().is_empty() {
            self.trigger = format!(
                r"(?m)^/test( all| {}),?(\s+|$)",
                regex::escape(&self.base.name)
            );
        }
        if self.rerun_command.trim().is_empty() {
            self.rerun_command = format!("/test {}", self.base.name);
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.base.validate()?;
        Regex::new(&self.trigger)
            .with_context(|| format!("presubmit {}: invalid trigger regex", self.base.name))?;
        Ok(())
    }

    pub fn trigger_matches(&self, body: &str) -> bool {
        Regex::new(&self.trigger).is_ok_and(|re| re.is_match(body))
    }

    /// Whether the job should run for `branch`.
    ///
    /// `force_run` is set when a comment explicitly asked for this job;
    /// `default_run` applies to jobs with neither `always_run` nor `run_if_changed`.
    pub fn should_run(
        &self,
        branch: &str,
        changed_files: Option<&[String]>,
        force_run: bool,
        default_run: bool,
    ) -> bool {
        if !self.base.can_run_on_branch(branch) {
            return false;
        }
        if self.always_run || force_run {
            return true;
        }
        if !self.base.run_if_changed.is_empty() {
            return changed_files
                .and_then(|files| self.base.changes_match(files))
                .unwrap_or(false);
        }
        default_run
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Postsubmit {
    #[serde(flatten)]
    pub base: JobBase,
    pub context: String,
    pub skip_report: bool,
}

impl Postsubmit {
    pub fn named(name: impl Into<String>) -> Self {
        let mut job = Self {
            base: JobBase {
                name: name.into(),
                ..JobBase::default()
            },
            ..Self::default()
        };
        job.set_defaults();
        job
    }

    pub fn name(&self) -> &str {
        &self.base.name
    }

    pub fn set_defaults(&mut self) {
        self.base.set_defaults();
        if self.context.trim().is_empty() {
            self.context = self.base.name.clone();
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.base.validate()
    }

    pub fn should_run(&self, branch: &str, changed_files: &[String]) -> bool {
        self.base.can_run_on_branch(branch)
            && self.base.changes_match(changed_files).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::{Postsubmit, Presubmit, DEFAULT_AGENT};

    #[test]
    fn unit_presubmit_defaults_follow_name() {
        let job = Presubmit::named("lint");
        assert_eq!(job.context, "lint");
        assert_eq!(job.rerun_command, "/test lint");
        assert_eq!(job.base.agent, DEFAULT_AGENT);
        assert!(job.trigger_matches("/test lint"));
        assert!(job.trigger_matches("looks good\n/test all\n"));
        assert!(!job.trigger_matches("/test lint-extra"));
        assert!(!job.trigger_matches("please /test lint"));
    }

    #[test]
    fn functional_should_run_respects_branches_and_changes() {
        let mut job = Presubmit::named("docs");
        job.base.branches = vec!["main".to_string(), "release-.*".to_string()];
        job.base.run_if_changed = r"^docs/".to_string();
        let docs = vec!["docs/index.md".to_string()];
        let code = vec!["src/lib.rs".to_string()];

        assert!(job.should_run("main", Some(&docs), false, false));
        assert!(!job.should_run("main", Some(&code), false, true));
        assert!(job.should_run("release-1.2", Some(&code), true, false));
        assert!(!job.should_run("maintenance", Some(&docs), true, true));
        assert!(!job.should_run("main", None, false, true));
    }

    #[test]
    fn unit_skip_branches_win_over_branches() {
        let mut job = Postsubmit::named("release");
        job.base.skip_branches = vec!["gh-pages".to_string()];
        assert!(job.should_run("main", &[]));
        assert!(!job.should_run("gh-pages", &[]));
    }

    #[test]
    fn regression_invalid_trigger_fails_validation() {
        let mut job = Presubmit::named("broken");
        job.trigger = "(unclosed".to_string();
        assert!(job.validate().is_err());
    }
}
