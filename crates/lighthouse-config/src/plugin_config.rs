use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Plugin configuration: enablement per org or repository plus per-plugin options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// `org` or `org/repo` to enabled plugin names.
    pub plugins: BTreeMap<String, Vec<String>>,
    pub triggers: Vec<Trigger>,
    pub label: LabelConfig,
    pub repo_milestone: BTreeMap<String, RepoMilestone>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Trigger {
    /// `org` or `org/repo` entries this trigger applies to.
    pub repos: Vec<String>,
    /// Members of this org are trusted to run jobs.
    pub trusted_org: String,
    pub join_org_url: String,
    pub only_org_members: bool,
    pub ignore_ok_to_test: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    /// Labels that `/label` may apply beyond the prefixed families.
    pub additional_labels: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoMilestone {
    pub maintainers_id: u64,
    pub maintainers_team: String,
    pub maintainers_friendly_name: String,
}

impl PluginConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).context("failed to parse plugin config yaml")
    }

    /// Union of org-level and repo-level plugin names, in first-seen order.
    pub fn enabled_plugins(&self, org: &str, repo: &str) -> Vec<String> {
        let full_name = format!("{org}/{repo}");
        let mut names: Vec<String> = Vec::new();
        for key in [org, full_name.as_str()] {
            for name in self.plugins.get(key).into_iter().flatten() {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        names
    }

    pub fn is_enabled(&self, org: &str, repo: &str, plugin: &str) -> bool {
        self.enabled_plugins(org, repo).iter().any(|name| name == plugin)
    }

    /// The trigger whose `repos` names this repository, falling back to its org.
    pub fn trigger_for(&self, org: &str, repo: &str) -> Trigger {
        let full_name = format!("{org}/{repo}");
        self.triggers
            .iter()
            .find(|trigger| trigger.repos.iter().any(|entry| *entry == full_name))
            .or_else(|| {
                self.triggers
                    .iter()
                    .find(|trigger| trigger.repos.iter().any(|entry| entry == org))
            })
            .cloned()
            .unwrap_or_default()
    }

    pub fn repo_milestone_for(&self, org: &str, repo: &str) -> RepoMilestone {
        self.repo_milestone
            .get(&format!("{org}/{repo}"))
            .or_else(|| self.repo_milestone.get(org))
            .or_else(|| self.repo_milestone.get(""))
            .cloned()
            .unwrap_or_default()
    }
}
