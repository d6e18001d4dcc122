//! Core and plugin configuration for Lighthouse.
//!
//! Documents are YAML. `ConfigAgent` holds the active snapshots and swaps them
//! atomically on reload; `InRepoResolver` overlays `.lighthouse/` files read
//! from the repository at the event's ref.

pub mod agent;
pub mod core_config;
pub mod inrepo;
pub mod job;
pub mod plugin_config;
pub mod store;

pub use agent::{
    ConfigAgent, SnapshotAgent, CORE_CONFIG_KEY, CORE_CONFIG_NAME, PLUGIN_CONFIG_KEY,
    PLUGIN_CONFIG_NAME,
};
pub use core_config::{Config, GithubReporter, InRepoConfig, DEFAULT_JOB_NAMESPACE};
pub use inrepo::{merge_fragment, InRepoFragment, InRepoResolver, ResolvedConfig, IN_REPO_DIR};
pub use job::{JobBase, JobType, Postsubmit, Presubmit, DEFAULT_AGENT};
pub use plugin_config::{LabelConfig, PluginConfig, RepoMilestone, Trigger};
pub use store::{ChangeCallback, ConfigStore, ConfigWatch, DirConfigStore};
