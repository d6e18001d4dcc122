use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use tracing::{info, warn};

use crate::core_config::Config;
use crate::plugin_config::PluginConfig;
use crate::store::{ChangeCallback, ConfigStore, ConfigWatch};

pub const CORE_CONFIG_NAME: &str = "config";
pub const CORE_CONFIG_KEY: &str = "config.yaml";
pub const PLUGIN_CONFIG_NAME: &str = "plugins";
pub const PLUGIN_CONFIG_KEY: &str = "plugins.yaml";

/// An immutable snapshot that is replaced wholesale on reload.
#[derive(Debug)]
pub struct SnapshotAgent<T> {
    current: ArcSwap<T>,
    loaded: AtomicBool,
}

impl<T> SnapshotAgent<T> {
    pub fn new(initial: T) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
            loaded: AtomicBool::new(false),
        }
    }

    pub fn snapshot(&self) -> Arc<T> {
        self.current.load_full()
    }

    pub fn install(&self, value: T) {
        self.current.store(Arc::new(value));
        self.loaded.store(true, Ordering::Release);
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }
}

/// Holds the core and plugin configuration snapshots.
pub struct ConfigAgent {
    core: Arc<SnapshotAgent<Config>>,
    plugins: Arc<SnapshotAgent<PluginConfig>>,
    watches: Mutex<Vec<ConfigWatch>>,
}

impl Default for ConfigAgent {
    fn default() -> Self {
        Self {
            core: Arc::new(SnapshotAgent::new(Config::default())),
            plugins: Arc::new(SnapshotAgent::new(PluginConfig::default())),
            watches: Mutex::new(Vec::new()),
        }
    }
}

impl ConfigAgent {
    /// An agent with fixed, already loaded snapshots.
    pub fn from_parts(config: Config, plugins: PluginConfig) -> Self {
        let agent = Self::default();
        agent.core.install(config);
        agent.plugins.install(plugins);
        agent
    }

    /// Loads both documents and subscribes to changes.
    ///
    /// A missing document loads as the default; an unparsable one fails
    /// startup. Later reloads that fail to parse keep the previous snapshot.
    pub async fn start(store: &dyn ConfigStore) -> Result<Self> {
        let agent = Self::default();

        let core_text = store
            .load(CORE_CONFIG_NAME, CORE_CONFIG_KEY)
            .await
            .context("failed to load core config")?;
        if core_text.is_none() {
            warn!(name = CORE_CONFIG_NAME, key = CORE_CONFIG_KEY, "core config missing, using defaults");
        }
        agent
            .core
            .install(Config::from_yaml(core_text.as_deref().unwrap_or_default())?);

        let plugin_text = store
            .load(PLUGIN_CONFIG_NAME, PLUGIN_CONFIG_KEY)
            .await
            .context("failed to load plugin config")?;
        if plugin_text.is_none() {
            warn!(name = PLUGIN_CONFIG_NAME, key = PLUGIN_CONFIG_KEY, "plugin config missing, using defaults");
        }
        agent
            .plugins
            .install(PluginConfig::from_yaml(plugin_text.as_deref().unwrap_or_default())?);

        let core = Arc::clone(&agent.core);
        let core_callback: ChangeCallback = Arc::new(move |text: String| {
            match Config::from_yaml(&text) {
                Ok(config) => {
                    core.install(config);
                    info!("core config reloaded");
                }
                Err(error) => {
                    warn!(error = %format!("{error:#}"), "ignoring invalid core config update");
                }
            }
        });
        let core_watch = store
            .subscribe(CORE_CONFIG_NAME, CORE_CONFIG_KEY, core_callback)
            .await
            .context("failed to watch core config")?;

        let plugins = Arc::clone(&agent.plugins);
        let plugin_callback: ChangeCallback = Arc::new(move |text: String| {
            match PluginConfig::from_yaml(&text) {
                Ok(config) => {
                    plugins.install(config);
                    info!("plugin config reloaded");
                }
                Err(error) => {
                    warn!(error = %format!("{error:#}"), "ignoring invalid plugin config update");
                }
            }
        });
        let plugin_watch = store
            .subscribe(PLUGIN_CONFIG_NAME, PLUGIN_CONFIG_KEY, plugin_callback)
            .await
            .context("failed to watch plugin config")?;

        agent
            .watches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend([core_watch, plugin_watch]);
        Ok(agent)
    }

    pub fn config(&self) -> Arc<Config> {
        self.core.snapshot()
    }

    pub fn plugins(&self) -> Arc<PluginConfig> {
        self.plugins.snapshot()
    }

    pub fn set_config(&self, config: Config) {
        self.core.install(config);
    }

    pub fn set_plugins(&self, plugins: PluginConfig) {
        self.plugins.install(plugins);
    }

    /// Both snapshots have been loaded at least once.
    pub fn is_loaded(&self) -> bool {
        self.core.is_loaded() && self.plugins.is_loaded()
    }

    pub async fn stop(&self) {
        let watches = std::mem::take(
            &mut *self
                .watches
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        for watch in watches {
            watch.stop().await;
        }
    }
}

impl std::fmt::Debug for ConfigAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigAgent")
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
