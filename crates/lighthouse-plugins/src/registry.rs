use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{bail, Result};
use lighthouse_config::PluginConfig;

use crate::plugin::{Plugin, PluginHelp};
use crate::plugins;

/// Plugins available to the dispatcher, keyed by name.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<&'static str, Arc<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in plugin.
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::new();
        for plugin in plugins::builtin()? {
            registry.register(plugin)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> Result<()> {
        let name = plugin.name();
        if self.plugins.contains_key(name) {
            bail!("plugin {name} is already registered");
        }
        self.plugins.insert(name, plugin);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.plugins.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Enabled plugins for `org/repo`, in configuration order.
    ///
    /// Names the registry does not know are skipped.
    pub fn enabled_for(&self, config: &PluginConfig, org: &str, repo: &str) -> Vec<Arc<dyn Plugin>> {
        config
            .enabled_plugins(org, repo)
            .iter()
            .filter_map(|name| self.get(name))
            .collect()
    }

    pub fn help(&self, config: &PluginConfig, org: &str, repo: &str) -> Vec<PluginHelp> {
        self.enabled_for(config, org, repo)
            .iter()
            .map(|plugin| plugin.help(config, org, repo))
            .collect()
    }

    /// Every registered plugin's help, regardless of enablement.
    pub fn all_help(&self) -> Vec<PluginHelp> {
        let config = PluginConfig::default();
        self.plugins
            .values()
            .map(|plugin| plugin.help(&config, "", ""))
            .collect()
    }
}

/// Markdown listing of plugins and their commands.
pub fn render_help_markdown(helps: &[PluginHelp]) -> String {
    let mut out = String::new();
    for help in helps {
        let _ = writeln!(out, "### {}\n\n{}\n", help.name, help.description);
        for line in &help.config {
            let _ = writeln!(out, "- {line}");
        }
        if !help.config.is_empty() {
            out.push('\n');
        }
        if help.commands.is_empty() {
            continue;
        }
        out.push_str("| Command | Description | Who can use |\n|---|---|---|\n");
        for command in &help.commands {
            let _ = writeln!(
                out,
                "| `{}` | {} | {} |",
                command.usage, command.description, command.who_can_use
            );
        }
        out.push('\n');
    }
    out
}
