use anyhow::Result;
use async_trait::async_trait;
use lighthouse_config::PluginConfig;
use lighthouse_scm::{IssueHook, PullRequestHook, PushHook, ReviewHook};
use serde::Serialize;

use crate::agent::Agent;
use crate::command::{CommandMatch, PluginCommand};
use crate::event::GenericCommentEvent;

/// Typed event handlers a plugin can opt into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    GenericComment,
    PullRequest,
    Push,
    Review,
    Issue,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandHelp {
    pub usage: &'static str,
    pub description: &'static str,
    pub who_can_use: &'static str,
    pub examples: Vec<&'static str>,
}

impl CommandHelp {
    pub fn new(usage: &'static str, description: &'static str) -> Self {
        Self {
            usage,
            description,
            who_can_use: "Anyone",
            examples: Vec::new(),
        }
    }

    pub fn who_can_use(mut self, who: &'static str) -> Self {
        self.who_can_use = who;
        self
    }

    pub fn examples(mut self, examples: &[&'static str]) -> Self {
        self.examples = examples.to_vec();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginHelp {
    pub name: &'static str,
    pub description: &'static str,
    /// Repository-specific notes rendered from configuration.
    pub config: Vec<String>,
    pub commands: Vec<CommandHelp>,
}

/// A unit of gateway behaviour.
///
/// Every handler defaults to a no-op; a plugin overrides the ones it lists
/// in [`Plugin::handles`] plus `handle_command` when it declares commands.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn commands(&self) -> &[PluginCommand] {
        &[]
    }

    fn handles(&self, _kind: HandlerKind) -> bool {
        false
    }

    fn help(&self, _config: &PluginConfig, _org: &str, _repo: &str) -> PluginHelp {
        PluginHelp {
            name: self.name(),
            description: self.description(),
            config: Vec::new(),
            commands: self
                .commands()
                .iter()
                .map(|command| command.help.clone())
                .collect(),
        }
    }

    async fn handle_command(
        &self,
        _matched: &CommandMatch,
        _agent: &Agent,
        _event: &GenericCommentEvent,
    ) -> Result<()> {
        Ok(())
    }

    async fn handle_generic_comment(
        &self,
        _agent: &Agent,
        _event: &GenericCommentEvent,
    ) -> Result<()> {
        Ok(())
    }

    async fn handle_pull_request(&self, _agent: &Agent, _hook: &PullRequestHook) -> Result<()> {
        Ok(())
    }

    async fn handle_push(&self, _agent: &Agent, _hook: &PushHook) -> Result<()> {
        Ok(())
    }

    async fn handle_review(&self, _agent: &Agent, _hook: &ReviewHook) -> Result<()> {
        Ok(())
    }

    async fn handle_issue(&self, _agent: &Agent, _hook: &IssueHook) -> Result<()> {
        Ok(())
    }
}

/// Command matches in `event` for the commands whose filter accepts it.
pub fn matching_commands(plugin: &dyn Plugin, event: &GenericCommentEvent) -> Vec<CommandMatch> {
    plugin
        .commands()
        .iter()
        .filter(|command| command.accepts(event))
        .flat_map(|command| command.find_matches(&event.body))
        .collect()
}
