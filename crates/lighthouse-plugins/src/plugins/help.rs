//! `/help` and `/good-first-issue` labels on open issues.

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use super::{add_label, has_label, issue_labels, remove_label, respond};
use crate::agent::Agent;
use crate::command::{CommandMatch, PluginCommand};
use crate::event::GenericCommentEvent;
use crate::plugin::{CommandHelp, Plugin};

pub const HELP_LABEL: &str = "help";
pub const GOOD_FIRST_ISSUE_LABEL: &str = "good-first-issue";

const HELP_REPLY: &str =
    "This request has been marked as needing help from a contributor.";
const GOOD_FIRST_ISSUE_REPLY: &str =
    "This request has been marked as suitable for new contributors.";

pub struct HelpPlugin {
    commands: Vec<PluginCommand>,
}

impl HelpPlugin {
    pub fn new() -> Result<Self> {
        Ok(Self {
            commands: vec![PluginCommand::builder("help", &[HELP_LABEL, GOOD_FIRST_ISSUE_LABEL])
                .prefix("remove")
                .help(
                    CommandHelp::new(
                        "/[remove-](help|good-first-issue)",
                        "Applies or removes the 'help' and 'good-first-issue' labels to an issue.",
                    )
                    .examples(&["/help", "/remove-help", "/good-first-issue"]),
                )
                .build()?],
        })
    }
}

#[async_trait]
impl Plugin for HelpPlugin {
    fn name(&self) -> &'static str {
        "help"
    }

    fn description(&self) -> &'static str {
        "Labels issues that need help from contributors or are suitable for newcomers."
    }

    fn commands(&self) -> &[PluginCommand] {
        &self.commands
    }

    async fn handle_command(
        &self,
        matched: &CommandMatch,
        agent: &Agent,
        event: &GenericCommentEvent,
    ) -> Result<()> {
        if !event.is_open() {
            return Ok(());
        }
        let labels = issue_labels(agent, event).await?;
        let has_help = has_label(&labels, HELP_LABEL);
        let has_good_first_issue = has_label(&labels, GOOD_FIRST_ISSUE_LABEL);
        let remove = matched.has_prefix("remove");

        match (matched.name.as_str(), remove) {
            (HELP_LABEL, true) => {
                if has_help {
                    remove_label(agent, event, HELP_LABEL).await?;
                }
                if has_good_first_issue {
                    remove_label(agent, event, GOOD_FIRST_ISSUE_LABEL).await?;
                }
            }
            (HELP_LABEL, false) => {
                if !has_help {
                    add_label(agent, event, HELP_LABEL).await?;
                    respond(agent, event, HELP_REPLY).await?;
                }
            }
            (GOOD_FIRST_ISSUE_LABEL, true) => {
                if has_good_first_issue {
                    remove_label(agent, event, GOOD_FIRST_ISSUE_LABEL).await?;
                }
            }
            (GOOD_FIRST_ISSUE_LABEL, false) => {
                if !has_good_first_issue {
                    add_label(agent, event, GOOD_FIRST_ISSUE_LABEL).await?;
                    respond(agent, event, GOOD_FIRST_ISSUE_REPLY).await?;
                }
                if !has_help {
                    add_label(agent, event, HELP_LABEL).await?;
                }
            }
            _ => return Ok(()),
        }
        info!(number = event.number, command = %matched.name, remove, "handled help command");
        Ok(())
    }
}
