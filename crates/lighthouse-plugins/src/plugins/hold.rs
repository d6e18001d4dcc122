//! `/hold` blocks merging a pull request until cancelled.

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use super::{add_label, has_label, issue_labels, remove_label};
use crate::agent::Agent;
use crate::command::{created_on_pull_request, CommandArg, CommandMatch, PluginCommand};
use crate::event::GenericCommentEvent;
use crate::plugin::{CommandHelp, Plugin};

pub const HOLD_LABEL: &str = "do-not-merge/hold";

pub struct HoldPlugin {
    commands: Vec<PluginCommand>,
}

impl HoldPlugin {
    pub fn new() -> Result<Self> {
        Ok(Self {
            commands: vec![
                PluginCommand::builder("hold", &["hold"])
                    .arg(CommandArg::optional("cancel"))
                    .filter(created_on_pull_request)
                    .help(
                        CommandHelp::new(
                            "/hold [cancel]",
                            "Adds or removes the `do-not-merge/hold` label which is used to indicate that the PR should not be automatically merged.",
                        )
                        .examples(&["/hold", "/hold cancel"]),
                    )
                    .build()?,
                PluginCommand::builder("unhold", &["unhold", "remove-hold"])
                    .filter(created_on_pull_request)
                    .help(
                        CommandHelp::new("/unhold", "Removes the `do-not-merge/hold` label.")
                            .examples(&["/unhold", "/remove-hold"]),
                    )
                    .build()?,
            ],
        })
    }
}

#[async_trait]
impl Plugin for HoldPlugin {
    fn name(&self) -> &'static str {
        "hold"
    }

    fn description(&self) -> &'static str {
        "Allows anyone to add or remove the do-not-merge/hold label from a pull request."
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
        let wants_hold = matched.command == "hold" && !matched.arg_is("cancel");
        let labels = issue_labels(agent, event).await?;
        let held = has_label(&labels, HOLD_LABEL);
        if wants_hold && !held {
            info!(number = event.number, "adding hold label");
            add_label(agent, event, HOLD_LABEL).await?;
        } else if !wants_hold && held {
            info!(number = event.number, "removing hold label");
            remove_label(agent, event, HOLD_LABEL).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{HoldPlugin, HOLD_LABEL};
    use crate::test_support::{comment_event, Harness};

    #[tokio::test]
    async fn functional_hold_cancel_removes_label() {
        let harness = Harness::new();
        harness.seed_labels(1, &[HOLD_LABEL]);
        let plugin = HoldPlugin::new().expect("plugin");
        harness
            .comment(&plugin, &comment_event("/hold cancel", 1, true, "alice"))
            .await
            .expect("handle");
        assert_eq!(harness.removed_labels(), vec![HOLD_LABEL]);
        assert!(harness.added_labels().is_empty());
    }

    #[tokio::test]
    async fn functional_hold_is_idempotent_and_pr_only() {
        let harness = Harness::new();
        let plugin = HoldPlugin::new().expect("plugin");
        harness
            .comment(&plugin, &comment_event("/hold", 1, true, "alice"))
            .await
            .expect("handle");
        harness
            .comment(&plugin, &comment_event("/HOLD", 1, true, "alice"))
            .await
            .expect("handle");
        harness
            .comment(&plugin, &comment_event("/hold", 2, false, "alice"))
            .await
            .expect("handle");
        assert_eq!(harness.added_labels(), vec![HOLD_LABEL]);
    }

    #[tokio::test]
    async fn unit_unhold_aliases() {
        let harness = Harness::new();
        harness.seed_labels(1, &[HOLD_LABEL]);
        let plugin = HoldPlugin::new().expect("plugin");
        harness
            .comment(&plugin, &comment_event("/remove-hold\r", 1, true, "alice"))
            .await
            .expect("handle");
        assert_eq!(harness.removed_labels(), vec![HOLD_LABEL]);
    }
}
