//! `/kind`, `/area`, `/priority`, `/triage` and `/label`, plus their `remove-` forms.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lighthouse_config::PluginConfig;
use tracing::info;

use super::{add_label, has_label, issue_labels, remove_label, respond};
use crate::agent::Agent;
use crate::command::{CommandArg, CommandMatch, PluginCommand};
use crate::event::GenericCommentEvent;
use crate::plugin::{CommandHelp, Plugin, PluginHelp};

const CUSTOM_LABEL_COMMAND: &str = "label";

pub struct LabelPlugin {
    commands: Vec<PluginCommand>,
}

impl LabelPlugin {
    pub fn new() -> Result<Self> {
        Ok(Self {
            commands: vec![PluginCommand::builder(
                "label",
                &["kind", "area", "priority", "triage", CUSTOM_LABEL_COMMAND],
            )
            .prefix("remove")
            .arg(CommandArg::required(".+?"))
            .help(
                CommandHelp::new(
                    "/[remove-](area|kind|priority|triage|label) <label1> <label2> ...",
                    "Applies or removes a label from one of the recognized types of labels.",
                )
                .examples(&["/kind bug", "/remove-area prow", "/label tide/merge-method-squash"]),
            )
            .build()?],
        })
    }
}

#[async_trait]
impl Plugin for LabelPlugin {
    fn name(&self) -> &'static str {
        "label"
    }

    fn description(&self) -> &'static str {
        "The label plugin provides commands that add or remove certain types of labels."
    }

    fn commands(&self) -> &[PluginCommand] {
        &self.commands
    }

    fn help(&self, config: &PluginConfig, _org: &str, _repo: &str) -> PluginHelp {
        let mut notes = Vec::new();
        if !config.label.additional_labels.is_empty() {
            notes.push(format!(
                "The following additional labels can be used with the /label command: {}",
                config.label.additional_labels.join(", ")
            ));
        }
        PluginHelp {
            name: self.name(),
            description: self.description(),
            config: notes,
            commands: self.commands.iter().map(|command| command.help.clone()).collect(),
        }
    }

    async fn handle_command(
        &self,
        matched: &CommandMatch,
        agent: &Agent,
        event: &GenericCommentEvent,
    ) -> Result<()> {
        let repo = event.repo.repo_ref();
        let additional = &agent.plugin_config.label.additional_labels;
        let is_additional =
            |label: &str| additional.iter().any(|known| known.eq_ignore_ascii_case(label));
        let repo_labels = agent
            .scm
            .get_repo_labels(&repo)
            .await
            .with_context(|| format!("failed to list labels of {repo}"))?;
        let current = issue_labels(agent, event).await?;
        let remove = matched.has_prefix("remove");
        let custom = matched.name == CUSTOM_LABEL_COMMAND;

        let mut missing = Vec::new();
        let mut unsupported = Vec::new();
        let mut not_set = Vec::new();
        for word in matched.arg_words() {
            let wanted = if custom {
                word.to_string()
            } else {
                format!("{}/{word}", matched.name)
            };
            if custom && !is_additional(&wanted) {
                unsupported.push(wanted);
                continue;
            }
            if !has_label(&repo_labels, &wanted) && !is_additional(&wanted) {
                missing.push(wanted);
                continue;
            }
            let present = has_label(&current, &wanted);
            if remove {
                if present {
                    remove_label(agent, event, &wanted).await?;
                    info!(number = event.number, label = %wanted, "removed label");
                } else {
                    not_set.push(wanted);
                }
            } else if !present {
                add_label(agent, event, &wanted).await?;
                info!(number = event.number, label = %wanted, "added label");
            }
        }

        if !missing.is_empty() {
            let reply = format!(
                "The label(s) `{}` cannot be applied, because the repository doesn't have them.",
                missing.join(", ")
            );
            respond(agent, event, &reply).await?;
        }
        if !unsupported.is_empty() {
            let reply = format!(
                "The label(s) `{}` cannot be applied. These labels are supported: `{}`",
                unsupported.join(", "),
                additional.join(", ")
            );
            respond(agent, event, &reply).await?;
        }
        if !not_set.is_empty() {
            let reply = format!(
                "Those labels are not set on the issue: `{}`",
                not_set.join(", ")
            );
            respond(agent, event, &reply).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use lighthouse_config::{Config, LabelConfig, PluginConfig};

    use super::LabelPlugin;
    use crate::test_support::{comment_event, Harness};

    fn harness() -> Harness {
        let plugins = PluginConfig {
            label: LabelConfig {
                additional_labels: vec!["tide/merge-method-squash".to_string()],
            },
            ..PluginConfig::default()
        };
        let harness = Harness::with_config(Config::default(), plugins);
        harness.fake.with_state(|state| {
            state.repo_labels_existing = vec!["kind/bug".to_string(), "area/docs".to_string()];
        });
        harness
    }

    #[tokio::test]
    async fn functional_prefixed_labels_add_and_remove() {
        let harness = harness();
        harness.seed_labels(1, &["area/docs"]);
        let plugin = LabelPlugin::new().expect("plugin");
        harness
            .comment(&plugin, &comment_event("/kind bug\n/remove-area docs", 1, true, "alice"))
            .await
            .expect("handle");
        assert_eq!(harness.added_labels(), vec!["kind/bug"]);
        assert_eq!(harness.removed_labels(), vec!["area/docs"]);
        assert!(harness.comments().is_empty());
    }

    #[tokio::test]
    async fn functional_unknown_labels_are_reported() {
        let harness = harness();
        let plugin = LabelPlugin::new().expect("plugin");
        harness
            .comment(&plugin, &comment_event("/kind feature", 1, false, "alice"))
            .await
            .expect("handle");
        harness
            .comment(&plugin, &comment_event("/label anything", 1, false, "alice"))
            .await
            .expect("handle");
        assert!(harness.added_labels().is_empty());
        let comments = harness.comments();
        assert!(comments[0].starts_with(
            "The label(s) `kind/feature` cannot be applied, because the repository doesn't have them."
        ));
        assert!(comments[1].starts_with(
            "The label(s) `anything` cannot be applied. These labels are supported: `tide/merge-method-squash`"
        ));
    }

    #[tokio::test]
    async fn unit_custom_label_from_additional_labels() {
        let harness = harness();
        let plugin = LabelPlugin::new().expect("plugin");
        harness
            .comment(&plugin, &comment_event("/label tide/merge-method-squash", 1, true, "alice"))
            .await
            .expect("handle");
        assert_eq!(harness.added_labels(), vec!["tide/merge-method-squash"]);
    }
}
