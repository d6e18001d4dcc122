//! `/milestone <title>|clear`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lighthouse_config::PluginConfig;
use lighthouse_scm::TeamRole;
use tracing::info;

use super::respond;
use crate::agent::Agent;
use crate::command::{CommandArg, CommandMatch, PluginCommand};
use crate::event::GenericCommentEvent;
use crate::plugin::{CommandHelp, Plugin, PluginHelp};

const CLEAR_KEYWORD: &str = "clear";

pub struct MilestonePlugin {
    commands: Vec<PluginCommand>,
}

impl MilestonePlugin {
    pub fn new() -> Result<Self> {
        Ok(Self {
            commands: vec![PluginCommand::builder("milestone", &["milestone"])
                .arg(CommandArg::required(".+?"))
                .help(
                    CommandHelp::new(
                        "/milestone <version> or /milestone clear",
                        "Updates the milestone for an issue or PR",
                    )
                    .who_can_use("Members of the milestone maintainers team can use the '/milestone' command.")
                    .examples(&["/milestone v1.10", "/milestone v1.9", "/milestone clear"]),
                )
                .build()?],
        })
    }
}

#[async_trait]
impl Plugin for MilestonePlugin {
    fn name(&self) -> &'static str {
        "milestone"
    }

    fn description(&self) -> &'static str {
        "The milestone plugin allows members of a configurable GitHub team to set the milestone on an issue or pull request."
    }

    fn commands(&self) -> &[PluginCommand] {
        &self.commands
    }

    fn help(&self, config: &PluginConfig, org: &str, repo: &str) -> PluginHelp {
        let milestone = config.repo_milestone_for(org, repo);
        let mut notes = Vec::new();
        if !milestone.maintainers_team.is_empty() {
            notes.push(format!(
                "The milestone maintainers team for {org}/{repo} is {}.",
                milestone.maintainers_team
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
        let Some(proposed) = matched.arg.as_deref() else {
            return Ok(());
        };
        let org = event.repo.namespace.as_str();
        let repo = event.repo.repo_ref();
        let milestone = agent.plugin_config.repo_milestone_for(org, &event.repo.name);

        if !milestone.maintainers_team.is_empty() || milestone.maintainers_id != 0 {
            let teams = agent
                .scm
                .list_teams(org)
                .await
                .with_context(|| format!("failed to list teams in {org}"))?;
            let team = teams.iter().find(|team| {
                (milestone.maintainers_id != 0 && team.id == milestone.maintainers_id)
                    || (!milestone.maintainers_team.is_empty()
                        && (team.slug.eq_ignore_ascii_case(&milestone.maintainers_team)
                            || team.name.eq_ignore_ascii_case(&milestone.maintainers_team)))
            });
            let is_member = match team {
                Some(team) => agent
                    .scm
                    .list_team_members(team.id, TeamRole::All)
                    .await
                    .with_context(|| format!("failed to list members of team {}", team.name))?
                    .iter()
                    .any(|member| member.login.eq_ignore_ascii_case(&event.author.login)),
                None => false,
            };
            if !is_member {
                let team_name = if milestone.maintainers_team.is_empty() {
                    team.map(|team| team.slug.clone()).unwrap_or_default()
                } else {
                    milestone.maintainers_team.clone()
                };
                let friendly = if milestone.maintainers_friendly_name.is_empty() {
                    "milestone maintainers".to_string()
                } else {
                    milestone.maintainers_friendly_name.clone()
                };
                let reply = format!(
                    "You must be a member of the [{org}/{team_name}]({}/orgs/{org}/teams/{team_name}/members) GitHub team to set the milestone. If you believe you should be able to issue the /milestone command, please contact your {friendly} and have them propose you as an additional delegate for this responsibility.",
                    agent.server_url.trim_end_matches('/'),
                );
                return respond(agent, event, &reply).await;
            }
        }

        if proposed.eq_ignore_ascii_case(CLEAR_KEYWORD) {
            agent
                .scm
                .clear_milestone(&repo, event.number)
                .await
                .with_context(|| format!("failed to clear milestone on {repo}#{}", event.number))?;
            info!(number = event.number, "cleared milestone");
            return Ok(());
        }

        let milestones = agent
            .scm
            .list_milestones(&repo)
            .await
            .with_context(|| format!("failed to list milestones in {repo}"))?;
        if let Some(found) = milestones.iter().find(|milestone| milestone.title == proposed) {
            agent
                .scm
                .set_milestone(&repo, event.number, found.number)
                .await
                .with_context(|| format!("failed to set milestone on {repo}#{}", event.number))?;
            info!(number = event.number, milestone = %found.title, "set milestone");
            return Ok(());
        }

        let titles = milestones
            .iter()
            .map(|milestone| milestone.title.as_str())
            .collect::<Vec<_>>()
            .join("`, `");
        let reply = format!(
            "The provided milestone is not valid for this repository. Milestones in this repository: [`{titles}`]\n\nUse `/milestone {CLEAR_KEYWORD}` to clear the milestone."
        );
        respond(agent, event, &reply).await
    }
}
