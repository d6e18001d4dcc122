//! Slash commands matched in comment bodies.
//!
//! A command compiles to one regex of the form
//! `^/(lh-)?(<prefix>-)?(<name>|..)( <arg>)?$`, applied multi-line and
//! case-insensitively so one comment can carry several commands.

use anyhow::{Context, Result};
use regex::Regex;

use crate::event::GenericCommentEvent;
use crate::plugin::CommandHelp;

pub type CommandFilter = fn(&GenericCommentEvent) -> bool;

/// Only newly created comments.
pub fn created_only(event: &GenericCommentEvent) -> bool {
    event.is_created()
}

/// Newly created comments on pull requests.
pub fn created_on_pull_request(event: &GenericCommentEvent) -> bool {
    event.is_created() && event.is_pr
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandArg {
    pub pattern: &'static str,
    pub optional: bool,
}

impl CommandArg {
    pub fn optional(pattern: &'static str) -> Self {
        Self {
            pattern,
            optional: true,
        }
    }

    pub fn required(pattern: &'static str) -> Self {
        Self {
            pattern,
            optional: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandMatch {
    /// Id of the command that matched.
    pub command: &'static str,
    /// Lowercased name as typed, without the prefix.
    pub name: String,
    /// Lowercased prefix, e.g. `remove` for `/remove-help`.
    pub prefix: Option<String>,
    pub arg: Option<String>,
}

impl CommandMatch {
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.prefix.as_deref() == Some(prefix)
    }

    pub fn arg_is(&self, value: &str) -> bool {
        self.arg
            .as_deref()
            .is_some_and(|arg| arg.eq_ignore_ascii_case(value))
    }

    /// Whitespace separated words of the argument.
    pub fn arg_words(&self) -> Vec<&str> {
        self.arg
            .as_deref()
            .map(|arg| arg.split_whitespace().collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct PluginCommand {
    pub id: &'static str,
    pub prefix: Option<&'static str>,
    pub names: Vec<&'static str>,
    pub arg: Option<CommandArg>,
    pub help: CommandHelp,
    filter: CommandFilter,
    regex: Regex,
}

impl PluginCommand {
    pub fn builder(id: &'static str, names: &[&'static str]) -> PluginCommandBuilder {
        PluginCommandBuilder {
            id,
            prefix: None,
            names: names.to_vec(),
            arg: None,
            help: CommandHelp::default(),
            filter: created_only,
        }
    }

    pub fn accepts(&self, event: &GenericCommentEvent) -> bool {
        (self.filter)(event)
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// Every occurrence of the command in `body`, in order.
    pub fn find_matches(&self, body: &str) -> Vec<CommandMatch> {
        self.regex
            .captures_iter(body)
            .filter_map(|captures| {
                let name = captures.name("name")?.as_str().to_ascii_lowercase();
                Some(CommandMatch {
                    command: self.id,
                    name,
                    prefix: captures
                        .name("prefix")
                        .map(|prefix| prefix.as_str().to_ascii_lowercase()),
                    arg: captures
                        .name("arg")
                        .map(|arg| arg.as_str().trim().to_string())
                        .filter(|arg| !arg.is_empty()),
                })
            })
            .collect()
    }
}

pub struct PluginCommandBuilder {
    id: &'static str,
    prefix: Option<&'static str>,
    names: Vec<&'static str>,
    arg: Option<CommandArg>,
    help: CommandHelp,
    filter: CommandFilter,
}

impl PluginCommandBuilder {
    pub fn prefix(mut self, prefix: &'static str) -> Self {
        self.prefix = Some(prefix);
        self
    }

    pub fn arg(mut self, arg: CommandArg) -> Self {
        self.arg = Some(arg);
        self
    }

    pub fn filter(mut self, filter: CommandFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn help(mut self, help: CommandHelp) -> Self {
        self.help = help;
        self
    }

    pub fn build(self) -> Result<PluginCommand> {
        let pattern = command_pattern(self.prefix, &self.names, self.arg.as_ref());
        let regex = Regex::new(&pattern)
            .with_context(|| format!("invalid pattern for command {}: {pattern}", self.id))?;
        Ok(PluginCommand {
            id: self.id,
            prefix: self.prefix,
            names: self.names,
            arg: self.arg,
            help: self.help,
            filter: self.filter,
            regex,
        })
    }
}

fn command_pattern(prefix: Option<&str>, names: &[&str], arg: Option<&CommandArg>) -> String {
    let names = names
        .iter()
        .map(|name| regex::escape(name))
        .collect::<Vec<_>>()
        .join("|");
    let prefix = prefix
        .map(|prefix| format!("(?:(?P<prefix>{})-)?", regex::escape(prefix)))
        .unwrap_or_default();
    let arg = match arg {
        Some(CommandArg {
            pattern,
            optional: true,
        }) => format!("(?:[ \\t]+(?P<arg>{pattern}))?"),
        Some(CommandArg {
            pattern,
            optional: false,
        }) => format!("[ \\t]+(?P<arg>{pattern})"),
        None => String::new(),
    };
    format!("(?mi)^/(?:lh-)?{prefix}(?P<name>{names}){arg}[ \\t]*\\r?$")
}
