//! Plugin runtime for the webhook gateway.
//!
//! A plugin is a value implementing [`Plugin`]: it declares comment commands
//! matched by generated regexes and opts into typed event handlers. The
//! [`PluginRegistry`] is assembled explicitly at startup and queried by the
//! dispatcher for the plugins enabled on a repository.

pub mod agent;
pub mod command;
pub mod event;
pub mod plugin;
pub mod plugins;
pub mod registry;

#[cfg(test)]
mod test_support;

pub use agent::{Agent, CommentPruner};
pub use command::{CommandArg, CommandMatch, PluginCommand};
pub use event::{GenericCommentAction, GenericCommentEvent};
pub use plugin::{matching_commands, CommandHelp, HandlerKind, Plugin, PluginHelp};
pub use registry::{render_help_markdown, PluginRegistry};
