//! Foundational helpers shared across Lighthouse crates.
//!
//! Provides repository identity parsing, lexical git-ref classification, and
//! small text utilities used by the webhook, git, and polling layers.

pub mod git_refs;
pub mod repo_ref;
pub mod text_utils;

pub use git_refs::{
    branch_from_ref, is_null_sha, is_sha, normalize_branch_name, tag_from_ref, NULL_SHA,
};
pub use repo_ref::RepoRef;
pub use text_utils::{tail_for_error, truncate_for_error};

