//! Local repository access for Lighthouse.
//!
//! `GitFileBrowser` keeps one cached clone per repository and serves file
//! reads, directory listings, and scoped working-tree access at a requested
//! ref. A per-request `FetchCache` bounds network fetches to one per
//! `(repository, ref)`.

pub mod browser;
pub mod error;
pub mod fetch_cache;
pub mod git_browser;
pub mod runner;

pub use browser::{FileBrowser, FileEntry, FileEntryKind, RepoDir};
pub use error::GitError;
pub use fetch_cache::FetchCache;
pub use git_browser::{GitBrowserConfig, GitFileBrowser};
pub use runner::GitRunner;
