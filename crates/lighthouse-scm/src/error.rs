use thiserror::Error;

/// Errors surfaced by provider operations.
///
/// The merge family is typed so the merge orchestrator can turn each case
/// into a user-visible explanation.
#[derive(Debug, Error)]
pub enum ScmError {
    #[error("{operation}: not found")]
    NotFound { operation: String },

    #[error("head branch was modified, review and try the merge again: {0}")]
    ModifiedHead(String),

    #[error("pull request is not mergeable: {0}")]
    Unmergable(String),

    #[error("base branch was modified since the pull request was tested")]
    UnmergableBaseChanged,

    #[error("not authorized to push to the base branch")]
    UnauthorizedToPush,

    #[error("merge commits are forbidden on this repository")]
    MergeCommitsForbidden,

    #[error("could not {action} the following users: {}", .users.join(", "))]
    MissingUsers { users: Vec<String>, action: String },

    #[error("{operation} failed with status {status}: {body}")]
    Api {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("{operation} request failed: {message}")]
    Transport { operation: String, message: String },

    #[error("failed to decode {operation}: {message}")]
    Decode { operation: String, message: String },

    #[error("{0} is not supported by this provider")]
    Unsupported(String),
}

impl ScmError {
    pub fn not_found(operation: impl Into<String>) -> Self {
        Self::NotFound {
            operation: operation.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Rate limiting and server-side failures; callers may retry later.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Transport { .. } => true,
            _ => false,
        }
    }
}

pub type ScmResult<T> = std::result::Result<T, ScmError>;
