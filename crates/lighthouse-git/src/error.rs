use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("git {} in {} failed: {stderr_tail}", .args.join(" "), .dir.display())]
    Command {
        dir: PathBuf,
        command: String,
        args: Vec<String>,
        stderr_tail: String,
    },

    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("git {} timed out after {timeout_ms}ms", .args.join(" "))]
    Timeout { args: Vec<String>, timeout_ms: u64 },

    #[error("io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid repository path '{0}'")]
    InvalidPath(String),
}

impl GitError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::GitError;

    #[test]
    fn unit_command_error_names_directory_and_arguments() {
        let error = GitError::Command {
            dir: PathBuf::from("/tmp/clone"),
            command: "git".to_string(),
            args: vec!["checkout".to_string(), "main".to_string()],
            stderr_tail: "pathspec 'main' did not match".to_string(),
        };
        let rendered = error.to_string();
        assert!(rendered.contains("git checkout main"));
        assert!(rendered.contains("/tmp/clone"));
        assert!(rendered.contains("did not match"));
    }
}
