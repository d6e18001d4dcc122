use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use lighthouse_core::tail_for_error;
use tokio::process::Command;
use tracing::debug;

use crate::error::GitError;

const STDERR_TAIL_CHARS: usize = 600;

/// Runs `git` subprocesses with a per-command timeout.
#[derive(Debug, Clone)]
pub struct GitRunner {
    binary: PathBuf,
    timeout: Duration,
}

impl Default for GitRunner {
    fn default() -> Self {
        Self::new("git", Duration::from_secs(120))
    }
}

impl GitRunner {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    /// Runs `git <args>` in `dir` and returns trimmed stdout.
    pub async fn run(&self, dir: &Path, args: &[&str]) -> Result<String, GitError> {
        let display_args = args.iter().map(|arg| redact_credentials(arg)).collect::<Vec<_>>();
        debug!(dir = %dir.display(), args = %display_args.join(" "), "running git");

        let mut command = Command::new(&self.binary);
        command.kill_on_drop(true);
        command.current_dir(dir);
        command.args(args);
        command.env("GIT_TERMINAL_PROMPT", "0");
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        let child = command.spawn().map_err(|source| GitError::Spawn {
            command: self.binary.display().to_string(),
            source,
        })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| GitError::Timeout {
                args: display_args.clone(),
                timeout_ms: self.timeout.as_millis() as u64,
            })?
            .map_err(|source| GitError::Spawn {
                command: self.binary.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(GitError::Command {
                dir: dir.to_path_buf(),
                command: self.binary.display().to_string(),
                args: display_args,
                stderr_tail: redact_credentials(&tail_for_error(&detail, STDERR_TAIL_CHARS)),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Like `run`, but maps a non-zero exit to `Ok(false)`.
    pub async fn succeeds(&self, dir: &Path, args: &[&str]) -> Result<bool, GitError> {
        match self.run(dir, args).await {
            Ok(_) => Ok(true),
            Err(GitError::Command { .. }) => Ok(false),
            Err(error) => Err(error),
        }
    }
}

/// Hides `user:token@` userinfo in URLs.
pub(crate) fn redact_credentials(text: &str) -> String {
    let Some(scheme_end) = text.find("://") else {
        return text.to_string();
    };
    let rest = &text[scheme_end + 3..];
    let host_end = rest.find('/').unwrap_or(rest.len());
    match rest[..host_end].rfind('@') {
        Some(at) => format!("{}://***@{}", &text[..scheme_end], &rest[at + 1..]),
        None => text.to_string(),
    }
}
