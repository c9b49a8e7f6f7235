//! Git command execution against a local (possibly bare) clone.

use std::path::{Path, PathBuf};
use tokio::process::Command;

use super::GitLogError;
use crate::sources::LogOptions;

/// Runs git commands with `--git-dir` pointing at one clone.
pub struct GitExecutor {
    git_dir: PathBuf,
}

impl GitExecutor {
    /// Create an executor, verifying git is installed and `git_dir` is a
    /// repository.
    pub async fn new(git_dir: &Path) -> Result<Self, GitLogError> {
        let output = Command::new("git").arg("--version").output().await;
        match output {
            Ok(output) if output.status.success() => {}
            _ => return Err(GitLogError::GitMissing),
        }

        let output = Command::new("git")
            .arg(format!("--git-dir={}", git_dir.display()))
            .args(["rev-parse", "--git-dir"])
            .output()
            .await?;

        if !output.status.success() {
            return Err(GitLogError::NotAClone(git_dir.to_path_buf()));
        }

        Ok(Self {
            git_dir: git_dir.to_path_buf(),
        })
    }

    /// Run `git log` over `revision` with a custom format.
    pub async fn log(
        &self,
        revision: &str,
        format: &str,
        options: &LogOptions,
    ) -> Result<String, GitLogError> {
        let mut cmd = Command::new("git");
        cmd.arg(format!("--git-dir={}", self.git_dir.display()));
        cmd.args(["--no-pager", "log", &format!("--format={}", format)]);
        cmd.arg(format!("-n{}", options.limit));

        if options.no_merges {
            cmd.arg("--no-merges");
        }

        cmd.arg(revision);
        cmd.arg("--");

        if let Some(path) = &options.path_filter {
            cmd.arg(path);
        }

        tracing::debug!(git_dir = %self.git_dir.display(), revision = %revision, "Running git log");
        let output = cmd.output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GitLogError::LogFailed {
                revision: revision.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(String::from_utf8(output.stdout)?)
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_non_repository_is_rejected() {
        let dir = TempDir::new().unwrap();
        let result = GitExecutor::new(dir.path()).await;

        // Depends on git being installed where tests run
        assert!(matches!(
            result,
            Err(GitLogError::NotAClone(_)) | Err(GitLogError::GitMissing)
        ));
    }
}
