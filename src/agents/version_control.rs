use crate::agents::pull_request::{ChangePublisher, PullRequestDraft};
use crate::error::{PguError, Result};
use crate::utils::path_validator::PathValidator;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::debug;

/// GitPublisher commits each change unit to its own local branch, using the
/// `git` CLI with hardened input validation.
pub struct GitPublisher {
    repo_path: PathBuf,
    base_branch: String,
}

impl GitPublisher {
    pub fn new<P: AsRef<Path>>(repo_path: P, base_branch: &str) -> Result<Self> {
        let repo_path = Self::validate_git_path(repo_path.as_ref())?;
        Self::validate_ref_name(base_branch)?;

        let publisher = Self {
            repo_path,
            base_branch: base_branch.to_string(),
        };
        if !publisher.is_working_directory_clean()? {
            return Err(PguError::GitOperation(
                "Working directory has uncommitted changes".to_string(),
            ));
        }
        Ok(publisher)
    }

    /// Check if the working directory is clean
    pub fn is_working_directory_clean(&self) -> Result<bool> {
        let output = self.run_git(&["status", "--porcelain"])?;
        Self::ensure_success(&output, "git status")?;
        Ok(output.stdout.is_empty())
    }

    fn commit_unit(&self, draft: &PullRequestDraft, file_path: &str, content: &str) -> Result<()> {
        let target = self.repo_path.join(file_path);
        let parent = target.parent().unwrap_or(&self.repo_path);
        PathValidator::validate_file_path(parent, &self.repo_path).map_err(|err| {
            PguError::GitOperation(format!("Refusing to write outside the repository: {err}"))
        })?;

        let output = self.run_git(&["checkout", "-b", &draft.branch, &self.base_branch])?;
        Self::ensure_success(&output, "git checkout -b")?;

        fs::write(&target, content)?;

        let output = self.run_git(&["add", "--", file_path])?;
        Self::ensure_success(&output, "git add")?;

        let output = self.run_git(&["commit", "-m", &draft.title, "-m", &draft.body])?;
        Self::ensure_success(&output, "git commit")?;
        Ok(())
    }

    fn run_git(&self, args: &[&str]) -> Result<Output> {
        debug!(args = %args.join(" "), "running git");
        Command::new("git")
            .current_dir(&self.repo_path)
            .args(args)
            .output()
            .map_err(|e| {
                PguError::GitOperation(format!(
                    "Failed to execute git command '{}': {e}",
                    args.join(" ")
                ))
            })
    }

    fn ensure_success(output: &Output, command: &str) -> Result<()> {
        if output.status.success() {
            return Ok(());
        }

        Err(PguError::GitOperation(format!(
            "{} failed: {}",
            command,
            String::from_utf8_lossy(&output.stderr)
        )))
    }

    fn validate_git_path(path: &Path) -> Result<PathBuf> {
        let dangerous = [';', '|', '&', '$', '`', '\n', '\r'];
        let path_str = path.to_string_lossy();
        if let Some(ch) = dangerous.iter().find(|c| path_str.contains(**c)) {
            return Err(PguError::GitOperation(format!(
                "Path contains dangerous character: '{}'",
                ch
            )));
        }

        if !path.is_absolute() {
            return Err(PguError::GitOperation(
                "Only absolute paths are allowed for Git operations".to_string(),
            ));
        }

        PathValidator::validate_project_path(path)
            .map_err(|err| PguError::GitOperation(format!("Invalid Git path: {}", err)))
    }

    fn validate_ref_name(name: &str) -> Result<()> {
        let valid = !name.is_empty()
            && !name.starts_with('-')
            && !name.contains("..")
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/' | '.'));
        if valid {
            Ok(())
        } else {
            Err(PguError::GitOperation(format!("Unsafe branch name '{}'", name)))
        }
    }
}

impl ChangePublisher for GitPublisher {
    fn publish(&self, draft: &PullRequestDraft, file_path: &str, content: &str) -> Result<String> {
        Self::validate_ref_name(&draft.branch)?;

        let result = self.commit_unit(draft, file_path, content);

        // Always return to the base branch so the next unit starts from it.
        let output = self.run_git(&["checkout", "--force", &self.base_branch])?;
        result?;
        Self::ensure_success(&output, "git checkout")?;
        Ok(draft.branch.clone())
    }
}
