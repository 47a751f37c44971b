// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Version-control capability interface.
//!
//! The synchronization engine only needs a narrow slice of Git: clone, fetch,
//! checkout, stage everything, inspect status, commit, push, and read the
//! log. [`Git`] models that slice so the engine does not care whether the
//! operations run through an external process or a linked library.
//!
//! Every operation except cloning receives the working directory it must run
//! in explicitly. Nothing here reads or changes the current working
//! directory of the process.

use std::{
    ffi::{OsStr, OsString},
    io,
    path::{Path, PathBuf},
    process::Stdio,
};
use tokio::process::Command;
use tracing::{debug, instrument};

/// What to check out in a working copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkout<'a> {
    /// Local branch tracking `origin/<branch>`, reset to the remote tip.
    Track(&'a str),

    /// New local branch started from the current HEAD.
    NewBranch(&'a str),

    /// Detached HEAD at a commit-ish, e.g., `FETCH_HEAD` or a commit hash.
    Detached(&'a str),
}

/// Layer of indirection for version-control operations.
///
/// Every call blocks its caller until the operation completes, and returns
/// the captured output of the operation as text for transcripts.
#[allow(async_fn_in_trait)]
pub trait Git {
    /// Check that the backend can run at all.
    fn ensure_available(&self) -> Result<()>;

    /// Clone repository into target directory.
    async fn clone_repo(&self, repository: &str, into: &Path) -> Result<String>;

    /// Fetch from `origin`, optionally only one reference into `FETCH_HEAD`.
    async fn fetch(&self, workdir: &Path, reference: Option<&str>) -> Result<String>;

    /// Check if `origin/<branch>` is known to working copy.
    async fn remote_branch_exists(&self, workdir: &Path, branch: &str) -> Result<bool>;

    /// Check out target in working copy.
    async fn checkout(&self, workdir: &Path, target: Checkout<'_>) -> Result<String>;

    /// Stage every change under top-level entries, deletions included.
    ///
    /// Ignore rules of any kind never keep an entry from being staged.
    async fn stage_all(&self, workdir: &Path, entries: &[&str]) -> Result<String>;

    /// Porcelain status of working copy. Empty means nothing changed.
    async fn status(&self, workdir: &Path) -> Result<String>;

    /// Commit staged changes.
    async fn commit(&self, workdir: &Path, message: &str) -> Result<String>;

    /// Push local branch to `origin` and set upstream tracking.
    async fn push(&self, workdir: &Path, branch: &str) -> Result<String>;

    /// Format latest commit of revision.
    async fn log(&self, workdir: &Path, revision: &str, format: &str) -> Result<String>;
}

/// Git access through the external `git` executable.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
    envs: Vec<(OsString, OsString)>,
}

impl GitCli {
    /// Construct new backend around target executable.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            envs: Vec::new(),
        }
    }

    /// Locate `git` executable through `PATH`.
    ///
    /// # Errors
    ///
    /// - Return [`GitError::ExecutableNotFound`] if `git` cannot be found.
    pub fn locate() -> Result<Self> {
        which::which("git")
            .map(Self::new)
            .map_err(|_| GitError::ExecutableNotFound {
                program: PathBuf::from("git"),
            })
    }

    /// Set environment variable for every invocation of executable.
    pub fn with_env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Path to executable in use.
    pub fn program(&self) -> &Path {
        self.program.as_path()
    }

    #[instrument(skip(self, workdir, args), level = "debug")]
    async fn call(
        &self,
        workdir: Option<&Path>,
        args: impl IntoIterator<Item = impl AsRef<OsStr>>,
    ) -> Result<String> {
        let mut bin_args: Vec<OsString> = Vec::new();
        if let Some(workdir) = workdir {
            bin_args.extend(["-C".into(), workdir.as_os_str().to_owned()]);
        }
        bin_args.extend(args.into_iter().map(|arg| arg.as_ref().to_owned()));
        let command_line = format!(
            "{} {}",
            self.program.display(),
            bin_args
                .iter()
                .map(|arg| arg.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );
        debug!("run {command_line}");

        // INVARIANT: Never wait on an interactive credential prompt.
        let output = Command::new(&self.program)
            .args(&bin_args)
            .envs(self.envs.iter().map(|(key, value)| (key, value)))
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| match err.kind() {
                io::ErrorKind::NotFound => GitError::ExecutableNotFound {
                    program: self.program.clone(),
                },
                _ => GitError::Spawn {
                    source: err,
                    program: self.program.clone(),
                },
            })?;

        let mut message = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();
        message.push_str(String::from_utf8_lossy(output.stderr.as_slice()).as_ref());

        // INVARIANT: Chomp trailing newlines.
        let message = message.trim_end_matches(['\r', '\n']).to_string();

        if !output.status.success() {
            return Err(GitError::Command {
                command: command_line,
                output: message,
            });
        }

        Ok(message)
    }
}

impl Git for GitCli {
    fn ensure_available(&self) -> Result<()> {
        which::which(&self.program)
            .map(|_| ())
            .map_err(|_| GitError::ExecutableNotFound {
                program: self.program.clone(),
            })
    }

    async fn clone_repo(&self, repository: &str, into: &Path) -> Result<String> {
        self.call(
            None,
            [OsStr::new("clone"), OsStr::new(repository), into.as_os_str()],
        )
        .await
    }

    async fn fetch(&self, workdir: &Path, reference: Option<&str>) -> Result<String> {
        match reference {
            Some(reference) => self.call(Some(workdir), ["fetch", "origin", reference]).await,
            None => self.call(Some(workdir), ["fetch", "origin"]).await,
        }
    }

    async fn remote_branch_exists(&self, workdir: &Path, branch: &str) -> Result<bool> {
        let remote = format!("origin/{branch}");
        let listing = self
            .call(Some(workdir), ["branch", "--remotes", "--list", remote.as_str()])
            .await?;
        Ok(!listing.trim().is_empty())
    }

    async fn checkout(&self, workdir: &Path, target: Checkout<'_>) -> Result<String> {
        match target {
            Checkout::Track(branch) => {
                let remote = format!("origin/{branch}");
                self.call(
                    Some(workdir),
                    ["checkout", "-B", branch, "--track", remote.as_str()],
                )
                .await
            }
            Checkout::NewBranch(branch) => {
                self.call(Some(workdir), ["checkout", "-b", branch]).await
            }
            Checkout::Detached(reference) => {
                self.call(Some(workdir), ["checkout", "--detach", reference])
                    .await
            }
        }
    }

    async fn stage_all(&self, workdir: &Path, entries: &[&str]) -> Result<String> {
        let mut args = vec![
            "add".to_string(),
            "--all".into(),
            "--force".into(),
            "--".into(),
        ];
        args.extend(entries.iter().map(|entry| format!(":(literal){entry}")));
        self.call(Some(workdir), args).await
    }

    async fn status(&self, workdir: &Path) -> Result<String> {
        self.call(Some(workdir), ["status", "--porcelain"]).await
    }

    async fn commit(&self, workdir: &Path, message: &str) -> Result<String> {
        self.call(Some(workdir), ["commit", "--message", message])
            .await
    }

    async fn push(&self, workdir: &Path, branch: &str) -> Result<String> {
        self.call(Some(workdir), ["push", "--set-upstream", "origin", branch])
            .await
    }

    async fn log(&self, workdir: &Path, revision: &str, format: &str) -> Result<String> {
        let pretty = format!("--pretty=format:{format}");
        self.call(Some(workdir), ["log", "-1", pretty.as_str(), revision])
            .await
    }
}

/// Version-control error types.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    /// Executable cannot be located.
    #[error(
        "executable {:?} is not found in your system, it is required for confkeep to work correctly",
        program.display()
    )]
    ExecutableNotFound { program: PathBuf },

    /// Executable could not be spawned.
    #[error("failed to run {:?}", program.display())]
    Spawn {
        #[source]
        source: io::Error,
        program: PathBuf,
    },

    /// Executable ran but reported failure.
    #[error("command {command:?} failed:\n{output}")]
    Command { command: String, output: String },
}

/// Friendly result alias :3
pub type Result<T, E = GitError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_executable_is_reported() {
        let git = GitCli::new("confkeep-no-such-git-binary");
        let result = git.ensure_available();
        assert!(matches!(result, Err(GitError::ExecutableNotFound { .. })));
    }

    #[tokio::test]
    async fn spawn_of_missing_executable_maps_to_not_found() {
        let git = GitCli::new("confkeep-no-such-git-binary");
        let result = git.status(Path::new(".")).await;
        assert!(matches!(result, Err(GitError::ExecutableNotFound { .. })));
    }

    #[test]
    fn locate_finds_git_on_path() -> anyhow::Result<()> {
        let git = GitCli::locate()?;
        assert!(git.program().is_absolute());
        assert!(git.ensure_available().is_ok());
        Ok(())
    }

    #[test]
    fn env_is_accumulated() {
        let git = GitCli::new("git")
            .with_env("GIT_AUTHOR_NAME", "John Doe")
            .with_env("GIT_AUTHOR_EMAIL", "john@doe.com");
        assert_eq!(git.envs.len(), 2);
        assert_eq!(git.program(), Path::new("git"));
    }
}
