// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Disposable working copies of remote repositories.
//!
//! Every project's pipeline works inside its own __workspace__: a fresh clone
//! of the project's repository placed in a unique temporary directory. The
//! temporary directory is owned by the workspace, so it is removed whenever
//! the workspace goes out of scope. That covers success, failure, and an
//! interrupted invocation whose future gets dropped.
//!
//! # Reference Resolution
//!
//! On push, the target branch is checked out tracking `origin/<branch>`. A
//! branch missing from the remote is expected on the first push, so a new
//! local branch is started from the current HEAD instead.
//!
//! On pull, a branch known to the remote is fetched into `FETCH_HEAD`, which
//! is then checked out detached. Anything else is treated as a commit-ish,
//! e.g., a commit hash or tag, and checked out detached as is.

use crate::{
    git::{Checkout, Git, GitError},
    mirror::Direction,
    transcript::Transcript,
};

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, instrument};

/// Isolated working copy of a remote repository.
#[derive(Debug)]
pub struct Workspace {
    scratch: TempDir,
    root: PathBuf,
    reference: String,
}

impl Workspace {
    /// Clone repository into a fresh temporary directory.
    ///
    /// Nothing is checked out besides the remote's default branch yet.
    ///
    /// # Errors
    ///
    /// - Return [`WorkspaceError::Scratch`] if temporary directory cannot be
    ///   created.
    /// - Return [`WorkspaceError::Unreachable`] if cloning or fetching fails.
    #[instrument(skip(git, transcript), level = "debug")]
    pub async fn clone_from(
        git: &impl Git,
        repository: &str,
        transcript: &mut Transcript,
    ) -> Result<Self> {
        let scratch = tempfile::Builder::new()
            .prefix("confkeep-")
            .tempdir()
            .map_err(WorkspaceError::Scratch)?;
        let root = scratch.path().join("repo");
        debug!("clone {repository:?} into {:?}", root.display());

        let unreachable = |source| WorkspaceError::Unreachable {
            repository: repository.to_string(),
            source,
        };
        transcript.record(git.clone_repo(repository, &root).await.map_err(unreachable)?);
        transcript.record(git.fetch(&root, None).await.map_err(unreachable)?);
        transcript.record(format!("Fetched {repository}"));

        Ok(Self {
            scratch,
            root,
            reference: String::new(),
        })
    }

    /// Check out reference for given direction.
    ///
    /// # Errors
    ///
    /// - Return [`WorkspaceError::MissingRef`] if reference cannot be
    ///   checked out.
    #[instrument(skip(self, git, transcript), level = "debug")]
    pub async fn checkout(
        &mut self,
        git: &impl Git,
        reference: &str,
        direction: Direction,
        transcript: &mut Transcript,
    ) -> Result<()> {
        let missing = |source| WorkspaceError::MissingRef {
            reference: reference.to_string(),
            source,
        };
        let known = git
            .remote_branch_exists(&self.root, reference)
            .await
            .map_err(missing)?;

        let output = match (direction, known) {
            (Direction::Push, true) => git.checkout(&self.root, Checkout::Track(reference)).await,
            (Direction::Push, false) => {
                info!("branch {reference:?} does not exist on remote yet, starting it");
                git.checkout(&self.root, Checkout::NewBranch(reference)).await
            }
            (Direction::Pull, true) => {
                transcript.record(git.fetch(&self.root, Some(reference)).await.map_err(missing)?);
                git.checkout(&self.root, Checkout::Detached("FETCH_HEAD")).await
            }
            (Direction::Pull, false) => {
                git.checkout(&self.root, Checkout::Detached(reference)).await
            }
        };
        transcript.record(output.map_err(missing)?);
        self.reference = reference.to_string();

        Ok(())
    }

    /// Clone repository and check out reference in one go.
    ///
    /// # Errors
    ///
    /// - Return [`WorkspaceError`] variants of [`Workspace::clone_from`] and
    ///   [`Workspace::checkout`].
    pub async fn prepare(
        git: &impl Git,
        repository: &str,
        reference: &str,
        direction: Direction,
        transcript: &mut Transcript,
    ) -> Result<Self> {
        let mut workspace = Self::clone_from(git, repository, transcript).await?;
        workspace.checkout(git, reference, direction, transcript).await?;
        Ok(workspace)
    }

    /// Root of working tree.
    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    /// Reference checked out, empty until [`Workspace::checkout`] succeeds.
    pub fn reference(&self) -> &str {
        self.reference.as_str()
    }

    /// Remove temporary directory now, reporting failure.
    ///
    /// Dropping the workspace removes it as well, silently.
    ///
    /// # Errors
    ///
    /// - Return [`WorkspaceError::Scratch`] if removal fails.
    pub fn cleanup(self) -> Result<()> {
        self.scratch.close().map_err(WorkspaceError::Scratch)
    }
}

/// Workspace error types.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    /// Temporary directory cannot be created or removed.
    #[error("failed to manage temporary workspace")]
    Scratch(#[source] std::io::Error),

    /// Repository cannot be cloned or fetched.
    #[error("repository {repository:?} is unreachable")]
    Unreachable {
        repository: String,
        #[source]
        source: GitError,
    },

    /// Reference cannot be checked out.
    #[error("reference {reference:?} cannot be checked out")]
    MissingRef {
        reference: String,
        #[source]
        source: GitError,
    },
}

/// Friendly result alias :3
pub type Result<T, E = WorkspaceError> = std::result::Result<T, E>;
