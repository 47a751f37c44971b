// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Commit and push of mirrored working trees.
//!
//! After a push mirror, every slot in the working tree is staged. An
//! unchanged tree produces no commit at all, and nothing gets pushed.
//! Otherwise the changes are committed with a deterministic message, then
//! the branch is pushed to `origin` with upstream tracking.

use crate::{
    git::{Git, GitError},
    mirror::Slot,
    transcript::Transcript,
    workspace::Workspace,
};

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

/// Result of committing a working tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Changes were committed with message.
    Committed { message: String },

    /// Working tree matched branch tip already.
    Unchanged,
}

/// Commit message for an automatic push of project at a point in time.
///
/// Format: `Auto push from YYYY-MM-DD HH:MM [<project>]`, always in UTC.
pub fn commit_message(project: &str, at: DateTime<Utc>) -> String {
    format!("Auto push from {} [{project}]", at.format("%Y-%m-%d %H:%M"))
}

/// Stage and commit slots in working tree of workspace.
///
/// Slots are staged forcefully, so ignore rules of the repository, of the
/// slots themselves, or of the user never drop mirrored files.
///
/// # Errors
///
/// - Return [`CommitError::Stage`] if staging or status inspection fails.
/// - Return [`CommitError::Commit`] if commit fails.
#[instrument(skip(git, workspace, slots, at, transcript), level = "debug")]
pub async fn commit_changes(
    git: &impl Git,
    workspace: &Workspace,
    project: &str,
    slots: &[Slot],
    at: DateTime<Utc>,
    transcript: &mut Transcript,
) -> Result<CommitOutcome> {
    let root = workspace.root();
    let entries = slots.iter().map(|slot| slot.name.as_str()).collect::<Vec<_>>();
    transcript.record(
        git.stage_all(root, &entries)
            .await
            .map_err(CommitError::Stage)?,
    );

    if git.status(root).await.map_err(CommitError::Stage)?.trim().is_empty() {
        info!("nothing changed for {project:?}, skipping commit");
        transcript.record("Nothing to commit");
        return Ok(CommitOutcome::Unchanged);
    }

    let message = commit_message(project, at);
    transcript.record(git.commit(root, &message).await.map_err(CommitError::Commit)?);
    let subject = git
        .log(root, "HEAD", "%s")
        .await
        .map_err(CommitError::Commit)?;
    transcript.record(format!("Committed as {subject:?}"));

    Ok(CommitOutcome::Committed { message })
}

/// Push checked out branch of workspace to `origin`.
///
/// # Errors
///
/// - Return [`CommitError::Push`] if remote rejects push.
#[instrument(skip(git, workspace, transcript), level = "debug")]
pub async fn push_branch(
    git: &impl Git,
    workspace: &Workspace,
    transcript: &mut Transcript,
) -> Result<()> {
    let branch = workspace.reference();
    let output = git
        .push(workspace.root(), branch)
        .await
        .map_err(|source| CommitError::Push {
            branch: branch.to_string(),
            source,
        })?;
    transcript.record(output);
    Ok(())
}

/// Commit and push error types.
#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    /// Changes cannot be staged or inspected.
    #[error("failed to stage changes")]
    Stage(#[source] GitError),

    /// Staged changes cannot be committed.
    #[error("failed to commit changes")]
    Commit(#[source] GitError),

    /// Branch cannot be pushed.
    #[error("failed to push branch {branch:?}")]
    Push {
        branch: String,
        #[source]
        source: GitError,
    },
}

/// Friendly result alias :3
pub type Result<T, E = CommitError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    #[test_case("test1", "2000-01-01T00:00:00Z", "Auto push from 2000-01-01 00:00 [test1]"; "frozen epoch")]
    #[test_case("dots", "2024-12-31T23:59:59Z", "Auto push from 2024-12-31 23:59 [dots]"; "seconds dropped")]
    #[test_case("x y", "1999-07-04T09:05:00Z", "Auto push from 1999-07-04 09:05 [x y]"; "zero padded")]
    #[test_case("tz", "2010-03-01T01:30:00+02:00", "Auto push from 2010-02-28 23:30 [tz]"; "converted to utc")]
    #[test]
    fn commit_message_format(project: &str, instant: &str, expect: &str) {
        let at = DateTime::parse_from_rfc3339(instant).unwrap().with_timezone(&Utc);
        pretty_assertions::assert_eq!(commit_message(project, at), expect);
    }
}
