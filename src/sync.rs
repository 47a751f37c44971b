// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Orchestration of push and pull across projects.
//!
//! An invocation names an ordered, non-empty list of projects. Each project
//! runs through its own pipeline, strictly one after another:
//!
//! ```text
//! PENDING -> PREPARING -> CHECKING-OUT -> SYNCING -> COMMITTING [-> PUSHING] -> SUCCEEDED  (push)
//! PENDING -> PREPARING -> FETCHING -> SYNCING -> SUCCEEDED                                (pull)
//!                       any step fails -> FAILED
//! ```
//!
//! Nothing is retried. The first failing step ends that project's pipeline
//! with a recorded diagnostic, and the next project starts regardless.
//! Changes made by projects that succeeded are kept even when siblings fail.
//!
//! Some problems abort the invocation before any project starts: a missing
//! `git` executable, a reference override combined with several projects,
//! and configuration that does not resolve.

use crate::{
    commit::{commit_changes, push_branch, CommitError, CommitOutcome},
    config::{Config, ConfigError, Project},
    git::{Git, GitError},
    mirror::{self, Direction, MirrorError, MirrorReport},
    prompt::{Confirmation, PromptError},
    transcript::Transcript,
    workspace::{Workspace, WorkspaceError},
};

use chrono::{DateTime, Utc};
use indicatif::ProgressBar;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
    process::ExitCode,
};
use tracing::{debug, error, info, instrument, warn};

/// Parameters of one push or pull invocation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    /// Project names in processing order.
    pub projects: Vec<String>,

    /// Reference overriding configured branch of the only project.
    pub reference: Option<String>,

    /// Ask for confirmation before mutating anything.
    pub ask: bool,

    /// Keep full transcript of every project in its outcome.
    pub verbose: bool,
}

impl SyncRequest {
    /// Construct new request for project names.
    pub fn new(projects: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            projects: projects.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_ask(mut self, ask: bool) -> Self {
        self.ask = ask;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Step of a project's pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pending,
    Preparing,
    Fetching,
    CheckingOut,
    Syncing,
    Committing,
    Pushing,
    Succeeded,
    Failed,
}

impl Display for Stage {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Self::Pending => "pending",
            Self::Preparing => "preparing",
            Self::Fetching => "fetching",
            Self::CheckingOut => "checking out",
            Self::Syncing => "syncing",
            Self::Committing => "committing",
            Self::Pushing => "pushing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        fmt.write_str(name)
    }
}

/// Terminal status of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Succeeded,
    Failed,
}

/// Terminal record of one project's pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Project name.
    pub project: String,

    /// Whether the pipeline finished.
    pub status: Status,

    /// Last stage entered; the failing one if the pipeline failed.
    pub stage: Stage,

    /// Error text with full cause chain if the pipeline failed.
    pub diagnostic: Option<String>,

    /// Slots skipped on pull because the checked out tree lacks them.
    pub skipped: Vec<String>,

    /// What happened at commit time on push.
    pub commit: Option<CommitOutcome>,

    /// Transcript of everything done, kept only in verbose mode.
    pub transcript: Option<Transcript>,
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        self.status == Status::Succeeded
    }
}

/// Aggregate of every project's outcome in processing order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub direction: Direction,
    pub outcomes: Vec<SyncOutcome>,
}

impl Report {
    /// Overall success only if every project succeeded.
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(SyncOutcome::is_success)
    }

    /// Names of failed projects in processing order.
    pub fn failed_projects(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|outcome| !outcome.is_success())
            .map(|outcome| outcome.project.as_str())
            .collect()
    }

    pub fn exit_status(&self) -> ExitStatus {
        if self.is_success() {
            ExitStatus::Success
        } else {
            ExitStatus::SyncFailed
        }
    }
}

/// How an invocation ended when no invocation-fatal error occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// User declined confirmation, nothing was touched.
    Declined,

    /// Every project ran.
    Finished(Report),
}

impl Completion {
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            Self::Declined => ExitStatus::Success,
            Self::Finished(report) => report.exit_status(),
        }
    }
}

/// Exit status classes visible to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Interrupted,
    InvalidConfig,
    ExecutableNotFound,
    UnknownProject,
    RefWithMultipleProjects,
    SyncFailed,
    Unexpected,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Interrupted => 130,
            Self::InvalidConfig => 201,
            Self::ExecutableNotFound => 202,
            Self::UnknownProject => 203,
            Self::RefWithMultipleProjects => 206,
            Self::SyncFailed => 220,
            Self::Unexpected => 255,
        }
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        ExitCode::from(status.code())
    }
}

/// Concrete effect of an invocation, shown before asking to proceed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preview {
    /// Branches to be updated, one line per repository and branch.
    Push(Vec<PushTarget>),

    /// Local paths to be overwritten.
    Pull(Vec<PullTarget>),
}

/// Repository branch updated by one or more projects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushTarget {
    pub repository: String,
    pub branch: String,
    pub projects: Vec<String>,
}

/// Local path overwritten by a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullTarget {
    pub path: PathBuf,
    pub project: String,
}

impl Preview {
    /// Compute preview of running direction over projects.
    pub fn new(direction: Direction, projects: &[Project], reference: Option<&str>) -> Self {
        match direction {
            Direction::Push => {
                let mut targets: Vec<PushTarget> = Vec::new();
                for project in projects {
                    let branch = reference.unwrap_or(project.branch.as_str());
                    match targets
                        .iter_mut()
                        .find(|t| t.repository == project.repository && t.branch == branch)
                    {
                        Some(target) => target.projects.push(project.name.clone()),
                        None => targets.push(PushTarget {
                            repository: project.repository.clone(),
                            branch: branch.to_string(),
                            projects: vec![project.name.clone()],
                        }),
                    }
                }
                Self::Push(targets)
            }
            Direction::Pull => Self::Pull(
                projects
                    .iter()
                    .flat_map(|project| {
                        project.slots.iter().map(|slot| PullTarget {
                            path: slot.local_path.clone(),
                            project: project.name.clone(),
                        })
                    })
                    .collect(),
            ),
        }
    }
}

impl Display for Preview {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Push(targets) => {
                writeln!(fmt, "Going to push into following branches:")?;
                for target in targets {
                    let projects = target
                        .projects
                        .iter()
                        .map(|name| format!("{name:?}"))
                        .collect::<Vec<_>>()
                        .join(", ");
                    writeln!(
                        fmt,
                        "- {:?} at {} (from {projects})",
                        target.branch, target.repository
                    )?;
                }
            }
            Self::Pull(targets) => {
                writeln!(fmt, "Following paths will most likely be replaced:")?;
                for target in targets {
                    writeln!(fmt, "- {} (from {:?})", target.path.display(), target.project)?;
                }
            }
        }

        Ok(())
    }
}

/// Drives push and pull of projects.
pub struct Orchestrator<G, C>
where
    G: Git,
    C: Confirmation,
{
    git: G,
    config: Config,
    confirmation: C,
    clock: Box<dyn Fn() -> DateTime<Utc>>,
    progress: ProgressBar,
}

impl<G, C> Orchestrator<G, C>
where
    G: Git,
    C: Confirmation,
{
    /// Construct new orchestrator over configuration read once up front.
    pub fn new(git: G, config: Config, confirmation: C) -> Self {
        Self {
            git,
            config,
            confirmation,
            clock: Box::new(Utc::now),
            progress: ProgressBar::hidden(),
        }
    }

    /// Use a different source of the current time for commit messages.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Report pipeline stages through progress bar.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Push local paths of projects into their repositories.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError`] if invocation cannot start at all.
    pub async fn push(&self, request: &SyncRequest) -> Result<Completion> {
        self.run(Direction::Push, request).await
    }

    /// Pull repository content of projects onto local paths.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError`] if invocation cannot start at all.
    pub async fn pull(&self, request: &SyncRequest) -> Result<Completion> {
        self.run(Direction::Pull, request).await
    }

    /// Run direction over every requested project.
    ///
    /// Per-project failures never escape; they are recorded in the report.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::NoProjects`] if no project was named.
    /// - Return [`SyncError::RefWithMultipleProjects`] if a reference override
    ///   accompanies several projects.
    /// - Return [`SyncError::Git`] if the version-control backend is missing.
    /// - Return [`SyncError::Config`] if projects do not resolve.
    /// - Return [`SyncError::Prompt`] if confirmation cannot be asked.
    #[instrument(skip(self, request), level = "debug")]
    pub async fn run(&self, direction: Direction, request: &SyncRequest) -> Result<Completion> {
        let completion = self.run_all(direction, request).await;
        self.progress.finish_and_clear();
        completion
    }

    async fn run_all(&self, direction: Direction, request: &SyncRequest) -> Result<Completion> {
        if request.projects.is_empty() {
            return Err(SyncError::NoProjects);
        }

        if request.reference.is_some() && request.projects.len() > 1 {
            return Err(SyncError::RefWithMultipleProjects);
        }

        self.git.ensure_available()?;
        let projects = self.config.resolve(&request.projects, direction)?;
        let reference = request.reference.as_deref();

        if request.ask {
            let preview = Preview::new(direction, &projects, reference);
            let proceed = self
                .progress
                .suspend(|| self.confirmation.confirm(&preview))?;
            if !proceed {
                info!("{direction} aborted, nothing was changed");
                return Ok(Completion::Declined);
            }
        }

        let mut outcomes = Vec::with_capacity(projects.len());
        for project in &projects {
            outcomes.push(
                self.run_project(direction, project, reference, request.verbose)
                    .await,
            );
        }

        Ok(Completion::Finished(Report {
            direction,
            outcomes,
        }))
    }

    async fn run_project(
        &self,
        direction: Direction,
        project: &Project,
        reference: Option<&str>,
        verbose: bool,
    ) -> SyncOutcome {
        let mut pipeline = Pipeline {
            project,
            stage: Stage::Pending,
            transcript: Transcript::new(),
            skipped: Vec::new(),
            commit: None,
        };

        let result = match direction {
            Direction::Push => self.push_project(&mut pipeline, reference).await,
            Direction::Pull => self.pull_project(&mut pipeline, reference).await,
        };

        let (status, diagnostic) = match result {
            Ok(()) => {
                self.enter(&mut pipeline, Stage::Succeeded);
                (Status::Succeeded, None)
            }
            Err(err) => {
                let diagnostic = format!("{:#}", anyhow::Error::from(err));
                error!(
                    "{direction} of {:?} failed while {}: {diagnostic}",
                    project.name, pipeline.stage
                );
                (Status::Failed, Some(diagnostic))
            }
        };

        SyncOutcome {
            project: project.name.clone(),
            status,
            stage: pipeline.stage,
            diagnostic,
            skipped: pipeline.skipped,
            commit: pipeline.commit,
            transcript: verbose.then_some(pipeline.transcript),
        }
    }

    async fn push_project(
        &self,
        pipeline: &mut Pipeline<'_>,
        reference: Option<&str>,
    ) -> Result<(), ProjectError> {
        let project = pipeline.project;
        let branch = reference.unwrap_or(project.branch.as_str());

        self.enter(pipeline, Stage::Preparing);
        let mut workspace =
            Workspace::clone_from(&self.git, &project.repository, &mut pipeline.transcript)
                .await?;

        self.enter(pipeline, Stage::CheckingOut);
        workspace
            .checkout(&self.git, branch, Direction::Push, &mut pipeline.transcript)
            .await?;

        self.enter(pipeline, Stage::Syncing);
        let report = mirror::apply(
            Direction::Push,
            &project.slots,
            workspace.root(),
            &mut pipeline.transcript,
        )?;
        summarize_mirror(project, &report);

        self.enter(pipeline, Stage::Committing);
        let at = (self.clock)();
        let outcome = commit_changes(
            &self.git,
            &workspace,
            &project.name,
            &project.slots,
            at,
            &mut pipeline.transcript,
        )
        .await?;
        if let CommitOutcome::Committed { .. } = outcome {
            self.enter(pipeline, Stage::Pushing);
            push_branch(&self.git, &workspace, &mut pipeline.transcript).await?;
        }
        pipeline.commit = Some(outcome);

        dispose(workspace);
        Ok(())
    }

    async fn pull_project(
        &self,
        pipeline: &mut Pipeline<'_>,
        reference: Option<&str>,
    ) -> Result<(), ProjectError> {
        let project = pipeline.project;
        let reference = reference.unwrap_or(project.branch.as_str());

        self.enter(pipeline, Stage::Preparing);
        let mut workspace =
            Workspace::clone_from(&self.git, &project.repository, &mut pipeline.transcript)
                .await?;

        self.enter(pipeline, Stage::Fetching);
        workspace
            .checkout(&self.git, reference, Direction::Pull, &mut pipeline.transcript)
            .await?;

        self.enter(pipeline, Stage::Syncing);
        let report = mirror::apply(
            Direction::Pull,
            &project.slots,
            workspace.root(),
            &mut pipeline.transcript,
        )?;
        summarize_mirror(project, &report);
        pipeline.skipped = report.skipped;

        dispose(workspace);
        Ok(())
    }

    fn enter(&self, pipeline: &mut Pipeline<'_>, stage: Stage) {
        debug!("{:?}: {} -> {stage}", pipeline.project.name, pipeline.stage);
        pipeline.stage = stage;
        self.progress
            .set_message(format!("{}: {stage}", pipeline.project.name));
        self.progress.tick();
    }
}

struct Pipeline<'a> {
    project: &'a Project,
    stage: Stage,
    transcript: Transcript,
    skipped: Vec<String>,
    commit: Option<CommitOutcome>,
}

fn summarize_mirror(project: &Project, report: &MirrorReport) {
    debug!(
        "{:?}: {} files put, {} entries deleted, {} slots skipped",
        project.name,
        report.put.len(),
        report.deleted.len(),
        report.skipped.len()
    );
}

fn dispose(workspace: Workspace) {
    if let Err(err) = workspace.cleanup() {
        warn!("failed to remove temporary workspace: {err}");
    }
}

/// Errors ending a single project's pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    Mirror(#[from] MirrorError),

    #[error(transparent)]
    Commit(#[from] CommitError),
}

/// Errors aborting a whole invocation before any project runs.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// No project was named.
    #[error("at least one project must be provided")]
    NoProjects,

    /// Reference override combined with several projects.
    #[error("--ref option cannot be used with multiple projects")]
    RefWithMultipleProjects,

    /// Version-control backend unavailable.
    #[error(transparent)]
    Git(#[from] GitError),

    /// Configuration does not resolve.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Confirmation cannot be asked.
    #[error(transparent)]
    Prompt(#[from] PromptError),
}

impl SyncError {
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            Self::NoProjects | Self::RefWithMultipleProjects => {
                ExitStatus::RefWithMultipleProjects
            }
            Self::Git(_) => ExitStatus::ExecutableNotFound,
            Self::Config(ConfigError::UnknownProject(_)) => ExitStatus::UnknownProject,
            Self::Config(_) => ExitStatus::InvalidConfig,
            Self::Prompt(PromptError::Interrupted) => ExitStatus::Interrupted,
            Self::Prompt(_) => ExitStatus::Unexpected,
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = SyncError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ProjectDefinition,
        git::{Checkout, Result as GitResult},
        prompt::AssumeYes,
    };
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use std::{
        cell::RefCell,
        collections::{BTreeMap, HashSet},
        fs,
        path::Path,
    };
    use tempfile::TempDir;

    /// In-memory stand-in for Git that records every call.
    #[derive(Default)]
    struct FakeGit {
        missing: bool,
        unreachable: HashSet<String>,
        calls: RefCell<Vec<String>>,
    }

    impl FakeGit {
        fn unreachable(repositories: &[&str]) -> Self {
            Self {
                unreachable: repositories.iter().map(|r| r.to_string()).collect(),
                ..Self::default()
            }
        }

        fn missing() -> Self {
            Self {
                missing: true,
                ..Self::default()
            }
        }

        fn log_call(&self, call: impl Into<String>) {
            self.calls.borrow_mut().push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    impl Git for FakeGit {
        fn ensure_available(&self) -> GitResult<()> {
            self.log_call("ensure_available");
            if self.missing {
                return Err(GitError::ExecutableNotFound {
                    program: "git".into(),
                });
            }
            Ok(())
        }

        async fn clone_repo(&self, repository: &str, into: &Path) -> GitResult<String> {
            self.log_call(format!("clone {repository}"));
            if self.unreachable.contains(repository) {
                return Err(GitError::Command {
                    command: format!("git clone {repository}"),
                    output: "fatal: repository not found".into(),
                });
            }
            fs::create_dir_all(into).unwrap();
            Ok(String::new())
        }

        async fn fetch(&self, _: &Path, reference: Option<&str>) -> GitResult<String> {
            self.log_call(format!("fetch {reference:?}"));
            Ok(String::new())
        }

        async fn remote_branch_exists(&self, _: &Path, _: &str) -> GitResult<bool> {
            Ok(false)
        }

        async fn checkout(&self, _: &Path, target: Checkout<'_>) -> GitResult<String> {
            self.log_call(format!("checkout {target:?}"));
            Ok(String::new())
        }

        async fn stage_all(&self, _: &Path, entries: &[&str]) -> GitResult<String> {
            self.log_call(format!("stage {}", entries.join(" ")));
            Ok(String::new())
        }

        async fn status(&self, _: &Path) -> GitResult<String> {
            Ok("A  file".into())
        }

        async fn commit(&self, _: &Path, message: &str) -> GitResult<String> {
            self.log_call(format!("commit {message}"));
            Ok(String::new())
        }

        async fn push(&self, _: &Path, branch: &str) -> GitResult<String> {
            self.log_call(format!("push {branch}"));
            Ok(String::new())
        }

        async fn log(&self, _: &Path, _: &str, _: &str) -> GitResult<String> {
            Ok("subject".into())
        }
    }

    /// Confirmation stub answering fixed value and keeping shown preview.
    struct Answer {
        proceed: bool,
        shown: RefCell<Option<String>>,
    }

    impl Answer {
        fn new(proceed: bool) -> Self {
            Self {
                proceed,
                shown: RefCell::new(None),
            }
        }
    }

    impl Confirmation for Answer {
        fn confirm(&self, preview: &Preview) -> crate::prompt::Result<bool> {
            *self.shown.borrow_mut() = Some(preview.to_string());
            Ok(self.proceed)
        }
    }

    fn project(repository: &str, branch: &str, paths: &[(&str, &Path)]) -> ProjectDefinition {
        ProjectDefinition {
            repository: repository.into(),
            branch: branch.into(),
            paths: paths
                .iter()
                .map(|(name, path)| (name.to_string(), path.to_path_buf()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn config(projects: Vec<(&str, ProjectDefinition)>) -> Config {
        Config {
            projects: projects
                .into_iter()
                .map(|(name, definition)| (name.to_string(), definition))
                .collect(),
        }
    }

    #[tokio::test]
    async fn ref_override_with_many_projects_touches_nothing() {
        let config = config(vec![
            ("test1", project("some", "some", &[])),
            ("test2", project("some", "some", &[])),
        ]);
        let orchestrator = Orchestrator::new(FakeGit::default(), config, AssumeYes);
        let request = SyncRequest::new(["test1", "test2"]).with_reference("someref");

        for direction in [Direction::Push, Direction::Pull] {
            let result = orchestrator.run(direction, &request).await;
            assert!(matches!(result, Err(SyncError::RefWithMultipleProjects)));
        }
        assert!(orchestrator.git.calls().is_empty());
        assert_eq!(
            SyncError::RefWithMultipleProjects.exit_status().code(),
            206
        );
    }

    #[tokio::test]
    async fn empty_project_list_is_rejected() {
        let orchestrator = Orchestrator::new(FakeGit::default(), Config::default(), AssumeYes);
        let result = orchestrator.push(&SyncRequest::default()).await;
        assert!(matches!(result, Err(SyncError::NoProjects)));
    }

    #[tokio::test]
    async fn missing_executable_is_invocation_fatal() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let rc = tmp.path().join("rc");
        fs::write(&rc, "rc")?;
        let config = config(vec![("test1", project("repo", "main", &[("rc", &rc)]))]);
        let orchestrator = Orchestrator::new(FakeGit::missing(), config, AssumeYes);

        for direction in [Direction::Push, Direction::Pull] {
            let Err(err) = orchestrator.run(direction, &SyncRequest::new(["test1"])).await else {
                panic!("expected missing executable");
            };
            assert!(matches!(err, SyncError::Git(GitError::ExecutableNotFound { .. })));
            assert_eq!(err.exit_status().code(), 202);
        }
        assert_eq!(
            orchestrator.git.calls(),
            vec!["ensure_available".to_string(), "ensure_available".to_string()]
        );

        Ok(())
    }

    #[tokio::test]
    async fn progress_is_cleared_on_every_exit_path() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let rc = tmp.path().join("rc");
        fs::write(&rc, "rc")?;
        let config = config(vec![("test1", project("repo", "main", &[("rc", &rc)]))]);

        let declined = ProgressBar::hidden();
        let orchestrator = Orchestrator::new(FakeGit::default(), config.clone(), Answer::new(false))
            .with_progress(declined.clone());
        orchestrator
            .push(&SyncRequest::new(["test1"]).with_ask(true))
            .await?;
        assert!(declined.is_finished());

        let fatal = ProgressBar::hidden();
        let orchestrator = Orchestrator::new(FakeGit::missing(), config, AssumeYes)
            .with_progress(fatal.clone());
        assert!(orchestrator.push(&SyncRequest::new(["test1"])).await.is_err());
        assert!(fatal.is_finished());

        Ok(())
    }

    #[tokio::test]
    async fn push_stages_only_slot_entries() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let rc = tmp.path().join("rc");
        let app = tmp.path().join("app");
        fs::write(&rc, "rc")?;
        fs::create_dir_all(&app)?;
        let config = config(vec![(
            "test1",
            project("repo", "main", &[("rc", &rc), ("app", &app)]),
        )]);
        let orchestrator = Orchestrator::new(FakeGit::default(), config, AssumeYes);

        orchestrator.push(&SyncRequest::new(["test1"])).await?;
        assert!(orchestrator.git.calls().contains(&"stage app rc".to_string()));

        Ok(())
    }

    #[tokio::test]
    async fn unknown_project_is_invocation_fatal() {
        let orchestrator = Orchestrator::new(FakeGit::default(), Config::default(), AssumeYes);
        let result = orchestrator.pull(&SyncRequest::new(["ghost"])).await;
        let Err(err) = result else {
            panic!("expected unknown project");
        };
        assert_eq!(err.exit_status(), ExitStatus::UnknownProject);
        assert_eq!(orchestrator.git.calls(), vec!["ensure_available".to_string()]);
    }

    #[tokio::test]
    async fn declined_confirmation_mutates_nothing() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let rc = tmp.path().join("rc");
        fs::write(&rc, "rc")?;
        let config = config(vec![("test1", project("repo", "main", &[("rc", &rc)]))]);
        let orchestrator = Orchestrator::new(FakeGit::default(), config, Answer::new(false));

        let completion = orchestrator
            .push(&SyncRequest::new(["test1"]).with_ask(true))
            .await?;

        assert_eq!(completion, Completion::Declined);
        assert_eq!(completion.exit_status(), ExitStatus::Success);
        assert_eq!(orchestrator.git.calls(), vec!["ensure_available".to_string()]);

        Ok(())
    }

    #[tokio::test]
    async fn failing_projects_do_not_stop_siblings() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let rc = tmp.path().join("rc");
        fs::write(&rc, "rc")?;
        let config = config(vec![
            ("test1", project("invalid/one", "main", &[("rc", &rc)])),
            ("test2", project("valid", "main", &[("rc", &rc)])),
            ("test3", project("invalid/three", "main", &[("rc", &rc)])),
        ]);
        let git = FakeGit::unreachable(&["invalid/one", "invalid/three"]);
        let orchestrator = Orchestrator::new(git, config, AssumeYes);

        let Completion::Finished(report) = orchestrator
            .push(&SyncRequest::new(["test1", "test2", "test3"]))
            .await?
        else {
            panic!("expected finished report");
        };

        assert!(!report.is_success());
        assert_eq!(report.exit_status(), ExitStatus::SyncFailed);
        assert_eq!(report.failed_projects(), vec!["test1", "test3"]);
        assert_eq!(report.outcomes[0].stage, Stage::Preparing);
        assert_eq!(report.outcomes[1].stage, Stage::Succeeded);
        assert!(report.outcomes[0]
            .diagnostic
            .as_deref()
            .unwrap()
            .contains("repository \"invalid/one\" is unreachable"));
        assert!(orchestrator.git.calls().contains(&"push main".to_string()));

        Ok(())
    }

    #[tokio::test]
    async fn commit_message_uses_injected_clock() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let rc = tmp.path().join("rc");
        fs::write(&rc, "rc")?;
        let config = config(vec![("test1", project("repo", "main", &[("rc", &rc)]))]);
        let frozen = DateTime::parse_from_rfc3339("2000-01-01T00:00:00Z")?.with_timezone(&Utc);
        let orchestrator =
            Orchestrator::new(FakeGit::default(), config, AssumeYes).with_clock(move || frozen);

        let Completion::Finished(report) =
            orchestrator.push(&SyncRequest::new(["test1"])).await?
        else {
            panic!("expected finished report");
        };

        assert_eq!(
            report.outcomes[0].commit,
            Some(CommitOutcome::Committed {
                message: "Auto push from 2000-01-01 00:00 [test1]".into()
            })
        );
        assert!(orchestrator
            .git
            .calls()
            .contains(&"checkout NewBranch(\"main\")".to_string()));

        Ok(())
    }

    #[tokio::test]
    async fn verbose_keeps_transcript() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let rc = tmp.path().join("rc");
        fs::write(&rc, "rc")?;
        let config = config(vec![("test1", project("repo", "main", &[("rc", &rc)]))]);
        let orchestrator = Orchestrator::new(FakeGit::default(), config, AssumeYes);

        let Completion::Finished(quiet) = orchestrator.push(&SyncRequest::new(["test1"])).await?
        else {
            panic!("expected finished report");
        };
        assert_eq!(quiet.outcomes[0].transcript, None);

        let Completion::Finished(loud) = orchestrator
            .push(&SyncRequest::new(["test1"]).with_verbose(true))
            .await?
        else {
            panic!("expected finished report");
        };
        let transcript = loud.outcomes[0].transcript.clone().unwrap();
        assert!(transcript.lines().iter().any(|l| l.starts_with("Fetched ")));
        assert!(transcript.lines().iter().any(|l| l.starts_with("Put ")));
        assert!(transcript
            .lines()
            .iter()
            .any(|l| l == "Committed as \"subject\""));

        Ok(())
    }

    #[test]
    fn push_preview_merges_shared_targets() {
        let projects = vec![
            Project {
                name: "a".into(),
                repository: "repo".into(),
                branch: "main".into(),
                slots: vec![],
            },
            Project {
                name: "b".into(),
                repository: "repo".into(),
                branch: "main".into(),
                slots: vec![],
            },
            Project {
                name: "c".into(),
                repository: "repo".into(),
                branch: "dev".into(),
                slots: vec![],
            },
        ];

        let result = Preview::new(Direction::Push, &projects, None).to_string();
        let expect = indoc! {r#"
            Going to push into following branches:
            - "main" at repo (from "a", "b")
            - "dev" at repo (from "c")
        "#};
        assert_eq!(result, expect);
    }

    #[test]
    fn pull_preview_lists_every_path() {
        let projects = vec![Project {
            name: "test1".into(),
            repository: "repo".into(),
            branch: "main".into(),
            slots: vec![
                crate::mirror::Slot::new("a", "/home/me/a"),
                crate::mirror::Slot::new("b", "/home/me/b"),
            ],
        }];

        let result = Preview::new(Direction::Pull, &projects, None).to_string();
        let expect = indoc! {r#"
            Following paths will most likely be replaced:
            - /home/me/a (from "test1")
            - /home/me/b (from "test1")
        "#};
        assert_eq!(result, expect);
    }

    #[tokio::test]
    async fn confirmation_sees_reference_override() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let rc = tmp.path().join("rc");
        fs::write(&rc, "rc")?;
        let config = config(vec![("test1", project("repo", "main", &[("rc", &rc)]))]);
        let answer = Answer::new(false);
        let orchestrator = Orchestrator::new(FakeGit::default(), config, answer);

        orchestrator
            .push(
                &SyncRequest::new(["test1"])
                    .with_reference("feature")
                    .with_ask(true),
            )
            .await?;

        let shown = orchestrator.confirmation.shown.borrow().clone().unwrap();
        assert!(shown.contains("- \"feature\" at repo (from \"test1\")"));

        Ok(())
    }
}
