// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use confkeep::{
    config::Config,
    git::GitCli,
    mirror::Direction,
    path::{default_config_path, NoWayHome, CONFIG_ENV},
    prompt::InquireConfirmation,
    sync::{Completion, ExitStatus, Orchestrator, Report, SyncError, SyncRequest},
};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::{path::PathBuf, process::ExitCode, time::Duration};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "confkeep [options] <push|pull> [options] <project>...",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, global = true, env = CONFIG_ENV, value_name = "path")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Push local paths of projects into their repositories.
    #[command(override_usage = "confkeep push [options] <project>...")]
    Push(SyncOptions),

    /// Pull repository content of projects onto local paths.
    #[command(override_usage = "confkeep pull [options] <project>...")]
    Pull(SyncOptions),
}

#[derive(Args, Clone, Debug)]
struct SyncOptions {
    /// Names of projects to process in order.
    #[arg(required = true, value_name = "project")]
    pub projects: Vec<String>,

    /// Branch, tag, or commit to use instead of configured branch.
    #[arg(short, long = "ref", value_name = "ref")]
    pub reference: Option<String>,

    /// Ask for confirmation before changing anything.
    #[arg(long, overrides_with = "no_ask")]
    pub ask: bool,

    /// Do not ask for confirmation.
    #[arg(long, overrides_with = "ask")]
    pub no_ask: bool,

    /// Print everything done for every project.
    #[arg(short, long)]
    pub verbose: bool,
}

impl SyncOptions {
    fn into_request(self) -> SyncRequest {
        SyncRequest {
            projects: self.projects,
            reference: self.reference,
            ask: self.ask || !self.no_ask,
            verbose: self.verbose,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    let cli = Cli::parse();
    let status = tokio::select! {
        status = run(cli) => status,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, dropping work in progress");
            ExitStatus::Interrupted
        }
    };

    status.into()
}

async fn run(cli: Cli) -> ExitStatus {
    match try_run(cli).await {
        Ok(status) => status,
        Err(error) => {
            error!("{error:#}");
            exit_status_of(&error)
        }
    }
}

fn exit_status_of(error: &anyhow::Error) -> ExitStatus {
    if let Some(err) = error.downcast_ref::<SyncError>() {
        err.exit_status()
    } else if error.downcast_ref::<NoWayHome>().is_some() {
        ExitStatus::InvalidConfig
    } else {
        ExitStatus::Unexpected
    }
}

async fn try_run(cli: Cli) -> Result<ExitStatus> {
    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = Config::load(&config_path).map_err(SyncError::from)?;

    let (direction, opts) = match cli.command {
        Command::Push(opts) => (Direction::Push, opts),
        Command::Pull(opts) => (Direction::Pull, opts),
    };
    let request = opts.into_request();

    let git = GitCli::locate().map_err(SyncError::from)?;
    let orchestrator = Orchestrator::new(git, config, InquireConfirmation)
        .with_progress(spinner()?);
    let completion = orchestrator.run(direction, &request).await?;

    match &completion {
        Completion::Declined => {}
        Completion::Finished(report) => summarize(report, request.verbose),
    }

    Ok(completion.exit_status())
}

fn spinner() -> Result<ProgressBar> {
    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template(
        "{elapsed_precise:.green}  {spinner:.yellow} {msg}",
    )?);
    bar.enable_steady_tick(Duration::from_millis(100));
    Ok(bar)
}

fn summarize(report: &Report, verbose: bool) {
    if verbose {
        for outcome in &report.outcomes {
            if let Some(transcript) = &outcome.transcript {
                println!("[{}]", outcome.project);
                for line in transcript.lines() {
                    println!("{line}");
                }
            }
        }
    }

    if report.is_success() {
        info!("Operation successfully completed.");
    } else {
        let failed = report
            .failed_projects()
            .iter()
            .map(|name| format!("{name:?}"))
            .collect::<Vec<_>>()
            .join(", ");
        error!("operation did not succeed for {failed}");
    }
}
