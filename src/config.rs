// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the configuration file that Confkeep reads, and the
//! validated project records that the synchronization engine consumes.
//!
//! # General Layout
//!
//! The configuration file is a listing of named __projects__. Each project
//! names the remote repository to back up into, the branch to use, and a
//! table of __slots__. A slot binds a top-level name inside the repository
//! tree to a file or directory on the local file system.
//!
//! ```toml
//! [projects.shell]
//! repository = "git@example.org:me/backup.git"
//! branch = "shell"
//!
//! [projects.shell.paths]
//! bashrc = "~/.bashrc"
//! fish = "$XDG_CONFIG_HOME/fish"
//! ```

use crate::mirror::{Direction, Slot};

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Component, Path, PathBuf},
    str::FromStr,
};

/// Configuration file layout.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Project listing keyed by project name.
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectDefinition>,
}

impl Config {
    /// Load configuration file at target path.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if file cannot be read.
    /// - Return [`ConfigError::Deserialize`] if file content is not valid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        read_to_string(path)
            .map_err(|err| ConfigError::Read {
                source: err,
                path: path.to_path_buf(),
            })?
            .parse()
    }

    /// Resolve project names into validated project records.
    ///
    /// Projects are returned in the order their names were given. Every
    /// problem found across all requested projects is reported at once.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::UnknownProject`] if a name is not configured.
    /// - Return [`ConfigError::Invalid`] if any requested project is invalid.
    pub fn resolve(
        &self,
        names: impl IntoIterator<Item = impl AsRef<str>>,
        direction: Direction,
    ) -> Result<Vec<Project>> {
        let mut projects = Vec::new();
        let mut problems = Vec::new();

        for name in names {
            let name = name.as_ref();
            let definition = self
                .projects
                .get(name)
                .ok_or_else(|| ConfigError::UnknownProject(name.to_string()))?;
            problems.extend(definition.problems(name, direction));
            projects.push(definition.to_project(name));
        }

        if !problems.is_empty() {
            return Err(ConfigError::Invalid(problems));
        }

        Ok(projects)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: Config = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every local path.
        for definition in config.projects.values_mut() {
            for path in definition.paths.values_mut() {
                *path = PathBuf::from(
                    shellexpand::full(path.to_string_lossy().as_ref())
                        .map_err(ConfigError::ShellExpansion)?
                        .into_owned(),
                );
            }
        }

        Ok(config)
    }
}

impl Display for Config {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Project entry of configuration file.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ProjectDefinition {
    /// Location of remote repository to back up into.
    #[serde(default)]
    pub repository: String,

    /// Branch holding this project's files.
    #[serde(default)]
    pub branch: String,

    /// Slot name to local path mapping.
    #[serde(default)]
    pub paths: BTreeMap<String, PathBuf>,
}

impl ProjectDefinition {
    fn problems(&self, name: &str, direction: Direction) -> Vec<String> {
        let mut problems = Vec::new();

        if self.repository.trim().is_empty() {
            problems.push(format!("\"projects.{name}.repository\" is empty"));
        }

        if self.branch.trim().is_empty() {
            problems.push(format!("\"projects.{name}.branch\" is empty"));
        }

        for (slot, path) in &self.paths {
            if !is_valid_slot_name(slot) {
                problems.push(format!(
                    "\"projects.{name}.paths.{slot}\" is not a valid path name"
                ));
            } else if direction == Direction::Push && !path.exists() {
                problems.push(format!(
                    "\"projects.{name}.paths.{slot}\" ({}) does not exist",
                    path.display()
                ));
            }
        }

        problems
    }

    fn to_project(&self, name: &str) -> Project {
        Project {
            name: name.to_string(),
            repository: self.repository.clone(),
            branch: self.branch.clone(),
            slots: self
                .paths
                .iter()
                .map(|(slot, path)| Slot::new(slot, path))
                .collect(),
        }
    }
}

/// Slot names must be a single plain component that cannot escape or
/// clobber the repository's own metadata.
fn is_valid_slot_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) => part != ".git" && part == name,
        _ => false,
    }
}

/// Validated project record.
///
/// Read-only view of a project handed to the synchronization engine.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Project {
    /// Unique project name.
    pub name: String,

    /// Location of remote repository.
    pub repository: String,

    /// Configured branch.
    pub branch: String,

    /// Slots sorted by name.
    pub slots: Vec<Slot>,
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read configuration file at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Requested project is not configured.
    #[error("project {0:?} does not exist")]
    UnknownProject(String),

    /// Requested projects failed validation.
    #[error("invalid configuration:\n{}", .0.join("\n"))]
    Invalid(Vec<String>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
