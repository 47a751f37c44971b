// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Bidirectional mirroring of configuration files with Git repositories.
//!
//! A __project__ binds named slots of a repository branch to paths on the
//! local machine. Pushing a project mirrors every local path into a fresh
//! clone of its repository, commits the result, and pushes the branch.
//! Pulling a project mirrors the repository's content back onto the local
//! paths. Both directions replace the destination exactly, so stale entries
//! are deleted along the way.
//!
//! Projects are processed one after another, each in its own disposable
//! workspace. A failing project never stops its siblings.

pub mod commit;
pub mod config;
pub mod git;
pub mod mirror;
pub mod path;
pub mod prompt;
pub mod sync;
pub mod transcript;
pub mod workspace;
