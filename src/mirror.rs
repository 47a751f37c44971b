// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Mirror synchronization of slots.
//!
//! A __mirror__ makes a destination exactly equal to its source: files are
//! overwritten with source bytes, directories are copied recursively, and any
//! entry that exists only at the destination is deleted afterwards. Nothing is
//! hashed or deduplicated. A sync is a plain recursive byte copy, so running
//! it twice against an unchanged source changes no content.
//!
//! Every slot of a project is its own namespace at the top-level of the
//! repository tree. Entries at the destination root that are not bound to a
//! slot are never touched.
//!
//! Nested `.git` directories inside a slot are neither copied nor pruned.
//! A slot holding its own repository is mirrored by content only.

use crate::transcript::Transcript;

use ignore::WalkBuilder;
use std::{
    ffi::OsStr,
    fmt::{Display, Formatter, Result as FmtResult},
    fs,
    io,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument, warn};

/// Direction of synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Local file system into repository working tree.
    Push,

    /// Repository working tree into local file system.
    Pull,
}

impl Display for Direction {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Push => fmt.write_str("push"),
            Self::Pull => fmt.write_str("pull"),
        }
    }
}

/// One named mapping between a local path and a top-level repository entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    /// Name of entry at the top-level of the repository tree.
    pub name: String,

    /// Absolute path on local file system.
    pub local_path: PathBuf,
}

impl Slot {
    /// Construct new slot.
    pub fn new(name: impl Into<String>, local_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            local_path: local_path.into(),
        }
    }

    /// Determine source and destination of slot for a given direction.
    pub fn endpoints(&self, direction: Direction, root: &Path) -> (PathBuf, PathBuf) {
        let tracked = root.join(&self.name);
        match direction {
            Direction::Push => (self.local_path.clone(), tracked),
            Direction::Pull => (tracked, self.local_path.clone()),
        }
    }
}

/// Kind of entry a slot currently refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    File,
    Directory,
}

impl SlotKind {
    /// Probe kind of entry at path, following symbolic links.
    ///
    /// Returns [`None`] if nothing exists at path.
    pub fn probe(path: impl AsRef<Path>) -> Option<Self> {
        let metadata = fs::metadata(path.as_ref()).ok()?;
        if metadata.is_dir() {
            Some(Self::Directory)
        } else {
            Some(Self::File)
        }
    }
}

/// Summary of what a mirror changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MirrorReport {
    /// Files written at destination.
    pub put: Vec<PathBuf>,

    /// Entries removed from destination.
    pub deleted: Vec<PathBuf>,

    /// Slots skipped because their source is absent.
    pub skipped: Vec<String>,
}

impl MirrorReport {
    fn absorb(&mut self, other: MirrorReport) {
        self.put.extend(other.put);
        self.deleted.extend(other.deleted);
        self.skipped.extend(other.skipped);
    }
}

/// Mirror every slot of a project between working tree root and local file
/// system.
///
/// On push, a missing local source is a hard error, because upstream
/// validation promised it exists. On pull, a slot whose entry is missing from
/// the checked out tree is skipped with a warning, and the remaining slots are
/// still mirrored.
///
/// # Errors
///
/// - Return [`MirrorError::MissingSource`] if a push source vanished.
/// - Return [`MirrorError::Io`] or [`MirrorError::Walk`] on the first I/O
///   failure hit while copying or pruning.
#[instrument(skip(slots, root, transcript), level = "debug")]
pub fn apply(
    direction: Direction,
    slots: &[Slot],
    root: &Path,
    transcript: &mut Transcript,
) -> Result<MirrorReport> {
    let mut report = MirrorReport::default();

    for slot in slots {
        let (source, dest) = slot.endpoints(direction, root);
        if SlotKind::probe(&source).is_none() {
            match direction {
                Direction::Push => return Err(MirrorError::MissingSource { path: source }),
                Direction::Pull => {
                    let message = format!(
                        "Skipped {} because repository does not contain ./{}",
                        slot.local_path.display(),
                        slot.name
                    );
                    warn!("{message}");
                    transcript.record(message);
                    report.skipped.push(slot.name.clone());
                    continue;
                }
            }
        }

        debug!("mirror slot {:?} ({direction})", slot.name);
        report.absorb(mirror(&source, &dest, transcript)?);
    }

    Ok(report)
}

/// Make destination an exact copy of source.
///
/// Source may be a file or a directory. Destination entries of the wrong
/// kind are replaced, and entries absent from source are deleted.
///
/// # Errors
///
/// - Return [`MirrorError::MissingSource`] if source does not exist.
/// - Return [`MirrorError::Io`] or [`MirrorError::Walk`] on the first I/O
///   failure.
pub fn mirror(source: &Path, dest: &Path, transcript: &mut Transcript) -> Result<MirrorReport> {
    let mut report = MirrorReport::default();

    match SlotKind::probe(source) {
        None => {
            return Err(MirrorError::MissingSource {
                path: source.to_path_buf(),
            })
        }
        Some(SlotKind::File) => {
            put_file(source, dest, &mut report, transcript)?;
        }
        Some(SlotKind::Directory) => {
            copy_tree(source, dest, &mut report, transcript)?;
            prune(source, dest, &mut report, transcript)?;
        }
    }

    Ok(report)
}

fn put_file(
    source: &Path,
    dest: &Path,
    report: &mut MirrorReport,
    transcript: &mut Transcript,
) -> Result<()> {
    if SlotKind::probe(dest) == Some(SlotKind::Directory) {
        remove_entry(dest, report, transcript)?;
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|err| io_error(err, parent))?;
    }

    fs::copy(source, dest).map_err(|err| io_error(err, dest))?;
    transcript.record(format!("Put {} -> {}", source.display(), dest.display()));
    report.put.push(dest.to_path_buf());

    Ok(())
}

fn copy_tree(
    source: &Path,
    dest: &Path,
    report: &mut MirrorReport,
    transcript: &mut Transcript,
) -> Result<()> {
    let walker = WalkBuilder::new(source)
        .standard_filters(false)
        .follow_links(true)
        .filter_entry(|entry| entry.depth() == 0 || !is_git_dir(entry.file_name()))
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    // INVARIANT: Walker yields every directory before its children.
    for entry in walker {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|_| MirrorError::Escape {
                path: entry.path().to_path_buf(),
            })?;
        let target = if relative.as_os_str().is_empty() {
            dest.to_path_buf()
        } else {
            dest.join(relative)
        };

        match SlotKind::probe(entry.path()) {
            Some(SlotKind::Directory) => {
                if SlotKind::probe(&target) == Some(SlotKind::File) {
                    remove_entry(&target, report, transcript)?;
                }
                fs::create_dir_all(&target).map_err(|err| io_error(err, &target))?;
            }
            Some(SlotKind::File) => put_file(entry.path(), &target, report, transcript)?,
            // Dangling symbolic link.
            None => continue,
        }
    }

    Ok(())
}

fn prune(
    source: &Path,
    dest: &Path,
    report: &mut MirrorReport,
    transcript: &mut Transcript,
) -> Result<()> {
    let mut entries = fs::read_dir(dest)
        .map_err(|err| io_error(err, dest))?
        .collect::<io::Result<Vec<_>>>()
        .map_err(|err| io_error(err, dest))?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        if is_git_dir(&entry.file_name()) {
            continue;
        }

        let path = entry.path();
        let counterpart = source.join(entry.file_name());
        match (SlotKind::probe(&counterpart), SlotKind::probe(&path)) {
            (Some(SlotKind::Directory), Some(SlotKind::Directory)) => {
                prune(&counterpart, &path, report, transcript)?;
            }
            (Some(_), _) => continue,
            (None, _) => remove_entry(&path, report, transcript)?,
        }
    }

    Ok(())
}

fn remove_entry(path: &Path, report: &mut MirrorReport, transcript: &mut Transcript) -> Result<()> {
    let metadata = fs::symlink_metadata(path).map_err(|err| io_error(err, path))?;
    if metadata.is_dir() {
        fs::remove_dir_all(path).map_err(|err| io_error(err, path))?;
    } else {
        fs::remove_file(path).map_err(|err| io_error(err, path))?;
    }

    transcript.record(format!("Deleted {}", path.display()));
    report.deleted.push(path.to_path_buf());

    Ok(())
}

fn is_git_dir(name: &OsStr) -> bool {
    name == OsStr::new(".git")
}

fn io_error(source: io::Error, path: &Path) -> MirrorError {
    MirrorError::Io {
        source,
        path: path.to_path_buf(),
    }
}

/// Mirror error types.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// Source entry of a slot does not exist.
    #[error("source {:?} does not exist", path.display())]
    MissingSource { path: PathBuf },

    /// Walked entry is not contained by the walked source.
    #[error("entry {:?} escapes its source directory", path.display())]
    Escape { path: PathBuf },

    /// Directory traversal failed.
    #[error(transparent)]
    Walk(#[from] ignore::Error),

    /// File system operation failed.
    #[error("failed to mirror {:?}", path.display())]
    Io {
        #[source]
        source: io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = MirrorError> = std::result::Result<T, E>;
