// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Per-project transcript of what the pipeline did.
//!
//! Every step of a project's pipeline records what it did here: captured
//! output of version-control commands, files put, entries deleted. The
//! transcript is shown to the user in verbose mode, and is attached to the
//! project's outcome either way.

use tracing::debug;

/// Ordered record of pipeline activity.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Transcript {
    lines: Vec<String>,
}

impl Transcript {
    /// Construct new empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a line of activity.
    ///
    /// Empty entries are dropped.
    pub fn record(&mut self, line: impl Into<String>) {
        let line = line.into();
        if line.trim().is_empty() {
            return;
        }

        debug!("{line}");
        self.lines.push(line);
    }

    /// Recorded lines in order.
    pub fn lines(&self) -> &[String] {
        self.lines.as_slice()
    }
}
