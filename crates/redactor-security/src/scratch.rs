// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scratch area — temporary artifacts (rendered previews, exported redaction
// canvases) that the UI spills to disk while a document is open.  Every
// artifact carries a marker prefix so panic clear can find and remove it.

use std::fs;
use std::path::{Path, PathBuf};

use redactor_core::error::Result;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// File-name prefix identifying a scratch artifact.
pub const SCRATCH_MARKER: &str = "redactor-scratch-";

pub struct ScratchArea {
    dir: PathBuf,
}

impl ScratchArea {
    /// Use `dir` as the scratch directory, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        debug!(path = %dir.display(), "scratch area ready");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a marked artifact and return its path.
    ///
    /// `label` is reduced to `[A-Za-z0-9._-]` so it cannot escape the
    /// scratch directory.
    pub fn write(&self, label: &str, bytes: &[u8]) -> Result<PathBuf> {
        let label: String = label
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let path = self
            .dir
            .join(format!("{SCRATCH_MARKER}{}-{label}", Uuid::new_v4().simple()));
        fs::write(&path, bytes)?;
        debug!(path = %path.display(), len = bytes.len(), "scratch artifact written");
        Ok(path)
    }

    /// Paths of every marked artifact currently in the directory.
    pub fn artifacts(&self) -> Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if is_marked(&entry.file_name().to_string_lossy()) {
                found.push(entry.path());
            }
        }
        found.sort();
        Ok(found)
    }

    /// Remove every marked artifact. Best effort: failures are logged and
    /// skipped. Returns how many were removed.
    pub fn purge(&self) -> usize {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %self.dir.display(), error = %e, "scratch area unreadable");
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            if !is_marked(&entry.file_name().to_string_lossy()) {
                continue;
            }
            let path = entry.path();
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "scratch artifact not removed"),
            }
        }

        info!(removed, "scratch area purged");
        removed
    }
}

fn is_marked(name: &str) -> bool {
    name.starts_with(SCRATCH_MARKER)
}
