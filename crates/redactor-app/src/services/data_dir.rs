// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Data directory resolution.

use std::path::{Path, PathBuf};

/// Overrides the data directory (useful for kiosks and tests).
pub const DATA_DIR_ENV: &str = "REDACTOR_DATA_DIR";

/// Return the application data directory, creating it if needed.
pub fn data_dir() -> PathBuf {
    let dir = match std::env::var_os(DATA_DIR_ENV) {
        Some(dir) => PathBuf::from(dir),
        None => dirs_fallback().join("redactor"),
    };
    std::fs::create_dir_all(&dir).ok();
    dir
}

/// Return a subdirectory of `base` (e.g. "scratch"), creating it if needed.
pub fn subdir(base: &Path, name: &str) -> PathBuf {
    let dir = base.join(name);
    std::fs::create_dir_all(&dir).ok();
    dir
}

fn dirs_fallback() -> PathBuf {
    // Try XDG data dir, then fallback to home
    if let Some(xdg) = std::env::var_os("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    std::env::temp_dir()
}
