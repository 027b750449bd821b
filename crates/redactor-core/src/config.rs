// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration.

use serde::{Deserialize, Serialize};

use crate::error::{RedactorError, Result};

/// Key prefix under which every cache entry is persisted.
pub const DEFAULT_CACHE_NAMESPACE: &str = "redactor_secure_cache_";

/// How long a cached document stays readable.
pub const DEFAULT_ENTRY_TTL_HOURS: u32 = 8;

/// Longest entry lifetime accepted from configuration (30 days).
pub const MAX_ENTRY_TTL_HOURS: u32 = 30 * 24;

/// Persistent application settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Prefix for cache entry keys; panic clear wipes everything under it.
    pub cache_namespace: String,
    /// Lifetime of a cache entry in hours (default 8).
    pub entry_ttl_hours: u32,
    /// Keep ciphertext in an on-disk SQLite database rather than in memory.
    pub persistent_cache: bool,
    /// Allow the UI to spill temporary artifacts to the scratch directory.
    pub scratch_enabled: bool,
}

impl AppConfig {
    /// Entry lifetime as a `chrono::Duration`.
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.entry_ttl_hours))
    }

    /// Reject settings the cache cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.cache_namespace.is_empty() {
            return Err(RedactorError::Config(
                "cache_namespace must not be empty".into(),
            ));
        }
        if self.entry_ttl_hours == 0 {
            return Err(RedactorError::Config(
                "entry_ttl_hours must be at least 1".into(),
            ));
        }
        if self.entry_ttl_hours > MAX_ENTRY_TTL_HOURS {
            return Err(RedactorError::Config(format!(
                "entry_ttl_hours must be at most {MAX_ENTRY_TTL_HOURS}"
            )));
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_namespace: DEFAULT_CACHE_NAMESPACE.to_owned(),
            entry_ttl_hours: DEFAULT_ENTRY_TTL_HOURS,
            persistent_cache: true,
            scratch_enabled: true,
        }
    }
}
