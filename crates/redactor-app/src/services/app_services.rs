// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service layer — builds the secure cache once at startup and
// provides async-friendly methods for the front-end to call.
//
// The cache is synchronous (rusqlite underneath), so every call that can
// touch storage runs on `tokio::task::spawn_blocking`.  `SecureCache` is
// `Sync`, so one `Arc` is shared by every task.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use redactor_core::AppConfig;
use redactor_core::error::{RedactorError, Result};
use redactor_core::types::{CacheEntry, DocumentId, Lookup, SessionInfo};
use redactor_security::{
    MemoryStore, PanicClearReport, ScratchArea, SecureCache, SqliteStore, generate_hash,
};
use tracing::{info, warn};

use super::data_dir;

const CACHE_DB_FILE: &str = "cache.db";
const SCRATCH_DIR: &str = "scratch";

/// Result of an upload: the cache entry plus the content digest the
/// workflow records for later integrity checks.
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    pub entry: CacheEntry,
    pub hash: String,
    pub len: usize,
}

/// Shared application services. Cheap to clone.
#[derive(Clone)]
pub struct AppServices {
    cache: Arc<SecureCache>,
    data_dir: PathBuf,
    config: Arc<Mutex<AppConfig>>,
}

impl AppServices {
    /// Initialise all services.  Call once at app startup.
    pub fn init() -> Result<Self> {
        Self::open(data_dir::data_dir())
    }

    /// Initialise services rooted at `dir`.
    ///
    /// Loads `config.json` (or defaults), opens the cache database, attaches
    /// the scratch area, and sweeps expired entries left by earlier runs.
    pub fn open(dir: PathBuf) -> Result<Self> {
        info!(path = %dir.display(), "initialising app services");

        let config = load_config(&dir).unwrap_or_default();
        config.validate()?;

        let mut cache = if config.persistent_cache {
            SecureCache::new(&config, SqliteStore::open(dir.join(CACHE_DB_FILE))?)?
        } else {
            SecureCache::new(&config, SqliteStore::open_in_memory()?)?
        };
        if config.scratch_enabled {
            cache = cache.with_scratch(ScratchArea::open(data_dir::subdir(&dir, SCRATCH_DIR))?);
        }

        let swept = cache.sweep_expired()?;
        info!(swept, "app services initialised");

        Ok(Self {
            cache: Arc::new(cache),
            data_dir: dir,
            config: Arc::new(Mutex::new(config)),
        })
    }

    /// Purely in-memory services for when the data directory is unusable.
    pub fn fallback() -> Result<Self> {
        let config = AppConfig {
            persistent_cache: false,
            scratch_enabled: false,
            ..AppConfig::default()
        };
        let cache = SecureCache::new(&config, MemoryStore::new())?;
        warn!("running with in-memory cache only");

        Ok(Self {
            cache: Arc::new(cache),
            data_dir: std::env::temp_dir(),
            config: Arc::new(Mutex::new(config)),
        })
    }

    // -- Cache ---------------------------------------------------------------

    /// Read a file from the upload flow, fingerprint it, and cache it.
    pub async fn upload(&self, document_id: String, path: PathBuf) -> Result<UploadReceipt> {
        let bytes = tokio::fs::read(&path).await?;
        let hash = generate_hash(&bytes);
        let len = bytes.len();
        let entry = self.cache_document(document_id, bytes).await?;
        Ok(UploadReceipt { entry, hash, len })
    }

    pub async fn cache_document(&self, document_id: String, bytes: Vec<u8>) -> Result<CacheEntry> {
        let cache = Arc::clone(&self.cache);
        tokio::task::spawn_blocking(move || cache.cache_document(&document_id, bytes))
            .await
            .map_err(|e| RedactorError::CacheWrite(format!("write task failed: {e}")))?
    }

    /// Fetch decrypted bytes; any failure reads as a miss.
    pub async fn get_cached_document(&self, document_id: String) -> Lookup {
        let cache = Arc::clone(&self.cache);
        match tokio::task::spawn_blocking(move || cache.get_cached_document(&document_id)).await {
            Ok(lookup) => lookup,
            Err(e) => {
                warn!(error = %e, "read task failed, treating as miss");
                Lookup::Miss
            }
        }
    }

    pub async fn remove_cached_document(&self, document_id: String) -> Result<()> {
        let cache = Arc::clone(&self.cache);
        tokio::task::spawn_blocking(move || cache.remove_cached_document(&document_id))
            .await
            .map_err(|e| RedactorError::Database(format!("remove task failed: {e}")))?
    }

    pub async fn cached_document_ids(&self) -> Result<Vec<DocumentId>> {
        let cache = Arc::clone(&self.cache);
        tokio::task::spawn_blocking(move || cache.cached_document_ids())
            .await
            .map_err(|e| RedactorError::Database(format!("list task failed: {e}")))?
    }

    pub async fn sweep_expired(&self) -> Result<usize> {
        let cache = Arc::clone(&self.cache);
        tokio::task::spawn_blocking(move || cache.sweep_expired())
            .await
            .map_err(|e| RedactorError::Database(format!("sweep task failed: {e}")))?
    }

    /// Wipe everything. A failure here must reach the user.
    pub async fn panic_clear(&self) -> Result<PanicClearReport> {
        let cache = Arc::clone(&self.cache);
        tokio::task::spawn_blocking(move || cache.panic_clear())
            .await
            .map_err(|e| RedactorError::PanicClear(format!("wipe task failed: {e}")))?
    }

    // -- Session -------------------------------------------------------------

    pub fn session_info(&self) -> SessionInfo {
        self.cache.session_info()
    }

    /// Rotate the session key; every cached document becomes a miss.
    pub fn initialize_session(&self) -> Result<SessionInfo> {
        self.cache.initialize_session()
    }

    // -- Transient state and scratch -----------------------------------------

    pub fn set_transient(&self, key: &str, value: &str) -> Result<()> {
        self.cache.set_transient(key, value)
    }

    pub fn transient_entries(&self) -> Result<Vec<(String, String)>> {
        let mut entries = Vec::new();
        for key in self.cache.transient_keys()? {
            if let Some(value) = self.cache.transient(&key)? {
                entries.push((key, value));
            }
        }
        Ok(entries)
    }

    /// Write a temporary artifact, e.g. a rendered preview. `None` when the
    /// scratch area is disabled.
    pub fn write_scratch(&self, label: &str, bytes: &[u8]) -> Result<Option<PathBuf>> {
        match self.cache.scratch() {
            Some(scratch) => Ok(Some(scratch.write(label, bytes)?)),
            None => Ok(None),
        }
    }

    // -- Config Persistence --------------------------------------------------

    /// Get a clone of the current config.
    pub fn config(&self) -> AppConfig {
        self.config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Validate and persist the config. Takes effect on next start.
    pub fn save_config(&self, config: &AppConfig) -> Result<()> {
        config.validate()?;
        persist_config(&self.data_dir, config)?;
        *self.config.lock().unwrap_or_else(PoisonError::into_inner) = config.clone();
        Ok(())
    }

    /// Path to the data directory.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

// -- Config file persistence -------------------------------------------------

const CONFIG_FILE: &str = "config.json";

fn load_config(data_dir: &Path) -> Option<AppConfig> {
    let path = data_dir.join(CONFIG_FILE);
    let data = std::fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&data) {
        Ok(config) => Some(config),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable config");
            None
        }
    }
}

fn persist_config(data_dir: &Path, config: &AppConfig) -> Result<()> {
    let path = data_dir.join(CONFIG_FILE);
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, json)?;
    Ok(())
}
