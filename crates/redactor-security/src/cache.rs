// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Secure document cache — document bytes encrypted under the session key,
// persisted as JSON records under a namespaced key, expiring after a fixed
// TTL, and wiped wholesale by panic clear.
//
// Reads never fail: an absent, expired, or undecryptable entry is a miss,
// and the latter two are removed on the spot.  Writes and panic clear
// report their failures.
//
// Every write captures the cache epoch before encrypting and persists only
// if the epoch is unchanged and no panic clear is running, checked under the
// store lock.  Panic clear advances the epoch under that same lock both when
// it starts and when it finishes, so no write that overlaps a wipe can
// repopulate the cache afterwards.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Duration;
use redactor_core::AppConfig;
use redactor_core::error::{RedactorError, Result};
use redactor_core::types::{CacheEntry, DocumentId, Lookup, SessionId, SessionInfo};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::scratch::ScratchArea;
use crate::session::SessionKeyManager;
use crate::store::{KeyValueStore, MemoryStore};

/// What a successful panic clear removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PanicClearReport {
    pub entries_removed: usize,
    pub transient_removed: usize,
    pub key_destroyed: bool,
    pub scratch_removed: usize,
}

/// An encrypted entry waiting for the store lock.
struct PendingWrite {
    epoch: u64,
    storage_key: String,
    record: String,
    entry: CacheEntry,
    session_id: SessionId,
    created_key: bool,
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Encrypted, expiring document cache bound to one session key manager.
///
/// Construct one per application and share it by `Arc`; all methods take
/// `&self`.
pub struct SecureCache {
    namespace: String,
    ttl: Duration,
    keys: SessionKeyManager,
    /// Durable entries (the cache namespace lives here).
    local: Mutex<Box<dyn KeyValueStore>>,
    /// Session-scoped transient state, cleared in bulk by panic clear.
    transient: Mutex<Box<dyn KeyValueStore>>,
    scratch: Option<ScratchArea>,
    clock: Arc<dyn Clock>,
    epoch: AtomicU64,
    /// Panic clears currently in progress.
    clearing: AtomicUsize,
}

impl SecureCache {
    /// Build a cache over `store` using the namespace and TTL from `config`.
    pub fn new(config: &AppConfig, store: impl KeyValueStore + 'static) -> Result<Self> {
        config.validate()?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        Ok(Self {
            namespace: config.cache_namespace.clone(),
            ttl: config.ttl(),
            keys: SessionKeyManager::new(Arc::clone(&clock)),
            local: Mutex::new(Box::new(store)),
            transient: Mutex::new(Box::new(MemoryStore::new())),
            scratch: None,
            clock,
            epoch: AtomicU64::new(0),
            clearing: AtomicUsize::new(0),
        })
    }

    /// Replace the time source. An active session key is kept.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.keys.set_clock(Arc::clone(&clock));
        self.clock = clock;
        self
    }

    /// Replace the in-memory transient store.
    pub fn with_transient_store(mut self, store: impl KeyValueStore + 'static) -> Self {
        self.transient = Mutex::new(Box::new(store));
        self
    }

    /// Attach a scratch area that panic clear will purge.
    pub fn with_scratch(mut self, scratch: ScratchArea) -> Self {
        self.scratch = Some(scratch);
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn scratch(&self) -> Option<&ScratchArea> {
        self.scratch.as_ref()
    }

    fn storage_key(&self, document_id: &DocumentId) -> String {
        format!("{}{}", self.namespace, document_id)
    }

    // -- Session -------------------------------------------------------------

    /// Start a new session key, making every existing entry unreadable.
    pub fn initialize_session(&self) -> Result<SessionInfo> {
        self.keys.initialize_session()?;
        Ok(self.keys.session_info())
    }

    pub fn session_info(&self) -> SessionInfo {
        self.keys.session_info()
    }

    // -- Entries -------------------------------------------------------------

    /// Encrypt `data` and store it under `document_id`, replacing any
    /// previous entry for that id.
    ///
    /// A session key is created if none exists.  Any failure after id
    /// validation is reported as `RedactorError::CacheWrite` and leaves no
    /// entry behind.
    #[instrument(skip_all, fields(document_id = %document_id, len = data.as_ref().len()))]
    pub fn cache_document(&self, document_id: &str, data: impl AsRef<[u8]>) -> Result<CacheEntry> {
        let document_id = DocumentId::new(document_id)?;
        let pending = self.seal(document_id, data.as_ref())?;
        self.commit(pending)
    }

    /// Encrypt and serialise an entry without touching the store.
    fn seal(&self, document_id: DocumentId, data: &[u8]) -> Result<PendingWrite> {
        let epoch = self.epoch.load(Ordering::SeqCst);

        let (key, created_key) = self
            .keys
            .ensure_session()
            .map_err(|e| RedactorError::CacheWrite(e.to_string()))?;
        let (ciphertext, iv) = key
            .encrypt(data)
            .map_err(|e| RedactorError::CacheWrite(e.to_string()))?;

        let now = self.clock.now();
        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| RedactorError::CacheWrite("entry expiry out of range".into()))?;
        let entry = CacheEntry {
            document_id,
            encrypted_data: STANDARD.encode(&ciphertext),
            iv: STANDARD.encode(iv),
            timestamp: now,
            expires_at,
        };
        let record = serde_json::to_string(&entry)
            .map_err(|e| RedactorError::CacheWrite(format!("serialize entry: {e}")))?;

        Ok(PendingWrite {
            epoch,
            storage_key: self.storage_key(&entry.document_id),
            record,
            entry,
            session_id: key.session_id(),
            created_key,
        })
    }

    /// Persist a sealed entry unless a panic clear ran since it was sealed
    /// or is running now.
    fn commit(&self, pending: PendingWrite) -> Result<CacheEntry> {
        let mut local = lock(&self.local);
        if self.epoch.load(Ordering::SeqCst) != pending.epoch
            || self.clearing.load(Ordering::SeqCst) > 0
        {
            drop(local);
            // A key this write created must not outlive the wipe.
            if pending.created_key {
                self.keys.destroy_if(pending.session_id);
            }
            warn!("panic clear ran during write, entry discarded");
            return Err(RedactorError::CacheWrite(
                "cache was wiped while the write was in flight".into(),
            ));
        }
        local
            .set_item(&pending.storage_key, &pending.record)
            .map_err(|e| RedactorError::CacheWrite(e.to_string()))?;
        drop(local);

        info!(
            session_id = %pending.session_id,
            expires_at = %pending.entry.expires_at,
            "document cached"
        );
        Ok(pending.entry)
    }

    /// Return the decrypted bytes for `document_id`, or `Lookup::Miss`.
    ///
    /// Expired entries, and entries that cannot be decrypted under the
    /// current session key, are removed and reported as misses.
    #[instrument(skip(self))]
    pub fn get_cached_document(&self, document_id: &str) -> Lookup {
        let Ok(document_id) = DocumentId::new(document_id) else {
            return Lookup::Miss;
        };
        let storage_key = self.storage_key(&document_id);

        let record = match lock(&self.local).get_item(&storage_key) {
            Ok(Some(record)) => record,
            Ok(None) => return Lookup::Miss,
            Err(e) => {
                warn!(error = %e, "cache read failed, treating as miss");
                return Lookup::Miss;
            }
        };

        let entry: CacheEntry = match serde_json::from_str(&record) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "unparsable cache record, discarding");
                self.discard(&storage_key, &record);
                return Lookup::Miss;
            }
        };

        if entry.is_expired(self.clock.now()) {
            debug!(expires_at = %entry.expires_at, "cache entry expired, discarding");
            self.discard(&storage_key, &record);
            return Lookup::Miss;
        }

        match self.decrypt_entry(&document_id, &entry) {
            Ok(plaintext) => {
                debug!(len = plaintext.len(), "cache hit");
                Lookup::Hit(plaintext)
            }
            Err(e) => {
                warn!(error = %e, "cache entry unreadable, discarding");
                self.discard(&storage_key, &record);
                Lookup::Miss
            }
        }
    }

    fn decrypt_entry(&self, document_id: &DocumentId, entry: &CacheEntry) -> Result<Vec<u8>> {
        if &entry.document_id != document_id {
            return Err(RedactorError::Decryption(format!(
                "record belongs to {}",
                entry.document_id
            )));
        }
        let key = self
            .keys
            .current()
            .ok_or_else(|| RedactorError::Decryption("no active session key".into()))?;
        let ciphertext = STANDARD
            .decode(&entry.encrypted_data)
            .map_err(|e| RedactorError::Decryption(format!("ciphertext encoding: {e}")))?;
        let iv = STANDARD
            .decode(&entry.iv)
            .map_err(|e| RedactorError::Decryption(format!("IV encoding: {e}")))?;
        key.decrypt(&ciphertext, &iv)
    }

    /// Remove `storage_key` if it still holds `record`, so a newer write
    /// that landed in the meantime survives.
    fn discard(&self, storage_key: &str, record: &str) {
        let mut local = lock(&self.local);
        let still_current = match local.get_item(storage_key) {
            Ok(current) => current.as_deref() == Some(record),
            Err(e) => {
                warn!(error = %e, "could not re-read entry for removal");
                return;
            }
        };
        if still_current {
            if let Err(e) = local.remove_item(storage_key) {
                warn!(error = %e, "could not remove stale cache entry");
            }
        }
    }

    /// Delete the entry for `document_id`. Absent ids are not an error.
    #[instrument(skip(self))]
    pub fn remove_cached_document(&self, document_id: &str) -> Result<()> {
        let Ok(document_id) = DocumentId::new(document_id) else {
            return Ok(());
        };
        let removed = lock(&self.local).remove_item(&self.storage_key(&document_id))?;
        debug!(removed, "cache entry removal");
        Ok(())
    }

    /// Ids of every stored entry, expired ones included, sorted.
    pub fn cached_document_ids(&self) -> Result<Vec<DocumentId>> {
        let keys = lock(&self.local).keys_with_prefix(&self.namespace)?;
        Ok(keys
            .iter()
            .filter_map(|k| k.strip_prefix(self.namespace.as_str()))
            .filter_map(|id| DocumentId::new(id).ok())
            .collect())
    }

    /// Remove every expired or unparsable entry. Returns how many went.
    #[instrument(skip(self))]
    pub fn sweep_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut local = lock(&self.local);
        let mut removed = 0;

        for key in local.keys_with_prefix(&self.namespace)? {
            let Some(record) = local.get_item(&key)? else {
                continue;
            };
            let stale = match serde_json::from_str::<CacheEntry>(&record) {
                Ok(entry) => entry.is_expired(now),
                Err(_) => true,
            };
            if stale && local.remove_item(&key)? {
                removed += 1;
            }
        }

        info!(removed, "expired cache entries swept");
        Ok(removed)
    }

    // -- Transient session state --------------------------------------------

    /// Stash session-scoped UI state (drafts, selections). Wiped by panic clear.
    pub fn set_transient(&self, key: &str, value: &str) -> Result<()> {
        lock(&self.transient).set_item(key, value)
    }

    pub fn transient(&self, key: &str) -> Result<Option<String>> {
        lock(&self.transient).get_item(key)
    }

    pub fn transient_keys(&self) -> Result<Vec<String>> {
        lock(&self.transient).keys()
    }

    // -- Panic clear ---------------------------------------------------------

    /// Wipe every cache entry, all transient state, the session key, and all
    /// scratch artifacts.
    ///
    /// Clearing an already-empty cache succeeds.  The key is destroyed even
    /// when a store fails; store failures are then reported as
    /// `RedactorError::PanicClear`.  Writes that overlap the wipe are
    /// discarded, and a key they created is destroyed with the rest.
    #[instrument(skip(self))]
    pub fn panic_clear(&self) -> Result<PanicClearReport> {
        let mut report = PanicClearReport::default();
        let mut failures = Vec::new();

        {
            let mut local = lock(&self.local);
            self.clearing.fetch_add(1, Ordering::SeqCst);
            self.epoch.fetch_add(1, Ordering::SeqCst);
            report.key_destroyed = self.keys.destroy();
            match local.remove_prefix(&self.namespace) {
                Ok(n) => report.entries_removed = n,
                Err(e) => failures.push(format!("cache storage: {e}")),
            }
        }

        match lock(&self.transient).clear() {
            Ok(n) => report.transient_removed = n,
            Err(e) => failures.push(format!("transient storage: {e}")),
        }

        if let Some(scratch) = &self.scratch {
            report.scratch_removed = scratch.purge();
        }

        {
            let _local = lock(&self.local);
            // A write sealed during the wipe may have created a key.
            if self.keys.destroy() {
                report.key_destroyed = true;
            }
            self.epoch.fetch_add(1, Ordering::SeqCst);
            self.clearing.fetch_sub(1, Ordering::SeqCst);
        }

        if !failures.is_empty() {
            let detail = failures.join("; ");
            error!(%detail, "panic clear incomplete");
            return Err(RedactorError::PanicClear(detail));
        }

        info!(
            entries = report.entries_removed,
            transient = report.transient_removed,
            key_destroyed = report.key_destroyed,
            scratch = report.scratch_removed,
            "panic clear complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::SqliteStore;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::mpsc;
    use std::thread;

    fn make_cache() -> SecureCache {
        SecureCache::new(&AppConfig::default(), MemoryStore::new()).expect("build cache")
    }

    fn make_cache_with_clock() -> (SecureCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap(),
        ));
        let cache = make_cache().with_clock(clock.clone());
        (cache, clock)
    }

    /// A store whose backend is unreachable.
    struct UnreachableStore;

    impl KeyValueStore for UnreachableStore {
        fn get_item(&self, _: &str) -> Result<Option<String>> {
            Err(RedactorError::Database("storage unavailable".into()))
        }
        fn set_item(&mut self, _: &str, _: &str) -> Result<()> {
            Err(RedactorError::Database("storage unavailable".into()))
        }
        fn remove_item(&mut self, _: &str) -> Result<bool> {
            Err(RedactorError::Database("storage unavailable".into()))
        }
        fn keys(&self) -> Result<Vec<String>> {
            Err(RedactorError::Database("storage unavailable".into()))
        }
        fn clear(&mut self) -> Result<usize> {
            Err(RedactorError::Database("storage unavailable".into()))
        }
    }

    /// A transient store whose `clear()` reports that it was entered and
    /// then waits to be resumed.
    struct GatedStore {
        inner: MemoryStore,
        entered: mpsc::Sender<()>,
        resume: mpsc::Receiver<()>,
    }

    impl KeyValueStore for GatedStore {
        fn get_item(&self, key: &str) -> Result<Option<String>> {
            self.inner.get_item(key)
        }
        fn set_item(&mut self, key: &str, value: &str) -> Result<()> {
            self.inner.set_item(key, value)
        }
        fn remove_item(&mut self, key: &str) -> Result<bool> {
            self.inner.remove_item(key)
        }
        fn keys(&self) -> Result<Vec<String>> {
            self.inner.keys()
        }
        fn clear(&mut self) -> Result<usize> {
            let _ = self.entered.send(());
            let _ = self.resume.recv();
            self.inner.clear()
        }
    }

    fn ids(cache: &SecureCache) -> Vec<String> {
        cache
            .cached_document_ids()
            .unwrap()
            .into_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn hello_round_trip_then_panic_clear() {
        let cache = make_cache();
        cache.cache_document("doc-1", "hello").unwrap();
        assert_eq!(
            cache.get_cached_document("doc-1"),
            Lookup::Hit(b"hello".to_vec())
        );

        cache.panic_clear().unwrap();
        assert_eq!(cache.get_cached_document("doc-1"), Lookup::Miss);
        assert!(cache.cached_document_ids().unwrap().is_empty());
        assert!(!cache.session_info().has_key);
    }

    #[test]
    fn round_trips_binary_and_empty_payloads() {
        let cache = make_cache();
        let binary: Vec<u8> = (0..=255u8).cycle().take(64 * 1024).collect();

        cache.cache_document("scan.pdf", &binary).unwrap();
        cache.cache_document("empty", b"").unwrap();

        assert_eq!(cache.get_cached_document("scan.pdf"), Lookup::Hit(binary));
        assert_eq!(cache.get_cached_document("empty"), Lookup::Hit(Vec::new()));
    }

    #[test]
    fn never_cached_is_miss() {
        let cache = make_cache();
        assert_eq!(cache.get_cached_document("nope"), Lookup::Miss);
        assert_eq!(cache.get_cached_document(""), Lookup::Miss);
    }

    #[test]
    fn empty_document_id_rejected() {
        let cache = make_cache();
        assert!(matches!(
            cache.cache_document("", "x"),
            Err(RedactorError::InvalidDocumentId)
        ));
        assert!(!cache.session_info().has_key);
    }

    #[test]
    fn first_write_creates_session_key() {
        let cache = make_cache();
        assert!(!cache.session_info().has_key);
        cache.cache_document("doc-1", "x").unwrap();
        let info = cache.session_info();
        assert!(info.has_key);
        assert!(info.session_id.is_some());
    }

    #[test]
    fn overwrite_replaces_previous_entry() {
        let cache = make_cache();
        cache.cache_document("doc-1", "v1").unwrap();
        cache.cache_document("doc-1", "v2").unwrap();
        assert_eq!(cache.get_cached_document("doc-1"), Lookup::Hit(b"v2".to_vec()));
        assert_eq!(ids(&cache), vec!["doc-1"]);
    }

    #[test]
    fn entries_get_distinct_ivs() {
        let cache = make_cache();
        let a = cache.cache_document("a", "same").unwrap();
        let b = cache.cache_document("b", "same").unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.encrypted_data, b.encrypted_data);
    }

    #[test]
    fn entry_expires_after_ttl() {
        let (cache, clock) = make_cache_with_clock();
        let entry = cache.cache_document("doc-1", "hello").unwrap();
        assert_eq!(entry.expires_at - entry.timestamp, Duration::hours(8));

        clock.set(entry.expires_at);
        assert!(cache.get_cached_document("doc-1").is_hit());

        clock.advance(Duration::seconds(1));
        assert_eq!(cache.get_cached_document("doc-1"), Lookup::Miss);
        assert!(ids(&cache).is_empty());
    }

    #[test]
    fn expired_entries_listed_until_swept() {
        let (cache, clock) = make_cache_with_clock();
        cache.cache_document("old", "1").unwrap();
        clock.advance(Duration::hours(4));
        cache.cache_document("new", "2").unwrap();

        clock.advance(Duration::hours(5));
        assert_eq!(ids(&cache), vec!["new", "old"]);

        assert_eq!(cache.sweep_expired().unwrap(), 1);
        assert_eq!(ids(&cache), vec!["new"]);
        assert!(cache.get_cached_document("new").is_hit());
        assert_eq!(cache.sweep_expired().unwrap(), 0);
    }

    #[test]
    fn new_session_makes_old_entries_miss() {
        let cache = make_cache();
        cache.cache_document("doc-1", "hello").unwrap();
        let before = cache.session_info().session_id;

        let after = cache.initialize_session().unwrap();
        assert_ne!(after.session_id, before);

        assert_eq!(cache.get_cached_document("doc-1"), Lookup::Miss);
        assert!(ids(&cache).is_empty(), "undecryptable entry should be removed");

        cache.cache_document("doc-1", "again").unwrap();
        assert_eq!(cache.get_cached_document("doc-1"), Lookup::Hit(b"again".to_vec()));
    }

    #[test]
    fn corrupted_record_is_miss_and_removed() {
        let mut store = MemoryStore::new();
        store
            .set_item("redactor_secure_cache_bad", "{not json")
            .unwrap();
        let cache = SecureCache::new(&AppConfig::default(), store).unwrap();

        assert_eq!(cache.get_cached_document("bad"), Lookup::Miss);
        assert!(ids(&cache).is_empty());
    }

    #[test]
    fn tampered_ciphertext_is_miss_and_removed() {
        let cache = make_cache();
        let mut entry = cache.cache_document("doc-1", "hello").unwrap();
        let mut raw = STANDARD.decode(&entry.encrypted_data).unwrap();
        raw[0] ^= 0x80;
        entry.encrypted_data = STANDARD.encode(raw);
        lock(&cache.local)
            .set_item(
                "redactor_secure_cache_doc-1",
                &serde_json::to_string(&entry).unwrap(),
            )
            .unwrap();

        assert_eq!(cache.get_cached_document("doc-1"), Lookup::Miss);
        assert!(ids(&cache).is_empty());
    }

    #[test]
    fn remove_missing_id_is_ok() {
        let cache = make_cache();
        cache.remove_cached_document("missing-id").unwrap();
        cache.remove_cached_document("").unwrap();
    }

    #[test]
    fn remove_deletes_entry() {
        let cache = make_cache();
        cache.cache_document("doc-1", "x").unwrap();
        cache.cache_document("doc-2", "y").unwrap();
        cache.remove_cached_document("doc-1").unwrap();
        assert_eq!(ids(&cache), vec!["doc-2"]);
        assert_eq!(cache.get_cached_document("doc-1"), Lookup::Miss);
    }

    #[test]
    fn panic_clear_on_empty_cache_succeeds() {
        let report = make_cache().panic_clear().unwrap();
        assert_eq!(report, PanicClearReport::default());
    }

    #[test]
    fn panic_clear_wipes_everything_in_namespace_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MemoryStore::new();
        store.set_item("unrelated_setting", "dark-mode").unwrap();

        let cache = SecureCache::new(&AppConfig::default(), store)
            .unwrap()
            .with_scratch(ScratchArea::open(dir.path()).unwrap());

        cache.cache_document("doc-1", "a").unwrap();
        cache.cache_document("doc-2", "b").unwrap();
        cache.set_transient("draft:doc-1", "[[10,10,50,20]]").unwrap();
        cache.scratch().unwrap().write("preview.png", b"img").unwrap();

        let report = cache.panic_clear().unwrap();
        assert_eq!(report.entries_removed, 2);
        assert_eq!(report.transient_removed, 1);
        assert!(report.key_destroyed);
        assert_eq!(report.scratch_removed, 1);

        assert!(ids(&cache).is_empty());
        assert!(cache.transient_keys().unwrap().is_empty());
        assert!(cache.scratch().unwrap().artifacts().unwrap().is_empty());
        assert_eq!(cache.session_info(), SessionInfo::absent());
        assert_eq!(
            lock(&cache.local).get_item("unrelated_setting").unwrap().as_deref(),
            Some("dark-mode")
        );
    }

    #[test]
    fn panic_clear_reports_unreachable_storage_and_still_drops_key() {
        let cache = SecureCache::new(&AppConfig::default(), UnreachableStore).unwrap();
        cache.initialize_session().unwrap();

        let err = cache.panic_clear().unwrap_err();
        assert!(matches!(err, RedactorError::PanicClear(_)));
        assert!(err.to_string().contains("storage unavailable"));
        assert!(!cache.session_info().has_key);
    }

    #[test]
    fn write_to_unreachable_storage_is_cache_write_error() {
        let cache = SecureCache::new(&AppConfig::default(), UnreachableStore).unwrap();
        assert!(matches!(
            cache.cache_document("doc-1", "x"),
            Err(RedactorError::CacheWrite(_))
        ));
        assert_eq!(cache.get_cached_document("doc-1"), Lookup::Miss);
    }

    #[test]
    fn write_overtaken_by_panic_clear_is_discarded() {
        let cache = make_cache();
        let pending = cache
            .seal(DocumentId::new("doc-1").unwrap(), b"in flight")
            .unwrap();
        assert!(pending.created_key);

        cache.panic_clear().unwrap();

        assert!(matches!(
            cache.commit(pending),
            Err(RedactorError::CacheWrite(_))
        ));
        assert!(ids(&cache).is_empty());
        assert!(!cache.session_info().has_key);
    }

    #[test]
    fn stale_write_does_not_destroy_a_newer_session() {
        let cache = make_cache();
        let pending = cache.seal(DocumentId::new("doc-1").unwrap(), b"x").unwrap();
        cache.panic_clear().unwrap();
        cache.cache_document("doc-2", "fresh").unwrap();

        assert!(cache.commit(pending).is_err());
        assert!(cache.session_info().has_key);
        assert_eq!(cache.get_cached_document("doc-2"), Lookup::Hit(b"fresh".to_vec()));
    }

    #[test]
    fn write_sealed_before_rotation_reads_as_miss() {
        let cache = make_cache();
        let pending = cache.seal(DocumentId::new("doc-1").unwrap(), b"x").unwrap();
        cache.initialize_session().unwrap();
        cache.commit(pending).unwrap();
        assert_eq!(cache.get_cached_document("doc-1"), Lookup::Miss);
    }

    #[test]
    fn write_during_panic_clear_does_not_survive_it() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (resume_tx, resume_rx) = mpsc::channel();
        let cache = make_cache().with_transient_store(GatedStore {
            inner: MemoryStore::new(),
            entered: entered_tx,
            resume: resume_rx,
        });
        cache.cache_document("doc-0", "before").unwrap();

        let (cleared, written) = thread::scope(|s| {
            let clear = s.spawn(|| cache.panic_clear());
            entered_rx.recv().unwrap();

            // The wipe is parked inside the transient store.
            let written = cache.cache_document("doc-1", "secret");
            resume_tx.send(()).unwrap();
            (clear.join().unwrap(), written)
        });

        let report = cleared.unwrap();
        assert_eq!(report.entries_removed, 1);
        assert!(report.key_destroyed);
        assert!(matches!(written, Err(RedactorError::CacheWrite(_))));
        assert!(ids(&cache).is_empty());
        assert!(!cache.session_info().has_key);

        cache.cache_document("doc-2", "after").unwrap();
        assert_eq!(cache.get_cached_document("doc-2"), Lookup::Hit(b"after".to_vec()));
    }

    #[test]
    fn write_sealed_during_panic_clear_is_discarded_after_it() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (resume_tx, resume_rx) = mpsc::channel();
        let cache = make_cache().with_transient_store(GatedStore {
            inner: MemoryStore::new(),
            entered: entered_tx,
            resume: resume_rx,
        });

        let (cleared, pending) = thread::scope(|s| {
            let clear = s.spawn(|| cache.panic_clear());
            entered_rx.recv().unwrap();
            let pending = cache.seal(DocumentId::new("doc-1").unwrap(), b"secret").unwrap();
            resume_tx.send(()).unwrap();
            (clear.join().unwrap(), pending)
        });

        cleared.unwrap();
        // The key created mid-wipe went with it.
        assert!(!cache.session_info().has_key);
        assert!(cache.commit(pending).is_err());
        assert!(ids(&cache).is_empty());
    }

    #[test]
    fn expiry_overflow_is_cache_write_error() {
        let clock = Arc::new(ManualClock::new(DateTime::<Utc>::MAX_UTC));
        let cache = make_cache().with_clock(clock);
        assert!(matches!(
            cache.cache_document("doc-1", "x"),
            Err(RedactorError::CacheWrite(_))
        ));
        assert!(ids(&cache).is_empty());
    }

    #[test]
    fn replacing_clock_keeps_active_session() {
        let cache = make_cache();
        cache.cache_document("doc-1", "hello").unwrap();
        let before = cache.session_info().session_id;

        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = cache.with_clock(clock);
        assert_eq!(cache.session_info().session_id, before);
        assert_eq!(cache.get_cached_document("doc-1"), Lookup::Hit(b"hello".to_vec()));
    }

    #[test]
    fn works_over_sqlite_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("cache.db")).unwrap();
        let cache = SecureCache::new(&AppConfig::default(), store).unwrap();

        cache.cache_document("doc-1", "hello").unwrap();
        assert_eq!(cache.get_cached_document("doc-1"), Lookup::Hit(b"hello".to_vec()));
        cache.panic_clear().unwrap();
        assert!(ids(&cache).is_empty());
    }

    #[test]
    fn persisted_record_layout() {
        let cache = make_cache();
        cache.cache_document("doc-1", "hello").unwrap();
        let record = lock(&cache.local)
            .get_item("redactor_secure_cache_doc-1")
            .unwrap()
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&record).unwrap();
        for field in ["documentId", "encryptedData", "iv", "timestamp", "expiresAt"] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
        assert!(!record.contains("hello"));
        assert_eq!(STANDARD.decode(json["iv"].as_str().unwrap()).unwrap().len(), 12);
    }
}
