// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Session keys — one AES-256-GCM key per session, held only in memory.
//
// Each session draws a random key and a random 96-bit session IV from the
// OS CSPRNG.  Per-encryption IVs are derived from the session IV by XOR-ing
// a 64-bit counter into its last eight bytes, so no IV repeats under a key.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use redactor_core::error::{RedactorError, Result};
use redactor_core::types::{SessionId, SessionInfo};
use ring::aead::{AES_256_GCM, Aad, LessSafeKey, NONCE_LEN, Nonce, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};
use tracing::{debug, info, instrument};
use zeroize::Zeroizing;

use crate::clock::{Clock, SystemClock};

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;

/// AES-GCM IV length in bytes (96 bits).
pub const IV_LEN: usize = NONCE_LEN;

/// Bytes of the IV that the per-entry counter is mixed into.
const COUNTER_LEN: usize = 8;

/// The active key of a session.
///
/// The raw key bytes are zeroised as soon as the cipher handle is built and
/// there is no way to read them back out.
pub struct SessionKey {
    key: LessSafeKey,
    iv: [u8; IV_LEN],
    session_id: SessionId,
    created_at: DateTime<Utc>,
    counter: AtomicU64,
}

impl SessionKey {
    fn generate(rng: &SystemRandom, created_at: DateTime<Utc>) -> Result<Self> {
        let mut key_bytes = Zeroizing::new([0u8; KEY_LEN]);
        rng.fill(&mut key_bytes[..])
            .map_err(|_| RedactorError::EncryptionInit("random source unavailable for key".into()))?;

        let mut iv = [0u8; IV_LEN];
        rng.fill(&mut iv)
            .map_err(|_| RedactorError::EncryptionInit("random source unavailable for IV".into()))?;

        let unbound = UnboundKey::new(&AES_256_GCM, &key_bytes[..])
            .map_err(|_| RedactorError::EncryptionInit("AES-256-GCM key rejected".into()))?;

        Ok(Self {
            key: LessSafeKey::new(unbound),
            iv,
            session_id: SessionId::new(),
            created_at,
            counter: AtomicU64::new(0),
        })
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Number of IVs handed out so far.
    pub fn encryptions(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    /// The session IV XOR the next counter value. The first call returns
    /// the session IV itself.
    fn next_iv(&self) -> Result<[u8; IV_LEN]> {
        let n = self
            .counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| c.checked_add(1))
            .map_err(|_| RedactorError::Encryption("IV space exhausted for this session".into()))?;

        let mut iv = self.iv;
        for (byte, mask) in iv[IV_LEN - COUNTER_LEN..].iter_mut().zip(n.to_be_bytes()) {
            *byte ^= mask;
        }
        Ok(iv)
    }

    /// Encrypt `plaintext` under a fresh IV. Returns `(ciphertext ‖ tag, iv)`.
    #[instrument(skip_all, fields(session_id = %self.session_id, plaintext_len = plaintext.len()))]
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<(Vec<u8>, [u8; IV_LEN])> {
        let iv = self.next_iv()?;
        let mut in_out = plaintext.to_vec();

        self.key
            .seal_in_place_append_tag(Nonce::assume_unique_for_key(iv), Aad::empty(), &mut in_out)
            .map_err(|_| RedactorError::Encryption("AES-256-GCM seal failed".into()))?;

        debug!(ciphertext_len = in_out.len(), "encryption complete");
        Ok((in_out, iv))
    }

    /// Decrypt `ciphertext ‖ tag` that was sealed with `iv` under this key.
    ///
    /// Fails for a key from another session, a wrong IV, or any tampering.
    #[instrument(skip_all, fields(session_id = %self.session_id, ciphertext_len = ciphertext.len()))]
    pub fn decrypt(&self, ciphertext: &[u8], iv: &[u8]) -> Result<Vec<u8>> {
        let nonce = Nonce::try_assume_unique_for_key(iv).map_err(|_| {
            RedactorError::Decryption(format!("IV must be {IV_LEN} bytes, got {}", iv.len()))
        })?;

        let mut in_out = ciphertext.to_vec();
        let plaintext_len = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| RedactorError::Decryption("authentication failed".into()))?
            .len();
        in_out.truncate(plaintext_len);

        debug!(plaintext_len, "decryption complete");
        Ok(in_out)
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKey")
            .field("session_id", &self.session_id)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Owner of the single session key.
///
/// Callers receive `Arc<SessionKey>` handles, so an encryption already in
/// progress finishes with the key it started with even if the session is
/// rotated or destroyed meanwhile.
pub struct SessionKeyManager {
    rng: SystemRandom,
    clock: Arc<dyn Clock>,
    active: RwLock<Option<Arc<SessionKey>>>,
}

impl SessionKeyManager {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            rng: SystemRandom::new(),
            clock,
            active: RwLock::new(None),
        }
    }

    /// Swap the time source used for key timestamps. The active key stays.
    pub fn set_clock(&mut self, clock: Arc<dyn Clock>) {
        self.clock = clock;
    }

    /// Generate a new key, IV, and session id, replacing any existing key.
    ///
    /// Everything encrypted under the previous key becomes unreadable.
    #[instrument(skip_all)]
    pub fn initialize_session(&self) -> Result<Arc<SessionKey>> {
        let key = Arc::new(SessionKey::generate(&self.rng, self.clock.now())?);
        let previous = self
            .active
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Arc::clone(&key));

        info!(
            session_id = %key.session_id,
            replaced = previous.is_some(),
            "session key initialised"
        );
        Ok(key)
    }

    /// Return the active key, generating one only if none exists.
    ///
    /// The flag is `true` when this call generated the key.
    pub fn ensure_session(&self) -> Result<(Arc<SessionKey>, bool)> {
        if let Some(key) = self.current() {
            return Ok((key, false));
        }

        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have won the race for the write lock.
        if let Some(key) = active.as_ref() {
            return Ok((Arc::clone(key), false));
        }

        let key = Arc::new(SessionKey::generate(&self.rng, self.clock.now())?);
        *active = Some(Arc::clone(&key));
        info!(session_id = %key.session_id, "session key initialised lazily");
        Ok((key, true))
    }

    pub fn current(&self) -> Option<Arc<SessionKey>> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn session_info(&self) -> SessionInfo {
        match self.current() {
            Some(key) => SessionInfo {
                session_id: Some(key.session_id),
                has_key: true,
                created_at: Some(key.created_at),
            },
            None => SessionInfo::absent(),
        }
    }

    /// Drop the active key. Returns whether one existed.
    pub fn destroy(&self) -> bool {
        let previous = self
            .active
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(key) = &previous {
            info!(session_id = %key.session_id, "session key destroyed");
        }
        previous.is_some()
    }

    /// Drop the active key only if it belongs to `session_id`.
    pub fn destroy_if(&self, session_id: SessionId) -> bool {
        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
        if active.as_ref().map(|k| k.session_id) == Some(session_id) {
            *active = None;
            info!(%session_id, "session key destroyed");
            return true;
        }
        false
    }
}

impl Default for SessionKeyManager {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}
