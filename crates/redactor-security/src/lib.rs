// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! redactor-security — the secure document cache behind the redaction
//! workflow.
//!
//! Uploaded document bytes are encrypted with AES-256-GCM under a key that
//! lives only in process memory for the session, stored as expiring JSON
//! records in a key-value store, and can be wiped together with the key in
//! one panic clear.

pub mod cache;
pub mod clock;
pub mod integrity;
pub mod scratch;
pub mod session;
pub mod store;

pub use cache::{PanicClearReport, SecureCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use integrity::{generate_hash, verify_hash};
pub use scratch::ScratchArea;
pub use session::{SessionKey, SessionKeyManager};
pub use store::{KeyValueStore, MemoryStore, SqliteStore};
