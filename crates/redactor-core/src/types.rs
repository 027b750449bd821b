// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Redactor secure document cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RedactorError;

/// Caller-supplied identifier of a cached document. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Result<Self, RedactorError> {
        let id = id.into();
        if id.is_empty() {
            return Err(RedactorError::InvalidDocumentId);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DocumentId {
    type Error = RedactorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for DocumentId {
    type Error = RedactorError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DocumentId> for String {
    fn from(id: DocumentId) -> Self {
        id.0
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier of one session key generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Snapshot of the key manager's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Present only while a key exists.
    pub session_id: Option<SessionId>,
    pub has_key: bool,
    /// When the active key was generated.
    pub created_at: Option<DateTime<Utc>>,
}

impl SessionInfo {
    /// State after a panic clear or before the first write.
    pub fn absent() -> Self {
        Self {
            session_id: None,
            has_key: false,
            created_at: None,
        }
    }
}

/// A persisted, encrypted cache record.
///
/// Serialised as JSON with camelCase field names and RFC 3339 timestamps:
/// `{"documentId", "encryptedData", "iv", "timestamp", "expiresAt"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub document_id: DocumentId,
    /// Base64 of AES-256-GCM ciphertext with the 16-byte tag appended.
    pub encrypted_data: String,
    /// Base64 of the 12-byte IV used for this entry.
    pub iv: String,
    pub timestamp: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// An entry is still readable at exactly `expires_at`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Outcome of a cache read. Decryption problems are folded into `Miss`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Hit(Vec<u8>),
    Miss,
}

impl Lookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }

    pub fn into_option(self) -> Option<Vec<u8>> {
        match self {
            Self::Hit(bytes) => Some(bytes),
            Self::Miss => None,
        }
    }
}

impl From<Option<Vec<u8>>> for Lookup {
    fn from(value: Option<Vec<u8>>) -> Self {
        match value {
            Some(bytes) => Self::Hit(bytes),
            None => Self::Miss,
        }
    }
}
