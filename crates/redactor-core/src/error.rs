// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Redactor.

use thiserror::Error;

/// Top-level error type for all Redactor operations.
#[derive(Debug, Error)]
pub enum RedactorError {
    // -- Session key errors --
    #[error("session key initialisation failed: {0}")]
    EncryptionInit(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    // -- Cache errors --
    #[error("cache write failed: {0}")]
    CacheWrite(String),

    /// Storage was unreachable while wiping. Always shown to the user.
    #[error("panic clear failed: {0}")]
    PanicClear(String),

    #[error("document id must not be empty")]
    InvalidDocumentId,

    // -- Storage / persistence --
    #[error("database error: {0}")]
    Database(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, RedactorError>;
