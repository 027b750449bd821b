// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for caseworkers using the redaction workflow.
//
// Every technical error is mapped to plain English with a clear suggestion.
// The severity drives how prominently the UI presents it.

use crate::error::RedactorError;

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Storage blip — trying again usually works.
    Transient,
    /// The user must change something (pick a document, fix settings).
    ActionRequired,
    /// Retrying will not help.
    Permanent,
    /// Sensitive material may still be on this device. Interrupt the user.
    Alert,
}

/// A human-readable error with plain English message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain English summary (shown as a heading).
    pub message: String,
    /// What the user should try (shown as body text).
    pub suggestion: String,
    /// Whether retrying the same action may succeed.
    pub retriable: bool,
    pub severity: Severity,
}

/// Convert a `RedactorError` into a `HumanError` for display.
pub fn humanize_error(err: &RedactorError) -> HumanError {
    match err {
        RedactorError::PanicClear(detail) => HumanError {
            message: "Secure wipe did NOT complete.".into(),
            suggestion: format!(
                "Documents may still be stored on this device. Close the application \
                 and report this to your security officer immediately. ({detail})"
            ),
            retriable: true,
            severity: Severity::Alert,
        },

        RedactorError::EncryptionInit(_) => HumanError {
            message: "Secure storage could not be started.".into(),
            suggestion: "This device could not create an encryption key. Try again; if it keeps failing, documents cannot be cached on this device.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        RedactorError::Encryption(_) | RedactorError::CacheWrite(_) => HumanError {
            message: "The document could not be saved securely.".into(),
            suggestion: "Try uploading the document again. Nothing was stored.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        RedactorError::Decryption(_) => HumanError {
            message: "A cached copy could not be opened.".into(),
            suggestion: "The cached copy has been discarded. The document will be fetched again from the server.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        RedactorError::InvalidDocumentId => HumanError {
            message: "No document selected.".into(),
            suggestion: "Choose a document from the list, then try again.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        RedactorError::Config(detail) => HumanError {
            message: "The settings are not valid.".into(),
            suggestion: format!("Check the cache settings and try again. ({detail})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        RedactorError::Database(_) | RedactorError::Io(_) => HumanError {
            message: "Local storage had a problem.".into(),
            suggestion: "Try again. If this keeps happening, restart the application.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        RedactorError::Serialization(_) => HumanError {
            message: "Stored data is damaged.".into(),
            suggestion: "Use Panic Clear to wipe the local cache, then upload the document again.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },
    }
}
