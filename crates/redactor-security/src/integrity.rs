// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document integrity — SHA-256 digests, base64-encoded, for tamper detection.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};

/// Compute the SHA-256 digest of `data` as standard (padded) base64.
///
/// Used to fingerprint a document before it enters the redaction workflow
/// and again before download, so a mismatch shows the bytes changed.
pub fn generate_hash(data: impl AsRef<[u8]>) -> String {
    let digest = Sha256::digest(data.as_ref());
    STANDARD.encode(digest)
}

/// Check `data` against a base64 SHA-256 digest produced by [`generate_hash`].
pub fn verify_hash(data: impl AsRef<[u8]>, expected_hash: &str) -> bool {
    generate_hash(data) == expected_hash
}
