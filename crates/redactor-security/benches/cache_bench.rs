// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for session encryption, integrity hashing, and the
// secure cache write/read path in the redactor-security crate.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use redactor_core::AppConfig;
use redactor_security::{SecureCache, SessionKeyManager, SqliteStore, generate_hash};

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

/// Benchmark an AES-256-GCM seal-then-open round trip on a 10 KiB payload
/// under one session key.
fn bench_encrypt_decrypt_roundtrip(c: &mut Criterion) {
    let manager = SessionKeyManager::default();
    let key = manager.initialize_session().expect("init failed");
    let plaintext = vec![0x42u8; 10 * 1024];

    c.bench_function("encrypt_decrypt_roundtrip (10 KiB)", |b| {
        b.iter(|| {
            let (ciphertext, iv) = key.encrypt(black_box(&plaintext)).expect("encrypt failed");
            let decrypted = key.decrypt(&ciphertext, &iv).expect("decrypt failed");
            assert_eq!(decrypted.len(), plaintext.len());
            black_box(decrypted);
        });
    });
}

/// Benchmark SHA-256 integrity hashing at various document sizes.
///
/// Sizes: 1 KiB, 10 KiB, 100 KiB, 1 MiB -- from a single-page memo to a
/// scanned multi-page release.
fn bench_integrity_hash(c: &mut Criterion) {
    let sizes: &[(&str, usize)] = &[
        ("1 KiB", 1024),
        ("10 KiB", 10 * 1024),
        ("100 KiB", 100 * 1024),
        ("1 MiB", 1024 * 1024),
    ];

    let mut group = c.benchmark_group("integrity_hash_sha256");
    for &(label, size) in sizes {
        let data = vec![0xABu8; size];
        group.bench_function(label, |b| {
            b.iter(|| {
                let digest = generate_hash(black_box(&data));
                black_box(digest);
            });
        });
    }
    group.finish();
}

/// Benchmark caching then reading back a 100 KiB document through an
/// in-memory SQLite store.
fn bench_cache_round_trip(c: &mut Criterion) {
    c.bench_function("cache_document + get_cached_document (100 KiB, SQLite)", |b| {
        // Build the cache once so we measure steady-state writes, not schema
        // creation or key generation.
        let store = SqliteStore::open_in_memory().expect("open in-memory store");
        let cache = SecureCache::new(&AppConfig::default(), store).expect("build cache");
        let document = vec![0x5Au8; 100 * 1024];

        b.iter(|| {
            cache
                .cache_document(black_box("bench-doc"), &document)
                .expect("cache failed");
            let hit = cache.get_cached_document(black_box("bench-doc"));
            assert!(hit.is_hit());
            black_box(hit);
        });
    });
}

criterion_group!(
    benches,
    bench_encrypt_decrypt_roundtrip,
    bench_integrity_hash,
    bench_cache_round_trip,
);
criterion_main!(benches);
