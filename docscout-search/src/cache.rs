//! Content-addressed result cache.
//!
//! Maps a [`Fingerprint`] (normalised query, document type, sorted provider
//! set) to the merged result list of a previous aggregation. Entries are
//! immutable; a later write for the same fingerprint replaces the entry
//! wholesale. A read at or after `expires_at` is a miss, never a stale hit.
//!
//! Each [`Aggregator`](crate::orchestrator::aggregate::Aggregator) owns its
//! own cache instance, backed by [`moka`] for bounded capacity and
//! per-entry expiry.

use chrono::{DateTime, Utc};
use moka::future::Cache;
use moka::Expiry;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::types::{Cursor, DocumentType, MergedResult, Provider};

/// Deterministic cache key: BLAKE3 hex digest of the request's identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Build the fingerprint for a normalised query.
    ///
    /// The query is lower-cased and whitespace-collapsed; the provider set
    /// is sorted and deduplicated, so `[Google, Brave]` and
    /// `[Brave, Google, Brave]` produce the same key.
    pub fn new(normalized_query: &str, doc_type: DocumentType, providers: &[Provider]) -> Self {
        let query = normalized_query
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        let mut sorted = providers.to_vec();
        sorted.sort();
        sorted.dedup();

        let mut hasher = blake3::Hasher::new();
        hasher.update(query.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(doc_type.extension().as_bytes());
        for p in sorted {
            hasher.update(b"\x1f");
            hasher.update(p.name().as_bytes());
        }
        Self(hasher.finalize().to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A cached merged result list.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub results: Vec<MergedResult>,
    /// Continuation cursors observed with the first page.
    pub next_cursors: BTreeMap<Provider, Cursor>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    fn remaining(&self) -> Duration {
        (self.expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Hit/miss counters and size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// `hits / (hits + misses)`, or 0.0 before any lookup.
    pub hit_rate: f64,
    pub entry_count: u64,
}

struct EntryExpiry;

impl Expiry<Fingerprint, CacheEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &Fingerprint,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.remaining())
    }

    fn expire_after_update(
        &self,
        _key: &Fingerprint,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.remaining())
    }
}

/// Bounded in-memory result cache with per-entry expiry.
pub struct ResultCache {
    inner: Cache<Fingerprint, CacheEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResultCache {
    pub fn new(capacity: u64) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(capacity)
                .expire_after(EntryExpiry)
                .build(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up `fingerprint`. Expired entries are evicted and count as a miss.
    pub async fn get(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        match self.inner.get(fingerprint).await {
            Some(entry) if !entry.is_expired(Utc::now()) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry)
            }
            Some(_) => {
                self.inner.invalidate(fingerprint).await;
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store `results` under `fingerprint` for `ttl`, replacing any
    /// previous entry. A zero `ttl`, or one too large to represent as a
    /// timestamp, stores nothing.
    pub async fn put(
        &self,
        fingerprint: Fingerprint,
        results: Vec<MergedResult>,
        next_cursors: BTreeMap<Provider, Cursor>,
        ttl: Duration,
    ) {
        if ttl.is_zero() {
            return;
        }
        let created_at = Utc::now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| created_at.checked_add_signed(ttl));
        let Some(expires_at) = expires_at else {
            tracing::warn!(ttl_secs = ttl.as_secs(), "cache ttl out of range, entry not stored");
            return;
        };
        let entry = CacheEntry {
            fingerprint: fingerprint.clone(),
            results,
            next_cursors,
            created_at,
            expires_at,
        };
        self.inner.insert(fingerprint, entry).await;
    }

    pub async fn invalidate(&self, fingerprint: &Fingerprint) {
        self.inner.invalidate(fingerprint).await;
    }

    pub fn clear(&self) {
        self.inner.invalidate_all();
    }

    pub async fn stats(&self) -> CacheStats {
        self.inner.run_pending_tasks().await;
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
            entry_count: self.inner.entry_count(),
        }
    }
}
