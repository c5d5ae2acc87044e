//! In-memory cache of fetched artifacts and their analyses.
//!
//! Entries are keyed by repository path. Expiry is lazy: an entry older than
//! the TTL reads as absent but stays in the map until it is overwritten,
//! invalidated or the cache is cleared.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use crate::analyze::AnalysisResult;
use crate::model::{Artifact, FileReference};

/// Default freshness window.
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

/// One cached artifact.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub reference: FileReference,
    pub artifact: Artifact,
    /// Absent when the bytes did not parse as a workflow.
    pub analysis: Option<AnalysisResult>,
    pub fetched_at: Instant,
}

impl CacheEntry {
    pub fn new(
        reference: FileReference,
        artifact: Artifact,
        analysis: Option<AnalysisResult>,
    ) -> Self {
        Self {
            reference,
            artifact,
            analysis,
            fetched_at: Instant::now(),
        }
    }

    pub fn age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.fetched_at)
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.age() > ttl
    }
}

/// Counters describing cache effectiveness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries physically stored, expired ones included
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    /// Reads that found an entry past its TTL
    pub expired: u64,
}

/// Thread-safe artifact cache shared by concurrent loads.
///
/// Readers receive an `Arc` snapshot of the entry. A concurrent `put`
/// replaces the map slot and never mutates a snapshot already handed out.
pub struct ArtifactCache {
    entries: RwLock<HashMap<String, Arc<CacheEntry>>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
}

impl Default for ArtifactCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl ArtifactCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expired: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get the entry for `path` if it exists and has not expired.
    pub fn get(&self, path: &str) -> Option<Arc<CacheEntry>> {
        let entry = {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            entries.get(path).cloned()
        };

        match entry {
            Some(entry) if entry.is_expired(self.ttl) => {
                self.expired.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Like [`get`](Self::get), but also treats an entry fetched at a
    /// different revision than `reference` as absent.
    pub fn get_fresh(&self, reference: &FileReference) -> Option<Arc<CacheEntry>> {
        self.get(&reference.path)
            .filter(|entry| entry.reference.revision_id == reference.revision_id)
    }

    /// Read the entry for `path` without touching the hit/miss counters.
    ///
    /// Expired entries read as absent, as with [`get`](Self::get).
    pub fn peek(&self, path: &str) -> Option<Arc<CacheEntry>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(path)
            .filter(|entry| !entry.is_expired(self.ttl))
            .cloned()
    }

    /// Non-counting [`get_fresh`](Self::get_fresh), for filters and reports.
    pub fn peek_fresh(&self, reference: &FileReference) -> Option<Arc<CacheEntry>> {
        self.peek(&reference.path)
            .filter(|entry| entry.reference.revision_id == reference.revision_id)
    }

    /// Store a result, replacing any entry for the same path.
    pub fn put(
        &self,
        reference: FileReference,
        artifact: Artifact,
        analysis: Option<AnalysisResult>,
    ) {
        self.insert(CacheEntry::new(reference, artifact, analysis));
    }

    /// Store a prebuilt entry, keeping its `fetched_at`.
    pub fn insert(&self, entry: CacheEntry) {
        let key = entry.reference.path.clone();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key, Arc::new(entry));
    }

    /// Drop the entry for `path`. Returns whether one was stored.
    pub fn invalidate(&self, path: &str) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(path).is_some()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.clear();
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
        }
    }
}
