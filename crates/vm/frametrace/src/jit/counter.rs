//! Per code unit call accounting.
//!
//! Tracks how many calls each code unit received, how many of them were
//! served by a compiled artifact, and which guards rejected artifacts. The
//! call total drives the `minimum_call_count` threshold; everything else is
//! exposed for observability only.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use rustc_hash::FxHashMap;

use super::types::FrameStats;
use crate::code::CodeId;

#[derive(Debug, Default)]
struct Counts {
    ok: AtomicU64,
    total: AtomicU64,
    guard_failures: RwLock<BTreeMap<String, u64>>,
}

/// Thread-safe call counters keyed by code unit.
///
/// Uses `AtomicU64` values so that recording a call only needs a read lock
/// for already-seen code units, reducing write-lock contention on the hot path.
#[derive(Debug, Clone, Default)]
pub struct FrameCounter {
    counts: Arc<RwLock<FxHashMap<CodeId, Arc<Counts>>>>,
}

impl FrameCounter {
    /// Create a new counter.
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, code: CodeId) -> Arc<Counts> {
        // Fast path: read lock for already-seen code units
        {
            #[expect(clippy::unwrap_used, reason = "RwLock poisoning is unrecoverable")]
            let counts = self.counts.read().unwrap();
            if let Some(entry) = counts.get(&code) {
                return entry.clone();
            }
        }

        #[expect(clippy::unwrap_used, reason = "RwLock poisoning is unrecoverable")]
        let mut counts = self.counts.write().unwrap();
        counts.entry(code).or_default().clone()
    }

    /// Record a call to `code`. Returns the new call total.
    pub fn record_call(&self, code: CodeId) -> u64 {
        self.entry(code)
            .total
            .fetch_add(1, Ordering::Relaxed)
            .saturating_add(1)
    }

    /// Record a call served by a compiled artifact.
    pub fn record_ok(&self, code: CodeId) {
        self.entry(code).ok.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a guard that rejected an artifact of `code`.
    pub fn record_guard_failure(&self, code: CodeId, guard: &str) {
        let entry = self.entry(code);
        #[expect(clippy::unwrap_used, reason = "RwLock poisoning is unrecoverable")]
        let mut failures = entry.guard_failures.write().unwrap();
        let count = failures.entry(guard.to_string()).or_default();
        *count = count.saturating_add(1);
    }

    /// Counters for one code unit; zero when it was never called.
    pub fn stats(&self, code: CodeId) -> FrameStats {
        #[expect(clippy::unwrap_used, reason = "RwLock poisoning is unrecoverable")]
        let counts = self.counts.read().unwrap();
        counts.get(&code).map(|entry| Self::read(entry)).unwrap_or_default()
    }

    /// Counters for every code unit seen so far.
    pub fn snapshot(&self) -> BTreeMap<CodeId, FrameStats> {
        #[expect(clippy::unwrap_used, reason = "RwLock poisoning is unrecoverable")]
        let counts = self.counts.read().unwrap();
        counts
            .iter()
            .map(|(code, entry)| (*code, Self::read(entry)))
            .collect()
    }

    fn read(entry: &Counts) -> FrameStats {
        #[expect(clippy::unwrap_used, reason = "RwLock poisoning is unrecoverable")]
        let failures = entry.guard_failures.read().unwrap();
        FrameStats {
            ok: entry.ok.load(Ordering::Relaxed),
            total: entry.total.load(Ordering::Relaxed),
            guard_failures: failures.clone(),
        }
    }

    /// Forget the counters of one code unit.
    pub fn reset_code(&self, code: CodeId) {
        #[expect(clippy::unwrap_used, reason = "RwLock poisoning is unrecoverable")]
        let mut counts = self.counts.write().unwrap();
        counts.remove(&code);
    }

    /// Remove all counters.
    pub fn clear(&self) {
        #[expect(clippy::unwrap_used, reason = "RwLock poisoning is unrecoverable")]
        let mut counts = self.counts.write().unwrap();
        counts.clear();
    }
}
