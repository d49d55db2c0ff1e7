//! Compiled artifact cache.
//!
//! Stores, per code unit, the artifacts compiled for it in insertion order.
//! The cache is thread-safe and designed for concurrent read access with
//! infrequent writes (compilation events). Entries are append-only: a failed
//! trace never touches them, and they only go away when the code unit is
//! retired or reset.

use std::sync::{Arc, RwLock};

use rustc_hash::FxHashMap;

use super::types::CompiledArtifact;
use crate::code::CodeId;

/// Thread-safe cache of compiled artifacts keyed by code unit.
#[derive(Debug, Clone, Default)]
pub struct ArtifactCache {
    inner: Arc<RwLock<FxHashMap<CodeId, Vec<Arc<CompiledArtifact>>>>>,
}

impl ArtifactCache {
    /// Create a new empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Artifacts for `code`, oldest first.
    pub fn get(&self, code: CodeId) -> Vec<Arc<CompiledArtifact>> {
        #[expect(clippy::unwrap_used, reason = "RwLock poisoning is unrecoverable")]
        let inner = self.inner.read().unwrap();
        inner.get(&code).cloned().unwrap_or_default()
    }

    /// Append an artifact for `code` and return its position.
    ///
    /// An artifact equivalent to one already cached is not stored twice; the
    /// existing position is returned instead.
    pub fn append(&self, code: CodeId, artifact: Arc<CompiledArtifact>) -> usize {
        #[expect(clippy::unwrap_used, reason = "RwLock poisoning is unrecoverable")]
        let mut inner = self.inner.write().unwrap();
        let entries = inner.entry(code).or_default();
        if let Some(existing) = entries.iter().position(|cached| cached.is_equivalent(&artifact)) {
            return existing;
        }
        entries.push(artifact);
        entries.len().saturating_sub(1)
    }

    /// Number of artifacts cached for `code`.
    pub fn len_for(&self, code: CodeId) -> usize {
        #[expect(clippy::unwrap_used, reason = "RwLock poisoning is unrecoverable")]
        let inner = self.inner.read().unwrap();
        inner.get(&code).map_or(0, Vec::len)
    }

    /// Drop every artifact of `code`. Returns how many were removed.
    pub fn invalidate(&self, code: CodeId) -> usize {
        #[expect(clippy::unwrap_used, reason = "RwLock poisoning is unrecoverable")]
        let mut inner = self.inner.write().unwrap();
        inner.remove(&code).map_or(0, |entries| entries.len())
    }

    /// Total number of artifacts across all code units.
    pub fn len(&self) -> usize {
        #[expect(clippy::unwrap_used, reason = "RwLock poisoning is unrecoverable")]
        let inner = self.inner.read().unwrap();
        inner.values().map(Vec::len).sum()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove all entries from the cache.
    pub fn clear(&self) {
        #[expect(clippy::unwrap_used, reason = "RwLock poisoning is unrecoverable")]
        let mut inner = self.inner.write().unwrap();
        inner.clear();
    }
}
