//! Process-wide LRU cache for finished boundary sets.
//!
//! Keyed by `(fingerprint, total_pages)` so a re-queued or re-uploaded
//! copy of the same document skips detection entirely. Misses are
//! idempotent — two workers racing on the same document compute the same
//! set and the second insert is a harmless overwrite — so the cache uses a
//! plain mutex rather than anything cleverer.

use crate::statement::BoundarySet;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use tracing::debug;

pub const DEFAULT_CAPACITY: usize = 100;

pub struct DetectionCache {
    entries: Mutex<LruCache<(String, usize), BoundarySet>>,
}

impl DetectionCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, fingerprint: &str, total_pages: usize) -> Option<BoundarySet> {
        let mut entries = self.entries.lock();
        let hit = entries.get(&(fingerprint.to_string(), total_pages)).cloned();
        if hit.is_some() {
            debug!("detection cache hit for {}", &fingerprint[..fingerprint.len().min(12)]);
        }
        hit
    }

    pub fn insert(&self, fingerprint: String, total_pages: usize, set: BoundarySet) {
        self.entries.lock().put((fingerprint, total_pages), set);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DetectionCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::{Boundary, DetectionSource};

    fn set() -> BoundarySet {
        BoundarySet::new(
            vec![Boundary::new(1, 3, DetectionSource::Content)],
            DetectionSource::Content,
        )
    }

    #[test]
    fn round_trips_by_fingerprint_and_pages() {
        let cache = DetectionCache::new(10);
        cache.insert("abc".into(), 3, set());

        assert_eq!(cache.get("abc", 3), Some(set()));
        assert_eq!(cache.get("abc", 4), None);
        assert_eq!(cache.get("xyz", 3), None);
    }

    #[test]
    fn evicts_least_recently_used_on_insert() {
        let cache = DetectionCache::new(2);
        cache.insert("a".into(), 1, set());
        cache.insert("b".into(), 1, set());
        cache.get("a", 1);
        cache.insert("c".into(), 1, set());

        assert!(cache.get("a", 1).is_some());
        assert!(cache.get("b", 1).is_none());
        assert!(cache.get("c", 1).is_some());
    }
}
