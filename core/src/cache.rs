//! Short-lived cache of ranked results.
//!
//! Entries are stamped with the [`IndexEpoch`] observed when the search started.
//! Every commit, failed ingestion and removal bumps the epoch, so an entry can
//! never outlive the index state it was computed from.

use crate::ranker::SearchResults;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct IndexEpoch(AtomicU64);

impl IndexEpoch {
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    pub fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub keywords: Vec<String>,
    pub limit: usize,
}

struct CacheEntry {
    epoch: u64,
    stored_at: Instant,
    results: SearchResults,
}

pub struct ResultCache {
    ttl: Duration,
    capacity: usize,
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl ResultCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self { ttl, capacity, entries: Mutex::new(HashMap::new()) }
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0 && !self.ttl.is_zero()
    }

    pub fn get(&self, key: &CacheKey, epoch: u64) -> Option<SearchResults> {
        if !self.is_enabled() {
            return None;
        }
        let mut entries = self.entries.lock();
        let fresh = entries.get(key).map(|e| e.epoch == epoch && e.stored_at.elapsed() < self.ttl)?;
        if fresh {
            entries.get(key).map(|e| e.results.clone())
        } else {
            entries.remove(key);
            None
        }
    }

    pub fn insert(&self, key: CacheKey, epoch: u64, results: SearchResults) {
        if !self.is_enabled() {
            return;
        }
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            let ttl = self.ttl;
            entries.retain(|_, e| e.epoch == epoch && e.stored_at.elapsed() < ttl);
            if entries.len() >= self.capacity {
                let oldest = entries.iter().min_by_key(|(_, e)| e.stored_at).map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }
        entries.insert(key, CacheEntry { epoch, stored_at: Instant::now(), results });
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(word: &str) -> CacheKey {
        CacheKey { keywords: vec![word.to_string()], limit: 20 }
    }

    fn results(total: usize) -> SearchResults {
        SearchResults { total_results: total, results: Vec::new() }
    }

    #[test]
    fn hit_on_same_epoch_miss_after_bump() {
        let epoch = IndexEpoch::default();
        let cache = ResultCache::new(Duration::from_secs(60), 8);
        cache.insert(key("radar"), epoch.current(), results(3));
        assert_eq!(cache.get(&key("radar"), epoch.current()), Some(results(3)));

        epoch.bump();
        assert_eq!(cache.get(&key("radar"), epoch.current()), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn evicts_oldest_when_full() {
        let cache = ResultCache::new(Duration::from_secs(60), 2);
        cache.insert(key("a"), 0, results(1));
        std::thread::sleep(Duration::from_millis(2));
        cache.insert(key("b"), 0, results(2));
        std::thread::sleep(Duration::from_millis(2));
        cache.insert(key("c"), 0, results(3));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&key("a"), 0), None);
        assert_eq!(cache.get(&key("c"), 0), Some(results(3)));
    }

    #[test]
    fn zero_capacity_disables() {
        let cache = ResultCache::new(Duration::from_secs(60), 0);
        cache.insert(key("a"), 0, results(1));
        assert_eq!(cache.get(&key("a"), 0), None);
    }
}
