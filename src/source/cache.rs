//! Output cache used to chain tool calls

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

struct Entries {
    lru: LruCache<String, Vec<u8>>,
    bytes: usize,
}

impl Entries {
    fn take(&mut self, key: &str) -> Option<Vec<u8>> {
        let data = self.lru.pop(key)?;
        self.bytes -= data.len();
        Some(data)
    }

    fn evict_oldest(&mut self) -> bool {
        match self.lru.pop_lru() {
            Some((_, data)) => {
                self.bytes -= data.len();
                true
            }
            None => false,
        }
    }
}

/// Assembled documents keyed by request-unique ids, bounded by both entry
/// count and total bytes. Least recently used entries go first.
pub struct CacheManager {
    entries: Mutex<Entries>,
    max_bytes: usize,
}

impl CacheManager {
    pub fn new(max_entries: usize, max_bytes: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(Entries {
                lru: LruCache::new(capacity),
                bytes: 0,
            }),
            max_bytes,
        }
    }

    /// Store `data` under `key`, evicting old entries to stay within the
    /// byte budget. Returns false (and stores nothing) when `data` alone is
    /// larger than the whole budget.
    pub fn put(&self, key: String, data: Vec<u8>) -> bool {
        if data.len() > self.max_bytes {
            return false;
        }

        let mut entries = self.entries.lock();
        entries.take(&key);
        while entries.bytes + data.len() > self.max_bytes && entries.evict_oldest() {}

        // An entry-count eviction inside `push` must be accounted for too.
        entries.bytes += data.len();
        let evicted = entries.lru.push(key, data);
        if let Some((_, evicted)) = evicted {
            entries.bytes -= evicted.len();
        }
        true
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.lock().lru.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().lru.contains(key)
    }

    pub fn remove(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.lock().take(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().lru.is_empty()
    }

    /// Bytes currently held
    pub fn total_bytes(&self) -> usize {
        self.entries.lock().bytes
    }

    /// A fresh UUID v4 key not currently in use
    pub fn generate_unique_key(&self) -> String {
        let entries = self.entries.lock();
        loop {
            let key = uuid::Uuid::new_v4().to_string();
            if !entries.lru.contains(&key) {
                return key;
            }
        }
    }
}
