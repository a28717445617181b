//! In-memory document cache
//!
//! Maps keys to their encoded bytes plus an update timestamp. This is a
//! durability cache, not a bounded one: it grows to the working set and
//! shrinks only on explicit removal. Once a key is populated the cache is
//! authoritative for it until `remove`/`clear` — readers never fall back to
//! disk behind its back.

use std::time::SystemTime;

use hashbrown::HashMap;
use parking_lot::RwLock;

/// One cached record: encoded document bytes and when they last changed.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Codec-encoded document bytes, identical to the artifact contents
    pub bytes: Vec<u8>,
    /// Instant of the last `put` for this key
    pub updated_at: SystemTime,
}

/// Concurrent key → entry map. Reads take the shared lock; a write
/// replaces the whole entry under the exclusive lock, so readers never see
/// a torn value.
pub struct DocumentCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl DocumentCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Get the entry for a key, if cached.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let entries = self.entries.read();
        entries.get(key).cloned()
    }

    /// Insert or replace the entry for a key, stamping the update time.
    pub fn put(&self, key: String, bytes: Vec<u8>) {
        let mut entries = self.entries.write();
        let now = SystemTime::now();
        // Wall clocks can step backwards (NTP); keep per-key timestamps
        // non-decreasing regardless.
        let updated_at = match entries.get(&key) {
            Some(prev) if prev.updated_at > now => prev.updated_at,
            _ => now,
        };
        entries.insert(key, CacheEntry { bytes, updated_at });
    }

    /// Evict a key. Missing keys are a no-op.
    pub fn remove(&self, key: &str) {
        let mut entries = self.entries.write();
        entries.remove(key);
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        entries.clear();
    }

    /// All cached keys.
    pub fn keys(&self) -> Vec<String> {
        let entries = self.entries.read();
        entries.keys().cloned().collect()
    }

    /// Whether a key is cached.
    pub fn contains(&self, key: &str) -> bool {
        let entries = self.entries.read();
        entries.contains_key(key)
    }

    /// When the key's entry last changed, if cached.
    pub fn modified_at(&self, key: &str) -> Option<SystemTime> {
        let entries = self.entries.read();
        entries.get(key).map(|entry| entry.updated_at)
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        let entries = self.entries.read();
        entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DocumentCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_remove() {
        let cache = DocumentCache::new();
        assert!(cache.is_empty());

        cache.put("k".to_string(), b"{}".to_vec());
        assert_eq!(cache.get("k").unwrap().bytes, b"{}");
        assert!(cache.contains("k"));
        assert_eq!(cache.len(), 1);

        cache.remove("k");
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_put_replaces_bytes() {
        let cache = DocumentCache::new();
        cache.put("k".to_string(), b"old".to_vec());
        cache.put("k".to_string(), b"new".to_vec());
        assert_eq!(cache.get("k").unwrap().bytes, b"new");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_timestamp_non_decreasing() {
        let cache = DocumentCache::new();
        cache.put("k".to_string(), b"1".to_vec());
        let first = cache.modified_at("k").unwrap();
        cache.put("k".to_string(), b"2".to_vec());
        let second = cache.modified_at("k").unwrap();
        assert!(second >= first);
    }

    #[test]
    fn test_keys_and_clear() {
        let cache = DocumentCache::new();
        cache.put("a".to_string(), b"1".to_vec());
        cache.put("b".to_string(), b"2".to_vec());

        let mut keys = cache.keys();
        keys.sort();
        assert_eq!(keys, vec!["a", "b"]);

        cache.clear();
        assert!(cache.keys().is_empty());
        assert!(cache.modified_at("a").is_none());
    }

    #[test]
    fn test_concurrent_readers() {
        use std::sync::Arc;

        let cache = Arc::new(DocumentCache::new());
        for i in 0..100 {
            cache.put(format!("k{}", i), format!("v{}", i).into_bytes());
        }

        let mut handles = vec![];
        for _ in 0..8 {
            let c = Arc::clone(&cache);
            handles.push(std::thread::spawn(move || {
                for i in 0..100 {
                    let entry = c.get(&format!("k{}", i)).unwrap();
                    assert_eq!(entry.bytes, format!("v{}", i).into_bytes());
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
    }
}
