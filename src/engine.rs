//! Storage engine facade — the public surface of satchel.
//!
//! `SatchelEngine` composes the cache, the artifact store, and the write
//! coalescer:
//!
//! **Read path**: cache hit decodes in memory; a miss reads the artifact,
//! populates the cache, and returns. A key with a pending write is always a
//! cache hit, so readers see their own writes before durability.
//!
//! **Write path**: validate, encode, stamp the cache, queue for the
//! coalescer. `set_item` never waits on the disk.
//!
//! **Deletes and `clear`**: synchronous. The pending entry goes first so a
//! delayed flush cannot resurrect the key, then the artifact is removed
//! under the I/O lock that flushes also hold.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use log::info;
use parking_lot::Mutex;

use crate::artifact::ArtifactStore;
use crate::cache::DocumentCache;
use crate::coalescer::WriteCoalescer;
use crate::codec::{self, Document};
use crate::config::Config;
use crate::error::{SatchelError, SatchelResult};

/// Embedded key → document store.
///
/// All methods take `&self`; the engine is safe to share across threads.
/// Readers proceed concurrently; durable mutations (flushes, deletes,
/// bulk writes, `clear`) serialize through one I/O lock so operations on
/// the same key never interleave on disk.
pub struct SatchelEngine {
    cache: DocumentCache,
    artifacts: Arc<ArtifactStore>,
    coalescer: WriteCoalescer,
    io_lock: Arc<Mutex<()>>,
    path: PathBuf,
    config: Config,
}

impl SatchelEngine {
    /// Open or create a store rooted at `path`.
    ///
    /// Creates the directory, sweeps temp files from interrupted writes,
    /// optionally preloads every artifact into the cache, and starts the
    /// coalescer worker.
    pub fn open<P: AsRef<Path>>(path: P, config: Config) -> SatchelResult<Self> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();

        let artifacts = Arc::new(ArtifactStore::open(&path)?);
        let io_lock = Arc::new(Mutex::new(()));
        let cache = DocumentCache::new();

        if config.preload_cache {
            let mut loaded = 0usize;
            for key in artifacts.list_keys()? {
                if let Some(bytes) = artifacts.read(&key)? {
                    cache.put(key, bytes);
                    loaded += 1;
                }
            }
            info!("preloaded {} record(s) into the cache", loaded);
        }

        let coalescer = WriteCoalescer::start(Arc::clone(&artifacts), Arc::clone(&io_lock), &config)?;

        Ok(Self {
            cache,
            artifacts,
            coalescer,
            io_lock,
            path,
            config,
        })
    }

    /// Store a document under a key.
    ///
    /// The write is visible to `get_item` immediately and becomes durable
    /// when the quiescence timer fires (or on `flush_now`). Returns without
    /// touching the disk.
    pub fn set_item(&self, key: &str, document: &Document) -> SatchelResult<()> {
        self.validate_key(key)?;
        let bytes = self.encode_checked(document)?;

        self.cache.put(key.to_string(), bytes.clone());
        self.coalescer.enqueue(key.to_string(), bytes);
        Ok(())
    }

    /// Fetch the document for a key, or `None` if absent.
    ///
    /// Cache hits never block on I/O. A miss reads the artifact and
    /// populates the cache. Undecodable artifact bytes surface as
    /// `CorruptArtifact`, never a panic.
    pub fn get_item(&self, key: &str) -> SatchelResult<Option<Document>> {
        if key.is_empty() {
            return Ok(None);
        }

        if let Some(entry) = self.cache.get(key) {
            let doc = codec::decode(&self.artifacts.artifact_path(key), &entry.bytes)?;
            return Ok(Some(doc));
        }

        match self.artifacts.read(key)? {
            Some(bytes) => {
                let doc = codec::decode(&self.artifacts.artifact_path(key), &bytes)?;
                self.cache.put(key.to_string(), bytes);
                Ok(Some(doc))
            }
            None => Ok(None),
        }
    }

    /// Delete a key everywhere: cache, pending set, and disk. Idempotent —
    /// deleting an absent key succeeds.
    pub fn remove_item(&self, key: &str) -> SatchelResult<()> {
        if key.is_empty() {
            return Ok(());
        }

        self.cache.remove(key);
        // Pending entry goes before the artifact: once removed here, no
        // later flush can bring the key back.
        self.coalescer.remove(key);

        let _io = self.io_lock.lock();
        self.artifacts.delete(key)
    }

    /// Every live key: the union of cached keys (covering writes not yet
    /// flushed) and on-disk artifacts (covering records never read this
    /// session). Sorted for deterministic output.
    pub fn get_all_keys(&self) -> SatchelResult<Vec<String>> {
        let mut keys: HashSet<String> = self.cache.keys().into_iter().collect();
        for key in self.artifacts.list_keys()? {
            keys.insert(key);
        }

        let mut keys: Vec<String> = keys.into_iter().collect();
        keys.sort();
        Ok(keys)
    }

    /// Empty the store: cancel the timer, drop all pending writes, clear
    /// the cache, delete every artifact. A full barrier — an in-flight
    /// flush finishes first and cannot re-create files afterwards.
    pub fn clear(&self) -> SatchelResult<()> {
        let _io = self.io_lock.lock();
        self.coalescer.drain();
        self.cache.clear();
        self.artifacts.clear()
    }

    /// Flush every pending write on the calling thread. When this returns
    /// `Ok`, everything enqueued before the call is durable. Call before
    /// process suspension.
    pub fn flush_now(&self) -> SatchelResult<()> {
        self.coalescer.flush_now().map(|_| ())
    }

    /// Bulk insert: validate and encode every document first, then stamp
    /// the cache and write all artifacts synchronously in one pass.
    /// Unlike `set_item` this is durable on return.
    pub fn set_items<I>(&self, items: I) -> SatchelResult<()>
    where
        I: IntoIterator<Item = (String, Document)>,
    {
        let mut encoded = Vec::new();
        for (key, document) in items {
            self.validate_key(&key)?;
            let bytes = self.encode_checked(&document)?;
            encoded.push((key, bytes));
        }

        for (key, bytes) in &encoded {
            self.cache.put(key.clone(), bytes.clone());
        }

        let _io = self.io_lock.lock();
        for (key, bytes) in encoded {
            // An older pending write for this key must not outlive the
            // newer bytes we are about to land.
            self.coalescer.remove(&key);
            self.artifacts.write(&key, &bytes, self.config.sync_writes)?;
        }
        Ok(())
    }

    /// Whether a key currently holds a record.
    pub fn contains(&self, key: &str) -> bool {
        if key.is_empty() {
            return false;
        }
        self.cache.contains(key) || self.artifacts.exists(key)
    }

    /// Number of live records.
    pub fn len(&self) -> SatchelResult<usize> {
        Ok(self.get_all_keys()?.len())
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> SatchelResult<bool> {
        Ok(self.len()? == 0)
    }

    /// When the record was last written this session, if it has been seen.
    pub fn modified_at(&self, key: &str) -> Option<SystemTime> {
        self.cache.modified_at(key)
    }

    /// Writes waiting for the next coalesced flush.
    pub fn pending_count(&self) -> usize {
        self.coalescer.pending_count()
    }

    /// Total entries made durable by coalesced flushes since open.
    pub fn total_flushed(&self) -> u64 {
        self.coalescer.total_flushed()
    }

    /// Non-empty flush batches since open.
    pub fn flush_batches(&self) -> u64 {
        self.coalescer.flush_batches()
    }

    /// Store directory path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The configuration this store was opened with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn validate_key(&self, key: &str) -> SatchelResult<()> {
        if key.is_empty() {
            return Err(SatchelError::InvalidKey {
                reason: "key must not be empty".into(),
            });
        }
        if key.len() > self.config.max_key_len {
            return Err(SatchelError::InvalidKey {
                reason: format!(
                    "key is {} bytes, limit is {}",
                    key.len(),
                    self.config.max_key_len
                ),
            });
        }
        Ok(())
    }

    fn encode_checked(&self, document: &Document) -> SatchelResult<Vec<u8>> {
        let bytes = codec::encode(document)?;
        if bytes.len() > self.config.max_document_bytes {
            return Err(SatchelError::InvalidDocument {
                reason: format!(
                    "encoded document is {} bytes, limit is {}",
                    bytes.len(),
                    self.config.max_document_bytes
                ),
            });
        }
        Ok(bytes)
    }
}

impl Drop for SatchelEngine {
    fn drop(&mut self) {
        // Flushes anything still pending and joins the worker
        self.coalescer.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn test_engine() -> (SatchelEngine, TempDir) {
        let dir = TempDir::new().unwrap();
        let engine = SatchelEngine::open(dir.path(), Config::default()).unwrap();
        (engine, dir)
    }

    #[test]
    fn test_open_empty() {
        let (engine, _dir) = test_engine();
        assert!(engine.is_empty().unwrap());
        assert_eq!(engine.pending_count(), 0);
        assert!(engine.get_all_keys().unwrap().is_empty());
    }

    #[test]
    fn test_set_get() {
        let (engine, _dir) = test_engine();
        let doc = json!({ "hello": "world" });
        engine.set_item("greeting", &doc).unwrap();
        assert_eq!(engine.get_item("greeting").unwrap(), Some(doc));
        assert!(engine.contains("greeting"));
        assert_eq!(engine.len().unwrap(), 1);
    }

    #[test]
    fn test_read_your_writes_before_flush() {
        let (engine, _dir) = test_engine();
        let doc = json!({ "n": 1 });
        engine.set_item("k", &doc).unwrap();
        // Still pending, nothing on disk yet — the read must see it anyway
        assert_eq!(engine.pending_count(), 1);
        assert_eq!(engine.get_item("k").unwrap(), Some(doc));
    }

    #[test]
    fn test_overwrite_last_wins() {
        let (engine, _dir) = test_engine();
        engine.set_item("k", &json!({ "v": 1 })).unwrap();
        engine.set_item("k", &json!({ "v": 2 })).unwrap();
        assert_eq!(engine.get_item("k").unwrap(), Some(json!({ "v": 2 })));
        assert_eq!(engine.pending_count(), 1);
    }

    #[test]
    fn test_empty_key_rejected() {
        let (engine, _dir) = test_engine();
        let result = engine.set_item("", &json!({}));
        assert!(matches!(result, Err(SatchelError::InvalidKey { .. })));
        // Reads and deletes of the empty key are benign
        assert_eq!(engine.get_item("").unwrap(), None);
        engine.remove_item("").unwrap();
        assert!(!engine.contains(""));
    }

    #[test]
    fn test_oversized_key_rejected() {
        let (engine, _dir) = test_engine();
        let key = "x".repeat(engine.config().max_key_len + 1);
        let result = engine.set_item(&key, &json!({}));
        assert!(matches!(result, Err(SatchelError::InvalidKey { .. })));
    }

    #[test]
    fn test_non_object_document_rejected() {
        let (engine, _dir) = test_engine();
        let result = engine.set_item("k", &json!([1, 2, 3]));
        assert!(matches!(result, Err(SatchelError::InvalidDocument { .. })));
        assert_eq!(engine.pending_count(), 0);
    }

    #[test]
    fn test_oversized_document_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.max_document_bytes = 32;
        let engine = SatchelEngine::open(dir.path(), config).unwrap();

        let result = engine.set_item("k", &json!({ "filler": "x".repeat(64) }));
        assert!(matches!(result, Err(SatchelError::InvalidDocument { .. })));
    }

    #[test]
    fn test_remove_item() {
        let (engine, _dir) = test_engine();
        engine.set_item("k", &json!({ "v": 1 })).unwrap();
        engine.flush_now().unwrap();

        engine.remove_item("k").unwrap();
        assert_eq!(engine.get_item("k").unwrap(), None);
        assert!(!engine.contains("k"));
        // Idempotent
        engine.remove_item("k").unwrap();
    }

    #[test]
    fn test_flush_now_persists() {
        let (engine, dir) = test_engine();
        engine.set_item("k", &json!({ "v": 1 })).unwrap();
        engine.flush_now().unwrap();
        assert_eq!(engine.pending_count(), 0);
        assert_eq!(engine.total_flushed(), 1);

        // Artifact is on disk under the escaped name
        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_get_all_keys_unions_cache_and_disk() {
        let (engine, _dir) = test_engine();
        engine.set_item("durable", &json!({ "d": 1 })).unwrap();
        engine.flush_now().unwrap();
        engine.set_item("pending", &json!({ "p": 1 })).unwrap();

        assert_eq!(engine.get_all_keys().unwrap(), vec!["durable", "pending"]);
    }

    #[test]
    fn test_clear_empties_everything() {
        let (engine, _dir) = test_engine();
        engine.set_item("a", &json!({ "v": 1 })).unwrap();
        engine.set_item("b", &json!({ "v": 2 })).unwrap();
        engine.flush_now().unwrap();
        engine.set_item("c", &json!({ "v": 3 })).unwrap();

        engine.clear().unwrap();
        assert!(engine.get_all_keys().unwrap().is_empty());
        assert_eq!(engine.get_item("a").unwrap(), None);
        assert_eq!(engine.get_item("c").unwrap(), None);
        assert_eq!(engine.pending_count(), 0);
    }

    #[test]
    fn test_set_items_is_synchronous() {
        let (engine, _dir) = test_engine();
        engine
            .set_items([
                ("a".to_string(), json!({ "v": 1 })),
                ("b".to_string(), json!({ "v": 2 })),
            ])
            .unwrap();

        // Durable immediately, nothing pending
        assert_eq!(engine.pending_count(), 0);
        assert!(engine.contains("a"));
        assert!(engine.contains("b"));
    }

    #[test]
    fn test_set_items_validates_before_writing() {
        let (engine, _dir) = test_engine();
        let result = engine.set_items([
            ("ok".to_string(), json!({ "v": 1 })),
            ("bad".to_string(), json!("not an object")),
        ]);
        assert!(matches!(result, Err(SatchelError::InvalidDocument { .. })));
        // The batch failed as a unit — nothing was cached or written
        assert!(!engine.contains("ok"));
    }

    #[test]
    fn test_modified_at_non_decreasing() {
        let (engine, _dir) = test_engine();
        engine.set_item("k", &json!({ "v": 1 })).unwrap();
        let first = engine.modified_at("k").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        engine.set_item("k", &json!({ "v": 2 })).unwrap();
        let second = engine.modified_at("k").unwrap();
        assert!(second >= first);
    }

    #[test]
    fn test_concurrent_set_get() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(SatchelEngine::open(dir.path(), Config::default()).unwrap());

        let mut handles = vec![];
        for t in 0..4 {
            let e = Arc::clone(&engine);
            handles.push(std::thread::spawn(move || {
                for i in 0..50 {
                    let key = format!("t{}-k{}", t, i);
                    e.set_item(&key, &json!({ "i": i })).unwrap();
                    assert_eq!(e.get_item(&key).unwrap(), Some(json!({ "i": i })));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        engine.flush_now().unwrap();
        assert_eq!(engine.len().unwrap(), 200);
    }
}
