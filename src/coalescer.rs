//! Write coalescer — batches rapid writes into one durable flush
//!
//! Callers that bulk-load state issue many `set` calls in a short window;
//! writing one file per call would multiply the I/O cost. Instead each
//! write parks its encoded bytes in a pending map (last write per key wins)
//! and re-arms a single quiescence timer. When the store has been quiet for
//! the configured delay, a background worker flushes every pending entry to
//! the artifact store in one pass.
//!
//! The worker never deletes from the cache — by the time bytes are pending
//! here they are already visible to readers. A failed artifact write is
//! logged and its pending entry dropped; the rest of the batch still
//! flushes. Callers that need confirmation use `flush_now` and check the
//! result.

use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use hashbrown::HashMap;
use log::{debug, warn};
use parking_lot::{Condvar, Mutex};

use crate::artifact::ArtifactStore;
use crate::config::Config;
use crate::error::{SatchelError, SatchelResult};

/// Pending encoded writes, keyed by record key. Setting the same key twice
/// before a flush replaces the earlier bytes — they are never written.
struct PendingWrites {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    /// Total entries made durable since the store opened
    total_flushed: AtomicU64,
    /// Total non-empty flush batches since the store opened
    flush_batches: AtomicU64,
}

impl PendingWrites {
    fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            total_flushed: AtomicU64::new(0),
            flush_batches: AtomicU64::new(0),
        }
    }

    /// Queue bytes for a key, replacing any earlier pending bytes.
    fn enqueue(&self, key: String, bytes: Vec<u8>) {
        let mut entries = self.entries.lock();
        entries.insert(key, bytes);
    }

    /// Drop the pending entry for a key so a later flush cannot write it.
    fn remove(&self, key: &str) {
        let mut entries = self.entries.lock();
        entries.remove(key);
    }

    /// Take the whole pending set, leaving it empty. Entries enqueued after
    /// this call land in the fresh map and belong to the next batch.
    fn take(&self) -> HashMap<String, Vec<u8>> {
        let mut entries = self.entries.lock();
        mem::take(&mut *entries)
    }

    fn pending_count(&self) -> usize {
        let entries = self.entries.lock();
        entries.len()
    }

    fn record_batch(&self, flushed: u64) {
        self.total_flushed.fetch_add(flushed, Ordering::Relaxed);
        self.flush_batches.fetch_add(1, Ordering::Relaxed);
    }
}

/// Quiescence-timer state shared with the worker thread. At most one
/// deadline exists; re-arming overwrites it rather than stacking timers.
struct TimerState {
    deadline: Option<Instant>,
    shutdown: bool,
}

struct Shared {
    pending: PendingWrites,
    artifacts: Arc<ArtifactStore>,
    /// Serializes every durable mutation with the engine (remove, clear,
    /// bulk writes), so a flush never races a delete for the same key.
    io_lock: Arc<Mutex<()>>,
    timer: Mutex<TimerState>,
    timer_cv: Condvar,
    quiescence: Duration,
    sync_writes: bool,
}

impl Shared {
    /// Flush everything pending to the artifact store.
    ///
    /// Takes the I/O lock for the whole batch, snapshots the pending map,
    /// then writes each artifact. Per-key failures are logged and dropped —
    /// the rest of the batch still lands — and the first failure is
    /// returned so `flush_now` callers can see it.
    fn flush_batch(&self) -> SatchelResult<usize> {
        let _io = self.io_lock.lock();
        let batch = self.pending.take();
        if batch.is_empty() {
            return Ok(0);
        }

        let mut flushed = 0u64;
        let mut first_err: Option<SatchelError> = None;
        for (key, bytes) in batch {
            match self.artifacts.write(&key, &bytes, self.sync_writes) {
                Ok(()) => flushed += 1,
                Err(e) => {
                    warn!("dropping pending write for key {:?}: {}", key, e);
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }

        self.pending.record_batch(flushed);
        debug!("flushed {} coalesced write(s)", flushed);

        match first_err {
            Some(e) => Err(e),
            None => Ok(flushed as usize),
        }
    }
}

/// The coalescer: pending map, quiescence timer, and the worker thread
/// that drains them. Dropping it flushes whatever is still pending and
/// joins the worker.
pub struct WriteCoalescer {
    shared: Arc<Shared>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl WriteCoalescer {
    /// Spawn the flush worker.
    pub fn start(
        artifacts: Arc<ArtifactStore>,
        io_lock: Arc<Mutex<()>>,
        config: &Config,
    ) -> SatchelResult<Self> {
        let shared = Arc::new(Shared {
            pending: PendingWrites::new(),
            artifacts,
            io_lock,
            timer: Mutex::new(TimerState {
                deadline: None,
                shutdown: false,
            }),
            timer_cv: Condvar::new(),
            quiescence: config.quiescence_delay,
            sync_writes: config.sync_writes,
        });

        let worker = thread::Builder::new()
            .name("satchel-coalescer".to_string())
            .spawn({
                let shared = Arc::clone(&shared);
                move || worker_loop(shared)
            })
            .map_err(|e| SatchelError::Io {
                path: None,
                kind: std::io::ErrorKind::Other,
                message: format!("failed to spawn coalescer thread: {}", e),
            })?;

        Ok(Self {
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Queue encoded bytes for a key and re-arm the quiescence timer.
    /// Never touches the disk; returns immediately.
    pub fn enqueue(&self, key: String, bytes: Vec<u8>) {
        self.shared.pending.enqueue(key, bytes);

        let mut timer = self.shared.timer.lock();
        timer.deadline = Some(Instant::now() + self.shared.quiescence);
        self.shared.timer_cv.notify_one();
    }

    /// Drop the pending entry for a key. Called before a delete so a
    /// delayed flush cannot resurrect the key.
    pub fn remove(&self, key: &str) {
        self.shared.pending.remove(key);
    }

    /// Cancel the timer and drop every pending entry. The caller holds the
    /// I/O lock (this is the `clear` path), which keeps the worker from
    /// snapshotting a batch concurrently.
    pub fn drain(&self) {
        self.shared.pending.take();
        let mut timer = self.shared.timer.lock();
        timer.deadline = None;
    }

    /// Flush all pending writes on the calling thread and cancel any armed
    /// timer. Serialized against the worker by the I/O lock, so when this
    /// returns every write enqueued before the call is durable (or was
    /// reported failed).
    pub fn flush_now(&self) -> SatchelResult<usize> {
        {
            let mut timer = self.shared.timer.lock();
            timer.deadline = None;
        }
        self.shared.flush_batch()
    }

    /// Number of writes waiting for the next flush.
    pub fn pending_count(&self) -> usize {
        self.shared.pending.pending_count()
    }

    /// Total entries made durable since the store opened.
    pub fn total_flushed(&self) -> u64 {
        self.shared.pending.total_flushed.load(Ordering::Relaxed)
    }

    /// Total non-empty flush batches since the store opened.
    pub fn flush_batches(&self) -> u64 {
        self.shared.pending.flush_batches.load(Ordering::Relaxed)
    }

    /// Stop the worker, flushing anything still pending first. Safe to call
    /// more than once.
    pub fn shutdown(&self) {
        {
            let mut timer = self.shared.timer.lock();
            timer.shutdown = true;
        }
        self.shared.timer_cv.notify_one();

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl Drop for WriteCoalescer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Worker loop: sleep until the deadline, flush, repeat. Re-arming moves
/// the deadline; cancelling clears it and the worker goes back to waiting.
fn worker_loop(shared: Arc<Shared>) {
    loop {
        let mut timer = shared.timer.lock();
        if timer.shutdown {
            break;
        }
        match timer.deadline {
            None => {
                shared.timer_cv.wait(&mut timer);
            }
            Some(deadline) => {
                if Instant::now() >= deadline {
                    timer.deadline = None;
                    drop(timer);
                    // Per-key failures are logged inside flush_batch; a
                    // timer flush has no caller to hand the error to.
                    let _ = shared.flush_batch();
                } else {
                    shared.timer_cv.wait_until(&mut timer, deadline);
                }
            }
        }
    }

    // Final flush so writes queued at shutdown are not lost
    let _ = shared.flush_batch();
}
