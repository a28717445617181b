//! Configuration for a satchel store
//!
//! Provides workload presets and parameter validation.

use std::time::Duration;

use crate::error::{SatchelError, SatchelResult};

/// Satchel configuration with workload presets
#[derive(Debug, Clone)]
pub struct Config {
    /// Quiescence delay: how long after the last write the coalesced flush
    /// fires. Every write re-arms the timer, so a burst of writes costs one
    /// flush.
    pub quiescence_delay: Duration,
    /// Durably sync each artifact write (and its directory entry). Turning
    /// this off keeps the atomic rename but trusts the OS page cache.
    pub sync_writes: bool,
    /// Load every artifact into the cache at open
    pub preload_cache: bool,
    /// Maximum key length in bytes
    pub max_key_len: usize,
    /// Maximum encoded document size in bytes
    pub max_document_bytes: usize,
}

impl Config {
    /// Interactive workload: UI state, preferences, session records.
    /// Short quiescence keeps data durable moments after the user stops
    /// typing; every flush is fully synced.
    pub fn interactive() -> Self {
        Self {
            quiescence_delay: Duration::from_millis(300),
            sync_writes: true,
            preload_cache: false,
            max_key_len: 512,
            max_document_bytes: 16 * 1024 * 1024,
        }
    }

    /// Bulk-load workload: importing or migrating thousands of records.
    /// Longer quiescence widens the batches; per-artifact sync is skipped
    /// and callers finish with `flush_now()`.
    pub fn bulk_load() -> Self {
        Self {
            quiescence_delay: Duration::from_secs(1),
            sync_writes: false,
            preload_cache: false,
            max_key_len: 512,
            max_document_bytes: 16 * 1024 * 1024,
        }
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> SatchelResult<()> {
        if self.quiescence_delay.as_millis() == 0 {
            return Err(SatchelError::Config {
                reason: "quiescence_delay must be > 0".into(),
            });
        }
        if self.quiescence_delay > Duration::from_secs(60) {
            return Err(SatchelError::Config {
                reason: "quiescence_delay must be <= 60s".into(),
            });
        }
        if self.max_key_len == 0 || self.max_key_len > 1024 {
            return Err(SatchelError::Config {
                reason: "max_key_len must be in [1, 1024]".into(),
            });
        }
        if self.max_document_bytes == 0 || self.max_document_bytes > 128 * 1024 * 1024 {
            return Err(SatchelError::Config {
                reason: "max_document_bytes must be in [1, 128MB]".into(),
            });
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::interactive()
    }
}
