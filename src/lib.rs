//! Satchel — embedded, crash-safe document store
//!
//! A small key → document storage engine for use inside an application
//! process: many small structured records, fast cached reads, coalesced
//! durable writes.
//!
//! # Architecture
//!
//! - **Read path**: served from the in-memory cache; a miss falls back to
//!   the per-key artifact file and populates the cache
//! - **Write path**: cache first (writes are readable immediately), then a
//!   pending queue drained by a quiescence timer — a burst of writes costs
//!   one flush
//! - **Durability**: every artifact lands via write-temp, sync, rename,
//!   sync-directory, so a crash mid-write never exposes a torn record
//!
//! Deletes and `clear` are synchronous and win over pending writes: a
//! queued write for a deleted key is discarded, never resurrected.
//!
//! # Example
//!
//! ```no_run
//! use satchel::{Config, SatchelEngine};
//! use serde_json::json;
//!
//! let store = SatchelEngine::open("/tmp/satchel-demo", Config::default()).unwrap();
//! store.set_item("profile", &json!({ "name": "ada", "logins": 3 })).unwrap();
//! assert_eq!(
//!     store.get_item("profile").unwrap(),
//!     Some(json!({ "name": "ada", "logins": 3 })),
//! );
//! store.flush_now().unwrap();
//! ```

pub mod artifact;
pub mod cache;
pub mod coalescer;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod fsync;

// Re-export key types for convenience
pub use artifact::ArtifactStore;
pub use cache::{CacheEntry, DocumentCache};
pub use coalescer::WriteCoalescer;
pub use codec::Document;
pub use config::Config;
pub use engine::SatchelEngine;
pub use error::{SatchelError, SatchelResult};
