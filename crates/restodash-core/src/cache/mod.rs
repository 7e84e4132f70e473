//! Response caching for dashboard reads.
//!
//! This module provides the `TieredCache`: a bounded in-memory tier in
//! front of a `PersistentStore` (in-memory or file-backed). Entries are
//! stamped when stored and served only while younger than the reader's
//! maximum age.
//!
//! - Memory eviction is FIFO by insertion, not LRU.
//! - Large values skip the persistent tier.
//! - A full store sheds its oldest half and the write is retried once.
//! - Storage failures are logged and absorbed, never returned.

pub mod entry;
pub mod store;
pub mod tiered;

pub use entry::{CacheEntry, Clock, ManualClock, SystemClock};
pub use store::{FileStore, MemoryStore, PersistentStore, StoreError};
pub use tiered::{CacheValue, TieredCache};
