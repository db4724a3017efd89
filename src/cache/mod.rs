//! Session-scoped response cache.
//!
//! Calls explicitly marked cache-allowed are served from here without touching the
//! network once a successful envelope for the same URL has been stored.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ResponseCache`] | Envelope cache over a [`crate::storage::Storage`] area, with eviction and statistics |
//! | [`CacheKey`] | The exact request URL |
//! | [`CacheStats`] | Hit/miss/write/eviction/error counters |
//!
//! ## Eviction
//!
//! The backing area has a byte quota. When a write is refused the oldest quarter of
//! the stored entries (by insertion order) is removed and the write is tried once
//! more. If that fails too the entry is simply not cached.

mod key;
mod manager;

pub use key::CacheKey;
pub use manager::{CacheStats, ResponseCache};
