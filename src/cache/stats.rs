//! Cache Statistics Module
//!
//! Snapshot of entry counts reported by `stats()`.

use serde::Serialize;

// == Cache Stats ==
/// Entry counts at the time of the call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Total stored entries, including expired ones not yet cleaned up
    pub size: usize,
    /// Entries currently past their expiry
    pub expired: usize,
}

impl CacheStats {
    // == Constructor ==
    pub fn new(size: usize, expired: usize) -> Self {
        Self { size, expired }
    }

    // == Live Entries ==
    /// Number of entries a normal read would still return.
    pub fn live(&self) -> usize {
        self.size.saturating_sub(self.expired)
    }
}
