//! Bridge activity counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by the binder, marshaling engine and dispatcher
#[derive(Debug, Default)]
pub struct BridgeStats {
    /// Calls attempted across the boundary (either direction)
    pub calls: AtomicU64,
    /// Calls that ended with a non-zero exception code
    pub faults: AtomicU64,
    /// Top-level single-value marshal operations
    pub marshal_calls: AtomicU64,
    /// Interned strings sent as a reference only
    pub interned_refs: AtomicU64,
    /// Interned strings sent as a full copy
    pub interned_copies: AtomicU64,
    /// Method table resolutions performed by the binder
    pub resolutions: AtomicU64,
    /// Binds answered from the binder cache
    pub bind_cache_hits: AtomicU64,
}

impl BridgeStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BridgeStatsSnapshot {
        BridgeStatsSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
            marshal_calls: self.marshal_calls.load(Ordering::Relaxed),
            interned_refs: self.interned_refs.load(Ordering::Relaxed),
            interned_copies: self.interned_copies.load(Ordering::Relaxed),
            resolutions: self.resolutions.load(Ordering::Relaxed),
            bind_cache_hits: self.bind_cache_hits.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of bridge statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BridgeStatsSnapshot {
    pub calls: u64,
    pub faults: u64,
    pub marshal_calls: u64,
    pub interned_refs: u64,
    pub interned_copies: u64,
    pub resolutions: u64,
    pub bind_cache_hits: u64,
}

impl BridgeStatsSnapshot {
    /// Share of interned-string transmissions that avoided a copy (0.0 - 100.0)
    pub fn intern_hit_rate(&self) -> f64 {
        let total = self.interned_refs + self.interned_copies;
        if total == 0 {
            0.0
        } else {
            (self.interned_refs as f64 / total as f64) * 100.0
        }
    }
}
