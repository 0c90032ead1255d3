//! Per-bucket statistics
//!
//! Every bucket owns one [`BucketStats`] handle. The dispatcher bumps a
//! counter for each forwarded call; `aggregate_stats` folds the handles of
//! all listed buckets into one [`StatsSnapshot`].

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Kind of forwarded operation, for accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Allocate,
    Get,
    Store,
    Remove,
    Arithmetic,
    Flush,
    Stats,
    Tap,
    Other,
}

/// Live counters for one bucket
#[derive(Debug, Default)]
pub struct BucketStats {
    allocations: AtomicU64,
    gets: AtomicU64,
    stores: AtomicU64,
    removes: AtomicU64,
    arithmetic: AtomicU64,
    flushes: AtomicU64,
    stats_calls: AtomicU64,
    tap_calls: AtomicU64,
    other: AtomicU64,
}

impl BucketStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, op: OpKind) {
        let counter = match op {
            OpKind::Allocate => &self.allocations,
            OpKind::Get => &self.gets,
            OpKind::Store => &self.stores,
            OpKind::Remove => &self.removes,
            OpKind::Arithmetic => &self.arithmetic,
            OpKind::Flush => &self.flushes,
            OpKind::Stats => &self.stats_calls,
            OpKind::Tap => &self.tap_calls,
            OpKind::Other => &self.other,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            allocations: self.allocations.load(Ordering::Relaxed),
            gets: self.gets.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            removes: self.removes.load(Ordering::Relaxed),
            arithmetic: self.arithmetic.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            stats_calls: self.stats_calls.load(Ordering::Relaxed),
            tap_calls: self.tap_calls.load(Ordering::Relaxed),
            other: self.other.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of a [`BucketStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub allocations: u64,
    pub gets: u64,
    pub stores: u64,
    pub removes: u64,
    pub arithmetic: u64,
    pub flushes: u64,
    pub stats_calls: u64,
    pub tap_calls: u64,
    pub other: u64,
}

impl StatsSnapshot {
    /// Add another bucket's counters into this one
    pub fn merge(&mut self, other: &StatsSnapshot) {
        self.allocations += other.allocations;
        self.gets += other.gets;
        self.stores += other.stores;
        self.removes += other.removes;
        self.arithmetic += other.arithmetic;
        self.flushes += other.flushes;
        self.stats_calls += other.stats_calls;
        self.tap_calls += other.tap_calls;
        self.other += other.other;
    }

    pub fn total(&self) -> u64 {
        self.allocations
            + self.gets
            + self.stores
            + self.removes
            + self.arithmetic
            + self.flushes
            + self.stats_calls
            + self.tap_calls
            + self.other
    }
}
