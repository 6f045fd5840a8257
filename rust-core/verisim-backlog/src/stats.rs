// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Lock-free accounting for the replication backlog.
//
// The log publishes its tier split (record counts and weights of the durable
// tier and the in-memory buffer) into a set of shared atomics after every
// mutation. `SizeProbe` hands a clone of those atomics to other threads so
// the replication layer can poll `size()` / `is_empty()` without taking the
// caller-level read/write lock around the log.
//
// Totals live in their own atomics and move in a single store from one
// consistent state of the log to the next. A flush shifts records between
// the tiers but leaves the totals as they were, so `size()` never counts a
// record twice. The per-tier split is only a best-effort view while a
// mutation is being published.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Snapshot of the backlog's tier split.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacklogStats {
    /// Records held by the durable tier.
    pub durable_count: u64,
    /// Total weight of the durable records.
    pub durable_weight: u64,
    /// Records staged in the in-memory buffer.
    pub buffer_count: u64,
    /// Total weight of the buffered records.
    pub buffer_weight: u64,
}

impl BacklogStats {
    /// Records across both tiers.
    pub fn total_count(&self) -> u64 {
        self.durable_count.saturating_add(self.buffer_count)
    }

    /// Weight across both tiers.
    pub fn total_weight(&self) -> u64 {
        self.durable_weight.saturating_add(self.buffer_weight)
    }
}

/// Atomically updated counters written by the log, read by anyone.
#[derive(Debug, Default)]
pub struct LogCounters {
    total_count: AtomicU64,
    total_weight: AtomicU64,
    durable_count: AtomicU64,
    durable_weight: AtomicU64,
    buffer_count: AtomicU64,
    buffer_weight: AtomicU64,
}

impl LogCounters {
    /// Publish a consistent state of the log.
    pub fn publish(&self, stats: BacklogStats) {
        self.durable_count.store(stats.durable_count, Ordering::Release);
        self.durable_weight.store(stats.durable_weight, Ordering::Release);
        self.buffer_count.store(stats.buffer_count, Ordering::Release);
        self.buffer_weight.store(stats.buffer_weight, Ordering::Release);
        self.total_count.store(stats.total_count(), Ordering::Release);
        self.total_weight.store(stats.total_weight(), Ordering::Release);
    }

    /// Records across both tiers, as of the last publish.
    pub fn size(&self) -> u64 {
        self.total_count.load(Ordering::Acquire)
    }

    /// Weight across both tiers, as of the last publish.
    pub fn weight(&self) -> u64 {
        self.total_weight.load(Ordering::Acquire)
    }

    /// Read the per-tier counters.
    pub fn snapshot(&self) -> BacklogStats {
        BacklogStats {
            durable_count: self.durable_count.load(Ordering::Acquire),
            durable_weight: self.durable_weight.load(Ordering::Acquire),
            buffer_count: self.buffer_count.load(Ordering::Acquire),
            buffer_weight: self.buffer_weight.load(Ordering::Acquire),
        }
    }
}

/// Cloneable, lock-free view of a log's size and weights.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use verisim_backlog::stats::{LogCounters, SizeProbe};
///
/// use verisim_backlog::BacklogStats;
///
/// let counters = Arc::new(LogCounters::default());
/// let probe = SizeProbe::new(Arc::clone(&counters));
/// assert!(probe.is_empty());
///
/// counters.publish(BacklogStats {
///     durable_count: 3,
///     durable_weight: 30,
///     buffer_count: 2,
///     buffer_weight: 5,
/// });
/// assert_eq!(probe.size(), 5);
/// assert_eq!(probe.weight(), 35);
/// ```
#[derive(Debug, Clone)]
pub struct SizeProbe {
    counters: Arc<LogCounters>,
}

impl SizeProbe {
    /// Wrap a set of shared counters.
    pub fn new(counters: Arc<LogCounters>) -> Self {
        Self { counters }
    }

    /// Records in the log.
    pub fn size(&self) -> u64 {
        self.counters.size()
    }

    /// Whether the log holds no records.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Total weight of the log.
    pub fn weight(&self) -> u64 {
        self.counters.weight()
    }

    /// Weight held in the in-memory buffer.
    pub fn memory_packets_weight(&self) -> u64 {
        self.counters.snapshot().buffer_weight
    }

    /// Weight held in the durable tier.
    pub fn external_storage_packets_weight(&self) -> u64 {
        self.counters.snapshot().durable_weight
    }

    /// Current tier split.
    pub fn stats(&self) -> BacklogStats {
        self.counters.snapshot()
    }
}
